//! Method units: the unit of work of a weave.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{body::Body, body::BodyError, types::TypeToken};

/// One declared parameter: name plus declared type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Param {
    pub name: String,
    pub ty: TypeToken,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: TypeToken) -> Self {
        Param {
            name: name.into(),
            ty,
        }
    }
}

/// The externally observable signature of a method. The weaver must leave
/// this unchanged; it is compared before and after every rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MethodSignature {
    pub name: String,
    pub qualified_name: String,
    pub declaring_type: String,
    pub params: Vec<Param>,
    pub return_type: Option<TypeToken>,
    pub is_async: bool,
}

/// A compiled method: identity, signature and an owned body.
///
/// Constructed once per method by the host toolchain before weaving. The
/// weaver consumes it by reference and produces a fresh unit with a
/// rewritten body; the input is never mutated in place.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MethodUnit {
    pub uuid: Uuid,
    pub name: String,
    pub qualified_name: String,
    pub declaring_type: String,
    pub params: Vec<Param>,
    /// Declared return type; `None` is `void`. For asynchronous methods this
    /// is the logical result type the builder completes with.
    pub return_type: Option<TypeToken>,
    pub is_async: bool,
    pub body: Body,
}

impl MethodUnit {
    pub fn new(
        name: impl Into<String>,
        declaring_type: impl Into<String>,
        params: Vec<Param>,
        return_type: Option<TypeToken>,
        body: Body,
    ) -> Self {
        let name = name.into();
        let declaring_type = declaring_type.into();
        MethodUnit {
            uuid: Uuid::new_v4(),
            qualified_name: format!("{}::{}", declaring_type, name),
            name,
            declaring_type,
            params,
            return_type,
            is_async: false,
            body,
        }
    }

    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }

    /// The externally observable part of this unit.
    pub fn signature(&self) -> MethodSignature {
        MethodSignature {
            name: self.name.clone(),
            qualified_name: self.qualified_name.clone(),
            declaring_type: self.declaring_type.clone(),
            params: self.params.clone(),
            return_type: self.return_type,
            is_async: self.is_async,
        }
    }

    /// Validate the body against this method's declared shape.
    pub fn validate(&self) -> Result<(), BodyError> {
        self.body.validate(self.is_async)
    }
}
