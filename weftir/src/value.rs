//! Literal and runtime values.
//!
//! Operands may embed immediate [`Value`]s; the same type doubles as the
//! runtime representation handed to hooks through an arguments view. Error
//! objects are first-class values so that an exception in flight can be
//! passed to exception hooks and rethrown without loss of identity.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::{EnumIs, EnumTryAs};

use crate::types::TypeToken;

/// A concrete value as seen by woven code and hooks.
#[derive(Debug, Clone, PartialEq, EnumIs, EnumTryAs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Value {
    Unit,
    Bool(bool),
    I32(i32),
    I64(i64),
    F64(f64),
    Str(String),
    Error(ErrorValue),
}

impl Value {
    /// Static type identity of this value.
    pub fn type_token(&self) -> TypeToken {
        match self {
            Value::Unit => TypeToken::UNIT,
            Value::Bool(_) => TypeToken::BOOL,
            Value::I32(_) => TypeToken::I32,
            Value::I64(_) => TypeToken::I64,
            Value::F64(_) => TypeToken::F64,
            Value::Str(_) => TypeToken::STR,
            Value::Error(error) => error.ty,
        }
    }

    /// Truthiness used by conditional branches. Anything that is not a
    /// boolean is a malformed body, treated as `false` by the validator's
    /// leniency rather than a panic.
    pub fn as_condition(&self) -> bool {
        matches!(self, Value::Bool(true))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::I32(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

/// An exception object: a nominal type identity plus a human-readable
/// message. Identity is what exception semantics preserve; the message is
/// advisory.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ErrorValue {
    pub ty: TypeToken,
    pub message: String,
}

impl ErrorValue {
    pub fn new(ty: TypeToken, message: impl Into<String>) -> Self {
        ErrorValue {
            ty,
            message: message.into(),
        }
    }

    /// The error surfaced when a cancelled execution context is observed by
    /// an asynchronous hook.
    pub fn cancelled() -> Self {
        ErrorValue::new(TypeToken::CANCELLED, "execution context was cancelled")
    }
}

impl std::fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "error: {}", self.message)
    }
}
