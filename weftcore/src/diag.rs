//! Structured diagnostics surfaced to the build host.
//!
//! The engine never formats or prints; it hands the host a kind, the
//! affected method's identity and a message, and the host decides how to
//! report them.
use strum::EnumIs;
use uuid::Uuid;
use weftir::method::MethodUnit;

use crate::error::WeaveError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIs)]
pub enum DiagnosticKind {
    Resolution,
    MalformedBody,
    Binding,
    Invariant,
}

/// One reportable build-time failure, bound to a single method unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub method: Uuid,
    pub method_name: String,
    pub message: String,
}

impl Diagnostic {
    pub fn from_error(method: &MethodUnit, error: &WeaveError) -> Self {
        let kind = match error {
            WeaveError::Resolution(_) => DiagnosticKind::Resolution,
            WeaveError::MalformedBody(_) => DiagnosticKind::MalformedBody,
            WeaveError::Binding(_) => DiagnosticKind::Binding,
            WeaveError::InvariantViolation { .. } => DiagnosticKind::Invariant,
        };
        Diagnostic {
            kind,
            method: method.uuid,
            method_name: method.qualified_name.clone(),
            message: error.to_string(),
        }
    }
}
