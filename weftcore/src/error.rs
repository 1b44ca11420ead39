//! Build-time failure taxonomy.
//!
//! Every variant is reported to the external host as a failure of one
//! specific method unit; weaving of independent methods continues.
use thiserror::Error;
use uuid::Uuid;
use weftir::{body::BodyError, types::TypeToken};

/// Attachment metadata could not be resolved against known aspects.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolutionError {
    #[error("method `{method}` is attached to aspect `{aspect}`, which is not present in the aspect registry")]
    UnknownAspect { method: String, aspect: Uuid },

    #[error(
        "attachment of aspect `{aspect}` to method `{method}` requires a typed exit hook for the method's return type, but the declared handler type does not match"
    )]
    ReturnTypeMismatch {
        method: String,
        aspect: String,
        expected: TypeToken,
        found: Option<TypeToken>,
    },
}

/// Attachment construction arguments do not satisfy the aspect's declared
/// parameter shape.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindingError {
    #[error("aspect `{aspect}` expects {expected} configuration arguments, but the attachment supplies {found}")]
    ArityMismatch {
        aspect: String,
        expected: usize,
        found: usize,
    },

    #[error("configuration argument `{param}` of aspect `{aspect}` has the wrong type")]
    TypeMismatch {
        aspect: String,
        param: String,
        expected: TypeToken,
        found: TypeToken,
    },
}

/// Anything that can make the weave of one method fail.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WeaveError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("malformed input body: {0}")]
    MalformedBody(#[from] BodyError),

    #[error(transparent)]
    Binding(#[from] BindingError),

    /// Internal: the rewritten unit would differ from the input in its
    /// externally observable signature, or failed re-validation. Always
    /// fatal for the method; never surfaced to a hook.
    #[error("weave invariant violated for method `{method}`: {detail}")]
    InvariantViolation { method: String, detail: String },
}
