//! Explicit hook outcomes.
//!
//! Veto and suppression are named transitions of the dispatch contract, not
//! implicit throw/catch conventions: an entry hook states whether the body
//! may run, and an exception hook states whether the error keeps
//! propagating. Woven code branches on these values; nothing is inferred
//! from a hook happening to raise.
use strum::EnumIs;
use weftir::value::{ErrorValue, Value};

/// What an entry hook decided.
#[derive(Debug, Clone, PartialEq, EnumIs)]
pub enum EntryOutcome {
    /// Run the body (after any later entry hooks).
    Proceed,
    /// Do not run the body; unwind with the carried error. Later entry
    /// hooks are skipped and exception hooks observe the error.
    Veto(ErrorValue),
}

/// What an exception hook decided.
#[derive(Debug, Clone, PartialEq, EnumIs)]
pub enum ExceptionOutcome {
    /// Keep unwinding; the error reaches the caller unchanged in type.
    Propagate,
    /// Stop the unwind and complete the method normally with the carried
    /// replacement value (`Value::Unit` for void methods).
    Suppress(Value),
}
