//! The weft weaving engine.
//!
//! Given a compiled [`weftir::method::MethodUnit`] and the ordered list of
//! aspect attachments resolved for it, the engine produces a new method unit
//! whose body invokes the attached aspects' lifecycle hooks around the
//! original logic. The external signature, call sites and observable
//! semantics of the method are preserved; only the documented injected
//! effects are added.
//!
//! - [`resolve`]: maps method identities to their ordered attachments
//! - [`bind`]: checks attachment configuration against aspect declarations
//! - [`weave`]: the core rewrite for synchronous shapes
//! - [`adapter`]: the injection strategy for continuation state machines
//! - [`exit`]: typed exit-value dispatch at every return path
//! - [`diag`]: structured diagnostics surfaced to the build host
//! - [`pass`]: the parallel per-module driver with partial-failure semantics
//!
//! Weaving is a build-time transformation: the engine never executes
//! business logic and performs no artifact I/O. The feature-gated
//! [`testkit`] module carries an IR evaluator used by the engine's own
//! tests to observe woven behavior.

pub mod adapter;
pub mod bind;
pub mod diag;
pub mod error;
pub mod exit;
pub mod pass;
pub mod resolve;
#[cfg(any(test, feature = "test-utils"))]
pub mod testkit;
pub mod weave;

pub use error::{BindingError, ResolutionError, WeaveError};
pub use pass::{PassReport, weave_module};
pub use resolve::{AspectAttachment, AspectRegistry, Resolver};
pub use weave::Weaver;
