//! The runtime-facing hook dispatch contract.
//!
//! Everything woven code depends on at run time lives here: the [`Aspect`]
//! trait with its entry/exit/exception/typed-exit hooks and their
//! asynchronous variants, the [`ArgumentsView`] handed to every hook, the
//! explicit hook outcomes, and the weave-time [`AspectDescriptor`] that
//! declares which hooks an aspect actually implements. The crate has no
//! dependency on the weaver; the dependency points the other way.

pub mod args;
pub mod aspect;
pub mod cancel;
pub mod outcome;

pub use args::ArgumentsView;
pub use aspect::{Aspect, AspectDescriptor, Capabilities, ConfigParam};
pub use cancel::Cancellation;
pub use outcome::{EntryOutcome, ExceptionOutcome};
