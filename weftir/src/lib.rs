//! Method-level intermediate representation used by the weft weaving engine.
//!
//! The crate models a compiled method body as a flat, index-addressed
//! instruction stream plus a set of exception-handling regions and, for
//! asynchronous methods, a state-machine descriptor supplied by the upstream
//! compilation stage. It deliberately stays below source level: there is no
//! notion of expressions or statements here, only instructions, ranges and
//! slots.
//!
//! - [`instr`]: the instruction set and operand model
//! - [`region`]: exception-handling regions (catch-all / finally)
//! - [`state_machine`]: the opaque contract of compiler-generated
//!   continuation state machines
//! - [`body`]: the owning [`body::Body`] container with validation and the
//!   splice/replace editing primitives rewrites are built on
//! - [`method`]: [`method::MethodUnit`], the unit of work of a weave
//! - [`types`]: interned type identities ([`types::TypeToken`])
//! - [`value`]: literal and runtime values carried by operands

pub mod body;
pub mod fmt;
pub mod instr;
pub mod method;
pub mod region;
pub mod state_machine;
pub mod types;
pub mod value;
