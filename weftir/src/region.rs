//! Exception-handling regions.
//!
//! A region pairs a protected instruction range with a handler range and a
//! handler kind. Regions must be well-nested: any two ranges in a body are
//! either disjoint or one strictly contains the other, and a region's
//! handler never overlaps its own protected range. The body validator
//! enforces this before any rewrite runs.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::EnumIs;

use crate::instr::InstrIdx;

/// A half-open range `[start, end)` of instruction indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InstrRange {
    pub start: InstrIdx,
    pub end: InstrIdx,
}

impl InstrRange {
    pub fn new(start: u32, end: u32) -> Self {
        InstrRange {
            start: InstrIdx(start),
            end: InstrIdx(end),
        }
    }

    pub fn contains(&self, idx: InstrIdx) -> bool {
        self.start <= idx && idx < self.end
    }

    pub fn len(&self) -> u32 {
        self.end.0.saturating_sub(self.start.0)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// True when the two ranges share no instruction.
    pub fn disjoint(&self, other: &InstrRange) -> bool {
        self.end <= other.start || other.end <= self.start
    }

    /// True when `self` contains every instruction of `other`.
    pub fn encloses(&self, other: &InstrRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl std::fmt::Display for InstrRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// What the handler range of a region does when it gains control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum HandlerKind {
    /// Gains control for any exception raised in the protected range, with
    /// the exception in flight available through `LoadExn`.
    CatchAll,
    /// Runs after normal exit from the protected range (via `Leave`) and
    /// during unwinds that cross it; terminated by `EndFinally`.
    Finally,
}

/// One exception-handling region of a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExceptionRegion {
    pub protected: InstrRange,
    pub handler: InstrRange,
    pub kind: HandlerKind,
}

impl ExceptionRegion {
    pub fn catch_all(protected: InstrRange, handler: InstrRange) -> Self {
        ExceptionRegion {
            protected,
            handler,
            kind: HandlerKind::CatchAll,
        }
    }

    pub fn finally(protected: InstrRange, handler: InstrRange) -> Self {
        ExceptionRegion {
            protected,
            handler,
            kind: HandlerKind::Finally,
        }
    }
}
