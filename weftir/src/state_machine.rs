//! The declared contract of a compiler-generated continuation state machine.
//!
//! An asynchronous method's body arrives here already lowered by the
//! upstream compilation stage: suspensions are explicit `Suspend`
//! instructions and completion is signaled through a builder slot. The
//! descriptor is the only thing the weaver needs to know about that
//! encoding: where first-invocation execution begins, where each logical
//! suspension point resumes and which slot holds the builder.
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::instr::{InstrIdx, Slot};

/// Mapping from logical suspension points to resumption entries, plus the
/// identity of the completion-signaling builder slot.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StateMachineDescriptor {
    /// Where execution of the first invocation begins. Code spliced at this
    /// index runs exactly once per logical invocation, never on resumption.
    pub initial_entry: InstrIdx,

    /// Resumption entry instruction for each suspension point. Resuming the
    /// machine jumps straight here, bypassing everything before it.
    pub resume_points: BTreeMap<u32, InstrIdx>,

    /// The synthetic slot holding the builder that signals completion.
    /// `SetResult`/`SetError` against this slot are the terminal
    /// transitions of the machine.
    pub completion_slot: Slot,
}

impl StateMachineDescriptor {
    pub fn new(completion_slot: Slot) -> Self {
        StateMachineDescriptor {
            initial_entry: InstrIdx(0),
            resume_points: BTreeMap::new(),
            completion_slot,
        }
    }

    pub fn with_resume_point(mut self, point: u32, entry: InstrIdx) -> Self {
        self.resume_points.insert(point, entry);
        self
    }

    pub fn resume_entry(&self, point: u32) -> Option<InstrIdx> {
        self.resume_points.get(&point).copied()
    }
}
