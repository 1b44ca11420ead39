//! The owning container for a method body.
//!
//! A [`Body`] is a flat instruction stream, its exception regions and, for
//! asynchronous methods, a state-machine descriptor. Because every branch
//! target, region bound and resume point is an instruction index, inserting
//! code means patching all of them consistently; [`Body::splice`] and
//! [`Body::replace_instr`] are the two primitives that do so, and every
//! rewrite in the engine is built from them. Naive insertion without this
//! bookkeeping is exactly what breaks region boundaries and state machines.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    instr::{Instr, InstrIdx, Slot},
    region::{ExceptionRegion, InstrRange},
    state_machine::StateMachineDescriptor,
};

/// Structural errors that make a body unusable as weaving input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BodyError {
    /// A branch references an instruction index past the end of the stream.
    #[error("instruction {at} branches to {target}, but the body only contains {len} instructions")]
    TargetOutOfBounds {
        at: InstrIdx,
        target: InstrIdx,
        len: usize,
    },

    /// A region range extends past the end of the instruction stream.
    #[error("exception region #{index} references instructions past the end of the body")]
    RegionOutOfBounds { index: usize },

    /// A region declares an empty protected or handler range.
    #[error("exception region #{index} declares an empty range; every region must cover at least one instruction")]
    EmptyRegionRange { index: usize },

    /// Two ranges partially overlap, violating well-nestedness.
    #[error("exception region ranges {first} and {second} partially overlap; regions must be disjoint or strictly nested")]
    RegionOverlap { first: InstrRange, second: InstrRange },

    /// A region's handler overlaps its own protected range.
    #[error("exception region #{index} has a handler range overlapping its protected range")]
    HandlerOverlapsProtected { index: usize },

    /// An asynchronous body arrived without a state-machine descriptor.
    #[error("asynchronous body carries no state-machine descriptor")]
    MissingStateMachine,

    /// A resume point targets an instruction past the end of the stream.
    #[error("state machine resume point {point} targets {target}, past the end of the body")]
    ResumePointOutOfBounds { point: u32, target: InstrIdx },

    /// The declared completion slot is never signaled.
    #[error("state machine completion slot %{slot} is never signaled by a SetResult/SetError instruction")]
    MissingCompletionSignal { slot: Slot },

    /// A host-supplied body already contains hook dispatch instructions.
    #[error("instruction {at} is a hook call; hook calls may only be produced by the weaver, never supplied as input")]
    ForeignHook { at: InstrIdx },
}

/// A method body: instructions, regions and (for async shapes) the
/// state-machine descriptor.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Body {
    pub instrs: Vec<Instr>,
    pub regions: Vec<ExceptionRegion>,
    pub state_machine: Option<StateMachineDescriptor>,
}

impl Body {
    pub fn new(instrs: Vec<Instr>) -> Self {
        Body {
            instrs,
            regions: Vec::new(),
            state_machine: None,
        }
    }

    pub fn with_regions(mut self, regions: Vec<ExceptionRegion>) -> Self {
        self.regions = regions;
        self
    }

    pub fn with_state_machine(mut self, descriptor: StateMachineDescriptor) -> Self {
        self.state_machine = Some(descriptor);
        self
    }

    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// First slot not referenced anywhere in the body. Arguments live in
    /// their own address space, so only slot references count.
    pub fn next_free_slot(&self) -> Slot {
        let mut max: Option<Slot> = None;
        for instr in &self.instrs {
            for slot in instr.referenced_slots() {
                max = Some(max.map_or(slot, |m| m.max(slot)));
            }
        }
        if let Some(desc) = &self.state_machine {
            max = Some(max.map_or(desc.completion_slot, |m| m.max(desc.completion_slot)));
        }
        max.map_or(0, |m| m + 1)
    }

    /// Indices of every `Ret` instruction.
    pub fn return_sites(&self) -> Vec<InstrIdx> {
        self.instrs
            .iter()
            .enumerate()
            .filter(|(_, instr)| instr.is_ret())
            .map(|(i, _)| InstrIdx(i as u32))
            .collect()
    }

    /// Indices of every `SetResult`/`SetError` signaling the given slot.
    pub fn completion_sites(&self, slot: Slot) -> Vec<InstrIdx> {
        self.instrs
            .iter()
            .enumerate()
            .filter(|(_, instr)| match instr {
                Instr::SetResult(set) => set.slot == slot,
                Instr::SetError(set) => set.slot == slot,
                _ => false,
            })
            .map(|(i, _)| InstrIdx(i as u32))
            .collect()
    }

    /// First hook-call instruction, if any. Host input must contain none.
    pub fn first_hook(&self) -> Option<InstrIdx> {
        self.instrs
            .iter()
            .position(|instr| instr.is_hook())
            .map(|i| InstrIdx(i as u32))
    }

    /// Insert `new_instrs` before the instruction currently at `at`,
    /// patching every index that refers into the stream:
    ///
    /// - branch targets and resume points at or after `at` shift forward,
    ///   so existing control flow lands on the instructions it used to;
    /// - a region whose range starts exactly at `at` grows to include the
    ///   inserted code (insertion happens *inside* the region), while a
    ///   range ending at `at` stays closed (insertion happens after it);
    /// - a state machine's `initial_entry` equal to `at` is left in place,
    ///   so the inserted code becomes part of first-invocation entry.
    ///
    /// Targets inside `new_instrs` must already be expressed in post-splice
    /// coordinates.
    pub fn splice(&mut self, at: InstrIdx, new_instrs: Vec<Instr>) {
        let len = new_instrs.len() as u32;
        if len == 0 {
            return;
        }
        debug_assert!(at.index() <= self.instrs.len());
        log::trace!("splicing {} instructions at {}", len, at);

        for instr in &mut self.instrs {
            if let Some(target) = instr.branch_target_mut() {
                if *target >= at {
                    target.0 += len;
                }
            }
        }
        for region in &mut self.regions {
            for range in [&mut region.protected, &mut region.handler] {
                if at < range.start {
                    range.start.0 += len;
                }
                if at < range.end {
                    range.end.0 += len;
                }
            }
        }
        if let Some(desc) = &mut self.state_machine {
            if at < desc.initial_entry {
                desc.initial_entry.0 += len;
            }
            for entry in desc.resume_points.values_mut() {
                if *entry >= at {
                    entry.0 += len;
                }
            }
        }
        self.instrs.splice(at.index()..at.index(), new_instrs);
    }

    /// Replace the single instruction at `at` with a sequence. Branches and
    /// resume points that targeted `at` now land on the first replacement
    /// instruction; a region covering `at` grows to cover the whole
    /// sequence. Targets inside `replacement` must be expressed in
    /// post-replacement coordinates.
    pub fn replace_instr(&mut self, at: InstrIdx, replacement: Vec<Instr>) {
        debug_assert!(at.index() < self.instrs.len());
        debug_assert!(!replacement.is_empty());
        let delta = replacement.len() as u32 - 1;

        if delta > 0 {
            for (i, instr) in self.instrs.iter_mut().enumerate() {
                if i == at.index() {
                    continue;
                }
                if let Some(target) = instr.branch_target_mut() {
                    if *target > at {
                        target.0 += delta;
                    }
                }
            }
            for region in &mut self.regions {
                for range in [&mut region.protected, &mut region.handler] {
                    if at < range.start {
                        range.start.0 += delta;
                    }
                    if at < range.end {
                        range.end.0 += delta;
                    }
                }
            }
            if let Some(desc) = &mut self.state_machine {
                if at < desc.initial_entry {
                    desc.initial_entry.0 += delta;
                }
                for entry in desc.resume_points.values_mut() {
                    if *entry > at {
                        entry.0 += delta;
                    }
                }
            }
        }
        self.instrs
            .splice(at.index()..at.index() + 1, replacement);
    }

    /// Structural validation: branch targets in bounds, regions well-nested,
    /// and (for asynchronous shapes) a usable state-machine descriptor.
    pub fn validate(&self, is_async: bool) -> Result<(), BodyError> {
        let len = self.instrs.len();

        for (i, instr) in self.instrs.iter().enumerate() {
            if let Some(target) = instr.branch_target() {
                if target.index() >= len {
                    return Err(BodyError::TargetOutOfBounds {
                        at: InstrIdx(i as u32),
                        target,
                        len,
                    });
                }
            }
        }

        for (index, region) in self.regions.iter().enumerate() {
            for range in [&region.protected, &region.handler] {
                if range.is_empty() {
                    return Err(BodyError::EmptyRegionRange { index });
                }
                if range.end.index() > len {
                    return Err(BodyError::RegionOutOfBounds { index });
                }
            }
            if !region.protected.disjoint(&region.handler) {
                return Err(BodyError::HandlerOverlapsProtected { index });
            }
        }

        let mut ranges: Vec<InstrRange> = Vec::with_capacity(self.regions.len() * 2);
        for region in &self.regions {
            ranges.push(region.protected);
            ranges.push(region.handler);
        }
        for i in 0..ranges.len() {
            for j in (i + 1)..ranges.len() {
                let (a, b) = (&ranges[i], &ranges[j]);
                if !(a.disjoint(b) || a.encloses(b) || b.encloses(a)) {
                    return Err(BodyError::RegionOverlap {
                        first: *a,
                        second: *b,
                    });
                }
            }
        }

        if is_async {
            let desc = self
                .state_machine
                .as_ref()
                .ok_or(BodyError::MissingStateMachine)?;
            for (point, entry) in &desc.resume_points {
                if entry.index() >= len {
                    return Err(BodyError::ResumePointOutOfBounds {
                        point: *point,
                        target: *entry,
                    });
                }
            }
            if self.completion_sites(desc.completion_slot).is_empty() {
                return Err(BodyError::MissingCompletionSignal {
                    slot: desc.completion_slot,
                });
            }
        }

        Ok(())
    }

    /// Regions whose protected range covers `at`, innermost first.
    pub fn enclosing_regions(&self, at: InstrIdx) -> Vec<usize> {
        let mut enclosing: Vec<usize> = self
            .regions
            .iter()
            .enumerate()
            .filter(|(_, region)| region.protected.contains(at))
            .map(|(i, _)| i)
            .collect();
        enclosing.sort_by_key(|&i| self.regions[i].protected.len());
        enclosing
    }
}
