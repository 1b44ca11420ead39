//! The core rewrite for synchronous method shapes.
//!
//! The woven layout gives every method a single exit choke point:
//!
//! ```text
//! prologue   suppressed := false; entry hooks, attachment order
//! body       original instructions, every `ret` rerouted through the
//!            exit-value dispatcher and a `leave` to the epilogue
//! handler    synthetic catch-all: exception hooks in reverse order,
//!            then rethrow unless some aspect suppressed
//! epilogue   untyped exit hooks in reverse order, final `ret`
//! ```
//!
//! The prologue sits inside the synthetic protected region, so a veto (or
//! any error raised by an entry hook) skips later entry hooks and the body
//! and unwinds straight into the handler. A suppression branches past the
//! rethrow directly to the final `ret`, returning the replacement value:
//! every aspect has already been notified through its exception hook, so
//! the untyped exit hooks do not run on that path.
use log::{debug, trace};
use weftir::{
    body::{Body, BodyError},
    instr::{
        BranchIf, Const, HookCall, HookPoint, Instr, InstrIdx, LoadExn, Leave, Operand, Ret,
        Rethrow,
    },
    method::MethodUnit,
    region::{ExceptionRegion, InstrRange},
    value::Value,
};

use crate::{
    adapter, bind::bind_arguments, error::WeaveError, exit::ExitRecord, resolve::AspectAttachment,
};

/// The weaving engine. Stateless; one instance may serve any number of
/// parallel weaves.
#[derive(Debug, Default)]
pub struct Weaver;

impl Weaver {
    pub fn new() -> Self {
        Weaver
    }

    /// Produce a new method unit whose body invokes the attachments' hooks
    /// around the original logic. The input is not mutated.
    ///
    /// An empty attachment list is the identity transform: the result is a
    /// bit-for-bit clone of the input, required so that untouched methods
    /// are unaffected by the weaving pass.
    pub fn weave(
        &self,
        method: &MethodUnit,
        attachments: &[AspectAttachment],
    ) -> Result<MethodUnit, WeaveError> {
        if attachments.is_empty() {
            trace!("{}: no attachments, identity transform", method.qualified_name);
            return Ok(method.clone());
        }

        method.body.validate(method.is_async)?;
        if let Some(at) = method.body.first_hook() {
            return Err(WeaveError::MalformedBody(BodyError::ForeignHook { at }));
        }
        for attachment in attachments {
            bind_arguments(&attachment.descriptor, &attachment.arguments)?;
        }

        debug!(
            "weaving {} ({} attachments, {})",
            method.qualified_name,
            attachments.len(),
            if method.is_async { "async" } else { "sync" }
        );

        let woven = if method.is_async {
            adapter::weave_async(method, attachments)
        } else {
            weave_sync(method, attachments)
        };

        self.check_invariants(method, woven)
    }

    /// Post-conditions of every weave: unchanged external signature and a
    /// structurally valid result. A violation is an engine bug, fatal for
    /// the method and never surfaced to a hook.
    fn check_invariants(
        &self,
        original: &MethodUnit,
        woven: MethodUnit,
    ) -> Result<MethodUnit, WeaveError> {
        if woven.signature() != original.signature() {
            return Err(WeaveError::InvariantViolation {
                method: original.qualified_name.clone(),
                detail: "rewritten unit changed the externally observable signature".to_string(),
            });
        }
        woven
            .validate()
            .map_err(|error| WeaveError::InvariantViolation {
                method: original.qualified_name.clone(),
                detail: format!("rewritten body failed validation: {}", error),
            })?;
        Ok(woven)
    }
}

fn weave_sync(method: &MethodUnit, attachments: &[AspectAttachment]) -> MethodUnit {
    let original = &method.body;
    let k = attachments.len();
    let n = original.instrs.len();

    let result = original.next_free_slot();
    let suppressed = result + 1;
    let exn = result + 2;

    let record = ExitRecord::new(result, method.return_type);
    let typed_len = record.typed_chain(attachments).len();
    // capture + typed chain + leave
    let ret_expansion = (2 + typed_len) as u32;

    let prologue_len = (1 + k) as u32;
    let mut map: Vec<u32> = Vec::with_capacity(n + 1);
    let mut cursor = prologue_len;
    for instr in &original.instrs {
        map.push(cursor);
        cursor += if instr.is_ret() { ret_expansion } else { 1 };
    }
    map.push(cursor);

    let handler_start = cursor;
    let exit_start = handler_start + (k as u32) + 3;
    let final_ret = exit_start + k as u32;

    let mut instrs: Vec<Instr> = Vec::with_capacity(final_ret as usize + 1);

    // Prologue.
    instrs.push(
        Const {
            dst: suppressed,
            value: Value::Bool(false),
        }
        .into(),
    );
    for index in 0..k {
        instrs.push(
            HookCall {
                attachment: index as u16,
                point: HookPoint::Entry,
            }
            .into(),
        );
    }

    // Original body, returns rerouted through the exit-value dispatcher.
    for instr in &original.instrs {
        match instr {
            Instr::Ret(ret) => {
                instrs.push(record.capture(ret.value.clone()));
                instrs.extend(record.typed_chain(attachments));
                instrs.push(
                    Leave {
                        target: InstrIdx(exit_start),
                    }
                    .into(),
                );
            }
            _ => {
                let mut instr = instr.clone();
                if let Some(target) = instr.branch_target_mut() {
                    *target = InstrIdx(map[target.index()]);
                }
                instrs.push(instr);
            }
        }
    }

    // Synthetic handler: exception hooks innermost-first, then rethrow
    // unless suppressed.
    instrs.push(LoadExn { dst: exn }.into());
    for index in (0..k).rev() {
        instrs.push(
            HookCall {
                attachment: index as u16,
                point: HookPoint::Exception {
                    exn: Operand::Slot(exn),
                    result,
                    suppressed,
                },
            }
            .into(),
        );
    }
    instrs.push(
        BranchIf {
            cond: Operand::Slot(suppressed),
            target: InstrIdx(final_ret),
        }
        .into(),
    );
    instrs.push(Rethrow.into());

    // Epilogue: untyped exit hooks innermost-first, single final return.
    for index in (0..k).rev() {
        instrs.push(
            HookCall {
                attachment: index as u16,
                point: HookPoint::Exit,
            }
            .into(),
        );
    }
    instrs.push(
        Ret {
            value: method.return_type.map(|_| Operand::Slot(result)),
        }
        .into(),
    );

    // Original regions follow their instructions; the synthetic region
    // wraps prologue and body and routes every unwind through the handler.
    let mut regions: Vec<ExceptionRegion> = original
        .regions
        .iter()
        .map(|region| ExceptionRegion {
            protected: remap_range(&region.protected, &map),
            handler: remap_range(&region.handler, &map),
            kind: region.kind,
        })
        .collect();
    regions.push(ExceptionRegion::catch_all(
        InstrRange::new(0, handler_start),
        InstrRange::new(handler_start, exit_start),
    ));

    let mut woven = method.clone();
    woven.body = Body {
        instrs,
        regions,
        state_machine: None,
    };
    woven
}

fn remap_range(range: &InstrRange, map: &[u32]) -> InstrRange {
    InstrRange::new(map[range.start.index()], map[range.end.index()])
}
