//! Injection strategy for compiler-generated continuation state machines.
//!
//! A naive application of the synchronous layout would fire entry hooks on
//! every resumption and exit hooks on every `ret` of the state machine's
//! step function. Instead, hooks are anchored to the machine's declared
//! contract: entry hooks are spliced at the initial-entry instruction,
//! which resumptions bypass (they jump straight to their resume points),
//! and exit dispatch is woven into the successful terminal transitions,
//! the `SetResult` instructions that signal the completion slot. Per
//! logical invocation each group therefore runs exactly once, no matter
//! how often the machine is resumed.
//!
//! Faults funnel through one choke point. Every `SetError` on the
//! completion slot is rewritten to a `Throw`, and the whole machine is
//! wrapped in a synthetic catch-all whose handler dispatches the exception
//! hooks in reverse order and then signals the builder: `SetError` when
//! the error propagates, `SetResult` with the replacement value when some
//! aspect suppressed. Because the injected entry and exit hooks sit inside
//! that protected range too, a veto or an error raised by any hook faults
//! the completion through the same path instead of escaping the step
//! function unobserved.
//!
//! Whether an aspect's synchronous or asynchronous hook variant runs is a
//! run-time capability decision; an asynchronous hook is awaited in place,
//! so the method's own completion is observed only after its exit hooks
//! have finished.
use log::trace;
use weftir::{
    body::Body,
    instr::{
        BranchIf, Const, HookCall, HookPoint, Instr, InstrIdx, LoadExn, Operand, Ret, SetError,
        SetResult, Throw,
    },
    method::MethodUnit,
    region::{ExceptionRegion, InstrRange},
    value::Value,
};

use crate::{exit::ExitRecord, resolve::AspectAttachment};

/// Rewrite an asynchronous method. The caller has already validated the
/// body, so a state-machine descriptor with at least one signaled
/// completion site is guaranteed to be present.
pub(crate) fn weave_async(method: &MethodUnit, attachments: &[AspectAttachment]) -> MethodUnit {
    let mut body: Body = method.body.clone();
    let Some(descriptor) = body.state_machine.clone() else {
        unreachable!("async body was validated to carry a state-machine descriptor");
    };

    let k = attachments.len();
    let result = body.next_free_slot();
    let suppressed = result + 1;
    let exn = result + 2;
    let record = ExitRecord::new(result, method.return_type);

    // Terminal transitions first, highest index first so earlier sites
    // keep their coordinates while we rewrite.
    let mut sites = body.completion_sites(descriptor.completion_slot);
    sites.reverse();
    for site in sites {
        let replacement = match body.instrs[site.index()].clone() {
            Instr::SetResult(set) => completion_success(&record, attachments, &set),
            Instr::SetError(set) => vec![Throw { exn: set.exn }.into()],
            _ => unreachable!("completion sites only index SetResult/SetError"),
        };
        trace!(
            "{}: rewriting completion site {}",
            method.qualified_name, site
        );
        body.replace_instr(site, replacement);
    }

    // Entry hooks run once, before the first suspension: splice them at the
    // initial entry, which resume points bypass.
    let entry = body
        .state_machine
        .as_ref()
        .map(|desc| desc.initial_entry)
        .unwrap_or(InstrIdx(0));
    let mut prologue: Vec<Instr> = Vec::with_capacity(1 + k);
    prologue.push(
        Const {
            dst: suppressed,
            value: Value::Bool(false),
        }
        .into(),
    );
    for index in 0..k {
        prologue.push(
            HookCall {
                attachment: index as u16,
                point: HookPoint::Entry,
            }
            .into(),
        );
    }
    body.splice(entry, prologue);

    // Synthetic handler appended past the end; appending needs no index
    // patching. Layout, with H the handler start:
    //
    //   H+0        ldexn
    //   H+1..H+k   exception hooks, reverse attachment order
    //   H+k+1      branch suppressed -> H+k+4
    //   H+k+2      builder <- error
    //   H+k+3      ret
    //   H+k+4      builder <- result
    //   H+k+5      ret
    let handler_start = body.len() as u32;
    body.instrs.push(LoadExn { dst: exn }.into());
    for index in (0..k).rev() {
        body.instrs.push(
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
    body.instrs.push(
        BranchIf {
            cond: Operand::Slot(suppressed),
            target: InstrIdx(handler_start + k as u32 + 4),
        }
        .into(),
    );
    body.instrs.push(
        SetError {
            slot: descriptor.completion_slot,
            exn: Operand::Slot(exn),
        }
        .into(),
    );
    body.instrs.push(Ret { value: None }.into());
    body.instrs.push(
        SetResult {
            slot: descriptor.completion_slot,
            value: method.return_type.map(|_| Operand::Slot(result)),
        }
        .into(),
    );
    body.instrs.push(Ret { value: None }.into());
    body.regions.push(ExceptionRegion::catch_all(
        InstrRange::new(0, handler_start),
        InstrRange::new(handler_start, body.len() as u32),
    ));

    let mut woven = method.clone();
    woven.body = body;
    woven
}

/// Successful completion: capture the logical result, run the typed exit
/// chain, then the untyped exit hooks innermost-first, and only then signal
/// the builder. An error raised by any of these hooks unwinds into the
/// synthetic handler and faults the completion.
fn completion_success(
    record: &ExitRecord,
    attachments: &[AspectAttachment],
    set: &SetResult,
) -> Vec<Instr> {
    let k = attachments.len();
    let mut seq: Vec<Instr> = Vec::with_capacity(2 + k);
    seq.push(record.capture(set.value.clone()));
    seq.extend(record.typed_chain(attachments));
    for index in (0..k).rev() {
        seq.push(
            HookCall {
                attachment: index as u16,
                point: HookPoint::Exit,
            }
            .into(),
        );
    }
    seq.push(
        SetResult {
            slot: set.slot,
            value: record.ty.map(|_| Operand::Slot(record.result)),
        }
        .into(),
    );
    seq
}
