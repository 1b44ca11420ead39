//! End-to-end behavior of woven asynchronous state machines. The
//! interpreter resumes immediately at every suspension, so these tests pin
//! the once-per-logical-invocation hook guarantees.
use std::sync::Arc;

use wefthook::{AspectDescriptor, Capabilities};
use weftcore::{
    resolve::{AspectRegistry, AttachmentRecord, Resolver},
    testkit::{hook_log, Evaluator, RecordingAspect},
    weave::Weaver,
};
use weftir::{
    body::Body,
    instr::{Bin, BinOp, Const, Operand, Ret, SetError, SetResult, Suspend},
    method::MethodUnit,
    state_machine::StateMachineDescriptor,
    types::TypeToken,
    value::{ErrorValue, Value},
};

const BUILDER: u32 = 9;

fn observer_caps() -> Capabilities {
    Capabilities::ENTRY | Capabilities::EXIT | Capabilities::EXCEPTION
}

/// Computes 42 across two suspensions.
fn two_step_method() -> MethodUnit {
    let body = Body::new(vec![
        Const {
            dst: 0,
            value: Value::I32(20),
        }
        .into(),
        Suspend { point: 0 }.into(),
        Bin {
            dst: 1,
            op: BinOp::Add,
            lhs: Operand::Slot(0),
            rhs: Operand::Imm(Value::I32(20)),
        }
        .into(),
        Suspend { point: 1 }.into(),
        Bin {
            dst: 2,
            op: BinOp::Add,
            lhs: Operand::Slot(1),
            rhs: Operand::Imm(Value::I32(2)),
        }
        .into(),
        SetResult {
            slot: BUILDER,
            value: Some(Operand::Slot(2)),
        }
        .into(),
        Ret { value: None }.into(),
    ])
    .with_state_machine(
        StateMachineDescriptor::new(BUILDER)
            .with_resume_point(0, weftir::instr::InstrIdx(2))
            .with_resume_point(1, weftir::instr::InstrIdx(4)),
    );
    MethodUnit::new(
        "compute",
        "acme.Worker",
        vec![],
        Some(TypeToken::I32),
        body,
    )
    .asynchronous()
}

fn timeout() -> ErrorValue {
    ErrorValue::new(TypeToken::derived("TimeoutException"), "operation timed out")
}

/// Suspends once, then completes faulted.
fn faulting_method() -> MethodUnit {
    let body = Body::new(vec![
        Const {
            dst: 0,
            value: Value::Error(timeout()),
        }
        .into(),
        Suspend { point: 0 }.into(),
        SetError {
            slot: BUILDER,
            exn: Operand::Slot(0),
        }
        .into(),
        Ret { value: None }.into(),
    ])
    .with_state_machine(
        StateMachineDescriptor::new(BUILDER).with_resume_point(0, weftir::instr::InstrIdx(2)),
    );
    MethodUnit::new("fetch", "acme.Gateway", vec![], Some(TypeToken::I32), body).asynchronous()
}

fn weave_with(method: &MethodUnit, descriptors: &[&AspectDescriptor]) -> MethodUnit {
    let registry = Arc::new(AspectRegistry::new());
    let mut resolver = Resolver::new(Arc::clone(&registry));
    for descriptor in descriptors {
        let handle = registry.register((*descriptor).clone());
        resolver.attach(method.uuid, AttachmentRecord::new(handle.uuid));
    }
    let attachments = resolver.resolve(method).unwrap();
    Weaver::new().weave(method, &attachments).unwrap()
}

#[test]
fn hooks_fire_once_across_resumptions() {
    let method = two_step_method();
    let descriptor = AspectDescriptor::new("log", observer_caps());
    let woven = weave_with(&method, &[&descriptor]);

    let log = hook_log();
    let evaluator = Evaluator::new().bind(
        Arc::new(RecordingAspect::new("log", Arc::clone(&log))),
        descriptor.capabilities,
    );

    let result = evaluator.invoke(&woven, vec![]).unwrap();
    assert_eq!(result, Value::I32(42));
    // Two suspensions, still exactly one entry and one exit.
    assert_eq!(*log.lock(), vec!["log:entry", "log:exit"]);
}

#[test]
fn woven_machine_keeps_its_descriptor_consistent() {
    let method = two_step_method();
    let descriptor = AspectDescriptor::new("log", observer_caps());
    let woven = weave_with(&method, &[&descriptor]);

    let machine = woven.body.state_machine.as_ref().unwrap();
    // The prologue runs before the original initial entry, so the entry
    // index itself is unchanged and every resume point shifted past it.
    assert_eq!(machine.initial_entry, weftir::instr::InstrIdx(0));
    assert_eq!(machine.completion_slot, BUILDER);
    assert!(woven.validate().is_ok());
    let first_resume = machine.resume_entry(0).unwrap();
    assert!(first_resume.0 > method.body.state_machine.as_ref().unwrap().resume_entry(0).unwrap().0);
}

#[test]
fn faulted_completion_runs_exception_hooks_in_reverse_and_propagates() {
    let method = faulting_method();
    let outer = AspectDescriptor::new("outer", observer_caps());
    let inner = AspectDescriptor::new("inner", observer_caps());
    let woven = weave_with(&method, &[&outer, &inner]);

    let log = hook_log();
    let evaluator = Evaluator::new()
        .bind(
            Arc::new(RecordingAspect::new("outer", Arc::clone(&log))),
            outer.capabilities,
        )
        .bind(
            Arc::new(RecordingAspect::new("inner", Arc::clone(&log))),
            inner.capabilities,
        );

    let error = evaluator.invoke(&woven, vec![]).unwrap_err();
    assert_eq!(error, timeout());
    assert_eq!(
        *log.lock(),
        vec![
            "outer:entry",
            "inner:entry",
            "inner:exception(operation timed out)",
            "outer:exception(operation timed out)",
        ]
    );
}

#[test]
fn suppressed_fault_completes_successfully_with_the_replacement() {
    let method = faulting_method();
    let descriptor = AspectDescriptor::new("retry", observer_caps());
    let woven = weave_with(&method, &[&descriptor]);

    let log = hook_log();
    let evaluator = Evaluator::new().bind(
        Arc::new(RecordingAspect::new("retry", Arc::clone(&log)).suppressing(Value::I32(-1))),
        descriptor.capabilities,
    );

    let result = evaluator.invoke(&woven, vec![]).unwrap();
    assert_eq!(result, Value::I32(-1));
    assert_eq!(
        *log.lock(),
        vec!["retry:entry", "retry:exception(operation timed out)"]
    );
}

#[test]
fn veto_faults_the_completion_through_the_exception_hooks() {
    let method = two_step_method();
    let guard = AspectDescriptor::new("guard", observer_caps());
    let audit = AspectDescriptor::new("audit", observer_caps());
    let woven = weave_with(&method, &[&guard, &audit]);

    let denied = ErrorValue::new(TypeToken::derived("AccessDenied"), "caller not allowed");
    let log = hook_log();
    let evaluator = Evaluator::new()
        .bind(
            Arc::new(RecordingAspect::new("guard", Arc::clone(&log)).vetoing(denied.clone())),
            guard.capabilities,
        )
        .bind(
            Arc::new(RecordingAspect::new("audit", Arc::clone(&log))),
            audit.capabilities,
        );

    let error = evaluator.invoke(&woven, vec![]).unwrap_err();
    assert_eq!(error, denied);
    // The veto never leaves the state machine silently: it faults the
    // completion, and every aspect observes it. Audit's entry hook and the
    // body itself are skipped.
    assert_eq!(
        *log.lock(),
        vec![
            "guard:entry",
            "audit:exception(caller not allowed)",
            "guard:exception(caller not allowed)",
        ]
    );
}

#[test]
fn exit_hook_errors_fault_the_completion() {
    let method = two_step_method();
    let descriptor = AspectDescriptor::new("log", observer_caps());
    let woven = weave_with(&method, &[&descriptor]);

    let broken = ErrorValue::new(TypeToken::derived("AuditFailure"), "sink unavailable");
    let log = hook_log();
    let evaluator = Evaluator::new().bind(
        Arc::new(
            RecordingAspect::new("log", Arc::clone(&log)).failing_on_exit(broken.clone()),
        ),
        descriptor.capabilities,
    );

    let error = evaluator.invoke(&woven, vec![]).unwrap_err();
    assert_eq!(error, broken);
    // The machine computed its result, but the raising exit hook turns the
    // completion into a fault observed by the exception hooks.
    assert_eq!(
        *log.lock(),
        vec!["log:entry", "log:exit", "log:exception(sink unavailable)"]
    );
}

#[test]
fn fault_signal_as_the_machines_final_instruction_is_woven() {
    // No instruction follows the completion signal.
    let body = Body::new(vec![
        Const {
            dst: 0,
            value: Value::Error(timeout()),
        }
        .into(),
        Suspend { point: 0 }.into(),
        SetError {
            slot: BUILDER,
            exn: Operand::Slot(0),
        }
        .into(),
    ])
    .with_state_machine(
        StateMachineDescriptor::new(BUILDER).with_resume_point(0, weftir::instr::InstrIdx(2)),
    );
    let method =
        MethodUnit::new("fetch", "acme.Gateway", vec![], Some(TypeToken::I32), body).asynchronous();
    let descriptor = AspectDescriptor::new("log", observer_caps());
    let woven = weave_with(&method, &[&descriptor]);

    let log = hook_log();
    let evaluator = Evaluator::new().bind(
        Arc::new(RecordingAspect::new("log", Arc::clone(&log))),
        descriptor.capabilities,
    );

    let error = evaluator.invoke(&woven, vec![]).unwrap_err();
    assert_eq!(error, timeout());
    assert_eq!(
        *log.lock(),
        vec!["log:entry", "log:exception(operation timed out)"]
    );
}

#[test]
fn cancelled_context_vetoes_async_capable_aspects() {
    let method = two_step_method();
    let descriptor = AspectDescriptor::new(
        "log",
        observer_caps() | Capabilities::ASYNC_ENTRY,
    );
    let woven = weave_with(&method, &[&descriptor]);

    let log = hook_log();
    let evaluator = Evaluator::new().bind(
        Arc::new(RecordingAspect::new("log", Arc::clone(&log))),
        descriptor.capabilities,
    );
    evaluator.cancellation().cancel();

    let error = evaluator.invoke(&woven, vec![]).unwrap_err();
    assert_eq!(error, ErrorValue::cancelled());
}
