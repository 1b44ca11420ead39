//! Typed exit handler behavior: selection by return type, left-to-right
//! composition, and pass-through for attachments without a matching
//! handler.
use std::sync::Arc;

use wefthook::{AspectDescriptor, Capabilities};
use weftcore::{
    resolve::{AspectRegistry, AttachmentRecord, Resolver},
    testkit::{hook_log, Evaluator, RecordingAspect},
    weave::Weaver,
};
use weftir::{
    body::Body,
    instr::{Const, Operand, Ret},
    method::MethodUnit,
    types::TypeToken,
    value::Value,
};

fn observer_caps() -> Capabilities {
    Capabilities::ENTRY | Capabilities::EXIT | Capabilities::EXCEPTION
}

/// `get_name() = "  John  "`.
fn get_name_method() -> MethodUnit {
    MethodUnit::new(
        "get_name",
        "acme.People",
        vec![],
        Some(TypeToken::STR),
        Body::new(vec![
            Const {
                dst: 0,
                value: Value::from("  John  "),
            }
            .into(),
            Ret {
                value: Some(Operand::Slot(0)),
            }
            .into(),
        ]),
    )
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

fn trim(value: Value) -> Value {
    match value {
        Value::Str(s) => Value::Str(s.trim().to_string()),
        other => other,
    }
}

fn tag_a(value: Value) -> Value {
    match value {
        Value::Str(s) => Value::Str(s + "-a"),
        other => other,
    }
}

fn tag_b(value: Value) -> Value {
    match value {
        Value::Str(s) => Value::Str(s + "-b"),
        other => other,
    }
}

#[test]
fn typed_handler_rewrites_the_returned_value() {
    let method = get_name_method();
    let descriptor =
        AspectDescriptor::new("trim", observer_caps()).with_typed_exit(TypeToken::STR);
    let woven = weave_with(&method, &[&descriptor]);

    let log = hook_log();
    let evaluator = Evaluator::new().bind(
        Arc::new(RecordingAspect::new("trim", Arc::clone(&log)).rewriting(trim)),
        descriptor.capabilities,
    );

    let result = evaluator.invoke(&woven, vec![]).unwrap();
    assert_eq!(result, Value::from("John"));
    // The typed handler runs on the return path, before the untyped exits.
    assert_eq!(*log.lock(), vec!["trim:entry", "trim:typed", "trim:exit"]);
}

#[test]
fn typed_handlers_compose_in_attachment_order() {
    let method = get_name_method();
    let first = AspectDescriptor::new("first", observer_caps()).with_typed_exit(TypeToken::STR);
    let second =
        AspectDescriptor::new("second", observer_caps()).with_typed_exit(TypeToken::STR);
    let woven = weave_with(&method, &[&first, &second]);

    let log = hook_log();
    let evaluator = Evaluator::new()
        .bind(
            Arc::new(RecordingAspect::new("first", Arc::clone(&log)).rewriting(tag_a)),
            first.capabilities,
        )
        .bind(
            Arc::new(RecordingAspect::new("second", Arc::clone(&log)).rewriting(tag_b)),
            second.capabilities,
        );

    let result = evaluator.invoke(&woven, vec![]).unwrap();
    // second(first(original)): each handler sees its predecessor's output.
    assert_eq!(result, Value::from("  John  -a-b"));
}

#[test]
fn attachments_without_a_matching_handler_pass_the_value_through() {
    let method = get_name_method();
    // Declares a handler for i32 only; the method returns a string.
    let mismatched =
        AspectDescriptor::new("numbers", observer_caps()).with_typed_exit(TypeToken::I32);
    let woven = weave_with(&method, &[&mismatched]);

    let log = hook_log();
    let evaluator = Evaluator::new().bind(
        Arc::new(RecordingAspect::new("numbers", Arc::clone(&log)).rewriting(trim)),
        mismatched.capabilities,
    );

    let result = evaluator.invoke(&woven, vec![]).unwrap();
    assert_eq!(result, Value::from("  John  "));
    // No typed hook was woven for this attachment at all.
    assert!(!log.lock().iter().any(|entry| entry.ends_with(":typed")));
}

#[test]
fn void_methods_never_dispatch_typed_handlers() {
    let method = MethodUnit::new(
        "touch",
        "acme.People",
        vec![],
        None,
        Body::new(vec![Ret { value: None }.into()]),
    );
    let descriptor =
        AspectDescriptor::new("trim", observer_caps()).with_typed_exit(TypeToken::STR);
    let woven = weave_with(&method, &[&descriptor]);

    let log = hook_log();
    let evaluator = Evaluator::new().bind(
        Arc::new(RecordingAspect::new("trim", Arc::clone(&log)).rewriting(trim)),
        descriptor.capabilities,
    );

    let result = evaluator.invoke(&woven, vec![]).unwrap();
    assert_eq!(result, Value::Unit);
    assert_eq!(*log.lock(), vec!["trim:entry", "trim:exit"]);
}
