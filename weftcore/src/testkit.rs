//! Test host: a reference interpreter for woven bodies plus a configurable
//! recording aspect.
//!
//! The interpreter is deliberately literal. It walks the instruction
//! stream one instruction at a time, dispatches hook calls against the
//! aspects bound to the attachment indices, and models unwinding by
//! searching the enclosing protected regions, running the finally
//! handlers of every crossed region before an exception is delivered or a
//! `Leave` completes its branch. Asynchronous bodies are
//! driven to completion with immediate resumption at every suspension
//! point, which is exactly what the once-per-invocation hook guarantees
//! are tested against.
use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use uuid::Uuid;
use wefthook::{
    ArgumentsView, Aspect, Cancellation, Capabilities, EntryOutcome, ExceptionOutcome,
};
use weftir::{
    body::Body,
    instr::{BinOp, HookCall, HookPoint, Instr, InstrIdx, Operand, Slot},
    method::MethodUnit,
    region::HandlerKind,
    value::{ErrorValue, Value},
};

/// Host-resolved callee for [`weftir::instr::Call`].
pub type Intrinsic = Box<dyn Fn(&[Value]) -> Result<Value, ErrorValue> + Send + Sync>;

struct BoundAspect {
    aspect: Arc<dyn Aspect>,
    capabilities: Capabilities,
}

/// Executes method units, woven or not, against a set of bound aspects.
/// Aspect binding order must match the attachment order the body was woven
/// with.
#[derive(Default)]
pub struct Evaluator {
    aspects: Vec<BoundAspect>,
    intrinsics: HashMap<Uuid, Intrinsic>,
    cancel: Cancellation,
}

impl Evaluator {
    pub fn new() -> Self {
        Evaluator::default()
    }

    pub fn bind(mut self, aspect: Arc<dyn Aspect>, capabilities: Capabilities) -> Self {
        self.aspects.push(BoundAspect {
            aspect,
            capabilities,
        });
        self
    }

    pub fn with_intrinsic(mut self, callee: Uuid, body: Intrinsic) -> Self {
        self.intrinsics.insert(callee, body);
        self
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancel
    }

    /// Run one logical invocation to completion. Void methods yield
    /// [`Value::Unit`].
    pub fn invoke(
        &self,
        method: &MethodUnit,
        mut args: Vec<Value>,
    ) -> Result<Value, ErrorValue> {
        let names: Vec<String> = method.params.iter().map(|param| param.name.clone()).collect();
        let mut frame = Frame {
            evaluator: self,
            body: &method.body,
            names: &names,
            args: &mut args,
            slots: HashMap::new(),
            exn: None,
            is_async: method.is_async,
            finally_plan: Vec::new(),
            after: None,
        };
        frame.run()
    }
}

enum Step {
    Next,
    Goto(u32),
    Done(Value),
    /// Surface the error to the caller without any further unwinding.
    Fault(ErrorValue),
    Raise(ErrorValue),
}

/// Where control goes once a chain of finally handlers has run out.
enum AfterFinally {
    /// A `Leave` finishes its branch.
    Branch(u32),
    /// An unwind delivers the exception in flight to this catch region.
    Catch(usize),
    /// An unwind found no catch handler and leaves the method.
    Propagate(ErrorValue),
}

struct Frame<'a> {
    evaluator: &'a Evaluator,
    body: &'a Body,
    names: &'a [String],
    args: &'a mut Vec<Value>,
    slots: HashMap<Slot, Value>,
    exn: Option<ErrorValue>,
    is_async: bool,
    /// Finally regions still to visit, next one last.
    finally_plan: Vec<usize>,
    after: Option<AfterFinally>,
}

impl Frame<'_> {
    fn run(&mut self) -> Result<Value, ErrorValue> {
        let mut pc: u32 = self
            .body
            .state_machine
            .as_ref()
            .filter(|_| self.is_async)
            .map(|desc| desc.initial_entry.0)
            .unwrap_or(0);
        let mut fuel: u32 = 100_000;

        loop {
            fuel -= 1;
            assert!(fuel > 0, "interpreter ran out of fuel, body does not terminate");
            let instr = self
                .body
                .instrs
                .get(pc as usize)
                .unwrap_or_else(|| panic!("execution fell off the body at @{pc:04}"));

            let step = self.step(pc, instr);
            match step {
                Step::Next => pc += 1,
                Step::Goto(target) => pc = target,
                Step::Done(value) => return Ok(value),
                Step::Fault(error) => return Err(error),
                Step::Raise(error) => match self.unwind(pc, error) {
                    Ok(handler) => pc = handler,
                    Err(error) => return Err(error),
                },
            }
        }
    }

    fn step(&mut self, pc: u32, instr: &Instr) -> Step {
        match instr.clone() {
            Instr::Const(c) => {
                self.slots.insert(c.dst, c.value);
                Step::Next
            }
            Instr::LoadArg(load) => {
                self.slots
                    .insert(load.dst, self.args[load.index as usize].clone());
                Step::Next
            }
            Instr::StoreArg(store) => {
                self.args[store.index as usize] = self.eval(&store.src);
                Step::Next
            }
            Instr::Move(mv) => {
                let value = self.eval(&mv.src);
                self.slots.insert(mv.dst, value);
                Step::Next
            }
            Instr::Bin(bin) => {
                let value = apply_bin(bin.op, self.eval(&bin.lhs), self.eval(&bin.rhs));
                self.slots.insert(bin.dst, value);
                Step::Next
            }
            Instr::Call(call) => {
                let callee = self
                    .evaluator
                    .intrinsics
                    .get(&call.callee)
                    .unwrap_or_else(|| panic!("no intrinsic bound for callee {}", call.callee));
                let arguments: Vec<Value> =
                    call.args.iter().map(|operand| self.eval(operand)).collect();
                match callee(&arguments) {
                    Ok(value) => {
                        if let Some(dst) = call.dst {
                            self.slots.insert(dst, value);
                        }
                        Step::Next
                    }
                    Err(error) => Step::Raise(error),
                }
            }
            Instr::Jump(jump) => Step::Goto(jump.target.0),
            Instr::BranchIf(branch) => {
                if self.eval(&branch.cond).as_condition() {
                    Step::Goto(branch.target.0)
                } else {
                    Step::Next
                }
            }
            Instr::Ret(ret) => Step::Done(
                ret.value
                    .as_ref()
                    .map(|operand| self.eval(operand))
                    .unwrap_or(Value::Unit),
            ),
            Instr::Throw(throw) => Step::Raise(self.eval_error(&throw.exn)),
            Instr::Rethrow(_) => {
                let error = self
                    .exn
                    .clone()
                    .unwrap_or_else(|| panic!("rethrow with no exception in flight at @{pc:04}"));
                Step::Raise(error)
            }
            Instr::LoadExn(load) => {
                let error = self
                    .exn
                    .clone()
                    .unwrap_or_else(|| panic!("loadexn with no exception in flight at @{pc:04}"));
                self.slots.insert(load.dst, Value::Error(error));
                Step::Next
            }
            Instr::Leave(leave) => {
                // Finally handlers of every region being exited run,
                // innermost first, before control reaches the target.
                self.exn = None;
                let exited: Vec<usize> = self
                    .body
                    .enclosing_regions(InstrIdx(pc))
                    .into_iter()
                    .filter(|&index| {
                        let region = &self.body.regions[index];
                        region.kind.is_finally() && !region.protected.contains(leave.target)
                    })
                    .collect();
                match exited.split_first() {
                    None => Step::Goto(leave.target.0),
                    Some((&first, rest)) => {
                        self.finally_plan = rest.iter().rev().copied().collect();
                        self.after = Some(AfterFinally::Branch(leave.target.0));
                        Step::Goto(self.body.regions[first].handler.start.0)
                    }
                }
            }
            Instr::EndFinally(_) => {
                if let Some(next) = self.finally_plan.pop() {
                    Step::Goto(self.body.regions[next].handler.start.0)
                } else {
                    match self.after.take() {
                        Some(AfterFinally::Branch(target)) => Step::Goto(target),
                        Some(AfterFinally::Catch(index)) => {
                            Step::Goto(self.body.regions[index].handler.start.0)
                        }
                        Some(AfterFinally::Propagate(error)) => {
                            self.exn = None;
                            Step::Fault(error)
                        }
                        None => panic!("endfinally at @{pc:04} outside an active finally traversal"),
                    }
                }
            }
            Instr::Suspend(suspend) => {
                let resume = self
                    .body
                    .state_machine
                    .as_ref()
                    .and_then(|desc| desc.resume_entry(suspend.point))
                    .unwrap_or_else(|| {
                        panic!("no resume point declared for suspension {}", suspend.point)
                    });
                Step::Goto(resume.0)
            }
            Instr::SetResult(set) => {
                let value = set
                    .value
                    .as_ref()
                    .map(|operand| self.eval(operand))
                    .unwrap_or(Value::Unit);
                if self.completes(set.slot) {
                    Step::Done(value)
                } else {
                    self.slots.insert(set.slot, value);
                    Step::Next
                }
            }
            Instr::SetError(set) => {
                let error = self.eval_error(&set.exn);
                if self.completes(set.slot) {
                    Step::Fault(error)
                } else {
                    Step::Raise(error)
                }
            }
            Instr::Hook(hook) => self.dispatch(&hook),
        }
    }

    fn dispatch(&mut self, hook: &HookCall) -> Step {
        let bound = &self.evaluator.aspects[hook.attachment as usize];
        let is_async = self.is_async;
        let use_async = move |flag: Capabilities| is_async && bound.capabilities.contains(flag);
        let cancel = &self.evaluator.cancel;
        let mut view = ArgumentsView::new(self.names, self.args);

        match &hook.point {
            HookPoint::Entry => {
                let outcome = if use_async(Capabilities::ASYNC_ENTRY) {
                    bound.aspect.on_entry_async(&mut view, cancel)
                } else {
                    bound.aspect.on_entry(&mut view)
                };
                match outcome {
                    EntryOutcome::Proceed => Step::Next,
                    EntryOutcome::Veto(error) => Step::Raise(error),
                }
            }
            HookPoint::Exit => {
                let outcome = if use_async(Capabilities::ASYNC_EXIT) {
                    bound.aspect.on_exit_async(&mut view, cancel)
                } else {
                    bound.aspect.on_exit(&mut view)
                };
                match outcome {
                    Ok(()) => Step::Next,
                    Err(error) => Step::Raise(error),
                }
            }
            HookPoint::Exception {
                exn,
                result,
                suppressed,
            } => {
                let error = match exn {
                    Operand::Slot(slot) => match self.slots.get(slot) {
                        Some(Value::Error(error)) => error.clone(),
                        other => panic!("exception slot holds {other:?}"),
                    },
                    Operand::Imm(Value::Error(error)) => error.clone(),
                    Operand::Imm(other) => panic!("exception operand holds {other:?}"),
                };
                let outcome = if use_async(Capabilities::ASYNC_EXCEPTION) {
                    bound.aspect.on_exception_async(&mut view, &error, cancel)
                } else {
                    bound.aspect.on_exception(&mut view, &error)
                };
                match outcome {
                    Ok(ExceptionOutcome::Propagate) => Step::Next,
                    Ok(ExceptionOutcome::Suppress(replacement)) => {
                        self.slots.insert(*result, replacement);
                        self.slots.insert(*suppressed, Value::Bool(true));
                        Step::Next
                    }
                    Err(error) => Step::Raise(error),
                }
            }
            HookPoint::TypedExit { value, .. } => {
                let current = self
                    .slots
                    .get(value)
                    .cloned()
                    .unwrap_or_else(|| panic!("typed exit over uninitialized slot {value}"));
                let outcome = if use_async(Capabilities::ASYNC_TYPED_EXIT) {
                    bound.aspect.on_exit_typed_async(&mut view, current, cancel)
                } else {
                    bound.aspect.on_exit_typed(&mut view, current)
                };
                match outcome {
                    Ok(replacement) => {
                        self.slots.insert(*value, replacement);
                        Step::Next
                    }
                    Err(error) => Step::Raise(error),
                }
            }
        }
    }

    /// Route a raised error towards the innermost catch handler whose
    /// protected range covers `pc`, running the finally handlers of every
    /// crossed region innermost first. Without a catch handler the error
    /// leaves the method once the finally chain has run. A fresh raise
    /// discards any traversal already in progress.
    fn unwind(&mut self, pc: u32, error: ErrorValue) -> Result<u32, ErrorValue> {
        self.exn = Some(error.clone());
        self.finally_plan.clear();
        self.after = None;

        let mut finallys: Vec<usize> = Vec::new();
        let mut catch: Option<usize> = None;
        for index in self.body.enclosing_regions(InstrIdx(pc)) {
            let region = &self.body.regions[index];
            match region.kind {
                HandlerKind::Finally => finallys.push(index),
                HandlerKind::CatchAll => {
                    catch = Some(index);
                    break;
                }
            }
        }

        match finallys.split_first() {
            None => match catch {
                Some(index) => Ok(self.body.regions[index].handler.start.0),
                None => {
                    self.exn = None;
                    Err(error)
                }
            },
            Some((&first, rest)) => {
                self.finally_plan = rest.iter().rev().copied().collect();
                self.after = Some(match catch {
                    Some(index) => AfterFinally::Catch(index),
                    None => AfterFinally::Propagate(error),
                });
                Ok(self.body.regions[first].handler.start.0)
            }
        }
    }

    fn completes(&self, slot: Slot) -> bool {
        self.body
            .state_machine
            .as_ref()
            .is_some_and(|desc| desc.completion_slot == slot)
    }

    fn eval(&self, operand: &Operand) -> Value {
        match operand {
            Operand::Slot(slot) => self
                .slots
                .get(slot)
                .cloned()
                .unwrap_or_else(|| panic!("read of uninitialized slot {slot}")),
            Operand::Imm(value) => value.clone(),
        }
    }

    fn eval_error(&self, operand: &Operand) -> ErrorValue {
        match self.eval(operand) {
            Value::Error(error) => error,
            other => panic!("throw of a non-error value {other:?}"),
        }
    }
}

fn apply_bin(op: BinOp, lhs: Value, rhs: Value) -> Value {
    use Value::*;
    match (op, lhs, rhs) {
        (BinOp::Add, I32(a), I32(b)) => I32(a + b),
        (BinOp::Add, I64(a), I64(b)) => I64(a + b),
        (BinOp::Add, F64(a), F64(b)) => F64(a + b),
        (BinOp::Add, Str(a), Str(b)) => Str(a + &b),
        (BinOp::Sub, I32(a), I32(b)) => I32(a - b),
        (BinOp::Sub, I64(a), I64(b)) => I64(a - b),
        (BinOp::Sub, F64(a), F64(b)) => F64(a - b),
        (BinOp::Mul, I32(a), I32(b)) => I32(a * b),
        (BinOp::Mul, I64(a), I64(b)) => I64(a * b),
        (BinOp::Mul, F64(a), F64(b)) => F64(a * b),
        (BinOp::CmpEq, a, b) => Bool(a == b),
        (BinOp::CmpLt, I32(a), I32(b)) => Bool(a < b),
        (BinOp::CmpLt, I64(a), I64(b)) => Bool(a < b),
        (BinOp::CmpLt, F64(a), F64(b)) => Bool(a < b),
        (op, lhs, rhs) => panic!("no evaluation for {op:?} over {lhs:?} and {rhs:?}"),
    }
}

/// Shared, ordered log of every hook firing across a set of recording
/// aspects.
pub type HookLog = Arc<Mutex<Vec<String>>>;

pub fn hook_log() -> HookLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// An aspect that appends `"<name>:<hook>"` to a shared log on every hook,
/// with optional knobs for vetoing, suppressing and typed rewriting.
pub struct RecordingAspect {
    name: String,
    log: HookLog,
    veto: Option<ErrorValue>,
    fail_exit: Option<ErrorValue>,
    suppress: Option<Value>,
    rewrite: Option<fn(Value) -> Value>,
}

impl RecordingAspect {
    pub fn new(name: impl Into<String>, log: HookLog) -> Self {
        RecordingAspect {
            name: name.into(),
            log,
            veto: None,
            fail_exit: None,
            suppress: None,
            rewrite: None,
        }
    }

    /// Veto every invocation with the given error.
    pub fn vetoing(mut self, error: ErrorValue) -> Self {
        self.veto = Some(error);
        self
    }

    /// Raise the given error from every untyped exit hook, after recording.
    pub fn failing_on_exit(mut self, error: ErrorValue) -> Self {
        self.fail_exit = Some(error);
        self
    }

    /// Suppress every observed exception with the given replacement value.
    pub fn suppressing(mut self, replacement: Value) -> Self {
        self.suppress = Some(replacement);
        self
    }

    /// Rewrite the in-flight value on every typed exit.
    pub fn rewriting(mut self, rewrite: fn(Value) -> Value) -> Self {
        self.rewrite = Some(rewrite);
        self
    }

    fn record(&self, hook: &str) {
        self.log.lock().push(format!("{}:{}", self.name, hook));
    }
}

impl Aspect for RecordingAspect {
    fn on_entry(&self, _args: &mut ArgumentsView<'_>) -> EntryOutcome {
        self.record("entry");
        match &self.veto {
            Some(error) => EntryOutcome::Veto(error.clone()),
            None => EntryOutcome::Proceed,
        }
    }

    fn on_exit(&self, _args: &mut ArgumentsView<'_>) -> Result<(), ErrorValue> {
        self.record("exit");
        match &self.fail_exit {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn on_exception(
        &self,
        _args: &mut ArgumentsView<'_>,
        error: &ErrorValue,
    ) -> Result<ExceptionOutcome, ErrorValue> {
        self.record(&format!("exception({})", error.message));
        match &self.suppress {
            Some(replacement) => Ok(ExceptionOutcome::Suppress(replacement.clone())),
            None => Ok(ExceptionOutcome::Propagate),
        }
    }

    fn on_exit_typed(
        &self,
        _args: &mut ArgumentsView<'_>,
        value: Value,
    ) -> Result<Value, ErrorValue> {
        self.record("typed");
        match self.rewrite {
            Some(rewrite) => Ok(rewrite(value)),
            None => Ok(value),
        }
    }
}
