//! The weft instruction set.
//!
//! Instructions live in a flat stream addressed by [`InstrIdx`]; control
//! falls through from one instruction to the next unless a branch says
//! otherwise. The set is intentionally small: it is rich enough to express
//! the bodies the weaver rewrites (argument access, opaque calls, branches,
//! returns, throws, region exits and the async builder protocol) plus the
//! hook calls the weaver itself emits. It is not a general-purpose codegen
//! target.
//!
//! [`Instr::Hook`] is special: it only ever appears in *woven* bodies. A
//! host-supplied input body containing one is rejected as malformed.
use auto_enums::auto_enum;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use strum::{EnumDiscriminants, EnumIs, EnumTryAs};
use uuid::Uuid;

use crate::{types::TypeToken, value::Value};

/// A virtual register / local slot identifier.
pub type Slot = u32;

/// Index of an instruction within a body. Branch targets, region bounds and
/// resume points are all expressed in this coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InstrIdx(pub u32);

impl InstrIdx {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for InstrIdx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{:04}", self.0)
    }
}

/// Instruction operand: a slot reference or an immediate literal.
#[derive(Debug, Clone, PartialEq, EnumIs, EnumTryAs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Operand {
    Slot(Slot),
    Imm(Value),
}

/// Binary operations. Enough arithmetic and comparison to give test bodies
/// observable behavior; the weaver itself never interprets these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    CmpEq,
    CmpLt,
}

/// Load an immediate value into a slot.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Const {
    pub dst: Slot,
    pub value: Value,
}

/// Read the method argument at `index` into a slot.
///
/// Arguments are live for the whole invocation; a mutation performed by an
/// entry hook is observed by every later `LoadArg`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LoadArg {
    pub dst: Slot,
    pub index: u16,
}

/// Overwrite the method argument at `index`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StoreArg {
    pub index: u16,
    pub src: Operand,
}

/// Copy an operand into a slot.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Move {
    pub dst: Slot,
    pub src: Operand,
}

/// Binary operation over two operands.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Bin {
    pub dst: Slot,
    pub op: BinOp,
    pub lhs: Operand,
    pub rhs: Operand,
}

/// Call an opaque external function identified by symbol id. The callee is
/// resolved by the executing host; the weaver treats it as a black box that
/// may return a value or raise.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Call {
    pub dst: Option<Slot>,
    pub callee: Uuid,
    pub args: SmallVec<[Operand; 4]>,
}

/// Unconditional branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Jump {
    pub target: InstrIdx,
}

/// Branch to `target` when the condition is true; fall through otherwise.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BranchIf {
    pub cond: Operand,
    pub target: InstrIdx,
}

/// Return from the method. `None` is a `void` return.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Ret {
    pub value: Option<Operand>,
}

/// Raise the given error object, starting an unwind.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Throw {
    pub exn: Operand,
}

/// Re-raise the exception in flight. Only valid inside a catch handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rethrow;

/// Load the exception in flight into a slot. Only valid inside a catch
/// handler, where an exception register is guaranteed to be populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LoadExn {
    pub dst: Slot,
}

/// Branch out of one or more protected regions. Finally handlers of every
/// region being exited run, innermost first, before control reaches
/// `target`. Catch handlers do not run on a leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Leave {
    pub target: InstrIdx,
}

/// Terminate a finally handler and resume the interrupted leave or unwind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EndFinally;

/// Logical suspension point of an asynchronous body. Execution yields to
/// the scheduler; resumption re-enters at the instruction recorded for
/// `point` in the body's state-machine descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Suspend {
    pub point: u32,
}

/// Signal successful completion through the builder held in `slot`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SetResult {
    pub slot: Slot,
    pub value: Option<Operand>,
}

/// Signal faulted completion through the builder held in `slot`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SetError {
    pub slot: Slot,
    pub exn: Operand,
}

/// Which lifecycle hook a woven [`HookCall`] dispatches to, together with
/// the slots the generated code threads through the call.
#[derive(Debug, Clone, PartialEq, EnumIs, EnumTryAs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum HookPoint {
    /// `on_entry` over the live arguments view. A veto outcome raises the
    /// carried error, starting an unwind before the body runs.
    Entry,
    /// Untyped `on_exit` over the live arguments view.
    Exit,
    /// `on_exception` with the error in `exn`. A suppress outcome stores the
    /// replacement value into `result` and sets `suppressed` to true;
    /// propagate leaves both slots untouched.
    Exception {
        exn: Operand,
        result: Slot,
        suppressed: Slot,
    },
    /// Typed exit handler for declared type `ty`: reads the in-flight value
    /// from `value` and writes the (possibly replaced) value back to it.
    TypedExit { ty: TypeToken, value: Slot },
}

/// A weaver-emitted call into the hook dispatch contract.
///
/// `attachment` indexes the method's resolved attachment list; whether the
/// synchronous or asynchronous hook variant runs is decided at run time from
/// the aspect's declared capabilities, not encoded here.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HookCall {
    pub attachment: u16,
    pub point: HookPoint,
}

/// Discriminated union over all instruction forms.
#[derive(Debug, Clone, PartialEq, EnumIs, EnumTryAs, EnumDiscriminants)]
#[strum_discriminants(name(InstrKind))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Instr {
    Const(Const),
    LoadArg(LoadArg),
    StoreArg(StoreArg),
    Move(Move),
    Bin(Bin),
    Call(Call),

    Jump(Jump),
    BranchIf(BranchIf),
    Ret(Ret),

    Throw(Throw),
    Rethrow(Rethrow),
    LoadExn(LoadExn),
    Leave(Leave),
    EndFinally(EndFinally),

    Suspend(Suspend),
    SetResult(SetResult),
    SetError(SetError),

    Hook(HookCall),
}

impl Instr {
    /// Iterate over all input operands of this instruction.
    #[auto_enum(Iterator)]
    pub fn operands(&self) -> impl Iterator<Item = &Operand> {
        match self {
            Instr::StoreArg(store) => std::iter::once(&store.src),
            Instr::Move(mv) => std::iter::once(&mv.src),
            Instr::Bin(bin) => [&bin.lhs, &bin.rhs].into_iter(),
            Instr::Call(call) => call.args.iter(),
            Instr::BranchIf(branch) => std::iter::once(&branch.cond),
            Instr::Ret(ret) => ret.value.iter(),
            Instr::Throw(throw) => std::iter::once(&throw.exn),
            Instr::SetResult(set) => set.value.iter(),
            Instr::SetError(set) => std::iter::once(&set.exn),
            Instr::Hook(HookCall {
                point: HookPoint::Exception { exn, .. },
                ..
            }) => std::iter::once(exn),
            _ => std::iter::empty(),
        }
    }

    /// Mutably iterate over all input operands of this instruction.
    #[auto_enum(Iterator)]
    pub fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        match self {
            Instr::StoreArg(store) => std::iter::once(&mut store.src),
            Instr::Move(mv) => std::iter::once(&mut mv.src),
            Instr::Bin(bin) => [&mut bin.lhs, &mut bin.rhs].into_iter(),
            Instr::Call(call) => call.args.iter_mut(),
            Instr::BranchIf(branch) => std::iter::once(&mut branch.cond),
            Instr::Ret(ret) => ret.value.iter_mut(),
            Instr::Throw(throw) => std::iter::once(&mut throw.exn),
            Instr::SetResult(set) => set.value.iter_mut(),
            Instr::SetError(set) => std::iter::once(&mut set.exn),
            Instr::Hook(HookCall {
                point: HookPoint::Exception { exn, .. },
                ..
            }) => std::iter::once(exn),
            _ => std::iter::empty(),
        }
    }

    /// The destination slot if this instruction produces a value.
    pub fn destination(&self) -> Option<Slot> {
        match self {
            Instr::Const(c) => Some(c.dst),
            Instr::LoadArg(load) => Some(load.dst),
            Instr::Move(mv) => Some(mv.dst),
            Instr::Bin(bin) => Some(bin.dst),
            Instr::Call(call) => call.dst,
            Instr::LoadExn(load) => Some(load.dst),
            _ => None,
        }
    }

    /// Mutable access to the branch target, for instructions that have one.
    /// Resume points and region bounds are patched separately by the body.
    pub fn branch_target_mut(&mut self) -> Option<&mut InstrIdx> {
        match self {
            Instr::Jump(jump) => Some(&mut jump.target),
            Instr::BranchIf(branch) => Some(&mut branch.target),
            Instr::Leave(leave) => Some(&mut leave.target),
            _ => None,
        }
    }

    /// The branch target, for instructions that have one.
    pub fn branch_target(&self) -> Option<InstrIdx> {
        match self {
            Instr::Jump(jump) => Some(jump.target),
            Instr::BranchIf(branch) => Some(branch.target),
            Instr::Leave(leave) => Some(leave.target),
            _ => None,
        }
    }

    /// Every slot this instruction touches, reads or writes, including the
    /// bookkeeping slots threaded through hook calls. Used to find a free
    /// slot when the weaver needs scratch space.
    pub fn referenced_slots(&self) -> SmallVec<[Slot; 4]> {
        let mut slots: SmallVec<[Slot; 4]> = SmallVec::new();
        if let Some(dst) = self.destination() {
            slots.push(dst);
        }
        for operand in self.operands() {
            if let Operand::Slot(slot) = operand {
                slots.push(*slot);
            }
        }
        match self {
            Instr::SetResult(set) => slots.push(set.slot),
            Instr::SetError(set) => slots.push(set.slot),
            Instr::Hook(hook) => match &hook.point {
                HookPoint::Exception {
                    result, suppressed, ..
                } => {
                    slots.push(*result);
                    slots.push(*suppressed);
                }
                HookPoint::TypedExit { value, .. } => slots.push(*value),
                _ => {}
            },
            _ => {}
        }
        slots
    }
}

macro_rules! define_instr_from {
    ($typ:ty, $variant:ident) => {
        impl From<$typ> for Instr {
            fn from(inst: $typ) -> Self {
                Instr::$variant(inst)
            }
        }
    };
}

define_instr_from!(Const, Const);
define_instr_from!(LoadArg, LoadArg);
define_instr_from!(StoreArg, StoreArg);
define_instr_from!(Move, Move);
define_instr_from!(Bin, Bin);
define_instr_from!(Call, Call);
define_instr_from!(Jump, Jump);
define_instr_from!(BranchIf, BranchIf);
define_instr_from!(Ret, Ret);
define_instr_from!(Throw, Throw);
define_instr_from!(Rethrow, Rethrow);
define_instr_from!(LoadExn, LoadExn);
define_instr_from!(Leave, Leave);
define_instr_from!(EndFinally, EndFinally);
define_instr_from!(Suspend, Suspend);
define_instr_from!(SetResult, SetResult);
define_instr_from!(SetError, SetError);
define_instr_from!(HookCall, Hook);
