//! Human-readable dumps of bodies and instructions.
//!
//! Used by diagnostics and tests; the dump format is not a stable interface
//! and is never parsed back.
use crate::{
    body::Body,
    instr::{Instr, Operand},
    types::TypeRegistry,
};

impl Operand {
    fn dump(&self) -> String {
        match self {
            Operand::Slot(slot) => format!("%{}", slot),
            Operand::Imm(value) => format!("{:?}", value),
        }
    }
}

impl Instr {
    /// Render a single instruction through the given registry.
    pub fn dump(&self, registry: &TypeRegistry) -> String {
        use crate::instr::HookPoint;
        match self {
            Instr::Const(c) => format!("%{} = const {:?}", c.dst, c.value),
            Instr::LoadArg(l) => format!("%{} = ldarg {}", l.dst, l.index),
            Instr::StoreArg(s) => format!("starg {}, {}", s.index, s.src.dump()),
            Instr::Move(m) => format!("%{} = move {}", m.dst, m.src.dump()),
            Instr::Bin(b) => format!(
                "%{} = {:?} {}, {}",
                b.dst,
                b.op,
                b.lhs.dump(),
                b.rhs.dump()
            ),
            Instr::Call(c) => {
                let args: Vec<String> = c.args.iter().map(|a| a.dump()).collect();
                match c.dst {
                    Some(dst) => format!("%{} = call {} ({})", dst, c.callee, args.join(", ")),
                    None => format!("call {} ({})", c.callee, args.join(", ")),
                }
            }
            Instr::Jump(j) => format!("jump {}", j.target),
            Instr::BranchIf(b) => format!("branch {} -> {}", b.cond.dump(), b.target),
            Instr::Ret(r) => match &r.value {
                Some(value) => format!("ret {}", value.dump()),
                None => "ret void".to_string(),
            },
            Instr::Throw(t) => format!("throw {}", t.exn.dump()),
            Instr::Rethrow(_) => "rethrow".to_string(),
            Instr::LoadExn(l) => format!("%{} = ldexn", l.dst),
            Instr::Leave(l) => format!("leave {}", l.target),
            Instr::EndFinally(_) => "endfinally".to_string(),
            Instr::Suspend(s) => format!("suspend #{}", s.point),
            Instr::SetResult(s) => match &s.value {
                Some(value) => format!("builder %{} <- result {}", s.slot, value.dump()),
                None => format!("builder %{} <- result void", s.slot),
            },
            Instr::SetError(s) => format!("builder %{} <- error {}", s.slot, s.exn.dump()),
            Instr::Hook(hook) => match &hook.point {
                HookPoint::Entry => format!("hook entry [{}]", hook.attachment),
                HookPoint::Exit => format!("hook exit [{}]", hook.attachment),
                HookPoint::Exception {
                    exn,
                    result,
                    suppressed,
                } => format!(
                    "hook exception [{}] {}, %{}, %{}",
                    hook.attachment,
                    exn.dump(),
                    result,
                    suppressed
                ),
                HookPoint::TypedExit { ty, value } => format!(
                    "hook exit<{}> [{}] %{}",
                    registry.fmt(*ty),
                    hook.attachment,
                    value
                ),
            },
        }
    }
}

impl Body {
    /// Build a formatting helper that renders the whole body, one line per
    /// instruction, followed by region and state-machine summaries.
    pub fn dump<'a>(&'a self, registry: &'a TypeRegistry) -> impl std::fmt::Display + 'a {
        struct Fmt<'a> {
            body: &'a Body,
            registry: &'a TypeRegistry,
        }

        impl std::fmt::Display for Fmt<'_> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                for (i, instr) in self.body.instrs.iter().enumerate() {
                    writeln!(f, "@{:04}: {}", i, instr.dump(self.registry))?;
                }
                for region in &self.body.regions {
                    writeln!(
                        f,
                        ".region {:?} protected {} handler {}",
                        region.kind, region.protected, region.handler
                    )?;
                }
                if let Some(desc) = &self.body.state_machine {
                    writeln!(
                        f,
                        ".machine entry {} completion %{} resume {:?}",
                        desc.initial_entry, desc.completion_slot, desc.resume_points
                    )?;
                }
                Ok(())
            }
        }

        Fmt {
            body: self,
            registry,
        }
    }
}
