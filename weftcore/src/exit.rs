//! Exit-value dispatch: rewriting one return path.
//!
//! Every return site of a woven method flows through an [`ExitRecord`]: the
//! slot carrying the value about to be returned (a sentinel unit for void)
//! plus its static type identity. The record selects, in attachment order,
//! the typed exit hooks whose declared type matches, and emits one hook
//! call per match; each call replaces the in-flight value, so handlers
//! compose left to right. A record is owned by the rewrite of exactly one
//! return path and never shared.
use weftir::{
    instr::{Const, HookCall, HookPoint, Instr, Move, Operand, Slot},
    types::TypeToken,
    value::Value,
};

use crate::resolve::AspectAttachment;

/// The in-flight return value of one return path, at weave time.
#[derive(Debug, Clone, Copy)]
pub struct ExitRecord {
    /// Slot the woven code stores the produced value into.
    pub result: Slot,
    /// Static type of the produced value; `None` for void.
    pub ty: Option<TypeToken>,
}

impl ExitRecord {
    pub fn new(result: Slot, ty: Option<TypeToken>) -> Self {
        ExitRecord { result, ty }
    }

    /// Instruction capturing the original return operand into the record's
    /// slot. Void paths store the unit sentinel.
    pub fn capture(&self, value: Option<Operand>) -> Instr {
        match value {
            Some(src) => Move {
                dst: self.result,
                src,
            }
            .into(),
            None => Const {
                dst: self.result,
                value: Value::Unit,
            }
            .into(),
        }
    }

    /// The typed exit hook chain for this return path, in attachment order.
    /// Void methods never dispatch typed hooks; attachments without a
    /// matching handler pass through untouched.
    pub fn typed_chain(&self, attachments: &[AspectAttachment]) -> Vec<Instr> {
        let Some(ty) = self.ty else {
            return Vec::new();
        };
        attachments
            .iter()
            .enumerate()
            .filter(|(_, attachment)| attachment.descriptor.handles_typed_exit(ty))
            .map(|(index, _)| {
                HookCall {
                    attachment: index as u16,
                    point: HookPoint::TypedExit {
                        ty,
                        value: self.result,
                    },
                }
                .into()
            })
            .collect()
    }
}
