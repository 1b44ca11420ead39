//! The aspect contract: lifecycle hooks and weave-time descriptors.
use bitflags::bitflags;
use uuid::Uuid;
use weftir::{
    types::TypeToken,
    value::{ErrorValue, Value},
};

use crate::{
    args::ArgumentsView,
    cancel::Cancellation,
    outcome::{EntryOutcome, ExceptionOutcome},
};

bitflags! {
    /// Which hooks an aspect implements. Dispatch matches declared
    /// capabilities; there is no class hierarchy to probe. An `ASYNC_*` flag
    /// makes woven asynchronous methods call the corresponding `*_async`
    /// variant instead of the synchronous one.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u16 {
        const ENTRY           = 1 << 0;
        const EXIT            = 1 << 1;
        const EXCEPTION       = 1 << 2;
        const TYPED_EXIT      = 1 << 3;
        const ASYNC_ENTRY     = 1 << 4;
        const ASYNC_EXIT      = 1 << 5;
        const ASYNC_EXCEPTION = 1 << 6;
        const ASYNC_TYPED_EXIT = 1 << 7;
    }
}

/// One declared constructor-like configuration parameter of an aspect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigParam {
    pub name: String,
    pub ty: TypeToken,
}

impl ConfigParam {
    pub fn new(name: impl Into<String>, ty: TypeToken) -> Self {
        ConfigParam {
            name: name.into(),
            ty,
        }
    }
}

/// Weave-time description of an aspect type: stable identity plus the
/// capability set the weaver dispatches against.
///
/// Resolved once per aspect identity and shared read-only across parallel
/// weaves.
#[derive(Debug, Clone, PartialEq)]
pub struct AspectDescriptor {
    pub uuid: Uuid,
    pub name: String,
    pub capabilities: Capabilities,
    /// Declared typed exit handlers, at most one per distinct type.
    pub typed_exits: Vec<TypeToken>,
    /// Expected construction arguments, in order.
    pub config_params: Vec<ConfigParam>,
}

impl AspectDescriptor {
    pub fn new(name: impl Into<String>, capabilities: Capabilities) -> Self {
        AspectDescriptor {
            uuid: Uuid::new_v4(),
            name: name.into(),
            capabilities,
            typed_exits: Vec::new(),
            config_params: Vec::new(),
        }
    }

    /// Declare a typed exit handler for `ty`. Redeclaring a type is a no-op;
    /// an aspect carries exactly one handler per distinct type.
    pub fn with_typed_exit(mut self, ty: TypeToken) -> Self {
        if !self.typed_exits.contains(&ty) {
            self.typed_exits.push(ty);
            self.capabilities |= Capabilities::TYPED_EXIT;
        }
        self
    }

    pub fn with_config_params(mut self, params: Vec<ConfigParam>) -> Self {
        self.config_params = params;
        self
    }

    /// Whether this aspect declares a typed exit handler for `ty`.
    pub fn handles_typed_exit(&self, ty: TypeToken) -> bool {
        self.typed_exits.contains(&ty)
    }
}

/// A reusable unit of cross-cutting behavior.
///
/// Every method has a pass-through default, so an aspect implements exactly
/// the hooks its descriptor declares. The asynchronous variants default to
/// observing the cancellation signal and then delegating to the synchronous
/// hook; aspects with genuinely asynchronous work override them.
///
/// Hooks on one logical invocation are ordered by happens-before only: for
/// an asynchronous method the exit hook may run on a different thread of
/// execution than the entry hook did.
pub trait Aspect: Send + Sync {
    /// Runs before the body, in attachment order. Vetoing unwinds before
    /// the body executes; later entry hooks are skipped.
    fn on_entry(&self, _args: &mut ArgumentsView<'_>) -> EntryOutcome {
        EntryOutcome::Proceed
    }

    /// Runs after normal completion, in reverse attachment order. An error
    /// returned here propagates to the caller.
    fn on_exit(&self, _args: &mut ArgumentsView<'_>) -> Result<(), ErrorValue> {
        Ok(())
    }

    /// Runs while an exception is in flight, in reverse attachment order.
    /// `Err` replaces the propagating error with a new one.
    fn on_exception(
        &self,
        _args: &mut ArgumentsView<'_>,
        _error: &ErrorValue,
    ) -> Result<ExceptionOutcome, ErrorValue> {
        Ok(ExceptionOutcome::Propagate)
    }

    /// Typed exit handler: receives the in-flight return value and produces
    /// the value the next handler (or the caller) sees. Only called when the
    /// descriptor declares a handler for the method's return type.
    fn on_exit_typed(
        &self,
        _args: &mut ArgumentsView<'_>,
        value: Value,
    ) -> Result<Value, ErrorValue> {
        Ok(value)
    }

    fn on_entry_async(
        &self,
        args: &mut ArgumentsView<'_>,
        cancel: &Cancellation,
    ) -> EntryOutcome {
        if let Err(error) = cancel.guard() {
            return EntryOutcome::Veto(error);
        }
        self.on_entry(args)
    }

    fn on_exit_async(
        &self,
        args: &mut ArgumentsView<'_>,
        cancel: &Cancellation,
    ) -> Result<(), ErrorValue> {
        cancel.guard()?;
        self.on_exit(args)
    }

    fn on_exception_async(
        &self,
        args: &mut ArgumentsView<'_>,
        error: &ErrorValue,
        cancel: &Cancellation,
    ) -> Result<ExceptionOutcome, ErrorValue> {
        cancel.guard()?;
        self.on_exception(args, error)
    }

    fn on_exit_typed_async(
        &self,
        args: &mut ArgumentsView<'_>,
        value: Value,
        cancel: &Cancellation,
    ) -> Result<Value, ErrorValue> {
        cancel.guard()?;
        self.on_exit_typed(args, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_exit_declarations_are_deduplicated() {
        let descriptor = AspectDescriptor::new("trim", Capabilities::empty())
            .with_typed_exit(TypeToken::STR)
            .with_typed_exit(TypeToken::STR)
            .with_typed_exit(TypeToken::I32);

        assert_eq!(descriptor.typed_exits.len(), 2);
        assert!(descriptor.capabilities.contains(Capabilities::TYPED_EXIT));
        assert!(descriptor.handles_typed_exit(TypeToken::STR));
        assert!(!descriptor.handles_typed_exit(TypeToken::BOOL));
    }

    #[test]
    fn default_async_variants_surface_cancellation() {
        struct Plain;
        impl Aspect for Plain {}

        let cancel = Cancellation::new();
        cancel.cancel();

        let names: Vec<String> = vec![];
        let mut values: Vec<Value> = vec![];
        let mut view = ArgumentsView::new(&names, &mut values);

        assert!(Plain.on_entry_async(&mut view, &cancel).is_veto());
        assert!(Plain.on_exit_async(&mut view, &cancel).is_err());
    }
}
