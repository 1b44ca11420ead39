//! Module-level weaving pass.
//!
//! A module is woven method by method; methods are independent, so the
//! pass fans the work out over a small pool of scoped worker threads.
//! Failures never abort the pass: a method that cannot be woven is carried
//! through unchanged and reported as a [`Diagnostic`], so one malformed
//! body does not hide problems in its siblings. The output order always
//! matches the input order regardless of worker scheduling.
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crossbeam::channel;
use log::{info, warn};
use weftir::method::MethodUnit;

use crate::{
    diag::Diagnostic,
    error::WeaveError,
    resolve::Resolver,
    weave::Weaver,
};

/// Outcome of weaving one module: every input method (woven or passed
/// through) plus the diagnostics accumulated along the way.
#[derive(Debug)]
pub struct PassReport {
    pub methods: Vec<MethodUnit>,
    pub diagnostics: Vec<Diagnostic>,
}

impl PassReport {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Weave every method of a module. `workers` bounds the pool size; zero
/// selects one worker per available core.
pub fn weave_module(
    weaver: &Weaver,
    resolver: &Resolver,
    methods: Vec<MethodUnit>,
    workers: usize,
) -> PassReport {
    let workers = effective_workers(workers, methods.len());
    info!(
        "weaving module: {} methods across {} workers",
        methods.len(),
        workers
    );

    let cursor = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = channel::unbounded::<(usize, Result<MethodUnit, WeaveError>)>();

    crossbeam::thread::scope(|scope| {
        for _ in 0..workers {
            let cursor = Arc::clone(&cursor);
            let tx = tx.clone();
            let methods = &methods;
            scope.spawn(move |_| {
                loop {
                    let index = cursor.fetch_add(1, Ordering::Relaxed);
                    let Some(method) = methods.get(index) else {
                        break;
                    };
                    let outcome = resolver
                        .resolve(method)
                        .map_err(WeaveError::from)
                        .and_then(|attachments| weaver.weave(method, &attachments));
                    if tx.send((index, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
    })
    .unwrap_or_else(|_| unreachable!("weave workers do not panic"));
    drop(tx);

    let mut woven: Vec<Option<MethodUnit>> = (0..methods.len()).map(|_| None).collect();
    let mut diagnostics = Vec::new();
    for (index, outcome) in rx {
        match outcome {
            Ok(method) => woven[index] = Some(method),
            Err(error) => {
                let method = &methods[index];
                warn!("{}: {}", method.qualified_name, error);
                diagnostics.push((index, Diagnostic::from_error(method, &error)));
            }
        }
    }
    diagnostics.sort_by_key(|(index, _)| *index);

    let methods = woven
        .into_iter()
        .zip(methods)
        .map(|(outcome, original)| outcome.unwrap_or(original))
        .collect();
    PassReport {
        methods,
        diagnostics: diagnostics.into_iter().map(|(_, diag)| diag).collect(),
    }
}

fn effective_workers(requested: usize, jobs: usize) -> usize {
    let available = if requested == 0 {
        std::thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(1)
    } else {
        requested
    };
    available.min(jobs).max(1)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use wefthook::{AspectDescriptor, Capabilities};
    use weftir::{body::Body, instr::Ret};

    use super::*;
    use crate::resolve::{AspectRegistry, AttachmentRecord, Resolver};

    fn method(name: &str) -> MethodUnit {
        MethodUnit::new(
            name,
            "acme.Service",
            vec![],
            None,
            Body::new(vec![Ret { value: None }.into()]),
        )
    }

    #[test]
    fn pass_preserves_input_order_and_skips_unattached_methods() {
        let registry = Arc::new(AspectRegistry::new());
        let aspect = registry.register(AspectDescriptor::new("log", Capabilities::ENTRY));

        let methods: Vec<MethodUnit> = (0..16).map(|i| method(&format!("m{i}"))).collect();
        let mut resolver = Resolver::new(registry);
        // Attach to every other method only.
        for target in methods.iter().step_by(2) {
            resolver.attach(target.uuid, AttachmentRecord::new(aspect.uuid));
        }

        let report = weave_module(&Weaver::new(), &resolver, methods.clone(), 4);
        assert!(report.is_clean());
        assert_eq!(report.methods.len(), methods.len());
        for (index, (woven, original)) in report.methods.iter().zip(&methods).enumerate() {
            assert_eq!(woven.name, original.name);
            if index % 2 == 0 {
                assert!(woven.body.instrs.len() > original.body.instrs.len());
            } else {
                assert_eq!(woven, original);
            }
        }
    }

    #[test]
    fn failed_methods_are_passed_through_with_a_diagnostic() {
        let registry = Arc::new(AspectRegistry::new());
        let mut resolver = Resolver::new(registry);

        let broken = method("broken");
        // Unknown aspect reference: resolution must fail for this method only.
        resolver.attach(broken.uuid, AttachmentRecord::new(uuid::Uuid::new_v4()));
        let methods = vec![method("fine"), broken.clone()];

        let report = weave_module(&Weaver::new(), &resolver, methods, 2);
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].method_name, "acme.Service::broken");
        assert_eq!(report.methods[1], broken);
    }
}
