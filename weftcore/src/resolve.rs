//! Annotation resolution: from a method identity to its ordered attachments.
//!
//! The declaration subsystem (out of scope here) produces attachment
//! records keyed by method identity; this module joins them against the
//! registry of known aspect descriptors. Resolution is a pure lookup with
//! no side effects, so a populated registry can be shared read-only across
//! parallel weaves.
use std::{collections::BTreeMap, sync::Arc};

use dashmap::DashMap;
use uuid::Uuid;
use wefthook::AspectDescriptor;
use weftir::{method::MethodUnit, types::TypeToken, value::Value};

use crate::error::ResolutionError;

/// Process-wide cache of resolved aspect descriptors, keyed by identity.
/// Populated once by the host, then read-only.
#[derive(Debug, Default)]
pub struct AspectRegistry {
    descriptors: DashMap<Uuid, Arc<AspectDescriptor>>,
}

impl AspectRegistry {
    pub fn new() -> Self {
        AspectRegistry::default()
    }

    /// Register a descriptor, returning the shared handle weaves will use.
    pub fn register(&self, descriptor: AspectDescriptor) -> Arc<AspectDescriptor> {
        let descriptor = Arc::new(descriptor);
        self.descriptors
            .insert(descriptor.uuid, Arc::clone(&descriptor));
        descriptor
    }

    pub fn lookup(&self, uuid: Uuid) -> Option<Arc<AspectDescriptor>> {
        self.descriptors.get(&uuid).map(|entry| Arc::clone(&entry))
    }
}

/// One attachment as recorded by the declaration subsystem: the referenced
/// aspect, its construction arguments, and an optional demand that the
/// aspect's typed exit hook match the method's return type.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentRecord {
    pub aspect: Uuid,
    pub arguments: Vec<Value>,
    pub expects_return: Option<TypeToken>,
}

impl AttachmentRecord {
    pub fn new(aspect: Uuid) -> Self {
        AttachmentRecord {
            aspect,
            arguments: Vec::new(),
            expects_return: None,
        }
    }

    pub fn with_arguments(mut self, arguments: Vec<Value>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn expecting_return(mut self, ty: TypeToken) -> Self {
        self.expects_return = Some(ty);
        self
    }
}

/// A resolved attachment: descriptor handle, construction arguments, and
/// the originating method. Ordering within a method's list is significant:
/// attachments form a stack, first-declared outermost.
#[derive(Debug, Clone)]
pub struct AspectAttachment {
    pub descriptor: Arc<AspectDescriptor>,
    pub arguments: Vec<Value>,
    pub method: Uuid,
}

/// Joins externally supplied attachment metadata against the descriptor
/// registry.
#[derive(Debug, Default)]
pub struct Resolver {
    registry: Arc<AspectRegistry>,
    attachments: BTreeMap<Uuid, Vec<AttachmentRecord>>,
}

impl Resolver {
    pub fn new(registry: Arc<AspectRegistry>) -> Self {
        Resolver {
            registry,
            attachments: BTreeMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<AspectRegistry> {
        &self.registry
    }

    /// Record an attachment for a method. Declaration order is preserved.
    pub fn attach(&mut self, method: Uuid, record: AttachmentRecord) {
        self.attachments.entry(method).or_default().push(record);
    }

    /// The ordered attachment list for a method; empty when nothing is
    /// attached. Pure lookup over the supplied metadata.
    pub fn resolve(&self, method: &MethodUnit) -> Result<Vec<AspectAttachment>, ResolutionError> {
        let Some(records) = self.attachments.get(&method.uuid) else {
            return Ok(Vec::new());
        };

        let mut resolved = Vec::with_capacity(records.len());
        for record in records {
            let descriptor = self.registry.lookup(record.aspect).ok_or_else(|| {
                ResolutionError::UnknownAspect {
                    method: method.qualified_name.clone(),
                    aspect: record.aspect,
                }
            })?;

            if let Some(expected) = record.expects_return {
                let matches = method.return_type == Some(expected)
                    && descriptor.handles_typed_exit(expected);
                if !matches {
                    return Err(ResolutionError::ReturnTypeMismatch {
                        method: method.qualified_name.clone(),
                        aspect: descriptor.name.clone(),
                        expected,
                        found: method.return_type,
                    });
                }
            }

            resolved.push(AspectAttachment {
                descriptor,
                arguments: record.arguments.clone(),
                method: method.uuid,
            });
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wefthook::Capabilities;
    use weftir::body::Body;

    fn dummy_method() -> MethodUnit {
        MethodUnit::new(
            "target",
            "acme.Service",
            vec![],
            Some(TypeToken::STR),
            Body::new(vec![weftir::instr::Ret { value: None }.into()]),
        )
    }

    #[test]
    fn resolves_in_declaration_order() {
        let registry = Arc::new(AspectRegistry::new());
        let first = registry.register(AspectDescriptor::new("first", Capabilities::ENTRY));
        let second = registry.register(AspectDescriptor::new("second", Capabilities::ENTRY));

        let method = dummy_method();
        let mut resolver = Resolver::new(registry);
        resolver.attach(method.uuid, AttachmentRecord::new(first.uuid));
        resolver.attach(method.uuid, AttachmentRecord::new(second.uuid));

        let resolved = resolver.resolve(&method).unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].descriptor.name, "first");
        assert_eq!(resolved[1].descriptor.name, "second");
    }

    #[test]
    fn unknown_aspect_is_a_resolution_error() {
        let method = dummy_method();
        let mut resolver = Resolver::new(Arc::new(AspectRegistry::new()));
        resolver.attach(method.uuid, AttachmentRecord::new(Uuid::new_v4()));
        assert!(matches!(
            resolver.resolve(&method),
            Err(ResolutionError::UnknownAspect { .. })
        ));
    }

    #[test]
    fn mandatory_typed_exit_must_match_return_type() {
        let registry = Arc::new(AspectRegistry::new());
        let aspect = registry.register(
            AspectDescriptor::new("trim", Capabilities::empty()).with_typed_exit(TypeToken::STR),
        );

        let mut ok_method = dummy_method();
        let mut resolver = Resolver::new(Arc::clone(&registry));
        resolver.attach(
            ok_method.uuid,
            AttachmentRecord::new(aspect.uuid).expecting_return(TypeToken::STR),
        );
        assert!(resolver.resolve(&ok_method).is_ok());

        // Same attachment against an i32-returning method must fail.
        ok_method.return_type = Some(TypeToken::I32);
        assert!(matches!(
            resolver.resolve(&ok_method),
            Err(ResolutionError::ReturnTypeMismatch { .. })
        ));
    }
}
