//! Interned type identities.
//!
//! The weaver never needs a structural type system: it only compares the
//! static identity of a method's declared return type against the identities
//! a typed exit hook declares. A [`TypeToken`] is that identity, stable
//! across processes because it is derived deterministically from the type's
//! qualified name. The [`TypeRegistry`] keeps the token-to-name mapping for
//! diagnostics and pretty printing; it can be shared read-mostly across
//! parallel weaves.
use std::{
    collections::BTreeMap,
    hash::{DefaultHasher, Hash, Hasher},
};

use parking_lot::RwLock;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stable identity for a declared type.
///
/// Tokens for the same qualified name always compare equal, so weave-time
/// matching is a plain equality check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TypeToken(Uuid);

impl TypeToken {
    /// The `void`/unit pseudo-type. A method whose declared return type is
    /// absent never participates in typed exit dispatch.
    pub const UNIT: TypeToken = TypeToken(Uuid::from_u128(0x01));
    pub const BOOL: TypeToken = TypeToken(Uuid::from_u128(0x02));
    pub const I32: TypeToken = TypeToken(Uuid::from_u128(0x03));
    pub const I64: TypeToken = TypeToken(Uuid::from_u128(0x04));
    pub const F64: TypeToken = TypeToken(Uuid::from_u128(0x05));
    pub const STR: TypeToken = TypeToken(Uuid::from_u128(0x06));

    /// Identity of the error object raised when a cancelled execution
    /// context surfaces through an asynchronous hook.
    pub const CANCELLED: TypeToken = TypeToken(Uuid::from_u128(0x10));

    /// Derive the token for a qualified type name.
    ///
    /// Purely a function of the name; two registries (or two processes)
    /// derive the same token for the same name.
    pub fn derived(name: &str) -> TypeToken {
        let mut hi = DefaultHasher::new();
        "weft-type".hash(&mut hi);
        name.hash(&mut hi);
        let mut lo = DefaultHasher::new();
        name.hash(&mut lo);
        "weft-type".hash(&mut lo);
        TypeToken(Uuid::from_u64_pair(hi.finish(), lo.finish()))
    }
}

/// Token-to-name mapping used for diagnostics and dumps.
///
/// Well-known primitive tokens are pre-seeded. Interning an already-known
/// name returns the existing token, so the registry stays consistent when
/// populated from several metadata sources.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    inner: RwLock<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    names: BTreeMap<TypeToken, String>,
    tokens: BTreeMap<String, TypeToken>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        let registry = TypeRegistry::default();
        for (token, name) in [
            (TypeToken::UNIT, "unit"),
            (TypeToken::BOOL, "bool"),
            (TypeToken::I32, "i32"),
            (TypeToken::I64, "i64"),
            (TypeToken::F64, "f64"),
            (TypeToken::STR, "str"),
            (TypeToken::CANCELLED, "weft.Cancelled"),
        ] {
            registry.insert(token, name);
        }
        registry
    }

    fn insert(&self, token: TypeToken, name: &str) {
        let mut inner = self.inner.write();
        inner.names.insert(token, name.to_string());
        inner.tokens.insert(name.to_string(), token);
    }

    /// Intern a qualified type name, returning its stable token.
    pub fn intern(&self, name: &str) -> TypeToken {
        if let Some(token) = self.inner.read().tokens.get(name) {
            return *token;
        }
        let token = TypeToken::derived(name);
        self.insert(token, name);
        token
    }

    /// Resolve a token back to its qualified name, if known to this registry.
    pub fn name_of(&self, token: TypeToken) -> Option<String> {
        self.inner.read().names.get(&token).cloned()
    }

    /// Build a formatting helper that renders the token through this
    /// registry, falling back to the raw identity for unknown tokens.
    pub fn fmt(&self, token: TypeToken) -> impl std::fmt::Display {
        match self.name_of(token) {
            Some(name) => name,
            None => format!("<type {}>", token.0),
        }
    }
}
