//! Type-erased composite identities for the facade cache and the
//! observation registry.
//!
//! The same domain value under two different backends must never collide, so
//! every identity starts from the backend's `TypeId` and only then mixes in
//! the erased domain (and key) values.

use std::any::{Any, TypeId};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::traits::KeyValueDataStorage;

trait ErasedValue: Any + Send + Sync {
    fn eq_value(&self, other: &dyn ErasedValue) -> bool;
    fn as_any(&self) -> &dyn Any;
}

impl<T> ErasedValue for T
where
    T: Eq + Hash + Send + Sync + 'static,
{
    fn eq_value(&self, other: &dyn ErasedValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .map_or(false, |other| self == other)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Hashable wrapper around a value whose concrete type has been erased.
///
/// Two identities are equal only when they wrap the same concrete type and
/// the wrapped values compare equal.
#[derive(Clone)]
pub(crate) struct AnyIdentity {
    hash: u64,
    value: Arc<dyn ErasedValue>,
}

impl AnyIdentity {
    pub(crate) fn new<T>(value: T) -> Self
    where
        T: Eq + Hash + Send + Sync + 'static,
    {
        let mut hasher = DefaultHasher::new();
        TypeId::of::<T>().hash(&mut hasher);
        value.hash(&mut hasher);

        Self {
            hash: hasher.finish(),
            value: Arc::new(value),
        }
    }
}

impl PartialEq for AnyIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.value.eq_value(other.value.as_ref())
    }
}

impl Eq for AnyIdentity {}

impl Hash for AnyIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Debug for AnyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AnyIdentity").field(&self.hash).finish()
    }
}

/// Cache identity of one (backend type, domain) pair
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub(crate) struct StorageIdentity {
    backend: TypeId,
    domain: Option<AnyIdentity>,
}

impl StorageIdentity {
    pub(crate) fn new<B: KeyValueDataStorage>(domain: Option<&B::Domain>) -> Self {
        Self {
            backend: TypeId::of::<B>(),
            domain: domain.map(|domain| AnyIdentity::new(domain.clone())),
        }
    }

    pub(crate) fn backend(&self) -> TypeId {
        self.backend
    }
}

/// Identity of one observation subject: a (backend type, domain, key) triple
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub(crate) struct SubjectIdentity {
    storage: StorageIdentity,
    key: AnyIdentity,
}

impl SubjectIdentity {
    pub(crate) fn new<B: KeyValueDataStorage>(domain: Option<&B::Domain>, key: &B::Key) -> Self {
        Self {
            storage: StorageIdentity::new::<B>(domain),
            key: AnyIdentity::new(key.clone()),
        }
    }

    pub(crate) fn storage(&self) -> &StorageIdentity {
        &self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{FileTreeStorage, InMemoryStorage};

    #[test]
    fn equal_values_are_equal() {
        let a = AnyIdentity::new("domain".to_string());
        let b = AnyIdentity::new("domain".to_string());
        assert_eq!(a, b);
    }

    #[test]
    fn different_values_differ() {
        let a = AnyIdentity::new("a".to_string());
        let b = AnyIdentity::new("b".to_string());
        assert_ne!(a, b);
    }

    #[test]
    fn same_domain_under_different_backends_does_not_collide() {
        let memory = StorageIdentity::new::<InMemoryStorage>(Some(&"shared".to_string()));
        let file = StorageIdentity::new::<FileTreeStorage>(Some(&"shared".to_string()));
        assert_ne!(memory, file);
    }

    #[test]
    fn absent_domain_differs_from_present() {
        let none = StorageIdentity::new::<InMemoryStorage>(None);
        let some = StorageIdentity::new::<InMemoryStorage>(Some(&String::new()));
        assert_ne!(none, some);
    }
}
