//! Exchange-scoped key/value context.
//!
//! A [`Context`] is an immutable map. [`Context::put`] returns a new map that
//! shares every existing entry with the old one, so a context handed to
//! another stage can never be observed half-updated. Contexts travel with the
//! call chain (see [`Body::deferred`](crate::Body::deferred) and
//! [`Body::with_context`](crate::Body::with_context)); there is no global
//! registry.

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

struct Entry {
    key: String,
    value: Arc<dyn Any + Send + Sync>,
    next: Option<Arc<Entry>>,
}

/// An immutable, persistent map from string keys to arbitrary values.
#[derive(Clone, Default)]
pub struct Context {
    head: Option<Arc<Entry>>,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new context with `key` bound to `value`.
    ///
    /// A later `put` for the same key shadows the earlier one.
    pub fn put<V>(&self, key: impl Into<String>, value: V) -> Context
    where
        V: Any + Send + Sync,
    {
        self.put_shared(key.into(), Arc::new(value))
    }

    fn put_shared(&self, key: String, value: Arc<dyn Any + Send + Sync>) -> Context {
        Context {
            head: Some(Arc::new(Entry {
                key,
                value,
                next: self.head.clone(),
            })),
        }
    }

    /// Look up `key`, returning the value if it is bound to a `V`.
    pub fn get<V: Any>(&self, key: &str) -> Option<&V> {
        self.entries()
            .find(|entry| entry.key == key)
            .and_then(|entry| entry.value.downcast_ref::<V>())
    }

    /// Whether `key` is bound to any value.
    pub fn contains(&self, key: &str) -> bool {
        self.entries().any(|entry| entry.key == key)
    }

    /// Combine two contexts; entries of `other` win on conflicting keys.
    pub fn merge(&self, other: &Context) -> Context {
        let mut pending: Vec<&Entry> = other.entries().collect();
        let mut merged = self.clone();
        while let Some(entry) = pending.pop() {
            merged = merged.put_shared(entry.key.clone(), entry.value.clone());
        }
        merged
    }

    /// Distinct keys, most recently bound first.
    pub fn keys(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.entries()
            .map(|entry| entry.key.as_str())
            .filter(|key| seen.insert(*key))
            .collect()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.keys().len()
    }

    /// Whether no key is bound.
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    fn entries(&self) -> impl Iterator<Item = &Entry> {
        let mut cursor = self.head.as_deref();
        std::iter::from_fn(move || {
            let entry = cursor?;
            cursor = entry.next.as_deref();
            Some(entry)
        })
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("keys", &self.keys())
            .finish()
    }
}
