//! Current-value storage
//!
//! `Values` is an immutable mapping from dependency type to its resolved
//! value. Contexts publish a fresh `Arc<Values>` on every change and never
//! mutate a published snapshot, so readers on other contexts are unaffected.

use crate::types::{AnyValue, Injectable, TypeKey};
use ahash::RandomState;
use std::collections::HashMap;
use std::sync::Arc;

/// Snapshot of the current values visible in a context.
#[derive(Clone, Default)]
pub struct Values {
    map: HashMap<TypeKey, AnyValue, RandomState>,
}

impl Values {
    /// Create an empty snapshot
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn insert(&mut self, key: TypeKey, value: AnyValue) -> Option<AnyValue> {
        self.map.insert(key, value)
    }

    #[inline]
    pub(crate) fn remove(&mut self, key: &TypeKey) -> Option<AnyValue> {
        self.map.remove(key)
    }

    /// Same value (by identity) stored under `key`
    #[inline]
    pub(crate) fn holds(&self, key: &TypeKey, value: &AnyValue) -> bool {
        self.map.get(key).is_some_and(|v| Arc::ptr_eq(v, value))
    }

    /// Get the value of `T`, if present
    #[inline]
    pub fn get<T: Injectable>(&self) -> Option<Arc<T>> {
        self.map
            .get(&TypeKey::of::<T>())
            .and_then(|any| Arc::clone(any).downcast::<T>().ok())
    }

    /// Get the type-erased value stored under `key`
    #[inline]
    pub fn get_any(&self, key: &TypeKey) -> Option<&AnyValue> {
        self.map.get(key)
    }

    /// Check if a value is present for `T`
    #[inline]
    pub fn contains<T: Injectable>(&self) -> bool {
        self.map.contains_key(&TypeKey::of::<T>())
    }

    /// Check if a value is present under `key`
    #[inline]
    pub fn contains_key(&self, key: &TypeKey) -> bool {
        self.map.contains_key(key)
    }

    /// Iterate over the types that have a value
    pub fn keys(&self) -> impl Iterator<Item = &TypeKey> {
        self.map.keys()
    }

    /// Iterate over all entries
    pub fn iter(&self) -> impl Iterator<Item = (&TypeKey, &AnyValue)> {
        self.map.iter()
    }

    /// Get number of values
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl std::fmt::Debug for Values {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.map.keys()).finish()
    }
}
