//! Call parameters
//!
//! A callable declares the inputs it needs by name and nominal type with
//! [`Requirements`]; the values for one call are carried by [`Arguments`].

use crate::types::{AnyValue, Injectable, TypeKey};
use crate::Result;
use ahash::RandomState;
use std::collections::HashMap;
use std::sync::Arc;

/// Parameter name to the candidate types that may satisfy it.
///
/// A parameter with several candidates is a union: the first candidate (in
/// declaration order) that has a current value or a provider wins.
#[derive(Debug, Clone, Default)]
pub struct Requirements {
    params: Vec<(String, Vec<TypeKey>)>,
}

impl Requirements {
    /// Create an empty set of requirements
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a value of `T` for parameter `name`
    pub fn param<T: Injectable>(self, name: impl Into<String>) -> Self {
        self.key(name, TypeKey::of::<T>())
    }

    /// Require a value of the type identified by `key` for parameter `name`
    pub fn key(self, name: impl Into<String>, key: TypeKey) -> Self {
        self.union(name, [key])
    }

    /// Require one of several types for parameter `name`
    pub fn union<I>(mut self, name: impl Into<String>, candidates: I) -> Self
    where
        I: IntoIterator<Item = TypeKey>,
    {
        let name = name.into();
        let candidates: Vec<TypeKey> = candidates.into_iter().collect();
        match self.params.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = candidates,
            None => self.params.push((name, candidates)),
        }
        self
    }

    /// Candidates for a parameter
    pub fn get(&self, name: &str) -> Option<&[TypeKey]> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c.as_slice())
    }

    /// Iterate in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[TypeKey])> {
        self.params.iter().map(|(n, c)| (n.as_str(), c.as_slice()))
    }

    /// Name of the first parameter requiring exactly `key`
    pub fn name_for(&self, key: &TypeKey) -> Option<&str> {
        self.params
            .iter()
            .find(|(_, c)| c.len() == 1 && c[0] == *key)
            .map(|(n, _)| n.as_str())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Reject built-in or ambiguous candidate types
    pub(crate) fn check(&self) -> Result<()> {
        for (_, candidates) in &self.params {
            for key in candidates {
                key.check()?;
            }
        }
        Ok(())
    }
}

/// Values for the parameters of one call.
#[derive(Clone, Default)]
pub struct Arguments {
    values: HashMap<String, AnyValue, RandomState>,
}

impl Arguments {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Supply a value for `name`
    pub fn insert<T: Injectable>(&mut self, name: impl Into<String>, value: T) {
        self.values.insert(name.into(), Arc::new(value));
    }

    /// Supply a shared value for `name`, keeping its identity
    pub fn insert_arc<T: Injectable>(&mut self, name: impl Into<String>, value: Arc<T>) {
        self.values.insert(name.into(), value);
    }

    /// Supply a type-erased value for `name`
    pub fn insert_any(&mut self, name: impl Into<String>, value: AnyValue) {
        self.values.insert(name.into(), value);
    }

    /// Builder form of [`Arguments::insert`]
    pub fn with<T: Injectable>(mut self, name: impl Into<String>, value: T) -> Self {
        self.insert(name, value);
        self
    }

    /// Get the value of `name` as `T`
    pub fn get<T: Injectable>(&self, name: &str) -> Option<Arc<T>> {
        self.values
            .get(name)
            .and_then(|any| Arc::clone(any).downcast::<T>().ok())
    }

    #[inline]
    pub fn get_any(&self, name: &str) -> Option<&AnyValue> {
        self.values.get(name)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Iterate over supplied values, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AnyValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for Arguments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}
