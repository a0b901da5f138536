//! Provider registry
//!
//! A [`ProviderMap`] is an immutable snapshot of the active providers, split
//! into a sync table and an async table. Registering a batch never mutates a
//! snapshot: it builds a new map in which the batch shadows earlier entries,
//! and the caller keeps the previous snapshot to restore it later.

use crate::factory::Producer;
use crate::graph::{InfoMap, Solution};
use crate::provider::{Provider, ProviderInfo};
use crate::storage::Values;
use crate::types::{AnyValue, TypeKey};
use crate::{DiError, Result};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Snapshot of the active providers.
#[derive(Debug, Clone, Default)]
pub(crate) struct ProviderMap {
    sync: InfoMap,
    async_: InfoMap,
}

impl ProviderMap {
    /// A new map with `providers` registered on top of this one.
    ///
    /// Types with a current value but no provider are registered as fixed
    /// values so that providers may require shared values.
    pub(crate) fn with_batch<I>(&self, providers: I, current: &Values) -> Result<ProviderMap>
    where
        I: IntoIterator<Item = Provider>,
    {
        let mut batch_sync = InfoMap::default();
        let mut batch_async = InfoMap::default();
        for provider in providers {
            for info in provider.into_infos()? {
                let table = if info.is_sync {
                    &mut batch_sync
                } else {
                    &mut batch_async
                };
                let key = info.provides;
                if table.insert(key, Arc::new(info)).is_some() {
                    return Err(DiError::DuplicateProvider {
                        type_name: key.name(),
                    });
                }
            }
        }

        let mut next = self.clone();
        for key in batch_sync.keys().chain(batch_async.keys()) {
            next.sync.remove(key);
            next.async_.remove(key);
        }
        next.sync.extend(batch_sync);
        next.async_.extend(batch_async);

        for (key, value) in current.iter() {
            if !next.contains(key) {
                #[cfg(feature = "logging")]
                trace!(
                    target: "booster",
                    dependency = key.name(),
                    "Registering current value as a fixed provider"
                );
                next.sync.insert(*key, Arc::new(ProviderInfo::fixed(*key, Arc::clone(value))));
            }
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "booster",
            sync = next.sync.len(),
            async_ = next.async_.len(),
            "Provider batch registered"
        );

        Ok(next)
    }

    /// Build the sync-only and the full solution.
    ///
    /// The full solution is checked first so that a requirement with no
    /// provider at all is reported as such, not as a missing sync provider.
    pub(crate) fn solve(&self) -> Result<(Solution, Solution)> {
        let full = Solution::build(self.full_infos(), false)?;
        let sync = Solution::build(self.sync.clone(), true)?;
        Ok((sync, full))
    }

    /// Sync and async entries; async wins where both exist
    fn full_infos(&self) -> InfoMap {
        let mut infos = self.sync.clone();
        infos.extend(self.async_.iter().map(|(k, v)| (*k, Arc::clone(v))));
        infos
    }

    #[inline]
    pub(crate) fn contains(&self, key: &TypeKey) -> bool {
        self.sync.contains_key(key) || self.async_.contains_key(key)
    }

    /// Number of distinct provided types
    pub(crate) fn len(&self) -> usize {
        let async_only = self
            .async_
            .keys()
            .filter(|key| !self.sync.contains_key(key))
            .count();
        self.sync.len() + async_only
    }
}

impl ProviderInfo {
    fn fixed(provides: TypeKey, value: AnyValue) -> Self {
        Self {
            provides,
            is_sync: true,
            required: Vec::new(),
            producer: Producer::constant(value),
        }
    }
}
