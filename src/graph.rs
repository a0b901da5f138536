//! Dependency graph and solutions
//!
//! A [`DependencyGraph`] is built once per registration batch from the
//! provider table. Nodes are provided types; an edge runs from a dependency
//! to each type that requires it. Kahn's algorithm assigns every node a
//! generation: generation 0 has no requirements, and every later node sits
//! one past the latest of its requirements. Nodes of one generation never
//! depend on each other and may be produced concurrently.
//!
//! A [`Solution`] pairs a graph with the provider entries it was built from
//! and answers `order_for`: the generations restricted to the unresolved
//! ancestors of a requested set of types.

use crate::provider::ProviderInfo;
use crate::types::TypeKey;
use crate::{DiError, Result};
use ahash::RandomState;
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

pub(crate) type InfoMap = HashMap<TypeKey, Arc<ProviderInfo>, RandomState>;

/// Directed acyclic graph of provided types.
#[derive(Debug, Default)]
pub(crate) struct DependencyGraph {
    keys: Vec<TypeKey>,
    index_by_key: HashMap<TypeKey, usize, RandomState>,
    /// Requirements of each node
    parents: Vec<Vec<usize>>,
    /// Nodes requiring each node
    children: Vec<Vec<usize>>,
    generation: Vec<usize>,
    generation_count: usize,
}

impl DependencyGraph {
    /// Build from `type -> required types`.
    ///
    /// Every requirement must itself be a node. All missing requirements are
    /// collected into one error; `sync` only selects its wording.
    pub(crate) fn build<'a, I>(dependencies: I, sync: bool) -> Result<Self>
    where
        I: IntoIterator<Item = (TypeKey, &'a [TypeKey])>,
    {
        let mut entries: Vec<(TypeKey, &[TypeKey])> = dependencies.into_iter().collect();
        // Stable node order, independent of hash map iteration
        entries.sort_by(|a, b| a.0.name().cmp(b.0.name()));

        let keys: Vec<TypeKey> = entries.iter().map(|(key, _)| *key).collect();
        let index_by_key: HashMap<TypeKey, usize, RandomState> =
            keys.iter().enumerate().map(|(i, key)| (*key, i)).collect();

        let mut parents = vec![Vec::new(); keys.len()];
        let mut children = vec![Vec::new(); keys.len()];
        let mut missing = Vec::new();
        for (child, (_, required)) in entries.iter().enumerate() {
            for dependency in required.iter() {
                match index_by_key.get(dependency) {
                    Some(&parent) => {
                        parents[child].push(parent);
                        children[parent].push(child);
                    }
                    None => missing.push(dependency.name()),
                }
            }
        }
        if !missing.is_empty() {
            return Err(DiError::provider_missing(missing, sync));
        }

        let (generation, generation_count) = kahn_generations(&parents, &children)
            .map_err(|cycle| DiError::CircularDependency {
                type_names: cycle.into_iter().map(|i| keys[i].name()).collect(),
            })?;

        Ok(Self {
            keys,
            index_by_key,
            parents,
            children,
            generation,
            generation_count,
        })
    }

    #[cfg(test)]
    pub(crate) fn generation_of(&self, key: &TypeKey) -> Option<usize> {
        self.index_by_key.get(key).map(|&i| self.generation[i])
    }

    /// All nodes grouped by generation
    #[cfg(test)]
    pub(crate) fn generations(&self) -> Vec<Vec<TypeKey>> {
        let mut generations = vec![Vec::new(); self.generation_count];
        for (i, key) in self.keys.iter().enumerate() {
            generations[self.generation[i]].push(*key);
        }
        generations
    }

    /// Every type that transitively requires `key`, excluding `key` itself
    pub(crate) fn descendants(&self, key: &TypeKey) -> Vec<TypeKey> {
        let Some(&start) = self.index_by_key.get(key) else {
            return Vec::new();
        };
        let mut seen = vec![false; self.keys.len()];
        let mut pending = self.children[start].clone();
        let mut found = Vec::new();
        while let Some(i) = pending.pop() {
            if !std::mem::replace(&mut seen[i], true) {
                found.push(self.keys[i]);
                pending.extend_from_slice(&self.children[i]);
            }
        }
        found
    }

    /// Indices of `requested` and their ancestors, not walking through nodes
    /// for which `known` holds
    fn unresolved_closure<F>(&self, requested: &[TypeKey], known: F) -> Vec<bool>
    where
        F: Fn(&TypeKey) -> bool,
    {
        let mut included = vec![false; self.keys.len()];
        let mut pending: Vec<usize> = requested
            .iter()
            .filter(|key| !known(*key))
            .filter_map(|key| self.index_by_key.get(key).copied())
            .collect();
        while let Some(i) = pending.pop() {
            if std::mem::replace(&mut included[i], true) {
                continue;
            }
            pending.extend(
                self.parents[i]
                    .iter()
                    .copied()
                    .filter(|&p| !known(&self.keys[p])),
            );
        }
        included
    }
}

/// Kahn's algorithm. Returns each node's generation and the number of
/// generations, or the nodes left on a cycle.
fn kahn_generations(
    parents: &[Vec<usize>],
    children: &[Vec<usize>],
) -> std::result::Result<(Vec<usize>, usize), Vec<usize>> {
    let mut in_degree: Vec<usize> = parents.iter().map(Vec::len).collect();
    let mut generation = vec![0usize; parents.len()];
    let mut current: Vec<usize> = (0..parents.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut placed = 0usize;
    let mut count = 0usize;

    while !current.is_empty() {
        let mut next = Vec::new();
        for &node in &current {
            generation[node] = count;
            placed += 1;
            for &child in &children[node] {
                in_degree[child] -= 1;
                if in_degree[child] == 0 {
                    next.push(child);
                }
            }
        }
        count += 1;
        current = next;
    }

    if placed == parents.len() {
        Ok((generation, count))
    } else {
        Err((0..parents.len()).filter(|&i| in_degree[i] > 0).collect())
    }
}

// =============================================================================
// Solution
// =============================================================================

/// Provider entries plus the graph built from them. Read-only once built.
#[derive(Debug, Default)]
pub(crate) struct Solution {
    infos: InfoMap,
    graph: DependencyGraph,
}

impl Solution {
    pub(crate) fn build(infos: InfoMap, sync: bool) -> Result<Self> {
        let graph = DependencyGraph::build(
            infos
                .iter()
                .map(|(key, info)| (*key, info.required.as_slice())),
            sync,
        )?;

        #[cfg(feature = "logging")]
        debug!(
            target: "booster",
            sync,
            providers = graph.keys.len(),
            generations = graph.generation_count,
            "Dependency solution built"
        );

        Ok(Self { infos, graph })
    }

    #[inline]
    pub(crate) fn contains(&self, key: &TypeKey) -> bool {
        self.infos.contains_key(key)
    }

    #[cfg(test)]
    pub(crate) fn infos(&self) -> &InfoMap {
        &self.infos
    }

    #[cfg(test)]
    pub(crate) fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub(crate) fn descendants(&self, key: &TypeKey) -> Vec<TypeKey> {
        self.graph.descendants(key)
    }

    /// Batches of providers needed to produce `requested`, in generation
    /// order. Types for which `known` holds are neither produced nor
    /// walked through. Requested types without a provider are skipped.
    pub(crate) fn order_for<F>(&self, requested: &[TypeKey], known: F) -> Vec<Vec<Arc<ProviderInfo>>>
    where
        F: Fn(&TypeKey) -> bool,
    {
        let included = self.graph.unresolved_closure(requested, known);
        let mut batches: Vec<Vec<Arc<ProviderInfo>>> = vec![Vec::new(); self.graph.generation_count];
        for (i, key) in self.graph.keys.iter().enumerate() {
            if included[i] {
                if let Some(info) = self.infos.get(key) {
                    batches[self.graph.generation[i]].push(Arc::clone(info));
                }
            }
        }
        batches.retain(|batch| !batch.is_empty());
        batches
    }
}
