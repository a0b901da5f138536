//! Resolver
//!
//! Fills the missing arguments of one call:
//!
//! 1. Explicit arguments are published into a working copy of the current
//!    values; cached values derived from a replaced value are dropped.
//! 2. Parameters with a current value take it.
//! 3. The remaining types are produced generation by generation from the
//!    active solution. Sync producers run inline. The async producers of a
//!    generation are polled together and the first failure cancels the rest.
//!
//! Every finalizer is pushed onto the caller's stack as soon as its resource
//! is acquired, so a later failure still releases everything acquired so far.
//! The working copy is only installed on the context when the caller asks to
//! keep current values, and the stack then restores the previous snapshot.

use crate::context::{Context, InjectOptions};
use crate::factory::{Acquired, Getter, Producer};
use crate::graph::Solution;
use crate::params::{Arguments, Requirements};
use crate::provider::ProviderInfo;
use crate::stack::CleanupStack;
use crate::storage::Values;
use crate::types::{AnyValue, TypeKey};
use crate::{DiError, Result};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

type Pending = Vec<(TypeKey, BoxFuture<'static, Result<Acquired>>)>;

/// Resolve without suspending; async-only providers are missing here
pub(crate) fn inject(
    ctx: &Context,
    requirements: &Requirements,
    arguments: &mut Arguments,
    stack: &mut CleanupStack,
    options: InjectOptions,
) -> Result<()> {
    let mut plan = Plan::prepare(ctx, requirements, arguments, true)?;
    if !plan.pending.is_empty() {
        for (_generation, batch) in plan.order().into_iter().enumerate() {
            #[cfg(feature = "logging")]
            trace!(target: "booster", generation = _generation, batch_size = batch.len(), "Entering generation");

            for info in batch {
                plan.enter_sync(stack, &info)?;
            }
        }
        plan.assign(arguments)?;
    }
    plan.finish(ctx, stack, options);
    Ok(())
}

/// Resolve, awaiting async providers one generation at a time
pub(crate) async fn inject_async(
    ctx: &Context,
    requirements: &Requirements,
    arguments: &mut Arguments,
    stack: &mut CleanupStack,
    options: InjectOptions,
) -> Result<()> {
    let mut plan = Plan::prepare(ctx, requirements, arguments, false)?;
    if !plan.pending.is_empty() {
        for (_generation, batch) in plan.order().into_iter().enumerate() {
            #[cfg(feature = "logging")]
            trace!(target: "booster", generation = _generation, batch_size = batch.len(), "Entering generation");

            let mut pending: Pending = Vec::new();
            for info in batch {
                match &info.producer {
                    Producer::Async(produce) if !plan.current.contains_key(&info.provides) => {
                        #[cfg(feature = "logging")]
                        debug!(target: "booster", dependency = info.provides.name(), "Starting async provider");

                        pending.push((info.provides, produce(&plan.current)?));
                    }
                    _ => plan.enter_sync(stack, &info)?,
                }
            }
            plan.enter_async(stack, pending).await?;
        }
        plan.assign(arguments)?;
    }
    plan.finish(ctx, stack, options);
    Ok(())
}

/// Working state of one resolution
struct Plan {
    sync: bool,
    solution: Arc<Solution>,
    current: Values,
    changed: bool,
    /// Parameters still to fill, with the type chosen for each
    pending: Vec<(String, TypeKey)>,
}

impl Plan {
    fn prepare(
        ctx: &Context,
        requirements: &Requirements,
        arguments: &mut Arguments,
        sync: bool,
    ) -> Result<Self> {
        requirements.check()?;
        let state = ctx.state();
        let solution = if sync {
            Arc::clone(&state.sync)
        } else {
            Arc::clone(&state.full)
        };
        let mut current = Values::clone(&ctx.current_values());
        let mut changed = false;

        // Explicit values replace current ones
        let mut overridden: Vec<TypeKey> = Vec::new();
        for (name, candidates) in requirements.iter() {
            let Some(value) = arguments.get_any(name) else {
                continue;
            };
            let key = explicit_key(name, candidates, value)?;
            if current.holds(&key, value) {
                continue;
            }
            #[cfg(feature = "logging")]
            trace!(target: "booster", dependency = key.name(), param = name, "Overriding current value");

            current.insert(key, Arc::clone(value));
            overridden.push(key);
            changed = true;
        }
        for key in &overridden {
            for stale in state.full.descendants(key) {
                if !overridden.contains(&stale) && current.remove(&stale).is_some() {
                    #[cfg(feature = "logging")]
                    trace!(target: "booster", dependency = stale.name(), "Invalidated derived value");
                }
            }
        }

        // Current values, then providers, first candidate wins
        let mut pending = Vec::new();
        let mut unresolved: Vec<&'static str> = Vec::new();
        for (name, candidates) in requirements.iter() {
            if arguments.contains(name) {
                continue;
            }
            let chosen = candidates
                .iter()
                .find(|key| current.contains_key(key) || solution.contains(key));
            match chosen {
                Some(key) => match current.get_any(key) {
                    Some(value) => {
                        #[cfg(feature = "logging")]
                        trace!(target: "booster", dependency = key.name(), param = name, "Using current value");

                        arguments.insert_any(name, Arc::clone(value));
                    }
                    None => pending.push((name.to_owned(), *key)),
                },
                None => unresolved.extend(candidates.iter().map(TypeKey::name)),
            }
        }
        if !unresolved.is_empty() {
            return Err(DiError::provider_missing(unresolved, sync));
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "booster",
            sync,
            requested = requirements.len(),
            to_produce = pending.len(),
            "Resolving dependencies"
        );

        Ok(Self {
            sync,
            solution,
            current,
            changed,
            pending,
        })
    }

    /// Batches needed for the pending parameters
    fn order(&self) -> Vec<Vec<Arc<ProviderInfo>>> {
        let requested: Vec<TypeKey> = self.pending.iter().map(|(_, key)| *key).collect();
        self.solution
            .order_for(&requested, |key| self.current.contains_key(key))
    }

    fn enter_sync(&mut self, stack: &mut CleanupStack, info: &ProviderInfo) -> Result<()> {
        if self.current.contains_key(&info.provides) {
            return Ok(());
        }
        let value = match &info.producer {
            Producer::Sync(produce) => {
                #[cfg(feature = "logging")]
                debug!(target: "booster", dependency = info.provides.name(), "Entering sync provider");

                record(stack, produce(&self.current)?)
            }
            Producer::Derived { source, getter } => self.derive(info.provides, source, getter)?,
            Producer::Async(_) => {
                return Err(DiError::provider_missing([info.provides.name()], true));
            }
        };
        self.current.insert(info.provides, value);
        self.changed = true;
        Ok(())
    }

    async fn enter_async(&mut self, stack: &mut CleanupStack, pending: Pending) -> Result<()> {
        if pending.is_empty() {
            return Ok(());
        }
        let mut running: FuturesUnordered<_> = pending
            .into_iter()
            .map(|(key, acquire)| acquire.map(move |outcome| (key, outcome)))
            .collect();

        // Dropping `running` on failure cancels the producers still in flight
        while let Some((key, outcome)) = running.next().await {
            let value = record(stack, outcome?);

            #[cfg(feature = "logging")]
            debug!(target: "booster", dependency = key.name(), remaining = running.len(), "Async provider finished");

            self.current.insert(key, value);
            self.changed = true;
        }
        Ok(())
    }

    fn derive(&self, provides: TypeKey, source: &TypeKey, getter: &Getter) -> Result<AnyValue> {
        let composite = self
            .current
            .get_any(source)
            .ok_or_else(|| DiError::provider_missing([source.name()], self.sync))?;
        getter(composite).ok_or_else(|| {
            DiError::Internal(format!("cannot extract {provides} from {source}"))
        })
    }

    fn assign(&self, arguments: &mut Arguments) -> Result<()> {
        for (name, key) in &self.pending {
            match self.current.get_any(key) {
                Some(value) => arguments.insert_any(name.clone(), Arc::clone(value)),
                None => return Err(DiError::provider_missing([key.name()], self.sync)),
            }
        }
        Ok(())
    }

    /// Install the working values until `stack` closes, if asked to
    fn finish(self, ctx: &Context, stack: &mut CleanupStack, options: InjectOptions) {
        if !(options.keep_current_values && self.changed) {
            return;
        }
        let prior = ctx.replace_values(Arc::new(self.current));
        let restore = ctx.handle();
        stack.push(move || {
            restore.replace_values(prior);
            Ok::<(), Infallible>(())
        });
    }
}

/// The type an explicit argument is stored under
fn explicit_key(name: &str, candidates: &[TypeKey], value: &AnyValue) -> Result<TypeKey> {
    match candidates {
        [single] => Ok(*single),
        _ => candidates
            .iter()
            .find(|key| key.matches(value))
            .copied()
            .ok_or_else(|| DiError::AmbiguousValue {
                param: name.to_owned(),
                candidates: candidates.iter().map(TypeKey::name).collect(),
            }),
    }
}

fn record(stack: &mut CleanupStack, acquired: Acquired) -> AnyValue {
    if let Some(release) = acquired.release {
        stack.push_release(release);
    }
    acquired.value
}
