//! Resolution context
//!
//! A [`Context`] is one logical execution context: it holds the current
//! values and the active provider solutions as two immutable snapshots.
//! Every change installs a new snapshot with a single atomic swap and hands
//! back the previous one as the restore token, so no snapshot is ever
//! mutated in place and readers never see a half-updated table.
//!
//! Cloning a `Context` gives the clone its own cells, seeded with the
//! current state, so tasks running on clones never restore each other's
//! values. [`Context::fork`] does the same one level deeper, and
//! [`Context::copy_state`] carries state over to another context.

use crate::graph::Solution;
use crate::params::{Arguments, Requirements};
use crate::provider::{Dependencies, Provider};
use crate::registry::ProviderMap;
use crate::resolver;
use crate::stack::CleanupStack;
use crate::storage::Values;
use crate::types::{AnyValue, Injectable, TypeKey};
use crate::{DiError, Result};
use arc_swap::ArcSwap;
use once_cell::sync::Lazy;
use std::future::Future;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, warn};

/// Active providers with the two solutions built from them
#[derive(Debug, Default)]
pub(crate) struct SolutionState {
    pub(crate) providers: Arc<ProviderMap>,
    /// Only providers that never suspend
    pub(crate) sync: Arc<Solution>,
    /// All providers; async shadows sync for the same type
    pub(crate) full: Arc<Solution>,
}

static EMPTY_VALUES: Lazy<Arc<Values>> = Lazy::new(|| Arc::new(Values::new()));
static EMPTY_STATE: Lazy<Arc<SolutionState>> = Lazy::new(|| Arc::new(SolutionState::default()));

struct Inner {
    values: ArcSwap<Values>,
    state: ArcSwap<SolutionState>,
}

/// Handle to one logical context's values and providers.
///
/// # Examples
///
/// ```rust
/// use booster::{Context, Provider};
/// use std::sync::Arc;
///
/// struct Greeting(&'static str);
/// struct Recipient(&'static str);
/// struct Message(String);
///
/// let ctx = Context::new();
/// let _solved = ctx
///     .solve([
///         Provider::value(Greeting("Hello")),
///         Provider::value(Recipient("World")),
///         Provider::function(|(g, r): (Arc<Greeting>, Arc<Recipient>)| {
///             Message(format!("{} {}", g.0, r.0))
///         }),
///     ])
///     .unwrap();
///
/// let message = ctx.invoke().call(|m: Arc<Message>| m.0.clone()).unwrap();
/// assert_eq!(message, "Hello World");
/// ```
pub struct Context {
    inner: Arc<Inner>,
    /// Fork depth for debugging
    depth: u32,
}

impl Context {
    /// Create a context with no values and no providers
    pub fn new() -> Self {
        #[cfg(feature = "logging")]
        debug!(target: "booster", depth = 0, "Creating new root context");

        Self::from_parts(Arc::clone(&EMPTY_VALUES), Arc::clone(&EMPTY_STATE), 0)
    }

    fn from_parts(values: Arc<Values>, state: Arc<SolutionState>, depth: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                values: ArcSwap::new(values),
                state: ArcSwap::new(state),
            }),
            depth,
        }
    }

    /// Start an independent context from this one's current state.
    ///
    /// Later changes on either side are not seen by the other.
    pub fn fork(&self) -> Self {
        let depth = self.depth + 1;

        #[cfg(feature = "logging")]
        debug!(
            target: "booster",
            parent_depth = self.depth,
            child_depth = depth,
            current_values = self.inner.values.load().len(),
            "Forking context"
        );

        Self::from_parts(self.current_values(), self.state(), depth)
    }

    /// Second handle on the same cells, for guards that restore this context
    #[inline]
    pub(crate) fn handle(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            depth: self.depth,
        }
    }

    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Snapshot of the current values
    #[inline]
    pub fn current_values(&self) -> Arc<Values> {
        self.inner.values.load_full()
    }

    /// Current value of `T`, if one is set
    #[inline]
    pub fn get<T: Injectable>(&self) -> Option<Arc<T>> {
        self.inner.values.load().get::<T>()
    }

    /// Whether any active provider produces `T`
    pub fn has_provider<T: Injectable>(&self) -> bool {
        self.inner.state.load().providers.contains(&TypeKey::of::<T>())
    }

    /// Number of provided types
    pub fn provider_count(&self) -> usize {
        self.inner.state.load().providers.len()
    }

    /// Activate `providers` on top of the current ones until the returned
    /// guard is dropped.
    ///
    /// Fails if a provider produces or requires a built-in type, if two
    /// providers of the batch produce the same type, or if any requirement
    /// has no provider. Every missing type is named.
    pub fn solve<I>(&self, providers: I) -> Result<SolutionGuard>
    where
        I: IntoIterator<Item = Provider>,
    {
        let prior = self.state();
        let current = self.current_values();
        let providers = prior.providers.with_batch(providers, &current)?;
        let (sync, full) = providers.solve()?;

        #[cfg(feature = "logging")]
        debug!(
            target: "booster",
            providers = providers.len(),
            depth = self.depth,
            "Activating provider solution"
        );

        let next = Arc::new(SolutionState {
            providers: Arc::new(providers),
            sync: Arc::new(sync),
            full: Arc::new(full),
        });
        let prior = self.replace_state(next);
        Ok(SolutionGuard {
            ctx: self.handle(),
            prior: Some(prior),
        })
    }

    /// Activate a single provider; see [`Context::solve`]
    pub fn provide(&self, provider: Provider) -> Result<SolutionGuard> {
        self.solve([provider])
    }

    /// Capture the current values and solutions
    pub fn copy_state(&self) -> StateSnapshot {
        StateSnapshot {
            values: self.current_values(),
            state: self.state(),
        }
    }

    /// Fill the missing `arguments` of one call without suspending.
    ///
    /// Finalizers of acquired resources are pushed onto `stack`; the caller
    /// closes it once the call is done.
    pub fn inject(
        &self,
        requirements: &Requirements,
        arguments: &mut Arguments,
        stack: &mut CleanupStack,
        options: InjectOptions,
    ) -> Result<()> {
        resolver::inject(self, requirements, arguments, stack, options)
    }

    /// Fill the missing `arguments` of one call, running independent async
    /// providers concurrently
    pub async fn inject_async(
        &self,
        requirements: &Requirements,
        arguments: &mut Arguments,
        stack: &mut CleanupStack,
        options: InjectOptions,
    ) -> Result<()> {
        resolver::inject_async(self, requirements, arguments, stack, options).await
    }

    /// Start an injected call
    #[inline]
    pub fn invoke(&self) -> Invocation<'_> {
        Invocation {
            ctx: self,
            keep_current_values: false,
            overrides: Vec::new(),
        }
    }

    /// Resolve `T` once.
    ///
    /// Resources acquired for it are released before this returns; use
    /// [`Context::invoke`] to work with them while they are live.
    pub fn resolve<T: Injectable>(&self) -> Result<Arc<T>> {
        self.invoke().call(|value: Arc<T>| value)
    }

    /// Resolve `T` once, allowing async providers
    pub async fn resolve_async<T: Injectable>(&self) -> Result<Arc<T>> {
        self.invoke()
            .call_async(|value: Arc<T>| async move { value })
            .await
    }

    #[inline]
    pub(crate) fn state(&self) -> Arc<SolutionState> {
        self.inner.state.load_full()
    }

    #[inline]
    pub(crate) fn replace_values(&self, values: Arc<Values>) -> Arc<Values> {
        self.inner.values.swap(values)
    }

    #[inline]
    pub(crate) fn replace_state(&self, state: Arc<SolutionState>) -> Arc<SolutionState> {
        self.inner.state.swap(state)
    }
}

impl Clone for Context {
    /// Independent cells seeded with this context's current state
    fn clone(&self) -> Self {
        Self::from_parts(self.current_values(), self.state(), self.depth)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("depth", &self.depth)
            .field("values", &self.inner.values.load().len())
            .field("providers", &self.provider_count())
            .finish()
    }
}

/// Options for [`Context::inject`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InjectOptions {
    /// Keep resolved and explicit values as current values until the
    /// cleanup stack closes
    pub keep_current_values: bool,
}

impl InjectOptions {
    #[inline]
    pub const fn keep() -> Self {
        Self {
            keep_current_values: true,
        }
    }
}

// =============================================================================
// Restore guards
// =============================================================================

/// Restores the previous providers when dropped.
#[must_use = "the providers are deactivated as soon as the guard is dropped"]
pub struct SolutionGuard {
    ctx: Context,
    prior: Option<Arc<SolutionState>>,
}

impl SolutionGuard {
    /// Restore the previous providers now
    pub fn reset(mut self) {
        self.restore();
    }

    fn restore(&mut self) {
        if let Some(prior) = self.prior.take() {
            #[cfg(feature = "logging")]
            debug!(target: "booster", depth = self.ctx.depth, "Restoring previous provider solution");

            self.ctx.replace_state(prior);
        }
    }
}

impl Drop for SolutionGuard {
    fn drop(&mut self) {
        self.restore();
    }
}

/// Current values and solutions of a context at one point in time.
#[derive(Clone)]
pub struct StateSnapshot {
    values: Arc<Values>,
    state: Arc<SolutionState>,
}

impl StateSnapshot {
    pub fn values(&self) -> &Values {
        &self.values
    }

    /// Install this state on `ctx` until the returned guard is dropped
    pub fn resume(&self, ctx: &Context) -> StateGuard {
        let values = ctx.replace_values(Arc::clone(&self.values));
        let state = ctx.replace_state(Arc::clone(&self.state));
        StateGuard {
            ctx: ctx.handle(),
            prior: Some((values, state)),
        }
    }
}

impl std::fmt::Debug for StateSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSnapshot")
            .field("values", &self.values)
            .field("providers", &self.state.providers.len())
            .finish()
    }
}

/// Undoes [`StateSnapshot::resume`] when dropped.
#[must_use = "the resumed state is undone as soon as the guard is dropped"]
pub struct StateGuard {
    ctx: Context,
    prior: Option<(Arc<Values>, Arc<SolutionState>)>,
}

impl StateGuard {
    pub fn reset(mut self) {
        self.restore();
    }

    fn restore(&mut self) {
        if let Some((values, state)) = self.prior.take() {
            self.ctx.replace_state(state);
            self.ctx.replace_values(values);
        }
    }
}

impl Drop for StateGuard {
    fn drop(&mut self) {
        self.restore();
    }
}

// =============================================================================
// Injected calls
// =============================================================================

/// Builder for one injected call.
///
/// The call's dependencies are declared by the argument type of the closure
/// passed to [`call`](Invocation::call) or
/// [`call_async`](Invocation::call_async). A cleanup stack is created for the
/// call and closed on every exit path.
#[must_use = "an invocation does nothing until `call` or `call_async`"]
pub struct Invocation<'a> {
    ctx: &'a Context,
    keep_current_values: bool,
    overrides: Vec<(TypeKey, AnyValue)>,
}

impl Invocation<'_> {
    /// Keep resolved values as current values for the duration of the call
    pub fn shared(mut self) -> Self {
        self.keep_current_values = true;
        self
    }

    /// Use `value` for `T` in this call, replacing any current value
    pub fn value<T: Injectable>(self, value: T) -> Self {
        self.arc(Arc::new(value))
    }

    /// Use a shared `value` for `T`, keeping its identity
    pub fn arc<T: Injectable>(mut self, value: Arc<T>) -> Self {
        self.overrides.push((TypeKey::of::<T>(), value));
        self
    }

    /// Parameters are named by position; overrides by type
    fn prepare<D: Dependencies>(&self) -> (Vec<TypeKey>, Requirements, Arguments) {
        let keys = D::keys();
        let mut requirements = Requirements::new();
        let mut arguments = Arguments::new();
        for (index, key) in keys.iter().enumerate() {
            requirements = requirements.key(index.to_string(), *key);
        }
        for (key, value) in &self.overrides {
            let name = format!("={}", key.name());
            requirements = requirements.key(name.clone(), *key);
            arguments.insert_any(name, Arc::clone(value));
        }
        (keys, requirements, arguments)
    }

    fn options(&self) -> InjectOptions {
        InjectOptions {
            keep_current_values: self.keep_current_values,
        }
    }

    /// Resolve `D` and run `f` with it
    pub fn call<D, R, F>(self, f: F) -> Result<R>
    where
        D: Dependencies,
        F: FnOnce(D) -> R,
    {
        let (keys, requirements, mut arguments) = self.prepare::<D>();
        let mut stack = CleanupStack::new();
        let outcome = self
            .ctx
            .inject(&requirements, &mut arguments, &mut stack, self.options())
            .and_then(|()| collect::<D>(&keys, &arguments))
            .map(f);
        finish(outcome, stack.close())
    }

    /// Resolve `D`, run `f` with it and await the result.
    ///
    /// Async finalizers only run when this future completes. If it is
    /// dropped mid-flight, the call's sync finalizers still run but async
    /// ones are logged and skipped; to release async resources on
    /// cancellation, drive the call with [`Context::inject_async`] and an
    /// explicit [`CleanupStack::aclose`].
    pub async fn call_async<D, R, F, Fut>(self, f: F) -> Result<R>
    where
        D: Dependencies,
        F: FnOnce(D) -> Fut,
        Fut: Future<Output = R>,
    {
        let (keys, requirements, mut arguments) = self.prepare::<D>();
        let mut stack = CleanupStack::new();
        let resolved = self
            .ctx
            .inject_async(&requirements, &mut arguments, &mut stack, self.options())
            .await
            .and_then(|()| collect::<D>(&keys, &arguments));
        let outcome = match resolved {
            Ok(deps) => Ok(f(deps).await),
            Err(e) => Err(e),
        };
        finish(outcome, stack.aclose().await)
    }
}

fn collect<D: Dependencies>(keys: &[TypeKey], arguments: &Arguments) -> Result<D> {
    let mut values = Values::new();
    for (index, key) in keys.iter().enumerate() {
        let value = arguments
            .get_any(&index.to_string())
            .ok_or_else(|| DiError::provider_missing([key.name()], false))?;
        values.insert(*key, Arc::clone(value));
    }
    D::extract(&values)
}

/// The call's error wins over cleanup errors, which are then only logged
fn finish<R>(outcome: Result<R>, closed: Result<()>) -> Result<R> {
    match (outcome, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(cleanup)) => Err(cleanup),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(_cleanup)) => {
            #[cfg(feature = "logging")]
            warn!(target: "booster", error = %_cleanup, "Cleanup failed after a failed call");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Greeting(&'static str);
    struct Recipient(&'static str);
    struct Message(String);

    fn message_providers() -> [Provider; 3] {
        [
            Provider::value(Greeting("Hello")),
            Provider::value(Recipient("World")),
            Provider::function(|(g, r): (Arc<Greeting>, Arc<Recipient>)| {
                Message(format!("{} {}", g.0, r.0))
            }),
        ]
    }

    #[test]
    fn test_solution_guard_restores_previous_state() {
        let ctx = Context::new();
        let before = ctx.state();
        {
            let _guard = ctx.solve(message_providers()).unwrap();
            assert_eq!(ctx.provider_count(), 3);
            assert!(ctx.has_provider::<Message>());
        }
        assert!(Arc::ptr_eq(&ctx.state(), &before));
        assert!(!ctx.has_provider::<Message>());
    }

    #[test]
    fn test_failed_solve_leaves_state_untouched() {
        let ctx = Context::new();
        let before = ctx.state();
        let err = ctx
            .provide(Provider::function(|_: Arc<Greeting>| Recipient("World")))
            .err()
            .unwrap();
        assert!(err.is_provider_missing());
        assert!(Arc::ptr_eq(&ctx.state(), &before));
    }

    #[test]
    fn test_shared_call_restores_values_on_close() {
        let ctx = Context::new();
        let _guard = ctx.solve(message_providers()).unwrap();

        let seen = ctx
            .invoke()
            .shared()
            .call(|_: Arc<Message>| ctx.get::<Greeting>().is_some())
            .unwrap();
        assert!(seen);
        assert!(ctx.current_values().is_empty());
    }

    #[test]
    fn test_override_rebuilds_dependents() {
        let ctx = Context::new();
        let _guard = ctx.solve(message_providers()).unwrap();

        let text = ctx
            .invoke()
            .value(Greeting("Goodbye"))
            .call(|m: Arc<Message>| m.0.clone())
            .unwrap();
        assert_eq!(text, "Goodbye World");
    }

    #[test]
    fn test_cleanup_error_is_returned_after_success() {
        let ctx = Context::new();
        let _guard = ctx
            .provide(Provider::resource(|(): ()| {
                Ok::<_, std::io::Error>(
                    crate::Resource::new(Greeting("Hello"))
                        .on_release(|_| Err::<(), _>("release failed")),
                )
            }))
            .unwrap();

        let err = ctx.resolve::<Greeting>().err().unwrap();
        assert!(matches!(err, DiError::Cleanup { errors } if errors.len() == 1));
    }

    #[test]
    fn test_fork_is_independent() {
        let ctx = Context::new();
        let child = ctx.fork();
        let _guard = child.solve(message_providers()).unwrap();
        assert_eq!(child.depth(), 1);
        assert!(child.has_provider::<Greeting>());
        assert!(!ctx.has_provider::<Greeting>());
    }

    #[test]
    fn test_clone_has_its_own_cells() {
        let ctx = Context::new();
        let _guard = ctx.provide(Provider::value(Greeting("Hello"))).unwrap();

        let clone = ctx.clone();
        assert_eq!(clone.depth(), ctx.depth());
        assert!(clone.has_provider::<Greeting>());

        let scope = clone.shared().value(Recipient("World")).enter().unwrap();
        let _solved = clone.provide(Provider::value(Message("Hi".into()))).unwrap();
        assert!(clone.get::<Recipient>().is_some());
        assert!(ctx.get::<Recipient>().is_none());
        assert!(!ctx.has_provider::<Message>());
        scope.close().unwrap();
    }

    #[test]
    fn test_resume_installs_and_undoes_state() {
        let source = Context::new();
        let _guard = source.solve(message_providers()).unwrap();
        let snapshot = source.copy_state();

        let target = Context::new();
        {
            let _resumed = snapshot.resume(&target);
            let message = target.resolve::<Message>().unwrap();
            assert_eq!(message.0, "Hello World");
        }
        assert_eq!(target.provider_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_async_call_skips_async_finalizers() {
        let sync_released = Arc::new(AtomicUsize::new(0));
        let async_released = Arc::new(AtomicUsize::new(0));
        let (on_sync, on_async) = (Arc::clone(&sync_released), Arc::clone(&async_released));

        let ctx = Context::new();
        let _guard = ctx
            .solve([
                Provider::resource(move |(): ()| {
                    let released = Arc::clone(&on_sync);
                    Ok::<_, std::io::Error>(crate::Resource::new(Greeting("Hello")).on_release(
                        move |_| {
                            released.fetch_add(1, Ordering::SeqCst);
                            Ok::<_, std::io::Error>(())
                        },
                    ))
                }),
                Provider::async_resource(move |(): ()| {
                    let released = Arc::clone(&on_async);
                    async move {
                        Ok::<_, std::io::Error>(
                            crate::AsyncResource::new(Recipient("World")).on_async_release(
                                move |_| async move {
                                    released.fetch_add(1, Ordering::SeqCst);
                                    Ok::<_, std::io::Error>(())
                                },
                            ),
                        )
                    }
                }),
            ])
            .unwrap();

        let call = ctx
            .invoke()
            .call_async(|_: (Arc<Greeting>, Arc<Recipient>)| std::future::pending::<()>());
        assert!(tokio::time::timeout(Duration::from_millis(20), call).await.is_err());
        assert_eq!(sync_released.load(Ordering::SeqCst), 1);
        assert_eq!(async_released.load(Ordering::SeqCst), 0);

        // A caller-owned stack can still be closed with `aclose`
        let requirements = Requirements::new().param::<Recipient>("recipient");
        let mut arguments = Arguments::new();
        let mut stack = CleanupStack::new();
        ctx.inject_async(&requirements, &mut arguments, &mut stack, InjectOptions::default())
            .await
            .unwrap();
        stack.aclose().await.unwrap();
        assert_eq!(async_released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_low_level_inject_fills_only_missing_arguments() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let ctx = Context::new();
        let _guard = ctx
            .solve([
                Provider::function(move |(): ()| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Greeting("Hello")
                }),
                Provider::value(Recipient("World")),
            ])
            .unwrap();

        let requirements = Requirements::new()
            .param::<Greeting>("greeting")
            .param::<Recipient>("recipient");
        let mut arguments = Arguments::new().with("recipient", Recipient("Everyone"));
        let mut stack = CleanupStack::new();
        ctx.inject(&requirements, &mut arguments, &mut stack, InjectOptions::default())
            .unwrap();
        stack.close().unwrap();

        assert_eq!(arguments.get::<Greeting>("greeting").unwrap().0, "Hello");
        assert_eq!(arguments.get::<Recipient>("recipient").unwrap().0, "Everyone");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(ctx.current_values().is_empty());
    }
}
