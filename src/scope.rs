//! Shared scopes
//!
//! A [`Shared`] descriptor names dependencies whose values should stay fixed
//! for a block: they are resolved (or taken from explicit values) once, and
//! published as current values for every type in the set with one
//! copy-on-write update. Closing the [`SharedScope`] restores the exact
//! previous mapping and releases the resources acquired for it.
//!
//! Scopes must be closed in the reverse order they were entered.

use crate::context::{Context, InjectOptions};
use crate::params::{Arguments, Requirements};
use crate::stack::CleanupStack;
use crate::types::{AnyValue, Injectable, TypeKey};
use crate::{DiError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[cfg(feature = "logging")]
use tracing::{debug, warn};

/// Unique scope identifier.
///
/// Each scope descriptor gets a unique ID for tracking and debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
    /// Generate a new unique scope ID.
    #[inline]
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[inline]
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl Default for ScopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

impl Context {
    /// Describe a set of values to share for a block
    pub fn shared(&self) -> Shared {
        Shared {
            ctx: self.handle(),
            id: ScopeId::new(),
            requirements: Requirements::new(),
            arguments: Arguments::new(),
            active: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Descriptor of values shared for the duration of a block.
///
/// A descriptor may be entered again once its previous scope is closed, but
/// never while that scope is still open.
///
/// # Examples
///
/// ```rust
/// use booster::{Context, Provider};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// struct Connection(usize);
///
/// static OPENED: AtomicUsize = AtomicUsize::new(0);
///
/// let ctx = Context::new();
/// let _solved = ctx
///     .provide(Provider::function(|(): ()| Connection(OPENED.fetch_add(1, Ordering::SeqCst))))
///     .unwrap();
///
/// let scope = ctx.shared().dependency::<Connection>().enter().unwrap();
/// let a = ctx.resolve::<Connection>().unwrap();
/// let b = ctx.resolve::<Connection>().unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
/// scope.close().unwrap();
///
/// assert_eq!(OPENED.load(Ordering::SeqCst), 1);
/// ```
pub struct Shared {
    ctx: Context,
    id: ScopeId,
    requirements: Requirements,
    arguments: Arguments,
    active: Arc<AtomicBool>,
}

impl Shared {
    fn next_name(&self) -> String {
        self.requirements.len().to_string()
    }

    /// Resolve `T` once and share it
    pub fn dependency<T: Injectable>(mut self) -> Self {
        let name = self.next_name();
        self.requirements = self.requirements.param::<T>(name);
        self
    }

    /// Share whichever of `candidates` resolves first
    pub fn union<I>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = TypeKey>,
    {
        let name = self.next_name();
        self.requirements = self.requirements.union(name, candidates);
        self
    }

    /// Share `value` as `T` without resolving it
    pub fn value<T: Injectable>(self, value: T) -> Self {
        self.arc(Arc::new(value))
    }

    pub fn arc<T: Injectable>(mut self, value: Arc<T>) -> Self {
        let name = self.next_name();
        self.requirements = self.requirements.param::<T>(name.clone());
        self.arguments.insert_arc(name, value);
        self
    }

    /// Share `value` as whichever of `candidates` its runtime type is
    pub fn union_value<I>(mut self, value: AnyValue, candidates: I) -> Self
    where
        I: IntoIterator<Item = TypeKey>,
    {
        let name = self.next_name();
        self.requirements = self.requirements.union(name.clone(), candidates);
        self.arguments.insert_any(name, value);
        self
    }

    #[inline]
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Whether a scope entered from this descriptor is still open
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Resolve and publish the shared values without suspending
    pub fn enter(&self) -> Result<SharedScope> {
        let mut scope = self.open()?;
        let mut values = self.arguments.clone();
        match self.ctx.inject(
            &self.requirements,
            &mut values,
            &mut scope.stack,
            InjectOptions::keep(),
        ) {
            Ok(()) => Ok(self.entered(scope, values)),
            Err(e) => {
                if let Err(_cleanup) = scope.stack.close() {
                    #[cfg(feature = "logging")]
                    warn!(target: "booster", scope_id = self.id.id(), error = %_cleanup, "Cleanup failed after scope entry failed");
                }
                Err(e)
            }
        }
    }

    /// Resolve and publish the shared values, allowing async providers.
    ///
    /// If the returned future is dropped before it completes, resources
    /// acquired so far get only their sync finalizers; async finalizers are
    /// logged and skipped. The same holds for a [`SharedScope`] that is
    /// dropped instead of closed with [`aclose`](SharedScope::aclose).
    pub async fn enter_async(&self) -> Result<SharedScope> {
        let mut scope = self.open()?;
        let mut values = self.arguments.clone();
        let injected = self
            .ctx
            .inject_async(
                &self.requirements,
                &mut values,
                &mut scope.stack,
                InjectOptions::keep(),
            )
            .await;
        match injected {
            Ok(()) => Ok(self.entered(scope, values)),
            Err(e) => {
                if let Err(_cleanup) = scope.stack.aclose().await {
                    #[cfg(feature = "logging")]
                    warn!(target: "booster", scope_id = self.id.id(), error = %_cleanup, "Cleanup failed after scope entry failed");
                }
                Err(e)
            }
        }
    }

    /// Mark the descriptor active; the returned scope clears the mark when
    /// dropped, including when entry is abandoned halfway
    fn open(&self) -> Result<SharedScope> {
        if self.active.swap(true, Ordering::AcqRel) {
            return Err(DiError::ReentrantScope { scope: self.id });
        }
        Ok(SharedScope {
            id: self.id,
            active: Arc::clone(&self.active),
            stack: CleanupStack::new(),
            values: Arguments::new(),
        })
    }

    fn entered(&self, mut scope: SharedScope, values: Arguments) -> SharedScope {
        #[cfg(feature = "logging")]
        debug!(
            target: "booster",
            scope_id = self.id.id(),
            shared = values.len(),
            "Entered shared scope"
        );

        scope.values = values;
        scope
    }
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("id", &self.id)
            .field("requirements", &self.requirements)
            .field("active", &self.is_active())
            .finish()
    }
}

/// An open shared scope. Close it with [`close`](SharedScope::close) or
/// [`aclose`](SharedScope::aclose); dropping it closes it without awaiting.
#[must_use = "the shared values are withdrawn as soon as the scope is dropped"]
pub struct SharedScope {
    id: ScopeId,
    active: Arc<AtomicBool>,
    stack: CleanupStack,
    values: Arguments,
}

impl SharedScope {
    #[inline]
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// The shared value of `T`
    pub fn get<T: Injectable>(&self) -> Option<Arc<T>> {
        self.values
            .iter()
            .find_map(|(_, value)| Arc::clone(value).downcast::<T>().ok())
    }

    /// The shared value at `index`, in declaration order
    pub fn get_any(&self, index: usize) -> Option<&AnyValue> {
        self.values.get_any(&index.to_string())
    }

    /// Withdraw the shared values and release their resources
    pub fn close(mut self) -> Result<()> {
        self.stack.close()
    }

    /// Like [`close`](SharedScope::close), awaiting async finalizers
    pub async fn aclose(mut self) -> Result<()> {
        self.stack.aclose().await
    }
}

impl Drop for SharedScope {
    fn drop(&mut self) {
        if !self.stack.is_empty() {
            if let Err(_e) = self.stack.close() {
                #[cfg(feature = "logging")]
                warn!(target: "booster", scope_id = self.id.id(), error = %_e, "Shared scope cleanup failed on drop");
            }
        }

        #[cfg(feature = "logging")]
        debug!(target: "booster", scope_id = self.id.id(), "Exited shared scope");

        self.active.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for SharedScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedScope")
            .field("id", &self.id)
            .field("values", &self.values)
            .finish()
    }
}
