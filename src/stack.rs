//! Cleanup stack
//!
//! A flat list of finalizers recorded as resources are acquired. Closing the
//! stack runs them in reverse order, keeps going past failures and reports
//! every failure at once.

use crate::error::{BoxError, SharedError};
use crate::factory::Release;
use crate::{DiError, Result};
use futures::future::FutureExt;
use std::future::Future;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, warn};

/// Ordered finalizers for the resources acquired by one scope.
///
/// Owned by exactly one scope and never shared. Sync finalizers left on the
/// stack when it is dropped still run; async ones cannot and are reported.
///
/// # Example
///
/// ```rust
/// use booster::CleanupStack;
/// use std::sync::{Arc, Mutex};
///
/// let order = Arc::new(Mutex::new(Vec::new()));
/// let mut stack = CleanupStack::new();
/// for i in 0..3 {
///     let order = Arc::clone(&order);
///     stack.push(move || {
///         order.lock().unwrap().push(i);
///         Ok::<_, std::io::Error>(())
///     });
/// }
/// stack.close().unwrap();
/// assert_eq!(*order.lock().unwrap(), [2, 1, 0]);
/// ```
#[derive(Default)]
pub struct CleanupStack {
    entries: Vec<Release>,
}

impl CleanupStack {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a blocking finalizer
    pub fn push<F, E>(&mut self, cleanup: F)
    where
        F: FnOnce() -> std::result::Result<(), E> + Send + 'static,
        E: Into<BoxError>,
    {
        self.entries
            .push(Release::Sync(Box::new(move || cleanup().map_err(Into::into))));
    }

    /// Record a finalizer that must be awaited
    pub fn push_async<F, Fut, E>(&mut self, cleanup: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.entries.push(Release::Async(Box::new(move || {
            cleanup().map(|r| r.map_err(Into::into)).boxed()
        })));
    }

    #[inline]
    pub(crate) fn push_release(&mut self, release: Release) {
        self.entries.push(release);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any recorded finalizer must be awaited
    pub fn has_async(&self) -> bool {
        self.entries.iter().any(Release::is_async)
    }

    /// Run every finalizer in reverse order without suspending.
    ///
    /// An async finalizer cannot run here and counts as a failure.
    pub fn close(&mut self) -> Result<()> {
        #[cfg(feature = "logging")]
        debug!(target: "booster", entries = self.entries.len(), "Closing cleanup stack");

        let mut errors: Vec<SharedError> = Vec::new();
        while let Some(entry) = self.entries.pop() {
            match entry {
                Release::Sync(cleanup) => {
                    if let Err(e) = cleanup() {
                        errors.push(Arc::from(e));
                    }
                }
                Release::Async(_) => errors.push(Arc::from(BoxError::from(
                    "async cleanup callback cannot run in a sync close",
                ))),
            }
        }
        aggregate(errors)
    }

    /// Run every finalizer in reverse order, awaiting async ones
    pub async fn aclose(&mut self) -> Result<()> {
        #[cfg(feature = "logging")]
        debug!(target: "booster", entries = self.entries.len(), "Closing cleanup stack");

        let mut errors: Vec<SharedError> = Vec::new();
        while let Some(entry) = self.entries.pop() {
            let outcome = match entry {
                Release::Sync(cleanup) => cleanup(),
                Release::Async(cleanup) => cleanup().await,
            };
            if let Err(e) = outcome {
                errors.push(Arc::from(e));
            }
        }
        aggregate(errors)
    }
}

fn aggregate(errors: Vec<SharedError>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(DiError::Cleanup { errors })
    }
}

impl Drop for CleanupStack {
    fn drop(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        let skipped = self.entries.iter().filter(|e| e.is_async()).count();
        self.entries.retain(|e| !e.is_async());

        #[cfg(feature = "logging")]
        if skipped > 0 {
            warn!(
                target: "booster",
                skipped,
                "Cleanup stack dropped with async finalizers; they were not run"
            );
        }
        #[cfg(not(feature = "logging"))]
        let _ = skipped;

        if let Err(_e) = self.close() {
            #[cfg(feature = "logging")]
            warn!(target: "booster", error = %_e, "Cleanup failed while dropping stack");
        }
    }
}

impl std::fmt::Debug for CleanupStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupStack")
            .field("len", &self.entries.len())
            .field("has_async", &self.has_async())
            .finish()
    }
}
