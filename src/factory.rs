//! Producer normalization
//!
//! A provider can be a plain value, a function, a resource with a release
//! callback, or the async form of any of these. Every shape is lowered once,
//! at construction, into one of the three [`Producer`] variants so the
//! resolver only ever deals with a small closed set.
//!
//! Dependencies are extracted from the current values *before* an async
//! producer's future is built, so the future itself is `'static` and can be
//! polled concurrently with its siblings.

use crate::error::BoxError;
use crate::provider::Dependencies;
use crate::storage::Values;
use crate::types::{AnyValue, Injectable, TypeKey};
use crate::{DiError, Result};
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;

type UserResult = std::result::Result<(), BoxError>;

// =============================================================================
// Releases
// =============================================================================

pub(crate) type SyncRelease = Box<dyn FnOnce() -> UserResult + Send>;
pub(crate) type AsyncRelease = Box<dyn FnOnce() -> BoxFuture<'static, UserResult> + Send>;

/// A finalizer recorded on a cleanup stack
pub(crate) enum Release {
    Sync(SyncRelease),
    Async(AsyncRelease),
}

impl Release {
    #[inline]
    pub(crate) fn is_async(&self) -> bool {
        matches!(self, Release::Async(_))
    }
}

// =============================================================================
// Resources
// =============================================================================

type ReleaseFn<T> = Box<dyn FnOnce(Arc<T>) -> UserResult + Send>;
type AsyncReleaseFn<T> = Box<dyn FnOnce(Arc<T>) -> BoxFuture<'static, UserResult> + Send>;

/// A value paired with the callback that releases it.
///
/// Returned by the producer of [`Provider::resource`](crate::Provider::resource).
/// The release callback runs when the cleanup stack of the resolution that
/// acquired the value is closed.
///
/// ```rust
/// use booster::Resource;
///
/// struct Connection;
///
/// let resource = Resource::new(Connection).on_release(|_conn| {
///     // close the connection
///     Ok::<_, std::io::Error>(())
/// });
/// ```
pub struct Resource<T> {
    value: Arc<T>,
    release: Option<ReleaseFn<T>>,
}

impl<T: Injectable> Resource<T> {
    /// Wrap a value that needs no release
    #[inline]
    pub fn new(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    #[inline]
    pub fn from_arc(value: Arc<T>) -> Self {
        Self {
            value,
            release: None,
        }
    }

    /// Set the callback run when the value is released
    pub fn on_release<F, E>(mut self, release: F) -> Self
    where
        F: FnOnce(Arc<T>) -> std::result::Result<(), E> + Send + 'static,
        E: Into<BoxError>,
    {
        self.release = Some(Box::new(move |value| release(value).map_err(Into::into)));
        self
    }

    #[inline]
    pub fn value(&self) -> &Arc<T> {
        &self.value
    }

    pub(crate) fn into_acquired(self) -> Acquired {
        let Self { value, release } = self;
        let release = release.map(|release| {
            let held = Arc::clone(&value);
            Release::Sync(Box::new(move || release(held)))
        });
        Acquired {
            value,
            release,
        }
    }
}

enum ResourceRelease<T> {
    Sync(ReleaseFn<T>),
    Async(AsyncReleaseFn<T>),
}

/// A value produced asynchronously, paired with a sync or async release.
pub struct AsyncResource<T> {
    value: Arc<T>,
    release: Option<ResourceRelease<T>>,
}

impl<T: Injectable> AsyncResource<T> {
    #[inline]
    pub fn new(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    #[inline]
    pub fn from_arc(value: Arc<T>) -> Self {
        Self {
            value,
            release: None,
        }
    }

    /// Set a blocking release callback
    pub fn on_release<F, E>(mut self, release: F) -> Self
    where
        F: FnOnce(Arc<T>) -> std::result::Result<(), E> + Send + 'static,
        E: Into<BoxError>,
    {
        self.release = Some(ResourceRelease::Sync(Box::new(move |value| {
            release(value).map_err(Into::into)
        })));
        self
    }

    /// Set a release callback that must be awaited
    pub fn on_async_release<F, Fut, E>(mut self, release: F) -> Self
    where
        F: FnOnce(Arc<T>) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.release = Some(ResourceRelease::Async(Box::new(move |value| {
            release(value).map(|r| r.map_err(Into::into)).boxed()
        })));
        self
    }

    #[inline]
    pub fn value(&self) -> &Arc<T> {
        &self.value
    }

    pub(crate) fn into_acquired(self) -> Acquired {
        let Self { value, release } = self;
        let held = Arc::clone(&value);
        let release = release.map(|release| match release {
            ResourceRelease::Sync(f) => Release::Sync(Box::new(move || f(held))),
            ResourceRelease::Async(f) => Release::Async(Box::new(move || f(held))),
        });
        Acquired {
            value,
            release,
        }
    }
}

/// A produced value and its optional finalizer
pub(crate) struct Acquired {
    pub(crate) value: AnyValue,
    pub(crate) release: Option<Release>,
}

impl Acquired {
    #[inline]
    pub(crate) fn value(value: AnyValue) -> Self {
        Self {
            value,
            release: None,
        }
    }
}

// =============================================================================
// Producers
// =============================================================================

pub(crate) type SyncProduceFn = Arc<dyn Fn(&Values) -> Result<Acquired> + Send + Sync>;

/// Extracts dependencies synchronously, then yields a `'static` future
pub(crate) type AsyncProduceFn =
    Arc<dyn Fn(&Values) -> Result<BoxFuture<'static, Result<Acquired>>> + Send + Sync>;

/// Extracts one element from a composite value
pub(crate) type Getter = Arc<dyn Fn(&AnyValue) -> Option<AnyValue> + Send + Sync>;

/// Type-erased producer.
///
/// Enum dispatch instead of a trait object keeps the shape closed: the
/// resolver matches on the variant and never needs to ask the producer
/// what it is.
#[derive(Clone)]
pub(crate) enum Producer {
    /// Runs inline without suspending
    Sync(SyncProduceFn),
    /// Must be awaited
    Async(AsyncProduceFn),
    /// Reads the current value of `source` and extracts a part of it
    Derived { source: TypeKey, getter: Getter },
}

impl Producer {
    pub(crate) fn constant(value: AnyValue) -> Self {
        Producer::Sync(Arc::new(move |_| Ok(Acquired::value(Arc::clone(&value)))))
    }

    pub(crate) fn sync<T, D, F, E>(f: F) -> Self
    where
        T: Injectable,
        D: Dependencies,
        F: Fn(D) -> std::result::Result<T, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        let type_name = std::any::type_name::<T>();
        Producer::Sync(Arc::new(move |values| {
            let value = f(D::extract(values)?).map_err(|e| DiError::provider_failed(type_name, e))?;
            Ok(Acquired::value(Arc::new(value)))
        }))
    }

    pub(crate) fn sync_resource<T, D, F, E>(f: F) -> Self
    where
        T: Injectable,
        D: Dependencies,
        F: Fn(D) -> std::result::Result<Resource<T>, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        let type_name = std::any::type_name::<T>();
        Producer::Sync(Arc::new(move |values| {
            let resource =
                f(D::extract(values)?).map_err(|e| DiError::provider_failed(type_name, e))?;
            Ok(resource.into_acquired())
        }))
    }

    pub(crate) fn sync_erased<D, F, E>(type_name: &'static str, f: F) -> Self
    where
        D: Dependencies,
        F: Fn(D) -> std::result::Result<AnyValue, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Producer::Sync(Arc::new(move |values| {
            let value = f(D::extract(values)?).map_err(|e| DiError::provider_failed(type_name, e))?;
            Ok(Acquired::value(value))
        }))
    }

    pub(crate) fn future<T, D, F, Fut, E>(f: F) -> Self
    where
        T: Injectable,
        D: Dependencies,
        F: Fn(D) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let type_name = std::any::type_name::<T>();
        Producer::Async(Arc::new(move |values| {
            let pending = f(D::extract(values)?);
            Ok(async move {
                let value = pending
                    .await
                    .map_err(|e| DiError::provider_failed(type_name, e))?;
                Ok(Acquired::value(Arc::new(value)))
            }
            .boxed())
        }))
    }

    pub(crate) fn future_resource<T, D, F, Fut, E>(f: F) -> Self
    where
        T: Injectable,
        D: Dependencies,
        F: Fn(D) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<AsyncResource<T>, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let type_name = std::any::type_name::<T>();
        Producer::Async(Arc::new(move |values| {
            let pending = f(D::extract(values)?);
            Ok(async move {
                let resource = pending
                    .await
                    .map_err(|e| DiError::provider_failed(type_name, e))?;
                Ok(resource.into_acquired())
            }
            .boxed())
        }))
    }

    /// Reject produced values whose runtime type is not `key`
    pub(crate) fn checked(self, key: TypeKey) -> Self {
        let verify = move |acquired: Acquired| {
            if key.matches(&acquired.value) {
                Ok(acquired)
            } else {
                Err(DiError::InvalidDependencyType {
                    type_name: key.name(),
                    reason: "Provider produced a value of another type than it was bound to",
                })
            }
        };
        match self {
            Producer::Sync(f) => Producer::Sync(Arc::new(move |values| f(values).and_then(verify))),
            Producer::Async(f) => Producer::Async(Arc::new(move |values| {
                let pending = f(values)?;
                Ok(pending.map(move |r| r.and_then(verify)).boxed())
            })),
            derived @ Producer::Derived { .. } => derived,
        }
    }

    #[inline]
    pub(crate) fn is_async(&self) -> bool {
        matches!(self, Producer::Async(_))
    }
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Producer::Sync(_) => f.write_str("Sync"),
            Producer::Async(_) => f.write_str("Async"),
            Producer::Derived { source, .. } => write!(f, "Derived({source})"),
        }
    }
}
