//! Providers
//!
//! A [`Provider`] pairs the type it produces with a producer and the types
//! that producer requires. The producer's requirements are declared by its
//! argument type (see [`Dependencies`]), so there is no signature
//! introspection at runtime.
//!
//! # Example
//!
//! ```rust
//! use booster::Provider;
//! use std::sync::Arc;
//!
//! struct Greeting(&'static str);
//! struct Recipient(&'static str);
//! struct Message(String);
//!
//! let providers = [
//!     Provider::value(Greeting("Hello")),
//!     Provider::value(Recipient("World")),
//!     Provider::function(|(g, r): (Arc<Greeting>, Arc<Recipient>)| {
//!         Message(format!("{} {}", g.0, r.0))
//!     }),
//! ];
//! assert!(providers.iter().all(|p| p.is_sync()));
//! ```

use crate::error::BoxError;
use crate::factory::{AsyncResource, Getter, Producer, Resource};
use crate::storage::Values;
use crate::types::{AnyValue, Injectable, TypeKey};
use crate::{DiError, Result};
use ahash::RandomState;
use std::collections::HashSet;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

// =============================================================================
// Dependencies - what a producer or injected call receives
// =============================================================================

/// Types a producer or injected call can receive as its input.
///
/// This is implemented for:
/// - `()` - No dependencies
/// - `Arc<T>` - Single dependency
/// - Tuples of `Arc<T>` - Multiple dependencies (up to 8)
pub trait Dependencies: Sized + Send + 'static {
    /// The dependency types, in argument order
    fn keys() -> Vec<TypeKey>;

    /// Read the dependencies from resolved values
    fn extract(values: &Values) -> Result<Self>;
}

impl Dependencies for () {
    #[inline]
    fn keys() -> Vec<TypeKey> {
        Vec::new()
    }

    #[inline]
    fn extract(_values: &Values) -> Result<Self> {
        Ok(())
    }
}

impl<T: Injectable> Dependencies for Arc<T> {
    #[inline]
    fn keys() -> Vec<TypeKey> {
        vec![TypeKey::of::<T>()]
    }

    #[inline]
    fn extract(values: &Values) -> Result<Self> {
        let key = TypeKey::of::<T>();
        match values.get_any(&key) {
            Some(value) => Arc::clone(value)
                .downcast::<T>()
                .map_err(|_| DiError::alias(key.name())),
            None => Err(DiError::provider_missing([key.name()], false)),
        }
    }
}

macro_rules! impl_dependencies_tuple {
    ($($T:ident),+) => {
        impl<$($T: Injectable),+> Dependencies for ($(Arc<$T>,)+) {
            fn keys() -> Vec<TypeKey> {
                vec![$(TypeKey::of::<$T>()),+]
            }

            fn extract(values: &Values) -> Result<Self> {
                Ok(($(<Arc<$T> as Dependencies>::extract(values)?,)+))
            }
        }
    };
}

impl_dependencies_tuple!(A, B);
impl_dependencies_tuple!(A, B, C);
impl_dependencies_tuple!(A, B, C, D);
impl_dependencies_tuple!(A, B, C, D, E);
impl_dependencies_tuple!(A, B, C, D, E, F);
impl_dependencies_tuple!(A, B, C, D, E, F, G);
impl_dependencies_tuple!(A, B, C, D, E, F, G, H);

// =============================================================================
// Composite - tuples whose elements are provided individually
// =============================================================================

/// A tuple type whose elements can each be resolved on their own.
///
/// Elements are cloned out of the resolved tuple, so each must be `Clone`.
pub trait Composite: Injectable {
    /// Element types, in tuple order
    fn element_keys() -> Vec<TypeKey>;

    /// Clone element `index` out of a resolved tuple value
    fn element(value: &AnyValue, index: usize) -> Option<AnyValue>;
}

macro_rules! impl_composite_tuple {
    ($($idx:tt $T:ident),+) => {
        impl<$($T: Injectable + Clone),+> Composite for ($($T,)+) {
            fn element_keys() -> Vec<TypeKey> {
                vec![$(TypeKey::of::<$T>()),+]
            }

            fn element(value: &AnyValue, index: usize) -> Option<AnyValue> {
                let tuple = (**value).downcast_ref::<Self>()?;
                match index {
                    $($idx => Some(Arc::new(tuple.$idx.clone()) as AnyValue),)+
                    _ => None,
                }
            }
        }
    };
}

impl_composite_tuple!(0 A, 1 B);
impl_composite_tuple!(0 A, 1 B, 2 C);
impl_composite_tuple!(0 A, 1 B, 2 C, 3 D);
impl_composite_tuple!(0 A, 1 B, 2 C, 3 D, 4 E);
impl_composite_tuple!(0 A, 1 B, 2 C, 3 D, 4 E, 5 F);

// =============================================================================
// Provider
// =============================================================================

/// A producer of one dependency type, ready to be registered.
#[derive(Clone)]
pub struct Provider {
    provides: Option<TypeKey>,
    required: Vec<TypeKey>,
    producer: Producer,
    aliases: Vec<TypeKey>,
    elements: Vec<(TypeKey, Getter)>,
    unpacked: Option<TypeKey>,
    /// Verify the runtime type of late-bound producers
    checked: bool,
}

impl Provider {
    fn new(provides: Option<TypeKey>, required: Vec<TypeKey>, producer: Producer) -> Self {
        Self {
            provides,
            required,
            producer,
            aliases: Vec::new(),
            elements: Vec::new(),
            unpacked: None,
            checked: false,
        }
    }

    /// Provide a fixed value
    pub fn value<T: Injectable>(value: T) -> Self {
        Self::arc(Arc::new(value))
    }

    /// Provide a fixed shared value, keeping its identity
    pub fn arc<T: Injectable>(value: Arc<T>) -> Self {
        Self::new(
            Some(TypeKey::of::<T>()),
            Vec::new(),
            Producer::constant(value),
        )
    }

    /// Provide the value returned by `f`
    pub fn function<T, D, F>(f: F) -> Self
    where
        T: Injectable,
        D: Dependencies,
        F: Fn(D) -> T + Send + Sync + 'static,
    {
        Self::try_function(move |deps: D| Ok::<T, Infallible>(f(deps)))
    }

    /// Provide the value returned by a fallible `f`
    pub fn try_function<T, D, F, E>(f: F) -> Self
    where
        T: Injectable,
        D: Dependencies,
        F: Fn(D) -> std::result::Result<T, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Self::new(Some(TypeKey::of::<T>()), D::keys(), Producer::sync(f))
    }

    /// Provide a value that must be released when the resolving scope closes
    pub fn resource<T, D, F, E>(f: F) -> Self
    where
        T: Injectable,
        D: Dependencies,
        F: Fn(D) -> std::result::Result<Resource<T>, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Self::new(Some(TypeKey::of::<T>()), D::keys(), Producer::sync_resource(f))
    }

    /// Provide the output of an async `f`
    pub fn asyncfunction<T, D, F, Fut>(f: F) -> Self
    where
        T: Injectable,
        D: Dependencies,
        F: Fn(D) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        Self::new(
            Some(TypeKey::of::<T>()),
            D::keys(),
            Producer::future(move |deps: D| {
                let pending = f(deps);
                async move { Ok::<T, Infallible>(pending.await) }
            }),
        )
    }

    /// Provide the output of a fallible async `f`
    pub fn try_asyncfunction<T, D, F, Fut, E>(f: F) -> Self
    where
        T: Injectable,
        D: Dependencies,
        F: Fn(D) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::new(Some(TypeKey::of::<T>()), D::keys(), Producer::future(f))
    }

    /// Provide an asynchronously acquired value with a sync or async release
    pub fn async_resource<T, D, F, Fut, E>(f: F) -> Self
    where
        T: Injectable,
        D: Dependencies,
        F: Fn(D) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<AsyncResource<T>, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::new(
            Some(TypeKey::of::<T>()),
            D::keys(),
            Producer::future_resource(f),
        )
    }

    /// Provide a type-erased value whose type is bound later with
    /// [`Provider::bind_type`]. Registering it unbound is an error.
    pub fn dynamic<D, F, E>(f: F) -> Self
    where
        D: Dependencies,
        F: Fn(D) -> std::result::Result<AnyValue, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        let mut provider = Self::new(
            None,
            D::keys(),
            Producer::sync_erased("dynamic provider", f),
        );
        provider.checked = true;
        provider
    }

    /// Provide an explicit value for whichever member of a union its
    /// runtime type matches
    pub fn union_value<I>(value: AnyValue, members: I) -> Result<Self>
    where
        I: IntoIterator<Item = TypeKey>,
    {
        let members: Vec<TypeKey> = members.into_iter().collect();
        match members.iter().find(|key| key.matches(&value)) {
            Some(key) => Ok(Self::new(Some(*key), Vec::new(), Producer::constant(value))),
            None => Err(DiError::AmbiguousValue {
                param: "provider".to_string(),
                candidates: members.iter().map(TypeKey::name).collect(),
            }),
        }
    }

    /// Bind the provided type of a late-bound provider
    pub fn bind_type<T: Injectable>(self) -> Self {
        self.bind_key(TypeKey::of::<T>())
    }

    pub fn bind_key(mut self, key: TypeKey) -> Self {
        self.provides = Some(key);
        self
    }

    /// Also register this producer under `key`.
    ///
    /// Values read through the alias keep the producer's runtime type, so
    /// they are only reachable type-erased. A typed request for the alias
    /// fails with [`DiError::InvalidDependencyType`].
    pub fn also_provides(mut self, key: TypeKey) -> Self {
        self.aliases.push(key);
        self
    }

    /// Register each element of the produced tuple as its own dependency.
    ///
    /// Element providers require only the tuple value, not this provider's
    /// requirements.
    pub fn unpack<C: Composite>(mut self) -> Self {
        self.unpacked = Some(TypeKey::of::<C>());
        self.elements = C::element_keys()
            .into_iter()
            .enumerate()
            .map(|(index, key)| {
                let getter: Getter = Arc::new(move |value| C::element(value, index));
                (key, getter)
            })
            .collect();
        self
    }

    /// The provided type, if bound
    #[inline]
    pub fn provides(&self) -> Option<TypeKey> {
        self.provides
    }

    #[inline]
    pub fn required(&self) -> &[TypeKey] {
        &self.required
    }

    /// Whether the producer runs without suspending
    #[inline]
    pub fn is_sync(&self) -> bool {
        !self.producer.is_async()
    }

    /// Validate and lower into one registry entry per provided type
    pub(crate) fn into_infos(self) -> Result<Vec<ProviderInfo>> {
        let provides = self
            .provides
            .ok_or(DiError::InvalidDependencyType {
                type_name: "<unbound>",
                reason: "Provider has no provided type - bind one with bind_type",
            })?
            .check()?;
        if let Some(composite) = self.unpacked {
            if composite != provides {
                return Err(DiError::InvalidDependencyType {
                    type_name: composite.name(),
                    reason: "Unpacked composite is not the provided type",
                });
            }
        }

        let mut seen = HashSet::with_hasher(RandomState::new());
        let mut required = self.required;
        required.retain(|key| seen.insert(*key));
        for key in &required {
            key.check()?;
        }

        let producer = if self.checked {
            self.producer.checked(provides)
        } else {
            self.producer
        };
        let is_sync = !producer.is_async();

        let mut infos = Vec::with_capacity(1 + self.aliases.len() + self.elements.len());
        for alias in self.aliases {
            infos.push(ProviderInfo {
                provides: alias.check()?,
                is_sync,
                required: required.clone(),
                producer: producer.clone(),
            });
        }
        for (key, getter) in self.elements {
            infos.push(ProviderInfo {
                provides: key.check()?,
                is_sync,
                required: vec![provides],
                producer: Producer::Derived {
                    source: provides,
                    getter,
                },
            });
        }
        infos.insert(
            0,
            ProviderInfo {
                provides,
                is_sync,
                required,
                producer,
            },
        );
        Ok(infos)
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("provides", &self.provides)
            .field("required", &self.required)
            .field("is_sync", &self.is_sync())
            .finish()
    }
}

/// Registry entry for one provided type.
#[derive(Debug, Clone)]
pub(crate) struct ProviderInfo {
    pub(crate) provides: TypeKey,
    pub(crate) is_sync: bool,
    pub(crate) required: Vec<TypeKey>,
    pub(crate) producer: Producer,
}
