//! Error types for dependency resolution

use crate::scope::ScopeId;
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error returned by user producers and release callbacks.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Shared form of a user error so [`DiError`] stays `Clone`.
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

/// Errors that can occur while registering, solving or resolving dependencies.
///
/// All of these are contract violations surfaced to the caller immediately;
/// none of them are retried.
#[derive(Error, Debug, Clone)]
pub enum DiError {
    /// No active provider for the requested type(s)
    #[error("No {} provider for {}", sync_label(.sync), join_names(.types))]
    ProviderMissing {
        types: Vec<&'static str>,
        /// Whether the lookup was restricted to sync providers
        sync: bool,
    },

    /// A built-in, ambiguous or unbound type was used as a dependency
    #[error("{reason}: {type_name}")]
    InvalidDependencyType {
        type_name: &'static str,
        reason: &'static str,
    },

    /// Two providers for the same type in one registration batch
    #[error("Provider already registered in this batch: {type_name}")]
    DuplicateProvider { type_name: &'static str },

    /// The provider graph contains a cycle
    #[error("Circular dependency detected between: {}", join_names(.type_names))]
    CircularDependency { type_names: Vec<&'static str> },

    /// A one-shot scope was entered while already active
    #[error("Cannot reuse a scope that is already active ({scope})")]
    ReentrantScope { scope: ScopeId },

    /// One or more cleanup callbacks failed while unwinding a stack
    #[error("{} cleanup callback(s) failed: {}", .errors.len(), join_errors(.errors))]
    Cleanup { errors: Vec<SharedError> },

    /// A producer returned an error
    #[error("Provider for {type_name} failed: {error}")]
    ProviderFailed {
        type_name: &'static str,
        error: SharedError,
    },

    /// An explicit value for a union parameter matched none of its candidates
    #[error("Value for parameter '{param}' matches none of {}", join_names(.candidates))]
    AmbiguousValue {
        param: String,
        candidates: Vec<&'static str>,
    },

    /// Internal error
    #[error("Internal DI error: {0}")]
    Internal(String),
}

impl DiError {
    /// Create a ProviderMissing error for a set of type names
    pub fn provider_missing<I>(types: I, sync: bool) -> Self
    where
        I: IntoIterator<Item = &'static str>,
    {
        let mut types: Vec<_> = types.into_iter().collect();
        types.sort_unstable();
        types.dedup();
        Self::ProviderMissing { types, sync }
    }

    /// Create an InvalidDependencyType error for a built-in type
    #[inline]
    pub fn builtin(type_name: &'static str) -> Self {
        Self::InvalidDependencyType {
            type_name,
            reason: "Cannot use built-in type as a dependency - use a distinct nominal wrapper",
        }
    }

    /// Create an InvalidDependencyType error for a type that is not concrete
    #[inline]
    pub fn ambiguous(type_name: &'static str) -> Self {
        Self::InvalidDependencyType {
            type_name,
            reason: "Can only provide concrete type, but found ambiguous type",
        }
    }

    /// Create an InvalidDependencyType error for a typed request whose value
    /// was stored under an alias key
    #[inline]
    pub fn alias(type_name: &'static str) -> Self {
        Self::InvalidDependencyType {
            type_name,
            reason: "Alias values are only reachable type-erased",
        }
    }

    /// Create a ProviderFailed error
    #[inline]
    pub fn provider_failed(type_name: &'static str, error: impl Into<BoxError>) -> Self {
        Self::ProviderFailed {
            type_name,
            error: Arc::from(error.into()),
        }
    }

    /// Whether this error is a missing provider
    #[inline]
    pub fn is_provider_missing(&self) -> bool {
        matches!(self, Self::ProviderMissing { .. })
    }
}

fn sync_label(sync: &bool) -> &'static str {
    if *sync { "sync" } else { "sync or async" }
}

fn join_names(names: &[&'static str]) -> String {
    match names {
        [single] => (*single).to_string(),
        _ => format!("any of [{}]", names.join(", ")),
    }
}

fn join_errors(errors: &[SharedError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for DI operations
pub type Result<T> = std::result::Result<T, DiError>;
