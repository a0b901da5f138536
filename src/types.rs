//! Dependency type identifiers
//!
//! A dependency type is any nominal `Send + Sync + 'static` type. Types from
//! the standard library and primitives are rejected so that every dependency
//! is a distinct wrapper (`struct Greeting(String)` rather than `String`).

use crate::{DiError, Result};
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A type-erased, shareable dependency value.
pub type AnyValue = Arc<dyn Any + Send + Sync>;

/// Marker trait for types that can be provided and injected.
///
/// This is automatically implemented for all types that are `Send + Sync + 'static`.
pub trait Injectable: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Injectable for T {}

/// Stable identifier of a dependency type.
///
/// Equality and hashing use only the `TypeId`; the name is kept for
/// messages and logs.
#[derive(Clone, Copy)]
pub struct TypeKey {
    type_id: TypeId,
    type_name: &'static str,
}

impl TypeKey {
    /// Key of type `T`
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.type_name
    }

    /// Whether `value` holds an instance of this type.
    #[inline]
    pub fn matches(&self, value: &AnyValue) -> bool {
        (**value).type_id() == self.type_id
    }

    /// Whether this is a primitive or standard-library type.
    pub fn is_builtin(&self) -> bool {
        is_builtin_name(self.type_name)
    }

    /// Whether this type cannot name a concrete dependency (trait objects).
    pub fn is_ambiguous(&self) -> bool {
        self.type_name.starts_with("dyn ")
    }

    /// Check that this type may be provided or requested.
    pub fn check(self) -> Result<Self> {
        if self.is_ambiguous() {
            return Err(DiError::ambiguous(self.type_name));
        }
        if self.is_builtin() {
            return Err(DiError::builtin(self.type_name));
        }
        Ok(self)
    }
}

const BUILTIN_PREFIXES: &[&str] = &["alloc::", "core::", "std::", "&", "*", "[", "fn("];

fn is_builtin_name(name: &str) -> bool {
    // Tuples of nominal types are composites, not built-ins
    if let Some(inner) = name.strip_prefix('(') {
        return match inner.strip_suffix(')') {
            Some("") | None => true,
            Some(elements) => split_top_level(elements).any(is_builtin_name),
        };
    }
    !name.contains("::") || BUILTIN_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Split a comma separated list of type names, ignoring commas nested in
/// generic arguments or tuples.
fn split_top_level(list: &str) -> impl Iterator<Item = &str> {
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut parts = Vec::new();
    for (i, c) in list.char_indices() {
        match c {
            '<' | '(' | '[' => depth += 1,
            '>' | ')' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(list[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = list[start..].trim();
    if !last.is_empty() {
        parts.push(last);
    }
    parts.into_iter()
}

impl PartialEq for TypeKey {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Greeting;
    #[allow(dead_code)]
    struct Wrapper(Vec<u8>);

    #[test]
    fn test_nominal_types_are_accepted() {
        assert!(TypeKey::of::<Greeting>().check().is_ok());
        assert!(TypeKey::of::<Wrapper>().check().is_ok());
        assert!(TypeKey::of::<(Greeting, Wrapper)>().check().is_ok());
    }

    #[test]
    fn test_builtin_types_are_rejected() {
        for key in [
            TypeKey::of::<String>(),
            TypeKey::of::<i32>(),
            TypeKey::of::<bool>(),
            TypeKey::of::<()>(),
            TypeKey::of::<Vec<Greeting>>(),
            TypeKey::of::<Option<Greeting>>(),
            TypeKey::of::<Arc<Greeting>>(),
            TypeKey::of::<&'static str>(),
            TypeKey::of::<(Greeting, String)>(),
        ] {
            let err = key.check().unwrap_err();
            assert!(
                err.to_string().starts_with("Cannot use built-in type"),
                "{key}: {err}"
            );
        }
    }

    #[test]
    fn test_trait_objects_are_ambiguous() {
        let err = TypeKey::of::<dyn Any + Send + Sync>().check().unwrap_err();
        assert!(err.to_string().starts_with("Can only provide concrete type"));
    }

    #[test]
    fn test_matches_runtime_type() {
        let value: AnyValue = Arc::new(Greeting);
        assert!(TypeKey::of::<Greeting>().matches(&value));
        assert!(!TypeKey::of::<Wrapper>().matches(&value));
    }

    #[test]
    fn test_equality_ignores_name() {
        assert_eq!(TypeKey::of::<Greeting>(), TypeKey::of::<Greeting>());
        assert_ne!(TypeKey::of::<Greeting>(), TypeKey::of::<Wrapper>());
    }
}
