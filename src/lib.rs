//! # Booster - Scoped Dependency Resolution for Rust
//!
//! Providers declare what they produce and what they need. Registering a
//! batch solves the provider graph once, up front, into generations of
//! independent producers; every later resolution only walks the slice of
//! that plan the call actually needs.
//!
//! ## Features
//!
//! - 🧭 **Solved up front** - missing providers and cycles fail at registration, naming every missing type
//! - ⚡ **Concurrent async providers** - independent async providers of one generation run together; the first failure cancels the rest
//! - 🔒 **Sync/async isolation** - a call that cannot suspend never drives an async provider
//! - ♻️ **Guaranteed cleanup** - resources are released in reverse order on every exit path, and every release failure is reported
//! - 🔄 **Shadow and restore** - provider batches and shared values are restored by identity when their guard drops
//! - 📊 **Observable** - optional tracing integration with JSON or pretty output
//!
//! ## Quick Start
//!
//! ```rust
//! use booster::{Context, Provider};
//! use std::sync::Arc;
//!
//! struct Greeting(&'static str);
//! struct Recipient(&'static str);
//! struct Message(String);
//!
//! let ctx = Context::new();
//! let _solved = ctx
//!     .solve([
//!         Provider::value(Greeting("Hello")),
//!         Provider::value(Recipient("World")),
//!         Provider::function(|(g, r): (Arc<Greeting>, Arc<Recipient>)| {
//!             Message(format!("{} {}", g.0, r.0))
//!         }),
//!     ])
//!     .unwrap();
//!
//! assert_eq!(ctx.resolve::<Message>().unwrap().0, "Hello World");
//!
//! // Explicit values win over providers for one call
//! let text = ctx
//!     .invoke()
//!     .value(Greeting("Goodbye"))
//!     .call(|m: Arc<Message>| m.0.clone())
//!     .unwrap();
//! assert_eq!(text, "Goodbye World");
//! ```
//!
//! ## Resources
//!
//! ```rust
//! use booster::{Context, Provider, Resource};
//! use std::sync::atomic::{AtomicBool, Ordering};
//!
//! struct Connection;
//!
//! static CLOSED: AtomicBool = AtomicBool::new(false);
//!
//! let ctx = Context::new();
//! let _solved = ctx
//!     .provide(Provider::resource(|(): ()| {
//!         Ok::<_, std::io::Error>(Resource::new(Connection).on_release(|_| {
//!             CLOSED.store(true, Ordering::SeqCst);
//!             Ok::<_, std::io::Error>(())
//!         }))
//!     }))
//!     .unwrap();
//!
//! ctx.invoke().call(|_conn: std::sync::Arc<Connection>| {
//!     assert!(!CLOSED.load(Ordering::SeqCst));
//! }).unwrap();
//! assert!(CLOSED.load(Ordering::SeqCst));
//! ```
//!
//! ## Shared Values
//!
//! ```rust
//! use booster::Context;
//!
//! struct RequestId(u64);
//!
//! let ctx = Context::new();
//! let scope = ctx.shared().value(RequestId(7)).enter().unwrap();
//! assert_eq!(ctx.get::<RequestId>().unwrap().0, 7);
//! scope.close().unwrap();
//! assert!(ctx.get::<RequestId>().is_none());
//! ```

mod context;
mod error;
mod factory;
mod graph;
#[cfg(feature = "logging")]
pub mod logging;
mod params;
mod provider;
mod registry;
mod resolver;
mod scope;
mod stack;
mod storage;
mod types;

pub use context::*;
pub use error::*;
pub use factory::*;
pub use params::*;
pub use provider::*;
pub use scope::*;
pub use stack::*;
pub use storage::*;
pub use types::*;

// Re-export tracing macros for convenience when logging feature is enabled
#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

// Re-export for convenience
pub use std::sync::Arc;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        AsyncResource, CleanupStack, Context, DiError, Injectable, Provider, Resource, Result,
        Shared, SharedScope, TypeKey,
    };
    pub use std::sync::Arc;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Clone)]
    struct Greeting(&'static str);
    #[derive(Clone)]
    struct Recipient(&'static str);
    struct Punctuation(&'static str);
    struct Message(String);

    fn key<T: 'static>() -> TypeKey {
        TypeKey::of::<T>()
    }

    fn message_from(g: &Greeting, r: &Recipient) -> Message {
        Message(format!("{} {}", g.0, r.0))
    }

    #[test]
    fn test_scenario_hello_world() {
        let ctx = Context::new();
        let _solved = ctx
            .solve([
                Provider::value(Greeting("Hello")),
                Provider::value(Recipient("World")),
                Provider::function(|(g, r): (Arc<Greeting>, Arc<Recipient>)| message_from(&g, &r)),
            ])
            .unwrap();

        assert_eq!(ctx.resolve::<Message>().unwrap().0, "Hello World");
    }

    #[test]
    fn test_scenario_sync_context_rejects_async_provider() {
        let ctx = Context::new();
        let _solved = ctx
            .solve([
                Provider::value(Greeting("Hello")),
                Provider::asyncfunction(|g: Arc<Greeting>| async move {
                    Message(g.0.to_string())
                }),
            ])
            .unwrap();

        let err = ctx.resolve::<Message>().err().unwrap();
        assert!(err.is_provider_missing());
        assert!(err.to_string().starts_with("No sync provider for"));
    }

    #[tokio::test]
    async fn test_scenario_async_generation_runs_concurrently() {
        // Both async providers wait on the same barrier, so they only finish
        // if they are polled together
        let barrier = Arc::new(tokio::sync::Barrier::new(2));
        let order = Arc::new(Mutex::new(Vec::new()));

        let (b1, o1) = (Arc::clone(&barrier), Arc::clone(&order));
        let (b2, o2) = (Arc::clone(&barrier), Arc::clone(&order));
        let o3 = Arc::clone(&order);

        let ctx = Context::new();
        let _solved = ctx
            .solve([
                Provider::value(Greeting("Hello")),
                Provider::asyncfunction(move |(): ()| {
                    let (b, o) = (Arc::clone(&b1), Arc::clone(&o1));
                    async move {
                        b.wait().await;
                        o.lock().unwrap().push("recipient");
                        Recipient("World")
                    }
                }),
                Provider::asyncfunction(move |(): ()| {
                    let (b, o) = (Arc::clone(&b2), Arc::clone(&o2));
                    async move {
                        b.wait().await;
                        o.lock().unwrap().push("punctuation");
                        Punctuation("!")
                    }
                }),
                Provider::asyncfunction(
                    move |(g, r, p): (Arc<Greeting>, Arc<Recipient>, Arc<Punctuation>)| {
                        o3.lock().unwrap().push("message");
                        async move { Message(format!("{} {}{}", g.0, r.0, p.0)) }
                    },
                ),
            ])
            .unwrap();

        let message = tokio::time::timeout(Duration::from_secs(5), ctx.resolve_async::<Message>())
            .await
            .expect("async providers of one generation were not run concurrently")
            .unwrap();

        assert_eq!(message.0, "Hello World!");
        let order = order.lock().unwrap();
        assert_eq!(order.len(), 3);
        assert_eq!(order[2], "message");
    }

    #[tokio::test]
    async fn test_async_failure_cancels_siblings() {
        struct Slow;
        struct Broken;
        struct Both;

        struct DropFlag(Arc<AtomicBool>);
        impl Drop for DropFlag {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);

        let ctx = Context::new();
        let _solved = ctx
            .solve([
                Provider::asyncfunction(move |(): ()| {
                    let guard = DropFlag(Arc::clone(&flag));
                    async move {
                        let _guard = guard;
                        std::future::pending::<()>().await;
                        Slow
                    }
                }),
                Provider::try_asyncfunction(|(): ()| async {
                    Err::<Broken, _>("connection refused")
                }),
                Provider::asyncfunction(|_: (Arc<Slow>, Arc<Broken>)| async { Both }),
            ])
            .unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(5), ctx.resolve_async::<Both>())
            .await
            .expect("failure did not cancel the pending sibling");

        assert!(matches!(outcome, Err(DiError::ProviderFailed { .. })));
        assert!(cancelled.load(Ordering::SeqCst));
    }

    #[test]
    fn test_scenario_union_prefers_first_declared() {
        let requirements = Requirements::new().union("value", [key::<Greeting>(), key::<Recipient>()]);
        let resolve = |ctx: &Context| {
            let mut arguments = Arguments::new();
            let mut stack = CleanupStack::new();
            ctx.inject(&requirements, &mut arguments, &mut stack, InjectOptions::default())
                .unwrap();
            stack.close().unwrap();
            arguments.get_any("value").cloned().unwrap()
        };

        let ctx = Context::new();
        let _recipient = ctx.provide(Provider::value(Recipient("World"))).unwrap();
        let value = resolve(&ctx);
        assert_eq!(value.downcast::<Recipient>().ok().unwrap().0, "World");

        let _greeting = ctx.provide(Provider::value(Greeting("Hello"))).unwrap();
        let value = resolve(&ctx);
        assert_eq!(value.downcast::<Greeting>().ok().unwrap().0, "Hello");
    }

    #[test]
    fn test_scenario_override_invalidates_cached_descendants() {
        let ctx = Context::new();
        let _solved = ctx
            .solve([
                Provider::function(|(): ()| Greeting("Hello")),
                Provider::value(Recipient("World")),
                Provider::function(|(g, r): (Arc<Greeting>, Arc<Recipient>)| message_from(&g, &r)),
            ])
            .unwrap();

        let scope = ctx
            .shared()
            .dependency::<Greeting>()
            .dependency::<Message>()
            .enter()
            .unwrap();
        assert_eq!(ctx.get::<Message>().unwrap().0, "Hello World");

        let text = ctx
            .invoke()
            .value(Greeting("Goodbye"))
            .call(|m: Arc<Message>| m.0.clone())
            .unwrap();
        assert_eq!(text, "Goodbye World");

        // The outer scope keeps its own cached values
        assert_eq!(ctx.get::<Message>().unwrap().0, "Hello World");
        scope.close().unwrap();
    }

    #[test]
    fn test_generations_run_after_their_requirements() {
        struct A;
        struct B;
        struct C;
        struct D;

        let order = Arc::new(Mutex::new(Vec::new()));
        let record = |name: &'static str| {
            let order = Arc::clone(&order);
            move || order.lock().unwrap().push(name)
        };
        let (a, b, c, d) = (record("A"), record("B"), record("C"), record("D"));

        let ctx = Context::new();
        let _solved = ctx
            .solve([
                Provider::function(move |_: (Arc<B>, Arc<C>)| {
                    d();
                    D
                }),
                Provider::function(move |_: Arc<A>| {
                    c();
                    C
                }),
                Provider::function(move |_: Arc<A>| {
                    b();
                    B
                }),
                Provider::function(move |(): ()| {
                    a();
                    A
                }),
            ])
            .unwrap();

        ctx.resolve::<D>().unwrap();
        let order = order.lock().unwrap();
        let position = |name| order.iter().position(|n| *n == name).unwrap();
        assert_eq!(order.len(), 4);
        assert!(position("A") < position("B"));
        assert!(position("A") < position("C"));
        assert!(position("B") < position("D"));
        assert!(position("C") < position("D"));
    }

    #[test]
    fn test_missing_types_are_named_exactly() {
        struct Outer;
        struct Inner;

        let ctx = Context::new();
        let err = ctx
            .solve([
                Provider::function(|_: Arc<Inner>| Outer),
                Provider::function(|_: (Arc<Greeting>, Arc<Recipient>)| Inner),
            ])
            .err()
            .unwrap();

        match err {
            DiError::ProviderMissing { types, sync } => {
                assert!(!sync);
                let mut expected = vec![key::<Greeting>().name(), key::<Recipient>().name()];
                expected.sort_unstable();
                assert_eq!(types, expected);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_nested_registration_restores_by_identity() {
        let ctx = Context::new();
        let _outer = ctx.provide(Provider::value(Greeting("Hello"))).unwrap();
        let before = ctx.state();
        {
            let _inner = ctx.provide(Provider::value(Greeting("Hi"))).unwrap();
            assert_eq!(ctx.resolve::<Greeting>().unwrap().0, "Hi");
        }
        assert!(Arc::ptr_eq(&ctx.state(), &before));
        assert_eq!(ctx.resolve::<Greeting>().unwrap().0, "Hello");
    }

    #[test]
    fn test_acquired_resources_released_once_in_reverse_after_failure() {
        struct First;
        struct Second;
        struct Third;
        struct Failing;

        let released = Arc::new(Mutex::new(Vec::new()));
        let releasing = |name: &'static str| {
            let released = Arc::clone(&released);
            move || released.lock().unwrap().push(name)
        };
        let (r1, r2, r3) = (releasing("first"), releasing("second"), releasing("third"));

        let ctx = Context::new();
        let _solved = ctx
            .solve([
                Provider::resource(move |(): ()| {
                    let release = r1.clone();
                    Ok::<_, std::io::Error>(Resource::new(First).on_release(move |_| {
                        release();
                        Ok::<_, std::io::Error>(())
                    }))
                }),
                Provider::resource(move |_: Arc<First>| {
                    let release = r2.clone();
                    Ok::<_, std::io::Error>(Resource::new(Second).on_release(move |_| {
                        release();
                        Ok::<_, std::io::Error>(())
                    }))
                }),
                Provider::resource(move |_: Arc<Second>| {
                    let release = r3.clone();
                    Ok::<_, std::io::Error>(Resource::new(Third).on_release(move |_| {
                        release();
                        Ok::<_, std::io::Error>(())
                    }))
                }),
                Provider::try_function(|_: Arc<Third>| Err::<Failing, _>("out of connections")),
            ])
            .unwrap();

        let err = ctx.resolve::<Failing>().err().unwrap();
        assert!(matches!(err, DiError::ProviderFailed { .. }));
        assert_eq!(*released.lock().unwrap(), ["third", "second", "first"]);
    }

    #[test]
    fn test_one_call_invokes_each_producer_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let ctx = Context::new();
        let _solved = ctx
            .solve([
                Provider::function(move |(): ()| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Greeting("Hello")
                }),
                Provider::value(Recipient("World")),
                Provider::function(|(g, r): (Arc<Greeting>, Arc<Recipient>)| message_from(&g, &r)),
            ])
            .unwrap();

        let same = ctx
            .invoke()
            .call(|(g1, m, g2): (Arc<Greeting>, Arc<Message>, Arc<Greeting>)| {
                assert_eq!(m.0, "Hello World");
                Arc::ptr_eq(&g1, &g2)
            })
            .unwrap();
        assert!(same);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unpacked_composite_elements_resolve() {
        let ctx = Context::new();
        let _solved = ctx
            .provide(
                Provider::function(|(): ()| (Greeting("Hello"), Recipient("World")))
                    .unpack::<(Greeting, Recipient)>(),
            )
            .unwrap();

        let (g, r) = ctx
            .invoke()
            .call(|(g, r): (Arc<Greeting>, Arc<Recipient>)| (g.0, r.0))
            .unwrap();
        assert_eq!((g, r), ("Hello", "World"));
    }

    #[test]
    fn test_builtin_types_are_rejected() {
        let ctx = Context::new();
        let err = ctx.provide(Provider::value(42_i32)).err().unwrap();
        assert!(matches!(err, DiError::InvalidDependencyType { .. }));
    }

    #[tokio::test]
    async fn test_copied_state_resumes_in_spawned_task() {
        let ctx = Context::new();
        let _solved = ctx.provide(Provider::value(Greeting("Hello"))).unwrap();
        let snapshot = ctx.copy_state();

        let greeting = tokio::spawn(async move {
            let worker = Context::new();
            let _resumed = snapshot.resume(&worker);
            worker.resolve_async::<Greeting>().await.map(|g| g.0)
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(greeting, "Hello");
    }

    #[tokio::test]
    async fn test_overlapping_shared_calls_on_clones_keep_values_apart() {
        let ctx = Context::new();
        let _solved = ctx.provide(Provider::value(Greeting("Hello"))).unwrap();

        let first = ctx.clone();
        let early = tokio::spawn(async move {
            let view = &first;
            first
                .invoke()
                .shared()
                .call_async(move |g: Arc<Greeting>| async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    (g.0, view.get::<Greeting>().map(|v| v.0))
                })
                .await
        });

        let second = ctx.clone();
        let late = tokio::spawn(async move {
            let view = &second;
            second
                .invoke()
                .shared()
                .value(Greeting("Hi"))
                .call_async(move |g: Arc<Greeting>| async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    (g.0, view.get::<Greeting>().map(|v| v.0))
                })
                .await
        });

        let early = early.await.unwrap().unwrap();
        let late = late.await.unwrap().unwrap();
        assert_eq!(early, ("Hello", Some("Hello")));
        assert_eq!(late, ("Hi", Some("Hi")));
        assert!(ctx.current_values().is_empty());
    }

    #[tokio::test]
    async fn test_async_failure_releases_finished_siblings() {
        struct Connection;
        struct Broken;
        struct Both;

        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);

        let ctx = Context::new();
        let _solved = ctx
            .solve([
                Provider::async_resource(move |(): ()| {
                    let counter = Arc::clone(&counter);
                    async move {
                        Ok::<_, std::io::Error>(AsyncResource::new(Connection).on_async_release(
                            move |_| async move {
                                tokio::task::yield_now().await;
                                counter.fetch_add(1, Ordering::SeqCst);
                                Ok::<_, std::io::Error>(())
                            },
                        ))
                    }
                }),
                Provider::try_asyncfunction(|(): ()| async {
                    tokio::task::yield_now().await;
                    Err::<Broken, _>("connection refused")
                }),
                Provider::asyncfunction(|_: (Arc<Connection>, Arc<Broken>)| async { Both }),
            ])
            .unwrap();

        let outcome = ctx.resolve_async::<Both>().await;
        assert!(matches!(outcome, Err(DiError::ProviderFailed { .. })));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_typed_alias_request_is_rejected() {
        let ctx = Context::new();
        let _solved = ctx
            .provide(Provider::value(Greeting("Hello")).also_provides(key::<Recipient>()))
            .unwrap();

        let err = ctx.resolve::<Recipient>().err().unwrap();
        assert!(matches!(
            err,
            DiError::InvalidDependencyType { type_name, reason }
                if type_name == key::<Recipient>().name()
                    && reason == "Alias values are only reachable type-erased"
        ));

        let mut arguments = Arguments::new();
        let mut stack = CleanupStack::new();
        ctx.inject(
            &Requirements::new().key("alias", key::<Recipient>()),
            &mut arguments,
            &mut stack,
            InjectOptions::default(),
        )
        .unwrap();
        stack.close().unwrap();
        let value = arguments.get_any("alias").cloned().unwrap();
        assert_eq!(value.downcast::<Greeting>().ok().unwrap().0, "Hello");
    }
}
