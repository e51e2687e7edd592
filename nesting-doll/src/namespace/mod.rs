//! Continuation-local storage for nested contexts.
//!
//! A [`Namespace`] is a named family of [`Scope`]s. Exactly one scope per
//! namespace is active at a time on a given thread; code running inside
//! [`Namespace::run`], a callback produced by [`Namespace::bind`], or a
//! future wrapped with [`Namespace::in_current_scope`] sees that scope's
//! slots. New scopes inherit from whichever scope was active when they were
//! created, which is how values flow down a causal chain without leaking into
//! unrelated chains that share the same executor.
//!
//! Namespaces are registered process-wide by name so independent callers can
//! find the same one again.

mod future;
mod scope;

pub use future::InScope;
pub use scope::{Scope, ScopeGuard, SlotValue};

use crate::errors::{NestingError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::debug;

static NAMESPACE_ID: AtomicU64 = AtomicU64::new(0);

fn registry() -> &'static RwLock<HashMap<String, Namespace>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, Namespace>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

struct NamespaceInner {
    id: u64,
    name: String,
}

/// A named family of inheritable scopes.
///
/// Cloning a namespace yields another handle to the same namespace.
#[derive(Clone)]
pub struct Namespace {
    inner: Arc<NamespaceInner>,
}

impl Namespace {
    fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(NamespaceInner {
                id: NAMESPACE_ID.fetch_add(1, Ordering::Relaxed),
                name: name.into(),
            }),
        }
    }

    /// Returns the namespace name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the unique id of this namespace.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Returns the scope active on this thread, if any.
    #[must_use]
    pub fn active(&self) -> Option<Scope> {
        scope::active_scope(self.inner.id)
    }

    /// Returns true if a scope of this namespace is active on this thread.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active().is_some()
    }

    /// Creates a scope inheriting from the active one.
    ///
    /// The scope is not entered.
    #[must_use]
    pub fn create_scope(&self) -> Scope {
        Scope::new(self.inner.id, self.active())
    }

    /// Runs `f` inside a fresh scope and returns its result.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        let scope = self.create_scope();
        self.run_in(&scope, f)
    }

    /// Runs `f` with `scope` active and returns its result.
    pub fn run_in<R>(&self, scope: &Scope, f: impl FnOnce() -> R) -> R {
        debug_assert_eq!(scope.namespace_id(), self.inner.id);
        let _guard = scope.enter();
        f()
    }

    /// Wraps `f` so that every call runs with a scope active.
    ///
    /// With `None`, the scope active at bind time is captured, or a new one is
    /// created if nothing is active. Nothing runs until the wrapper is called.
    pub fn bind<F, R>(&self, mut f: F, scope: Option<Scope>) -> impl FnMut() -> R
    where
        F: FnMut() -> R,
    {
        let scope = scope.unwrap_or_else(|| self.current_or_new_scope());
        let namespace = self.clone();
        move || namespace.run_in(&scope, &mut f)
    }

    /// Reads a slot from the active scope chain.
    #[must_use]
    pub fn get<T>(&self, slot: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.active()?.get(slot)
    }

    /// Writes a slot in the active scope.
    ///
    /// # Errors
    ///
    /// Returns [`NestingError::NoActiveScope`] outside of any scope.
    pub fn set<T>(&self, slot: impl Into<String>, value: T) -> Result<()>
    where
        T: Send + Sync + 'static,
    {
        let scope = self
            .active()
            .ok_or_else(|| NestingError::no_active_scope(self.name()))?;
        scope.set(slot, value);
        Ok(())
    }

    /// Wraps a future so it keeps the scope that is active right now.
    ///
    /// This is what lets a timer or I/O continuation scheduled from inside a
    /// context see that context's slots when it eventually runs.
    pub fn in_current_scope<F: Future>(&self, future: F) -> InScope<F> {
        InScope::new(self.current_or_new_scope(), future)
    }

    /// Spawns a future on the tokio runtime, carrying the active scope.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime, like `tokio::spawn`.
    pub fn spawn<F>(&self, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tokio::spawn(self.in_current_scope(future))
    }

    fn current_or_new_scope(&self) -> Scope {
        self.active().unwrap_or_else(|| Scope::new(self.inner.id, None))
    }
}

impl PartialEq for Namespace {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Namespace {}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .finish()
    }
}

/// Registers a new namespace.
///
/// # Errors
///
/// Returns [`NestingError::NamespaceExists`] if the name is taken.
pub fn create_namespace(name: &str) -> Result<Namespace> {
    let mut namespaces = registry().write();
    if namespaces.contains_key(name) {
        return Err(NestingError::NamespaceExists(name.to_string()));
    }
    let namespace = Namespace::new(name);
    namespaces.insert(name.to_string(), namespace.clone());
    debug!(namespace = %name, namespace_id = namespace.id(), "Namespace created");
    Ok(namespace)
}

/// Looks up a registered namespace.
#[must_use]
pub fn get_namespace(name: &str) -> Option<Namespace> {
    registry().read().get(name).cloned()
}

/// Returns the namespace registered under `name`, registering it if needed.
pub fn get_or_create_namespace(name: &str) -> Namespace {
    if let Some(namespace) = get_namespace(name) {
        return namespace;
    }
    let mut namespaces = registry().write();
    namespaces
        .entry(name.to_string())
        .or_insert_with(|| {
            let namespace = Namespace::new(name);
            debug!(namespace = %name, namespace_id = namespace.id(), "Namespace created");
            namespace
        })
        .clone()
}

/// Removes a namespace from the registry.
///
/// Existing handles keep working; later lookups create a new, unrelated
/// namespace.
pub fn destroy_namespace(name: &str) -> Option<Namespace> {
    let removed = registry().write().remove(name);
    if removed.is_some() {
        debug!(namespace = %name, "Namespace destroyed");
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(prefix: &str) -> String {
        format!("{prefix}-{}", uuid::Uuid::new_v4())
    }

    #[test]
    fn test_registry_reuses_namespace() {
        let name = unique_name("reuse");
        let first = get_or_create_namespace(&name);
        let second = get_or_create_namespace(&name);
        assert_eq!(first, second);
        assert_eq!(get_namespace(&name), Some(first));
    }

    #[test]
    fn test_create_namespace_rejects_duplicates() {
        let name = unique_name("dup");
        create_namespace(&name).unwrap();
        assert!(matches!(
            create_namespace(&name),
            Err(NestingError::NamespaceExists(_))
        ));
    }

    #[test]
    fn test_destroy_namespace() {
        let name = unique_name("destroy");
        let original = get_or_create_namespace(&name);
        assert_eq!(destroy_namespace(&name), Some(original.clone()));
        assert!(get_namespace(&name).is_none());

        let replacement = get_or_create_namespace(&name);
        assert_ne!(original, replacement);
    }

    #[test]
    fn test_run_activates_scope() {
        let ns = get_or_create_namespace(&unique_name("run"));
        assert!(!ns.is_active());

        let value = ns.run(|| {
            assert!(ns.is_active());
            ns.set("key", 7_u8).unwrap();
            ns.get::<u8>("key")
        });

        assert_eq!(value, Some(7));
        assert!(!ns.is_active());
        assert!(ns.get::<u8>("key").is_none());
    }

    #[test]
    fn test_set_outside_scope_fails() {
        let ns = get_or_create_namespace(&unique_name("outside"));
        assert!(matches!(
            ns.set("key", 1_u8),
            Err(NestingError::NoActiveScope { .. })
        ));
    }

    #[test]
    fn test_nested_run_inherits_and_shadows() {
        let ns = get_or_create_namespace(&unique_name("nested"));
        ns.run(|| {
            ns.set("key", "outer".to_string()).unwrap();
            ns.run(|| {
                assert_eq!(ns.get::<String>("key").as_deref(), Some("outer"));
                ns.set("key", "inner".to_string()).unwrap();
                assert_eq!(ns.get::<String>("key").as_deref(), Some("inner"));
            });
            assert_eq!(ns.get::<String>("key").as_deref(), Some("outer"));
        });
    }

    #[test]
    fn test_bind_captures_scope_at_bind_time() {
        let ns = get_or_create_namespace(&unique_name("bind"));
        let reader = ns.clone();
        let mut bound = ns.run(|| {
            ns.set("key", 1_u32).unwrap();
            ns.bind(move || reader.get::<u32>("key"), None)
        });

        assert!(!ns.is_active());
        assert_eq!(bound(), Some(1));
        assert!(!ns.is_active());
    }

    #[test]
    fn test_bind_with_explicit_scope() {
        let ns = get_or_create_namespace(&unique_name("explicit"));
        let scope = ns.create_scope();
        scope.set("key", true);

        let mut bound = ns.bind(|| ns.get::<bool>("key"), Some(scope));
        assert_eq!(bound(), Some(true));
    }

    #[tokio::test]
    async fn test_in_current_scope_survives_await() {
        let ns = get_or_create_namespace(&unique_name("await"));
        let future = ns.run(|| {
            ns.set("key", 3_u64).unwrap();
            let inner = ns.clone();
            ns.in_current_scope(async move {
                tokio::task::yield_now().await;
                inner.get::<u64>("key")
            })
        });

        assert_eq!(future.await, Some(3));
        assert!(!ns.is_active());
    }

    #[tokio::test]
    async fn test_scoped_future_is_pinned_in_place() {
        let ns = get_or_create_namespace(&unique_name("inline"));
        let buffer = [0_u8; 128];
        let inner = ns.clone();
        let future = ns.in_current_scope(async move {
            tokio::task::yield_now().await;
            (buffer.len(), inner.is_active())
        });
        assert!(std::mem::size_of_val(&future) >= buffer.len());

        tokio::pin!(future);
        assert_eq!(future.await, (128, true));
        assert!(!ns.is_active());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_spawn_carries_scope_across_threads() {
        let ns = get_or_create_namespace(&unique_name("spawn"));
        let handle = ns.run(|| {
            ns.set("key", "value".to_string()).unwrap();
            let inner = ns.clone();
            ns.spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                inner.get::<String>("key")
            })
        });

        assert_eq!(handle.await.unwrap().as_deref(), Some("value"));
    }
}
