//! The nested context and its entry algorithm.

use super::future::Nested;
use super::payload::{Payload, PayloadMap};
use crate::config::ActivationPolicy;
use crate::errors::{InvalidArgumentError, Result};
use crate::namespace::{Namespace, Scope};
use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// Slot holding the context that started the chain in a scope.
pub const OUTER_SLOT: &str = "outer";

/// Slot holding the context entered most recently in a scope.
pub const CURRENT_SLOT: &str = "current";

/// Where a context sits in its causal chain, fixed at first entry.
#[derive(Debug, Clone, Default)]
struct Lineage {
    outer: Option<NestedContext>,
    previous: Option<NestedContext>,
}

struct NestedInner {
    id: Uuid,
    name: String,
    namespace: Namespace,
    policy: ActivationPolicy,
    payload: Payload,
    lineage: OnceLock<Lineage>,
    active: AtomicBool,
}

/// One tracked unit of nested asynchronous work.
///
/// Running or binding a callback through a `NestedContext` records, on the
/// first entry, the `outer` context that began the chain and the `previous`
/// context that was current just before. Both are write-once. Contexts that
/// are not [activated](NestedContext::activate) are never recorded as
/// anyone's `outer` or `previous` under the default policy.
///
/// Clones share state; equality is identity.
#[derive(Clone)]
pub struct NestedContext {
    inner: Arc<NestedInner>,
}

impl NestedContext {
    /// Creates a context in `namespace` with the default activation policy.
    ///
    /// # Errors
    ///
    /// Returns [`NestingError::InvalidArgument`](crate::NestingError::InvalidArgument)
    /// when `name` is empty or whitespace.
    pub fn new(
        name: impl Into<String>,
        namespace: &Namespace,
        payload: Option<PayloadMap>,
    ) -> Result<Self> {
        Self::with_policy(name, namespace, payload, ActivationPolicy::default())
    }

    pub(crate) fn with_policy(
        name: impl Into<String>,
        namespace: &Namespace,
        payload: Option<PayloadMap>,
        policy: ActivationPolicy,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            warn!(namespace = %namespace.name(), "Rejected context without a name");
            return Err(InvalidArgumentError::new("name", "a context needs a non-empty name").into());
        }

        Ok(Self {
            inner: Arc::new(NestedInner {
                id: Uuid::new_v4(),
                name,
                namespace: namespace.clone(),
                policy,
                payload: Payload::from_data(payload),
                lineage: OnceLock::new(),
                active: AtomicBool::new(false),
            }),
        })
    }

    /// Returns the context name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the unique id of this context.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Returns the namespace this context propagates through.
    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.inner.namespace
    }

    /// Returns the activation policy applied at entry.
    #[must_use]
    pub fn policy(&self) -> ActivationPolicy {
        self.inner.policy
    }

    /// Returns the context that began this chain, if any.
    #[must_use]
    pub fn outer(&self) -> Option<Self> {
        self.inner.lineage.get().and_then(|l| l.outer.clone())
    }

    /// Returns the context that was current when this one was first entered.
    #[must_use]
    pub fn previous(&self) -> Option<Self> {
        self.inner.lineage.get().and_then(|l| l.previous.clone())
    }

    /// Returns true once the context has been entered.
    #[must_use]
    pub fn is_entered(&self) -> bool {
        self.inner.lineage.get().is_some()
    }

    /// Marks the context as a valid ancestor for work nested under it.
    pub fn activate(&self) {
        if !self.inner.active.swap(true, Ordering::SeqCst) {
            debug!(context = %self.inner.name, context_id = %self.inner.id, "Context activated");
        }
    }

    /// Stops the context from being recorded as an ancestor of later work.
    pub fn deactivate(&self) {
        if self.inner.active.swap(false, Ordering::SeqCst) {
            debug!(context = %self.inner.name, context_id = %self.inner.id, "Context deactivated");
        }
    }

    /// Returns whether the context is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Returns a copy of the payload value under `key`.
    ///
    /// `None` or an empty key yields `None`.
    #[must_use]
    pub fn get<'k>(&self, key: impl Into<Option<&'k str>>) -> Option<serde_json::Value> {
        self.inner.payload.get(key.into())
    }

    /// Stores a payload value. `None` or an empty key is ignored.
    pub fn set<'k>(&self, key: impl Into<Option<&'k str>>, value: serde_json::Value) {
        self.inner.payload.set(key.into(), value);
    }

    /// Replaces the payload. Lineage and activation are untouched.
    pub fn reset(&self, payload: Option<PayloadMap>) {
        self.inner.payload.reset(payload);
    }

    /// Returns a deep copy of the payload.
    #[must_use]
    pub fn payload(&self) -> PayloadMap {
        self.inner.payload.snapshot()
    }

    /// Runs `callback` in a fresh scope nested under the active one.
    pub fn run<R>(&self, callback: impl FnOnce() -> R) -> R {
        let scope = self.inner.namespace.create_scope();
        let _guard = scope.enter();
        self.enter(&scope);
        callback()
    }

    /// Runs `callback` in a fresh scope without touching lineage or slots.
    pub fn run_untracked<R>(&self, callback: impl FnOnce() -> R) -> R {
        self.inner.namespace.run(callback)
    }

    /// Wraps `callback` so that each call enters this context.
    ///
    /// The scope is created now, under whatever scope is active, but nothing
    /// runs until the returned callback is invoked. Slot reads happen at call
    /// time, so lineage reflects the chain as it stands when the callback
    /// fires.
    pub fn bind<F, R>(&self, mut callback: F) -> impl FnMut() -> R
    where
        F: FnMut() -> R,
    {
        let scope = self.inner.namespace.create_scope();
        let context = self.clone();
        move || {
            let _guard = scope.enter();
            context.enter(&scope);
            callback()
        }
    }

    /// Like [`bind`](Self::bind), for callbacks taking one argument.
    pub fn bind_with<A, F, R>(&self, mut callback: F) -> impl FnMut(A) -> R
    where
        F: FnMut(A) -> R,
    {
        let scope = self.inner.namespace.create_scope();
        let context = self.clone();
        move |arg| {
            let _guard = scope.enter();
            context.enter(&scope);
            callback(arg)
        }
    }

    /// Wraps `callback` in a scope without recording this context anywhere.
    ///
    /// Code inside still sees the propagated slots, but neither this context's
    /// lineage nor the `outer`/`current` slots are touched.
    pub fn bind_untracked<F, R>(&self, callback: F) -> impl FnMut() -> R
    where
        F: FnMut() -> R,
    {
        let scope = self.inner.namespace.create_scope();
        self.inner.namespace.bind(callback, Some(scope))
    }

    /// Wraps a future so it runs in this context.
    ///
    /// The scope is created now; the context is entered on the first poll and
    /// the scope is re-entered on every poll after that.
    pub fn instrument<F: Future>(&self, future: F) -> Nested<F> {
        Nested::new(self.clone(), self.inner.namespace.create_scope(), future)
    }

    /// Publishes this context into `scope`, computing lineage on first entry.
    pub(crate) fn enter(&self, scope: &Scope) {
        let mut first_entry = false;
        let lineage = self.inner.lineage.get_or_init(|| {
            first_entry = true;
            let candidate_outer = scope.get::<Self>(OUTER_SLOT);
            let candidate_previous = scope.get::<Self>(CURRENT_SLOT);
            Lineage {
                outer: candidate_outer.filter(|c| self.accepts(c)),
                previous: candidate_previous.filter(|c| self.accepts(c)),
            }
        });

        if first_entry {
            if lineage.outer.is_none() {
                scope.set(OUTER_SLOT, self.clone());
            }
            debug!(
                context = %self.inner.name,
                context_id = %self.inner.id,
                outer = lineage.outer.as_ref().map(Self::name),
                previous = lineage.previous.as_ref().map(Self::name),
                "Context entered"
            );
        } else if !scope
            .get::<Self>(OUTER_SLOT)
            .is_some_and(|c| self.accepts(&c))
        {
            // Re-entry into a scope with no live root: start the chain here.
            scope.set(OUTER_SLOT, self.clone());
        }

        scope.set(CURRENT_SLOT, self.clone());
    }

    fn accepts(&self, candidate: &Self) -> bool {
        match self.inner.policy {
            ActivationPolicy::Gated => candidate.is_active(),
            ActivationPolicy::Trusting => true,
        }
    }
}

impl PartialEq for NestedContext {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for NestedContext {}

impl Hash for NestedContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.inner).hash(state);
    }
}

impl fmt::Display for NestedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.inner.name, self.inner.id)
    }
}

impl fmt::Debug for NestedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestedContext")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("namespace", &self.inner.namespace.name())
            .field("active", &self.is_active())
            .field("outer", &self.outer().as_ref().map(Self::name))
            .field("previous", &self.previous().as_ref().map(Self::name))
            .finish()
    }
}
