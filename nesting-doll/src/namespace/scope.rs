//! Inheritable scopes and the thread-local record of which scope is active.

use parking_lot::RwLock;
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

static SCOPE_ID: AtomicU64 = AtomicU64::new(0);

/// A type-erased value stored in a scope slot.
pub type SlotValue = Arc<dyn Any + Send + Sync>;

thread_local! {
    // Active scope per namespace id on this thread.
    static ACTIVE: RefCell<HashMap<u64, Scope>> = RefCell::new(HashMap::new());
}

struct ScopeInner {
    id: u64,
    namespace_id: u64,
    parent: Option<Scope>,
    slots: RwLock<HashMap<String, SlotValue>>,
}

/// One frame of slot values inside a namespace.
///
/// Reads fall through to the parent chain, so a child scope sees values its
/// ancestors hold *at the time of the read*. Writes only touch this frame and
/// are invisible to the parent and to sibling scopes.
///
/// Scopes are cheap to clone; clones refer to the same frame.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    pub(crate) fn new(namespace_id: u64, parent: Option<Self>) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                id: SCOPE_ID.fetch_add(1, Ordering::Relaxed),
                namespace_id,
                parent,
                slots: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Returns the unique id of this scope.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Returns the id of the namespace this scope belongs to.
    #[must_use]
    pub fn namespace_id(&self) -> u64 {
        self.inner.namespace_id
    }

    /// Returns the scope this one inherits from, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&Self> {
        self.inner.parent.as_ref()
    }

    /// Reads a slot, searching this scope and then its ancestors.
    ///
    /// The nearest scope holding the slot wins. If that value is not a `T`,
    /// `None` is returned rather than looking further up.
    #[must_use]
    pub fn get<T>(&self, slot: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(value) = current.inner.slots.read().get(slot) {
                return (**value).downcast_ref::<T>().cloned();
            }
            scope = current.parent();
        }
        None
    }

    /// Returns true if this scope or one of its ancestors holds the slot.
    #[must_use]
    pub fn contains(&self, slot: &str) -> bool {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if current.inner.slots.read().contains_key(slot) {
                return true;
            }
            scope = current.parent();
        }
        false
    }

    /// Writes a slot in this scope only.
    pub fn set<T>(&self, slot: impl Into<String>, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.inner.slots.write().insert(slot.into(), Arc::new(value));
    }

    /// Makes this scope the active one for its namespace on the current thread.
    ///
    /// The previously active scope is restored when the guard drops, including
    /// during unwinding.
    #[must_use = "the scope is only active while the guard is alive"]
    pub fn enter(&self) -> ScopeGuard {
        let namespace_id = self.inner.namespace_id;
        let previous = ACTIVE.with(|active| active.borrow_mut().insert(namespace_id, self.clone()));
        trace!(scope_id = self.inner.id, namespace_id, "Scope entered");
        ScopeGuard {
            namespace_id,
            previous,
            _not_send: PhantomData,
        }
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Scope {}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots: Vec<String> = self.inner.slots.read().keys().cloned().collect();
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("namespace_id", &self.inner.namespace_id)
            .field("parent", &self.parent().map(Self::id))
            .field("slots", &slots)
            .finish()
    }
}

/// Returns the scope currently active for a namespace on this thread.
pub(crate) fn active_scope(namespace_id: u64) -> Option<Scope> {
    ACTIVE
        .try_with(|active| active.borrow().get(&namespace_id).cloned())
        .ok()
        .flatten()
}

/// Restores the previously active scope when dropped.
///
/// Guards are tied to the thread that created them.
pub struct ScopeGuard {
    namespace_id: u64,
    previous: Option<Scope>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        // The thread-local may already be gone during thread teardown.
        let _ = ACTIVE.try_with(|active| {
            let mut active = active.borrow_mut();
            match previous {
                Some(scope) => {
                    active.insert(self.namespace_id, scope);
                }
                None => {
                    active.remove(&self.namespace_id);
                }
            }
        });
        trace!(namespace_id = self.namespace_id, "Scope exited");
    }
}

impl fmt::Debug for ScopeGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeGuard")
            .field("namespace_id", &self.namespace_id)
            .field("previous", &self.previous.as_ref().map(Scope::id))
            .finish()
    }
}
