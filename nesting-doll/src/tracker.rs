//! The tracker that owns a namespace and hands out nested contexts.

use crate::config::{ActivationPolicy, TrackerConfig};
use crate::errors::Result;
use crate::namespace::{get_or_create_namespace, Namespace};
use crate::nest::{NestedContext, PayloadMap, CURRENT_SLOT};
use std::sync::OnceLock;

/// Factory for [`NestedContext`]s sharing one namespace.
///
/// Every tracker built with the same namespace name reuses the same
/// registered namespace, so contexts created through different trackers can
/// still see each other as outer or previous.
#[derive(Debug, Clone)]
pub struct ContextTracker {
    namespace: Namespace,
    policy: ActivationPolicy,
}

impl Default for ContextTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextTracker {
    /// Creates a tracker over the default namespace.
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(&TrackerConfig::default())
    }

    /// Creates a tracker from configuration.
    #[must_use]
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self {
            namespace: get_or_create_namespace(&config.namespace),
            policy: config.activation,
        }
    }

    /// Returns the process-wide tracker over the default namespace.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<ContextTracker> = OnceLock::new();
        GLOBAL.get_or_init(Self::new)
    }

    /// Returns the namespace this tracker owns.
    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Returns the activation policy given to new contexts.
    #[must_use]
    pub fn policy(&self) -> ActivationPolicy {
        self.policy
    }

    /// Creates a context bound to this tracker's namespace.
    ///
    /// # Errors
    ///
    /// Returns [`NestingError::InvalidArgument`](crate::NestingError::InvalidArgument)
    /// when `name` is empty or only whitespace.
    pub fn create_context(
        &self,
        name: impl Into<String>,
        payload: Option<PayloadMap>,
    ) -> Result<NestedContext> {
        NestedContext::with_policy(name, &self.namespace, payload, self.policy)
    }

    /// Returns the current context, if a scope is active and that context is
    /// marked active.
    #[must_use]
    pub fn current_context(&self) -> Option<NestedContext> {
        self.namespace
            .get::<NestedContext>(CURRENT_SLOT)
            .filter(NestedContext::is_active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_NAMESPACE;
    use crate::errors::NestingError;
    use serde_json::json;

    fn isolated() -> ContextTracker {
        ContextTracker::from_config(
            &TrackerConfig::new().with_namespace(format!("tracker-{}", uuid::Uuid::new_v4())),
        )
    }

    #[test]
    fn test_default_tracker_uses_default_namespace() {
        let tracker = ContextTracker::new();
        assert_eq!(tracker.namespace().name(), DEFAULT_NAMESPACE);
        assert_eq!(tracker.policy(), ActivationPolicy::Gated);
    }

    #[test]
    fn test_second_tracker_reuses_namespace() {
        let first = ContextTracker::new();
        let second = ContextTracker::default();
        assert_eq!(first.namespace(), second.namespace());
        assert_eq!(ContextTracker::global().namespace(), first.namespace());
    }

    #[test]
    fn test_differently_named_trackers_are_isolated() {
        let first = isolated();
        let second = isolated();
        assert_ne!(first.namespace(), second.namespace());

        let root = first.create_context("root", None).unwrap();
        let child = second.create_context("child", None).unwrap();
        root.activate();

        root.run(|| child.run(|| ()));
        assert!(child.outer().is_none());
        assert!(child.previous().is_none());
    }

    #[test]
    fn test_contexts_from_two_trackers_see_each_other() {
        let name = format!("shared-{}", uuid::Uuid::new_v4());
        let config = TrackerConfig::new().with_namespace(name);
        let first = ContextTracker::from_config(&config);
        let second = ContextTracker::from_config(&config);

        let root = first.create_context("root", None).unwrap();
        let child = second.create_context("child", None).unwrap();
        root.activate();

        root.run(|| child.run(|| ()));
        assert_eq!(child.outer(), Some(root.clone()));
        assert_eq!(child.previous(), Some(root));
    }

    #[test]
    fn test_create_context() {
        let tracker = isolated();
        let doll = tracker
            .create_context("transaction", Some(PayloadMap::from([("id".to_string(), json!(9))])))
            .unwrap();
        assert_eq!(doll.name(), "transaction");
        assert_eq!(doll.namespace(), tracker.namespace());
        assert_eq!(doll.get("id"), Some(json!(9)));
    }

    #[test]
    fn test_create_context_requires_name() {
        let tracker = isolated();
        assert!(matches!(
            tracker.create_context("", None),
            Err(NestingError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_create_context_passes_policy() {
        let tracker = ContextTracker::from_config(
            &TrackerConfig::new()
                .with_namespace(format!("trusting-{}", uuid::Uuid::new_v4()))
                .with_activation(ActivationPolicy::Trusting),
        );
        let doll = tracker.create_context("doll", None).unwrap();
        assert_eq!(doll.policy(), ActivationPolicy::Trusting);
    }

    #[test]
    fn test_current_context_outside_scope() {
        let tracker = isolated();
        assert!(tracker.current_context().is_none());
    }

    #[test]
    fn test_current_context_requires_activation() {
        let tracker = isolated();
        let doll = tracker.create_context("doll", None).unwrap();

        doll.run(|| assert!(tracker.current_context().is_none()));

        doll.activate();
        doll.run(|| assert_eq!(tracker.current_context(), Some(doll.clone())));
        assert!(tracker.current_context().is_none());
    }
}
