//! Testing utilities.
//!
//! This module provides:
//! - Log output for tests, filtered through `RUST_LOG`
//! - Trackers over private namespaces, so tests never share chains
//! - A recorder for capturing lineage from inside callbacks

use crate::config::{ActivationPolicy, TrackerConfig};
use crate::nest::NestedContext;
use crate::tracker::ContextTracker;
use parking_lot::Mutex;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Installs a test-friendly `tracing` subscriber once per process.
///
/// Respects `RUST_LOG`; defaults to `nesting_doll=debug`.
pub fn init_test_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("nesting_doll=debug"));
        // Another subscriber may already be installed by the host test binary.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Returns a tracker over a freshly named namespace.
#[must_use]
pub fn isolated_tracker(policy: ActivationPolicy) -> ContextTracker {
    let config = TrackerConfig::new()
        .with_namespace(format!("test-{}", uuid::Uuid::new_v4()))
        .with_activation(policy);
    ContextTracker::from_config(&config)
}

/// One observation of a context's lineage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineageRecord {
    /// The observed context name.
    pub name: String,
    /// Name of its outer context.
    pub outer: Option<String>,
    /// Name of its previous context.
    pub previous: Option<String>,
}

impl LineageRecord {
    /// Captures the lineage of `context` as names.
    #[must_use]
    pub fn of(context: &NestedContext) -> Self {
        Self {
            name: context.name().to_string(),
            outer: context.outer().map(|c| c.name().to_string()),
            previous: context.previous().map(|c| c.name().to_string()),
        }
    }

    /// Builds an expected record.
    #[must_use]
    pub fn expect(name: &str, outer: Option<&str>, previous: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            outer: outer.map(str::to_string),
            previous: previous.map(str::to_string),
        }
    }
}

/// Thread-safe collector of lineage records, in observation order.
#[derive(Debug, Default)]
pub struct LineageRecorder {
    records: Mutex<Vec<LineageRecord>>,
}

impl LineageRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the lineage of `context` as it is right now.
    pub fn record(&self, context: &NestedContext) {
        self.records.lock().push(LineageRecord::of(context));
    }

    /// Returns all records.
    #[must_use]
    pub fn records(&self) -> Vec<LineageRecord> {
        self.records.lock().clone()
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_test_logging_is_idempotent() {
        init_test_logging();
        init_test_logging();
    }

    #[test]
    fn test_isolated_trackers_differ() {
        let first = isolated_tracker(ActivationPolicy::Gated);
        let second = isolated_tracker(ActivationPolicy::Gated);
        assert_ne!(first.namespace(), second.namespace());
    }

    #[test]
    fn test_recorder_captures_lineage() {
        let tracker = isolated_tracker(ActivationPolicy::Gated);
        let root = tracker.create_context("root", None).unwrap();
        let child = tracker.create_context("child", None).unwrap();
        root.activate();

        let recorder = LineageRecorder::new();
        root.run(|| {
            recorder.record(&root);
            child.run(|| recorder.record(&child));
        });

        assert_eq!(
            recorder.records(),
            vec![
                LineageRecord::expect("root", None, None),
                LineageRecord::expect("child", Some("root"), Some("root")),
            ]
        );
    }
}
