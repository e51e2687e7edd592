//! Tracker configuration.

use crate::errors::NestingError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of the namespace shared by default trackers.
pub const DEFAULT_NAMESPACE: &str = "__NS__nesting_doll";

/// Environment variable overriding the namespace name.
pub const NAMESPACE_ENV: &str = "NESTING_DOLL_NAMESPACE";

/// Environment variable overriding the activation policy.
pub const ACTIVATION_ENV: &str = "NESTING_DOLL_ACTIVATION";

/// Decides which contexts found in a scope may become `outer` or `previous`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationPolicy {
    /// Only contexts marked active are accepted.
    #[default]
    Gated,
    /// Any context found in the slot is accepted, active or not.
    ///
    /// Completed contexts can then be attributed as ancestors of unrelated
    /// work that reuses their scope.
    Trusting,
}

impl ActivationPolicy {
    /// Returns the policy name as used in configuration.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gated => "gated",
            Self::Trusting => "trusting",
        }
    }
}

impl fmt::Display for ActivationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivationPolicy {
    type Err = NestingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gated" => Ok(Self::Gated),
            "trusting" => Ok(Self::Trusting),
            other => Err(NestingError::Config(format!(
                "unknown activation policy '{other}', expected 'gated' or 'trusting'"
            ))),
        }
    }
}

/// Configuration for a [`ContextTracker`](crate::ContextTracker).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Namespace the tracker registers or reuses.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Activation policy handed to every context the tracker creates.
    #[serde(default)]
    pub activation: ActivationPolicy,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            activation: ActivationPolicy::default(),
        }
    }
}

impl TrackerConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the namespace name.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the activation policy.
    #[must_use]
    pub fn with_activation(mut self, activation: ActivationPolicy) -> Self {
        self.activation = activation;
        self
    }

    /// Builds a configuration from the process environment.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`NestingError::Config`] for an empty namespace or an unknown
    /// activation policy.
    pub fn from_env() -> Result<Self, NestingError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, NestingError> {
        let mut config = Self::default();

        if let Some(namespace) = lookup(NAMESPACE_ENV) {
            if namespace.trim().is_empty() {
                return Err(NestingError::Config(format!("{NAMESPACE_ENV} must not be empty")));
            }
            config.namespace = namespace;
        }

        if let Some(activation) = lookup(ACTIVATION_ENV) {
            config.activation = activation.parse()?;
        }

        Ok(config)
    }
}
