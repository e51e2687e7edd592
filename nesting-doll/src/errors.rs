//! Error types for nesting-doll.
//!
//! The taxonomy is deliberately narrow: payload accessors never fail, and
//! re-entering a context is not an error. Errors only surface when a context
//! is built without a name, when a namespace slot is written outside of any
//! scope, or when configuration cannot be parsed.

use thiserror::Error;

/// The main error type for nesting-doll operations.
#[derive(Debug, Error)]
pub enum NestingError {
    /// An argument was missing or malformed.
    #[error("{0}")]
    InvalidArgument(#[from] InvalidArgumentError),

    /// A namespace slot was written while no scope of that namespace was active.
    #[error("No active scope in namespace '{namespace}': run or bind must be called first")]
    NoActiveScope {
        /// The namespace name.
        namespace: String,
    },

    /// A namespace with this name is already registered.
    #[error("Namespace already exists: {0}")]
    NamespaceExists(String),

    /// A configuration value could not be parsed.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl NestingError {
    /// Creates a `NoActiveScope` error for the given namespace.
    #[must_use]
    pub fn no_active_scope(namespace: impl Into<String>) -> Self {
        Self::NoActiveScope {
            namespace: namespace.into(),
        }
    }
}

/// Error raised when an operation receives an unusable argument.
#[derive(Debug, Clone, Error)]
#[error("Invalid argument '{argument}': {message}")]
pub struct InvalidArgumentError {
    /// The argument name.
    pub argument: String,
    /// What was wrong with it.
    pub message: String,
}

impl InvalidArgumentError {
    /// Creates a new invalid argument error.
    #[must_use]
    pub fn new(argument: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            argument: argument.into(),
            message: message.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NestingError>;
