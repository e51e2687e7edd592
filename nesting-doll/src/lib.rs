//! # Nesting Doll
//!
//! Causal tracking of nested asynchronous execution contexts.
//!
//! When a request handler starts a transaction, which in turn starts a
//! sub-transaction, each of those units of work is a [`NestedContext`]. On
//! entry every context records:
//!
//! - **outer**: the active context that began its causal chain
//! - **previous**: the active context that was current just before it
//!
//! Chains are kept apart by continuation-local [`namespace`] scopes, so flows
//! interleaved on one executor never see each other's contexts.
//!
//! ## Quick Start
//!
//! ```rust
//! use nesting_doll::prelude::*;
//!
//! let tracker = ContextTracker::new();
//! let request = tracker.create_context("request", None)?;
//! let transaction = tracker.create_context("transaction", None)?;
//!
//! request.activate();
//! request.run(|| {
//!     transaction.run(|| {
//!         // work attributed to `transaction` nested in `request`
//!     });
//! });
//!
//! assert_eq!(transaction.outer(), Some(request.clone()));
//! assert_eq!(transaction.previous(), Some(request));
//! # Ok::<(), NestingError>(())
//! ```
//!
//! Async work uses [`NestedContext::instrument`], which enters the context on
//! the first poll and keeps its scope active across `.await` points.

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod errors;
pub mod namespace;
pub mod nest;
pub mod testing;
pub mod tracker;

pub use config::{ActivationPolicy, TrackerConfig};
pub use errors::{InvalidArgumentError, NestingError, Result};
pub use nest::{Nested, NestedContext, PayloadMap};
pub use tracker::ContextTracker;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{ActivationPolicy, TrackerConfig};
    pub use crate::errors::NestingError;
    pub use crate::namespace::{Namespace, Scope};
    pub use crate::nest::{Nested, NestedContext, PayloadMap};
    pub use crate::tracker::ContextTracker;
}
