//! Nested contexts ("dolls") and their causal bookkeeping.
//!
//! This module provides:
//! - [`NestedContext`], which records its outer and previous context on entry
//! - [`Nested`], the future wrapper returned by [`NestedContext::instrument`]
//! - [`Payload`], the opaque key/value data each context owns

mod context;
mod future;
mod payload;

pub use context::{NestedContext, CURRENT_SLOT, OUTER_SLOT};
pub use future::Nested;
pub use payload::{Payload, PayloadMap};
