//! Async counterpart of [`NestedContext::bind`].

use super::NestedContext;
use crate::namespace::Scope;
use pin_project::pin_project;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A future running inside a [`NestedContext`].
///
/// Created by [`NestedContext::instrument`]. The context is entered on the
/// first poll, and its scope is active during every poll, so synchronous
/// `run` calls and further `instrument` calls made by the inner future nest
/// under it.
#[pin_project]
#[must_use = "futures do nothing unless polled"]
pub struct Nested<F> {
    context: NestedContext,
    scope: Scope,
    #[pin]
    future: F,
    entered: bool,
}

impl<F> Nested<F> {
    pub(crate) fn new(context: NestedContext, scope: Scope, future: F) -> Self {
        Self {
            context,
            scope,
            future,
            entered: false,
        }
    }
}

impl<F: Future> Future for Nested<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = this.scope.enter();
        if !*this.entered {
            *this.entered = true;
            this.context.enter(this.scope);
        }
        this.future.poll(cx)
    }
}

impl<F> fmt::Debug for Nested<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Nested")
            .field("context", &self.context)
            .field("scope", &self.scope)
            .field("entered", &self.entered)
            .finish()
    }
}
