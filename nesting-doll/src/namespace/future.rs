//! Carrying a scope across `.await` points.

use super::Scope;
use pin_project::pin_project;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A future that runs with a fixed scope active during every poll.
///
/// Executors may poll a future from any worker thread and interleave it with
/// unrelated futures, so the thread-local active scope cannot be trusted
/// across an `.await`. `InScope` re-enters its scope before each poll and
/// restores whatever was active afterwards.
#[pin_project]
#[must_use = "futures do nothing unless polled"]
pub struct InScope<F> {
    scope: Scope,
    #[pin]
    future: F,
}

impl<F> InScope<F> {
    pub(crate) fn new(scope: Scope, future: F) -> Self {
        Self { scope, future }
    }
}

impl<F: Future> Future for InScope<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = this.scope.enter();
        this.future.poll(cx)
    }
}

impl<F> fmt::Debug for InScope<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InScope").field("scope", &self.scope).finish()
    }
}
