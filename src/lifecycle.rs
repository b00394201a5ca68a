//! Cooperative cancellation and completion for background tasks.

use crate::error::{Error, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Shared stop/join handle between a background task and its owners.
///
/// Any clone may request a stop; the owning task marks itself done exactly
/// once, after which [`Lifecycle::join`] resolves with the recorded error.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    token: CancellationToken,
    reason: Mutex<Option<Error>>,
    done: watch::Sender<bool>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (done, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                token: CancellationToken::new(),
                reason: Mutex::new(None),
                done,
            }),
        }
    }

    /// Asks the task to stop, optionally recording why.
    ///
    /// Idempotent and non-blocking. The first error recorded wins, and nothing
    /// is recorded once the task has finished.
    pub fn request_stop(&self, err: Option<Error>) {
        if let Some(err) = err {
            let mut reason = self.lock_reason();
            if !self.is_done() {
                reason.get_or_insert(err);
            }
        }
        self.inner.token.cancel();
    }

    pub fn is_stopping(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Completes once a stop has been requested.
    pub fn stopping(&self) -> WaitForCancellationFuture<'_> {
        self.inner.token.cancelled()
    }

    /// Token cancelled together with this lifecycle, for tasks it supervises.
    pub(crate) fn child_token(&self) -> CancellationToken {
        self.inner.token.child_token()
    }

    pub fn is_done(&self) -> bool {
        *self.inner.done.borrow()
    }

    /// Marks the owning task as finished.
    pub(crate) fn mark_done(&self) {
        let _reason = self.lock_reason();
        self.inner.done.send_replace(true);
    }

    /// Returns a guard that marks the task done when dropped, on every exit path.
    pub(crate) fn done_guard(&self) -> DoneGuard {
        DoneGuard {
            lifecycle: self.clone(),
        }
    }

    /// The error recorded so far, if any.
    pub fn err(&self) -> Option<Error> {
        self.lock_reason().clone()
    }

    fn lock_reason(&self) -> MutexGuard<'_, Option<Error>> {
        self.inner
            .reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits until the task is done and returns its terminal error.
    pub async fn join(&self) -> Result<()> {
        let mut done = self.inner.done.subscribe();
        // The sender lives in `inner`, so the channel cannot close while we wait.
        let _ = done.wait_for(|finished| *finished).await;
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct DoneGuard {
    lifecycle: Lifecycle,
}

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.lifecycle.mark_done();
    }
}
