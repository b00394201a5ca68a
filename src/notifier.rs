//! One-shot change signal shared between a watcher task and the tail engine.
//!
//! The producer side (`ChangeSender`) lives in the watcher task and reports
//! modifications and truncations. Dropping it, or calling `notify_deleted`,
//! closes the channel, which the consumer sees as the file having been
//! deleted or rotated away.

use crate::error::{Error, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A change observed on the followed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// New data may have been written.
    Modified,
    /// The file shrank; previously read offsets are no longer valid.
    Truncated,
}

#[derive(Debug, Default)]
struct Pending {
    modified: bool,
    truncated: bool,
    closed: bool,
    fault: Option<Error>,
}

#[derive(Debug, Default)]
struct Shared {
    pending: Mutex<Pending>,
    wakeup: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, f: impl FnOnce(&mut Pending)) {
        f(&mut self.lock());
        self.wakeup.notify_one();
    }
}

/// Creates a connected sender/notifier pair.
///
/// Signals coalesce: the consumer only ever sees the latest state, so the
/// producer never blocks. A pending truncation takes precedence over a
/// pending modification.
pub(crate) fn channel() -> (ChangeSender, ChangeNotifier) {
    let shared = Arc::new(Shared::default());
    let sender = ChangeSender {
        shared: Arc::clone(&shared),
    };
    let notifier = ChangeNotifier {
        shared,
        cancel: CancellationToken::new(),
        task: None,
    };
    (sender, notifier)
}

/// Producer half, owned by a watcher task.
#[derive(Debug)]
pub(crate) struct ChangeSender {
    shared: Arc<Shared>,
}

impl ChangeSender {
    pub(crate) fn notify_modified(&self) {
        self.shared.update(|p| p.modified = true);
    }

    pub(crate) fn notify_truncated(&self) {
        self.shared.update(|p| p.truncated = true);
    }

    /// Closes the channel: the file is gone from its path.
    pub(crate) fn notify_deleted(&self) {
        self.shared.update(|p| p.closed = true);
    }

    /// Closes the channel with a watcher fault the engine must surface.
    pub(crate) fn notify_failed(&self, err: Error) {
        self.shared.update(|p| {
            p.fault.get_or_insert(err);
            p.closed = true;
        });
    }
}

impl Drop for ChangeSender {
    fn drop(&mut self) {
        self.shared.update(|p| p.closed = true);
    }
}

/// Consumer half, owned by the tail engine.
///
/// Dropping or [closing](ChangeNotifier::close) it cancels the watcher task
/// that feeds it.
#[derive(Debug)]
pub struct ChangeNotifier {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ChangeNotifier {
    /// Ties the lifetime of the producing task to this notifier.
    pub(crate) fn attach(&mut self, cancel: CancellationToken, task: JoinHandle<()>) {
        self.cancel = cancel;
        self.task = Some(task);
    }

    /// Waits for the next signal.
    ///
    /// Returns `Ok(Some(change))` for a modification or truncation, `Ok(None)`
    /// once the file has been deleted or renamed, and `Err` if the watcher
    /// failed. After a close, every further call returns the same outcome.
    pub async fn recv(&mut self) -> Result<Option<Change>> {
        loop {
            {
                let mut pending = self.shared.lock();
                if pending.truncated {
                    pending.truncated = false;
                    pending.modified = false;
                    return Ok(Some(Change::Truncated));
                }
                if pending.modified {
                    pending.modified = false;
                    return Ok(Some(Change::Modified));
                }
                if let Some(err) = &pending.fault {
                    return Err(err.clone());
                }
                if pending.closed {
                    return Ok(None);
                }
            }
            self.shared.wakeup.notified().await;
        }
    }

    /// Stops the watcher task and waits for it to exit.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                debug!(error = %err, "watcher task ended abnormally");
            }
        }
    }
}

impl Drop for ChangeNotifier {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
