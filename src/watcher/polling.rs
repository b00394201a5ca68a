//! Change detection by periodically calling `stat` on the path.

use super::{WatchState, forward};
use crate::error::{Error, Result};
use crate::notifier::{self, ChangeNotifier, ChangeSender};
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Polls the file for changes.
#[derive(Debug, Clone)]
pub struct PollingWatcher {
    path: PathBuf,
    interval: Duration,
}

impl PollingWatcher {
    pub fn new<P: AsRef<Path>>(path: P, interval: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            interval,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) async fn block_until_exists(&self, cancel: &CancellationToken) -> Result<()> {
        loop {
            match fs::metadata(&self.path).await {
                Ok(_) => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Dying),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    pub(crate) fn watch_for_changes(
        &self,
        current: &Metadata,
        cancel: CancellationToken,
    ) -> ChangeNotifier {
        let (sender, mut notifier) = notifier::channel();
        let state = WatchState::new(&self.path, current);
        let task = tokio::spawn(poll_changes(state, self.interval, sender, cancel.clone()));
        notifier.attach(cancel, task);
        notifier
    }
}

async fn poll_changes(
    mut state: WatchState,
    interval: Duration,
    sender: ChangeSender,
    cancel: CancellationToken,
) {
    debug!(path = %state.path().display(), ?interval, "polling for changes");
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let stat = fs::metadata(state.path()).await;
        let observation = state.observe(stat);
        if forward(&state, observation, &sender).is_break() {
            break;
        }
    }
    debug!(path = %state.path().display(), "stopped polling");
}
