//! Detection of changes to the followed file.
//!
//! Two strategies share one contract: [`PollingWatcher`] stats the path on a
//! fixed interval, [`NativeWatcher`] reacts to OS notifications delivered by
//! the notify crate. Both feed the same decision logic in [`WatchState`], so
//! the engine cannot tell them apart.

mod native;
mod polling;

pub use native::NativeWatcher;
pub use polling::PollingWatcher;

use crate::config::Config;
use crate::error::Result;
use crate::notifier::{ChangeNotifier, ChangeSender};
use std::fs::Metadata;
use std::io;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Watches one path, using the strategy selected by [`Config::poll`].
#[derive(Debug, Clone)]
pub enum FileWatcher {
    Polling(PollingWatcher),
    Native(NativeWatcher),
}

impl FileWatcher {
    pub fn new<P: AsRef<Path>>(path: P, config: &Config) -> Self {
        if config.poll {
            FileWatcher::Polling(PollingWatcher::new(path, config.poll_interval))
        } else {
            FileWatcher::Native(NativeWatcher::new(path))
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            FileWatcher::Polling(w) => w.path(),
            FileWatcher::Native(w) => w.path(),
        }
    }

    /// Waits until the path exists.
    ///
    /// Returns [`Error::Dying`](crate::Error::Dying) if `cancel` fires first.
    pub async fn block_until_exists(&self, cancel: &CancellationToken) -> Result<()> {
        match self {
            FileWatcher::Polling(w) => w.block_until_exists(cancel).await,
            FileWatcher::Native(w) => w.block_until_exists(cancel).await,
        }
    }

    /// Starts a monitoring task for the file whose metadata is `current`.
    ///
    /// The task stops when the file disappears, when `cancel` fires, or when
    /// the returned notifier is closed or dropped.
    pub fn watch_for_changes(
        &self,
        current: &Metadata,
        cancel: CancellationToken,
    ) -> Result<ChangeNotifier> {
        match self {
            FileWatcher::Polling(w) => Ok(w.watch_for_changes(current, cancel)),
            FileWatcher::Native(w) => w.watch_for_changes(current, cancel),
        }
    }
}

/// Device and inode of a file, used to tell a rotated file from the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileIdentity {
    dev: u64,
    ino: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    pub fn of(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }

    /// Without inodes, only disappearance of the path is detected as rotation.
    #[cfg(not(unix))]
    pub fn of(_metadata: &Metadata) -> Self {
        Self { dev: 0, ino: 0 }
    }
}

/// What a single look at the path revealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Observation {
    Deleted,
    Truncated,
    Modified,
    Unchanged,
}

/// Last known state of the watched file, private to one monitoring task.
#[derive(Debug)]
pub(crate) struct WatchState {
    path: PathBuf,
    identity: FileIdentity,
    last_size: u64,
    // Unknown at start, so the first observation always reports a change.
    last_modified: Option<SystemTime>,
}

impl WatchState {
    pub(crate) fn new(path: &Path, current: &Metadata) -> Self {
        Self {
            path: path.to_path_buf(),
            identity: FileIdentity::of(current),
            last_size: current.len(),
            last_modified: None,
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Compares a fresh `stat` of the path against the last known state.
    ///
    /// Checks run in priority order: missing path, different file, shrunk
    /// size, then modification time or growth.
    pub(crate) fn observe(&mut self, stat: io::Result<Metadata>) -> io::Result<Observation> {
        let metadata = match stat {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Observation::Deleted),
            Err(e) => return Err(e),
        };

        if FileIdentity::of(&metadata) != self.identity {
            return Ok(Observation::Deleted);
        }

        let size = metadata.len();
        let previous_size = self.last_size;
        self.last_size = size;
        if size < previous_size {
            return Ok(Observation::Truncated);
        }

        let modified = metadata.modified().ok();
        if modified != self.last_modified || size > previous_size {
            self.last_modified = modified;
            return Ok(Observation::Modified);
        }

        Ok(Observation::Unchanged)
    }
}

/// Hands an observation to the engine. Breaks once the watch is over.
pub(crate) fn forward(
    state: &WatchState,
    observation: io::Result<Observation>,
    sender: &ChangeSender,
) -> ControlFlow<()> {
    match observation {
        Ok(Observation::Deleted) => {
            debug!(path = %state.path().display(), "file moved or deleted");
            sender.notify_deleted();
            ControlFlow::Break(())
        }
        Ok(Observation::Truncated) => {
            debug!(path = %state.path().display(), "file truncated");
            sender.notify_truncated();
            ControlFlow::Continue(())
        }
        Ok(Observation::Modified) => {
            sender.notify_modified();
            ControlFlow::Continue(())
        }
        Ok(Observation::Unchanged) => ControlFlow::Continue(()),
        Err(e) => {
            warn!(path = %state.path().display(), error = %e, "unable to stat watched file");
            sender.notify_failed(e.into());
            ControlFlow::Break(())
        }
    }
}
