//! Tail configuration.

use crate::error::{Error, Result};
use std::io::SeekFrom;
use std::time::Duration;

/// Interval between two `stat` calls of the polling watcher.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Controls where tailing starts and how the file is followed.
///
/// ```rust
/// use log_tail::Config;
///
/// // tail -F from the start of the file
/// let config = Config {
///     location: -1,
///     follow: true,
///     reopen: true,
///     ..Config::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Start location: `0` tails from the end of the file, `N > 0` starts at
    /// byte `N`, and `-N` starts at byte `N - 1` (so `-1` is the start).
    pub location: i64,
    /// Keep reading past end of file, waiting for new writes (tail -f).
    pub follow: bool,
    /// Reopen the file when it is deleted or rotated (tail -F). Requires `follow`.
    pub reopen: bool,
    /// Fail at start if the file does not exist.
    pub must_exist: bool,
    /// Poll the file with `stat` instead of using OS change notification.
    pub poll: bool,
    /// Split lines longer than this many bytes into fragments. `0` disables splitting.
    pub max_line_size: usize,
    /// How often the polling watcher checks the file.
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            location: 0,
            follow: false,
            reopen: false,
            must_exist: false,
            poll: false,
            max_line_size: 0,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl Config {
    /// Checks invariants between fields.
    pub fn validate(&self) -> Result<()> {
        if self.reopen && !self.follow {
            return Err(Error::InvalidConfig {
                message: "cannot set reopen without follow".to_string(),
            });
        }
        Ok(())
    }

    /// Seek target for the first open of the file.
    pub fn seek_target(&self) -> SeekFrom {
        match self.location {
            0 => SeekFrom::End(0),
            n if n > 0 => SeekFrom::Start(n as u64),
            n => SeekFrom::Start(n.unsigned_abs() - 1),
        }
    }
}
