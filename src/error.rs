//! Error types for the log tail library.

use std::io;
use std::sync::Arc;
use thiserror::Error;

/// The main error type for tail operations.
///
/// Errors are cheap to clone so the terminal error of a session can be handed
/// out by every call to [`Tail::wait`](crate::Tail::wait) and
/// [`Tail::stop`](crate::Tail::stop).
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// I/O errors when reading files or watching for changes.
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    /// File watching errors from the notify crate.
    #[error("File watcher error: {0}")]
    Watcher(Arc<notify::Error>),

    /// The file was required to exist when tailing started.
    #[error("File does not exist: {path}")]
    NotFound { path: String },

    /// The configuration breaks an invariant, e.g. `reopen` without `follow`.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Opening the file failed for a reason other than it being absent.
    #[error("Unable to open file {path}: {source}")]
    Open { path: String, source: Arc<io::Error> },

    /// Seeking to the configured start location failed.
    #[error("Seek error on {path}: {source}")]
    Seek { path: String, source: Arc<io::Error> },

    /// Reading from the open file failed.
    #[error("Error reading {path}: {source}")]
    Read { path: String, source: Arc<io::Error> },

    /// A blocking wait was interrupted because the session is stopping.
    #[error("Tail is dying")]
    Dying,
}

impl Error {
    pub(crate) fn open(path: impl Into<String>, source: io::Error) -> Self {
        Error::Open {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn seek(path: impl Into<String>, source: io::Error) -> Self {
        Error::Seek {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn read(path: impl Into<String>, source: io::Error) -> Self {
        Error::Read {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Returns true if this error only reports that the session was cancelled.
    pub(crate) fn is_dying(&self) -> bool {
        matches!(self, Error::Dying)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl From<notify::Error> for Error {
    fn from(err: notify::Error) -> Self {
        Error::Watcher(Arc::new(err))
    }
}

/// A convenient Result type for log tail operations.
pub type Result<T> = std::result::Result<T, Error>;
