//! A library for following files the way `tail -F` does.
//!
//! Lines appended to the file are emitted as an async stream. Tailing
//! survives truncation, and with [`Config::reopen`] also deletion and
//! rotation of the file. Changes are detected through OS notifications, or
//! by polling with [`Config::poll`].
//!
//! # Example
//!
//! ```rust,no_run
//! use log_tail::{Config, tail_file};
//! use tokio_stream::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         follow: true,
//!         reopen: true,
//!         ..Config::default()
//!     };
//!     let mut tail = tail_file("app.log", config).await?;
//!
//!     while let Some(line) = tail.next().await {
//!         println!("{}", line.text());
//!     }
//!     tail.wait().await?;
//!
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod lifecycle;
mod notifier;
mod reader;
mod stream;
mod watcher;

#[cfg(test)]
mod test_helpers;

// Public API exports
pub use config::{Config, DEFAULT_POLL_INTERVAL};
pub use error::{Error, Result};
pub use lifecycle::Lifecycle;
pub use notifier::{Change, ChangeNotifier};
pub use reader::Line;
pub use stream::Tail;
pub use watcher::{FileIdentity, FileWatcher, NativeWatcher, PollingWatcher};

use std::path::Path;

/// Starts tailing a file.
///
/// Returns as soon as the driver task is scheduled. Must be called from
/// within a tokio runtime.
///
/// # Arguments
///
/// * `path` - File path to follow
/// * `config` - Start location, follow/reopen behaviour and watcher choice
///
/// # Example
///
/// ```rust,no_run
/// use log_tail::{Config, tail_file};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     // Print the whole file, then stop.
///     let config = Config { location: -1, ..Config::default() };
///     let mut tail = tail_file("app.log", config).await?;
///
///     while let Some(line) = tail.next_line().await {
///         println!("{}", line.text());
///     }
///
///     Ok(())
/// }
/// ```
pub async fn tail_file<P: AsRef<Path>>(path: P, config: Config) -> Result<Tail> {
    Tail::start(path, config).await
}
