//! File watching functionality using the notify crate.
//!
//! Rename and delete are only reported reliably for the containing directory,
//! so the watch is placed on the parent and events are filtered by file name.

use super::{WatchState, forward};
use crate::error::{Error, Result};
use crate::notifier::{self, ChangeNotifier, ChangeSender};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

type EventReceiver = mpsc::UnboundedReceiver<notify::Result<Event>>;

/// Watches the file through OS change notifications.
#[derive(Debug, Clone)]
pub struct NativeWatcher {
    path: PathBuf,
    file_name: String,
}

impl NativeWatcher {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        Self { path, file_name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) async fn block_until_exists(&self, cancel: &CancellationToken) -> Result<()> {
        // Subscribe before checking so a creation in between is not missed.
        let (_watcher, mut events) = subscribe(&self.path)?;
        loop {
            match fs::metadata(&self.path).await {
                Ok(_) => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Dying),
                event = events.recv() => match event {
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(notify::Error::generic("event channel closed").into()),
                },
            }
        }
    }

    pub(crate) fn watch_for_changes(
        &self,
        current: &Metadata,
        cancel: CancellationToken,
    ) -> Result<ChangeNotifier> {
        let (watcher, events) = subscribe(&self.path)?;
        let (sender, mut notifier) = notifier::channel();
        let state = WatchState::new(&self.path, current);
        let task = tokio::spawn(forward_events(
            watcher,
            events,
            state,
            self.file_name.clone(),
            sender,
            cancel.clone(),
        ));
        notifier.attach(cancel, task);
        Ok(notifier)
    }
}

/// Starts watching the directory containing `path`.
fn subscribe(path: &Path) -> Result<(RecommendedWatcher, EventReceiver)> {
    let (tx, rx) = mpsc::unbounded_channel();

    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = tx.send(res);
        },
        Config::default(),
    )?;
    watcher.watch(&watch_dir(path), RecursiveMode::NonRecursive)?;

    Ok((watcher, rx))
}

/// Directory to subscribe to for `path`; bare file names live in the current directory.
fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

async fn forward_events(
    _watcher: RecommendedWatcher,
    mut events: EventReceiver,
    mut state: WatchState,
    file_name: String,
    sender: ChangeSender,
    cancel: CancellationToken,
) {
    debug!(path = %state.path().display(), "watching for change events");
    // Anything written between the last read and the subscription shows up
    // in the first comparison.
    let mut check = true;
    loop {
        if check {
            let stat = fs::metadata(state.path()).await;
            let observation = state.observe(stat);
            if forward(&state, observation, &sender).is_break() {
                break;
            }
        }

        check = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(Ok(event)) => is_change_to_file(&event, &file_name),
                Some(Err(e)) => {
                    sender.notify_failed(e.into());
                    break;
                }
                None => break,
            },
        };
    }
    debug!(path = %state.path().display(), "stopped watching for change events");
}

/// Events that can change the content or location of the file.
fn is_change_to_file(event: &Event, file_name: &str) -> bool {
    !matches!(event.kind, EventKind::Access(_)) && is_event_relevant_to_file(event, file_name)
}

/// Check if a notify event is relevant to a specific file
fn is_event_relevant_to_file(event: &Event, target_file_name: &str) -> bool {
    event.paths.iter().any(|path| {
        path.file_name()
            .map(|name| name.to_string_lossy() == target_file_name)
            .unwrap_or(false)
    })
}
