//! Tail sessions: the driver task that follows a file and the stream of lines it yields.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::lifecycle::Lifecycle;
use crate::notifier::{Change, ChangeNotifier};
use crate::reader::{Line, LineReader};
use crate::watcher::FileWatcher;
use futures::Stream;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs::File;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lines buffered between the driver task and the consumer.
const LINE_BUFFER: usize = 64;

/// A running tail of one file.
///
/// Yields [`Line`]s in file order until the session ends. Once the stream is
/// exhausted, [`Tail::wait`] tells why it ended. Dropping the `Tail` stops the
/// driver task.
pub struct Tail {
    filename: PathBuf,
    receiver: mpsc::Receiver<Line>,
    lifecycle: Lifecycle,
}

impl Tail {
    /// Starts tailing `path` according to `config`.
    ///
    /// Fails right away if the configuration is invalid, or if
    /// `config.must_exist` is set and the file cannot be opened. Otherwise the
    /// file is opened by the driver task, which waits for it to appear when
    /// following.
    pub async fn start<P: AsRef<Path>>(path: P, config: Config) -> Result<Self> {
        config.validate()?;
        let filename = path.as_ref().to_path_buf();

        let file = if config.must_exist {
            match File::open(&filename).await {
                Ok(file) => Some(file),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(Error::NotFound {
                        path: filename.display().to_string(),
                    });
                }
                Err(e) => return Err(Error::open(filename.display().to_string(), e)),
            }
        } else {
            None
        };

        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        let lifecycle = Lifecycle::new();

        let session = Session {
            watcher: FileWatcher::new(&filename, &config),
            filename: filename.clone(),
            config,
            file,
            notifier: None,
            tx,
            cancel: lifecycle.child_token(),
        };
        tokio::spawn(run(session, lifecycle.clone()));

        Ok(Tail {
            filename,
            receiver: rx,
            lifecycle,
        })
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// Receives the next line, or `None` once the session has ended.
    pub async fn next_line(&mut self) -> Option<Line> {
        self.receiver.recv().await
    }

    /// Stops tailing and waits for the driver task to exit.
    ///
    /// Safe to call repeatedly or after the session ended on its own; every
    /// call returns the same result.
    pub async fn stop(&self) -> Result<()> {
        self.lifecycle.request_stop(None);
        self.lifecycle.join().await
    }

    /// Waits for the session to end and returns its terminal error, if any.
    pub async fn wait(&self) -> Result<()> {
        self.lifecycle.join().await
    }

    /// Handle for stopping or joining the session from another task.
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }
}

impl Drop for Tail {
    fn drop(&mut self) {
        self.lifecycle.request_stop(None);
    }
}

impl Stream for Tail {
    type Item = Line;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// State owned by the driver task.
struct Session {
    filename: PathBuf,
    config: Config,
    watcher: FileWatcher,
    /// Handle opened by [`Tail::start`] when the file had to exist.
    file: Option<File>,
    notifier: Option<ChangeNotifier>,
    tx: mpsc::Sender<Line>,
    cancel: CancellationToken,
}

/// Why the driver stopped waiting at end of file.
enum Wake {
    Changed,
    Truncated,
    Gone,
    Stopped,
}

/// Driver task: runs the session, then records how it ended.
async fn run(mut session: Session, lifecycle: Lifecycle) {
    let _done = lifecycle.done_guard();
    let path = session.display();

    let result = session.follow().await;
    if let Some(notifier) = session.notifier.take() {
        notifier.close().await;
    }
    // Closes the file handle and the output stream.
    drop(session);

    match result {
        Ok(()) => lifecycle.request_stop(None),
        Err(e) if e.is_dying() => lifecycle.request_stop(None),
        Err(e) => {
            warn!(%path, error = %e, "tail ended with error");
            lifecycle.request_stop(Some(e));
        }
    }
}

impl Session {
    fn display(&self) -> String {
        self.filename.display().to_string()
    }

    async fn follow(&mut self) -> Result<()> {
        let file = match self.file.take() {
            Some(file) => file,
            None => self.open().await?,
        };
        let mut reader = LineReader::new(file);

        // Only the first open seeks; reopened files are read from the start.
        let target = self.config.seek_target();
        reader
            .seek(target)
            .await
            .map_err(|e| Error::seek(self.display(), e))?;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            let raw = reader
                .next_line()
                .await
                .map_err(|e| Error::read(self.display(), e))?;
            if let Some(raw) = raw {
                if !self.emit(&raw).await {
                    return Ok(());
                }
                continue;
            }

            if !self.config.follow {
                self.flush_partial(&mut reader).await;
                return Ok(());
            }

            match self.wait_for_change(&reader).await? {
                Wake::Changed => {}
                Wake::Truncated => {
                    debug!(path = %self.filename.display(), "re-reading truncated file from the start");
                    reader
                        .seek(SeekFrom::Start(0))
                        .await
                        .map_err(|e| Error::seek(self.display(), e))?;
                }
                Wake::Stopped => return Ok(()),
                Wake::Gone => {
                    if !self.drain(&mut reader).await? {
                        return Ok(());
                    }
                    if let Some(notifier) = self.notifier.take() {
                        notifier.close().await;
                    }
                    if !self.config.reopen {
                        info!(path = %self.filename.display(), "finishing because file has been moved/deleted");
                        return Ok(());
                    }

                    info!(path = %self.filename.display(), "re-opening moved/deleted file");
                    drop(reader);
                    reader = LineReader::new(self.open().await?);
                    info!(path = %self.filename.display(), "successfully reopened");
                }
            }
        }
    }

    /// Opens the file, waiting for it to be created when following.
    async fn open(&self) -> Result<File> {
        loop {
            match File::open(&self.filename).await {
                Ok(file) => return Ok(file),
                Err(e) if e.kind() == io::ErrorKind::NotFound && self.config.follow => {
                    info!(path = %self.filename.display(), "waiting for file to appear");
                    self.watcher.block_until_exists(&self.cancel).await?;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(Error::NotFound {
                        path: self.display(),
                    });
                }
                Err(e) => return Err(Error::open(self.display(), e)),
            }
        }
    }

    /// Blocks until the file changes or the session is stopped.
    async fn wait_for_change(&mut self, reader: &LineReader) -> Result<Wake> {
        // One notifier per open file, armed lazily at the first end of file.
        let mut notifier = match self.notifier.take() {
            Some(notifier) => notifier,
            None => {
                let metadata = reader.metadata().await?;
                self.watcher
                    .watch_for_changes(&metadata, self.cancel.child_token())?
            }
        };

        let wake = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Ok(Wake::Stopped),
            change = notifier.recv() => change.map(|change| match change {
                Some(Change::Modified) => Wake::Changed,
                Some(Change::Truncated) => Wake::Truncated,
                None => Wake::Gone,
            }),
        };
        self.notifier = Some(notifier);
        wake
    }

    /// Reads what is left behind the handle of a deleted or renamed file,
    /// including a trailing partial line. The old handle stays readable.
    async fn drain(&self, reader: &mut LineReader) -> Result<bool> {
        while let Some(raw) = reader
            .next_line()
            .await
            .map_err(|e| Error::read(self.display(), e))?
        {
            if !self.emit(&raw).await {
                return Ok(false);
            }
        }
        Ok(self.flush_partial(reader).await)
    }

    /// Emits an unterminated last line once the handle is done being read.
    async fn flush_partial(&self, reader: &mut LineReader) -> bool {
        match reader.take_partial() {
            Some(raw) => self.emit(&raw).await,
            None => true,
        }
    }

    /// Sends one raw line, split per `max_line_size`. Returns false once the
    /// session should end: it was stopped or nobody is listening.
    async fn emit(&self, raw: &[u8]) -> bool {
        for line in Line::from_raw(raw, self.config.max_line_size) {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return false,
                sent = self.tx.send(line) => {
                    if sent.is_err() {
                        debug!(path = %self.filename.display(), "line receiver dropped");
                        return false;
                    }
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::TempLogFile;
    use std::time::Duration;
    use tokio_stream::StreamExt;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn polling(location: i64) -> Config {
        Config {
            location,
            follow: true,
            poll: true,
            poll_interval: Duration::from_millis(5),
            ..Config::default()
        }
    }

    async fn next_text(tail: &mut Tail) -> Option<String> {
        tokio::time::timeout(TIMEOUT, tail.next())
            .await
            .expect("timed out waiting for a line")
            .map(|line| line.text().into_owned())
    }

    #[tokio::test]
    async fn test_start_rejects_reopen_without_follow() {
        let file = TempLogFile::new().unwrap();
        let config = Config {
            reopen: true,
            ..Config::default()
        };

        let result = Tail::start(file.path(), config).await;
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn test_must_exist_on_missing_file() {
        let config = Config {
            follow: true,
            must_exist: true,
            ..Config::default()
        };

        let result = Tail::start("/no/such/file", config).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_missing_file_without_follow_fails_in_task() {
        let mut tail = Tail::start("/no/such/file", Config::default())
            .await
            .unwrap();

        assert!(next_text(&mut tail).await.is_none());
        let err = tail.wait().await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_reads_from_start_without_follow() {
        let file = TempLogFile::with_content("hello\nworld\n").unwrap();
        let config = Config {
            location: -1,
            ..Config::default()
        };
        let mut tail = Tail::start(file.path(), config).await.unwrap();

        assert_eq!(next_text(&mut tail).await.as_deref(), Some("hello"));
        assert_eq!(next_text(&mut tail).await.as_deref(), Some("world"));
        assert_eq!(next_text(&mut tail).await, None);
        assert!(tail.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_positive_location_is_byte_offset() {
        let file = TempLogFile::with_content("hello\nworld\n").unwrap();
        let config = Config {
            location: 6,
            ..Config::default()
        };
        let mut tail = Tail::start(file.path(), config).await.unwrap();

        assert_eq!(next_text(&mut tail).await.as_deref(), Some("world"));
        assert_eq!(next_text(&mut tail).await, None);
    }

    #[tokio::test]
    async fn test_partial_line_flushed_at_end_without_follow() {
        let file = TempLogFile::with_content("hello\nwor").unwrap();
        let config = Config {
            location: -1,
            ..Config::default()
        };
        let mut tail = Tail::start(file.path(), config).await.unwrap();

        assert_eq!(next_text(&mut tail).await.as_deref(), Some("hello"));
        assert_eq!(next_text(&mut tail).await.as_deref(), Some("wor"));
        assert_eq!(next_text(&mut tail).await, None);
    }

    #[tokio::test]
    async fn test_partial_line_held_while_following() {
        let file = TempLogFile::with_content("").unwrap();
        let mut tail = Tail::start(file.path(), polling(-1)).await.unwrap();

        file.append_content("hel").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        file.append_content("lo\n").unwrap();

        assert_eq!(next_text(&mut tail).await.as_deref(), Some("hello"));
        assert!(tail.stop().await.is_ok());
    }

    #[tokio::test]
    async fn test_stop_while_consumer_is_not_reading() {
        let content: String = (0..500).map(|i| format!("line {i}\n")).collect();
        let file = TempLogFile::with_content(&content).unwrap();
        let tail = Tail::start(file.path(), polling(-1)).await.unwrap();

        // The output buffer fills up; stopping must not depend on draining it.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let result = tokio::time::timeout(TIMEOUT, tail.stop()).await;
        assert!(result.expect("stop should not hang").is_ok());
    }

    #[tokio::test]
    async fn test_no_lines_after_stop() {
        let file = TempLogFile::with_content("one\ntwo\n").unwrap();
        let mut tail = Tail::start(file.path(), polling(0)).await.unwrap();

        tail.stop().await.unwrap();
        file.append_content("three\n").unwrap();

        assert_eq!(next_text(&mut tail).await, None);
    }

    #[tokio::test]
    async fn test_stop_from_another_task() {
        let file = TempLogFile::with_content("").unwrap();
        let mut tail = Tail::start(file.path(), polling(0)).await.unwrap();
        let lifecycle = tail.lifecycle().clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            lifecycle.request_stop(None);
        });

        assert_eq!(next_text(&mut tail).await, None);
        assert!(tail.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_dropping_tail_stops_driver() {
        let file = TempLogFile::with_content("").unwrap();
        let tail = Tail::start(file.path(), polling(0)).await.unwrap();
        let lifecycle = tail.lifecycle().clone();

        drop(tail);

        let result = tokio::time::timeout(TIMEOUT, lifecycle.join()).await;
        assert!(result.expect("driver should exit").is_ok());
    }

    #[tokio::test]
    async fn test_watcher_fault_ends_session() {
        let file = TempLogFile::with_content("hello\n").unwrap();
        let config = polling(0);
        let (sender, notifier) = crate::notifier::channel();
        sender.notify_failed(Error::from(io::Error::other("stat failed")));

        let (tx, mut rx) = mpsc::channel(LINE_BUFFER);
        let lifecycle = Lifecycle::new();
        let session = Session {
            watcher: FileWatcher::new(file.path(), &config),
            filename: file.path().to_path_buf(),
            config,
            file: Some(File::open(file.path()).await.unwrap()),
            notifier: Some(notifier),
            tx,
            cancel: lifecycle.child_token(),
        };
        tokio::spawn(run(session, lifecycle.clone()));

        let line = tokio::time::timeout(TIMEOUT, rx.recv()).await.unwrap();
        assert!(line.is_none());
        let err = tokio::time::timeout(TIMEOUT, lifecycle.join())
            .await
            .expect("driver should exit on a watcher fault")
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("stat failed"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_fault_ends_session() {
        // Opening a directory works, reading from it does not.
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            location: -1,
            ..Config::default()
        };
        let mut tail = Tail::start(dir.path(), config).await.unwrap();

        assert_eq!(next_text(&mut tail).await, None);
        let err = tail.wait().await.unwrap_err();
        assert!(matches!(err, Error::Read { .. }), "unexpected error: {err}");
        assert_eq!(tail.stop().await.unwrap_err().to_string(), err.to_string());
    }

    #[tokio::test]
    async fn test_lines_left_behind_removed_file_are_read() {
        let file = TempLogFile::with_content("a\n").unwrap();
        let mut tail = Tail::start(file.path(), polling(-1)).await.unwrap();
        assert_eq!(next_text(&mut tail).await.as_deref(), Some("a"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        file.append_content("b\nc\npart").unwrap();
        file.remove().unwrap();

        assert_eq!(next_text(&mut tail).await.as_deref(), Some("b"));
        assert_eq!(next_text(&mut tail).await.as_deref(), Some("c"));
        assert_eq!(next_text(&mut tail).await.as_deref(), Some("part"));
        assert_eq!(next_text(&mut tail).await, None);
        assert!(tail.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_filename_is_kept() {
        let file = TempLogFile::new().unwrap();
        let tail = Tail::start(file.path(), Config::default()).await.unwrap();

        assert_eq!(tail.filename(), file.path());
        tail.stop().await.unwrap();
    }
}
