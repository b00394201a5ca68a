//! Line reading over an open file handle.

use chrono::{DateTime, Utc};
use std::borrow::Cow;
use std::fs::Metadata;
use std::io::{self, SeekFrom};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

/// A line read from the tailed file.
///
/// The content is kept as the raw bytes found in the file, so fragments of a
/// split line join back to the original exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Line content without the trailing newline.
    pub bytes: Vec<u8>,
    /// When the line was read. Fragments of a split line share one timestamp.
    pub time: DateTime<Utc>,
}

impl Line {
    pub fn new(bytes: impl Into<Vec<u8>>, time: DateTime<Utc>) -> Self {
        Self {
            bytes: bytes.into(),
            time,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The content as text. Invalid UTF-8 is replaced with U+FFFD.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    /// Builds the lines to emit for one raw line, splitting it when
    /// `max_line_size` is non-zero and the line is longer.
    pub(crate) fn from_raw(raw: &[u8], max_line_size: usize) -> Vec<Line> {
        let now = Utc::now();
        if max_line_size > 0 && raw.len() > max_line_size {
            split_line(raw, max_line_size)
                .into_iter()
                .map(|fragment| Line::new(fragment, now))
                .collect()
        } else {
            vec![Line::new(raw, now)]
        }
    }
}

/// Splits a line into consecutive chunks of `chunk_size` bytes, the last one
/// possibly shorter. An empty line yields no chunks.
pub(crate) fn split_line(line: &[u8], chunk_size: usize) -> Vec<&[u8]> {
    debug_assert!(chunk_size > 0, "chunk size must be positive");
    line.chunks(chunk_size.max(1)).collect()
}

/// Buffered, newline-delimited reader that keeps an incomplete trailing line
/// until its newline arrives.
#[derive(Debug)]
pub(crate) struct LineReader {
    reader: BufReader<File>,
    partial: Vec<u8>,
}

impl LineReader {
    pub(crate) fn new(file: File) -> Self {
        Self {
            reader: BufReader::new(file),
            partial: Vec::new(),
        }
    }

    /// Reads the next complete line, without its `\n` or `\r\n`.
    ///
    /// Returns `None` at end of file. Bytes of an unterminated last line are
    /// kept and completed by later reads.
    pub(crate) async fn next_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        self.reader.read_until(b'\n', &mut self.partial).await?;
        if self.partial.last() != Some(&b'\n') {
            return Ok(None);
        }

        let mut line = std::mem::take(&mut self.partial);
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    /// Hands out the unterminated trailing line, if any.
    pub(crate) fn take_partial(&mut self) -> Option<Vec<u8>> {
        if self.partial.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.partial))
        }
    }

    /// Moves the read position and drops anything buffered.
    pub(crate) async fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.partial.clear();
        self.reader.seek(pos).await
    }

    pub(crate) async fn metadata(&self) -> io::Result<Metadata> {
        self.reader.get_ref().metadata().await
    }
}
