//! Test utilities for creating, rotating and truncating temporary log files.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct TempLogFile {
    pub path: PathBuf,
    temp_dir: tempfile::TempDir,
}

impl TempLogFile {
    /// Create a new, empty temporary log file
    pub fn new() -> std::io::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("test.log");

        File::create(&path)?;

        Ok(Self { path, temp_dir })
    }

    /// Create a temporary log file with exactly `content`
    pub fn with_content(content: &str) -> std::io::Result<Self> {
        let temp_file = Self::new()?;
        temp_file.append_content(content)?;
        Ok(temp_file)
    }

    /// Append raw content, without adding a newline
    pub fn append_content(&self, content: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;

        file.write_all(content.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Truncate the file in place and write new content (same inode)
    pub fn rewrite(&self, content: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        file.write_all(content.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Create the file again at the original path (new inode)
    pub fn recreate(&self, content: &str) -> std::io::Result<()> {
        fs::write(&self.path, content)
    }

    pub fn remove(&self) -> std::io::Result<()> {
        fs::remove_file(&self.path)
    }

    /// Rename the file within the temporary directory (simulate log rotation)
    pub fn rename(&self, new_name: &str) -> std::io::Result<()> {
        fs::rename(&self.path, self.temp_dir.path().join(new_name))
    }

    /// Get the path to the temporary file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temp_log_file_creation() {
        let temp_file = TempLogFile::new().unwrap();
        assert!(temp_file.path().exists());
    }

    #[tokio::test]
    async fn test_temp_log_file_with_content() {
        let temp_file = TempLogFile::with_content("test line\n").unwrap();

        let file_content = fs::read_to_string(temp_file.path()).unwrap();
        assert_eq!(file_content, "test line\n");
    }

    #[tokio::test]
    async fn test_append_content() {
        let temp_file = TempLogFile::new().unwrap();
        temp_file.append_content("line 1\n").unwrap();
        temp_file.append_content("line 2").unwrap();

        let content = fs::read_to_string(temp_file.path()).unwrap();
        assert_eq!(content, "line 1\nline 2");
    }

    #[tokio::test]
    async fn test_rewrite() {
        let temp_file = TempLogFile::with_content("initial content").unwrap();
        temp_file.rewrite("new").unwrap();

        let content = fs::read_to_string(temp_file.path()).unwrap();
        assert_eq!(content, "new");
    }

    #[tokio::test]
    async fn test_rename_and_recreate() {
        let temp_file = TempLogFile::with_content("old\n").unwrap();
        temp_file.rename("test.log.1").unwrap();
        assert!(!temp_file.path().exists());

        temp_file.recreate("fresh\n").unwrap();
        let content = fs::read_to_string(temp_file.path()).unwrap();
        assert_eq!(content, "fresh\n");
    }
}
