//! Persistent log buffer
//!
//! Appends entries as JSON lines so a "share logs" screen can read them back
//! after a restart.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    time::{LogEntry, LogLevel, LoggerSink},
};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

/// [`LoggerSink`] that appends to a JSON-lines file.
pub struct FileLogSink {
    path: PathBuf,
    min_level: LogLevel,
    // Serializes appends from concurrent tracing events
    write_lock: Mutex<()>,
}

impl FileLogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            min_level: LogLevel::Info,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Platform data directory log file for the application.
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("notes-sync")
            .join("sync.log")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored entries in timestamp order.
    ///
    /// Lines that fail to parse are skipped.
    pub async fn read_entries(&self) -> Result<Vec<LogEntry>> {
        let _guard = self.write_lock.lock().await;

        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BridgeError::Io(e)),
        };

        let mut entries: Vec<LogEntry> = contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable log line");
                    None
                }
            })
            .collect();
        entries.sort_by_key(|entry| entry.timestamp);
        Ok(entries)
    }

    /// Delete every stored entry.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BridgeError::Io(e)),
        }
    }
}

#[async_trait]
impl LoggerSink for FileLogSink {
    async fn log(&self, entry: LogEntry) -> Result<()> {
        if entry.level < self.min_level {
            return Ok(());
        }

        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        self.min_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_append_and_read_back() {
        let dir = TempDir::new().unwrap();
        let sink = FileLogSink::new(dir.path().join("logs").join("sync.log"));

        sink.log(LogEntry::new(LogLevel::Info, "core_sync", "Sync started"))
            .await
            .unwrap();
        sink.log(
            LogEntry::new(LogLevel::Warn, "core_sync", "Sync failed")
                .with_field("kind", "network"),
        )
        .await
        .unwrap();

        let entries = sink.read_entries().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "Sync started");
        assert_eq!(entries[1].fields.get("kind").map(String::as_str), Some("network"));
    }

    #[tokio::test]
    async fn test_filters_below_min_level() {
        let dir = TempDir::new().unwrap();
        let sink = FileLogSink::new(dir.path().join("sync.log")).with_min_level(LogLevel::Warn);

        sink.log(LogEntry::new(LogLevel::Debug, "core_sync", "noise"))
            .await
            .unwrap();
        sink.log(LogEntry::new(LogLevel::Error, "core_sync", "boom"))
            .await
            .unwrap();

        let entries = sink.read_entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, LogLevel::Error);
    }

    #[tokio::test]
    async fn test_clear_and_garbage_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sync.log");
        let sink = FileLogSink::new(&path);

        assert!(sink.read_entries().await.unwrap().is_empty());

        sink.log(LogEntry::new(LogLevel::Info, "core_sync", "ok"))
            .await
            .unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).await.unwrap();
        file.write_all(b"not json\n").await.unwrap();

        assert_eq!(sink.read_entries().await.unwrap().len(), 1);

        sink.clear().await.unwrap();
        sink.clear().await.unwrap();
        assert!(sink.read_entries().await.unwrap().is_empty());
    }
}
