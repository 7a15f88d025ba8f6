//! Append-only mirror of log entries in a plain text file
//!
//! One line per entry: `<rfc3339> [<target>] <task>: <entry>` with ` (error: ...)`
//! appended for failures. Write errors are reported through tracing only.

use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use crate::entry::{JsonLogEntry, LogState};
use crate::error::{LogError, Result};

pub struct FileLogger {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileLogger {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| LogError::FileOpen {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write_entry(&self, target: &str, entry: &JsonLogEntry) {
        let mut line = format!(
            "{} [{}] {}: {}",
            entry.created.to_rfc3339(),
            target,
            entry.task_name,
            entry.entry.trim_end()
        );
        if entry.is_error() {
            line.push_str(&format!(" (error: {})", entry.err));
        }
        line.push('\n');
        self.append(&line).await;
    }

    pub async fn write_state(&self, target: &str, state: LogState) {
        let line = format!(
            "{} [{}] state: {}\n",
            chrono::Utc::now().to_rfc3339(),
            target,
            state
        );
        self.append(&line).await;
    }

    async fn append(&self, line: &str) {
        let mut file = self.file.lock().await;
        if let Err(e) = file.write_all(line.as_bytes()).await {
            warn!(path = %self.path.display(), error = %e, "Failed to write log file");
            return;
        }
        if let Err(e) = file.flush().await {
            warn!(path = %self.path.display(), error = %e, "Failed to flush log file");
        }
    }
}
