use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::entry::{JsonLog, JsonLogEntry, LogState};
use crate::error::Result;
use crate::file_logger::FileLogger;
use crate::json_logger::JsonLogger;

/// Structured execution logger shared by every worker of a run
#[derive(Clone)]
pub struct Logger {
    json: Arc<JsonLogger>,
    file: Option<Arc<FileLogger>>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    /// In-memory logging only
    pub fn new() -> Self {
        Self {
            json: Arc::new(JsonLogger::new()),
            file: None,
        }
    }

    /// In-memory logging mirrored into `path`
    pub async fn with_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = FileLogger::open(path).await?;
        debug!(path = %file.path().display(), "File logging enabled");
        let mut logger = Self::new();
        logger.file = Some(Arc::new(file));
        Ok(logger)
    }

    /// Append an entry for `target`, creating its log in state Running if needed.
    pub async fn write_entry(&self, target: &str, task: &str, entry: &str, err: &str) {
        let new_entry = JsonLogEntry::new(task, entry, err);

        if let Some(file) = &self.file {
            file.write_entry(target, &new_entry).await;
        }
        self.json.write_entry(target, new_entry).await;
    }

    /// Move `target` to `state`; fails if the target has never been written to.
    pub async fn set_state(&self, target: &str, state: LogState) -> Result<()> {
        if let Err(e) = self.json.set_state(target, state).await {
            warn!(error = %e, "Unable to set logging state");
            return Err(e);
        }
        if let Some(file) = &self.file {
            file.write_state(target, state).await;
        }
        Ok(())
    }

    pub async fn get_log(&self, target: &str) -> Result<JsonLog> {
        self.json.get(target).await
    }

    pub async fn delete_log(&self, target: &str) -> Result<()> {
        self.json.delete(target).await
    }

    /// Targets that currently have a log, sorted
    pub async fn targets(&self) -> Vec<String> {
        self.json.targets().await
    }

    /// Copy of every target's log
    pub async fn snapshot(&self) -> HashMap<String, JsonLog> {
        self.json.snapshot().await
    }
}
