use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution state of a single target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogState {
    /// Created on first entry, actions still in flight
    Running,
    /// Every action finished or had its failure ignored
    Success,
    /// An action failed without `ignoreFailure`, or the run was cancelled
    Failed,
}

impl fmt::Display for LogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogState::Running => write!(f, "Running"),
            LogState::Success => write!(f, "Success"),
            LogState::Failed => write!(f, "Failed"),
        }
    }
}

/// All output recorded for one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonLog {
    pub state: LogState,
    pub entries: Vec<JsonLogEntry>,
}

impl JsonLog {
    pub(crate) fn new() -> Self {
        Self {
            state: LogState::Running,
            entries: Vec::new(),
        }
    }

    /// Entries that recorded an error
    pub fn failures(&self) -> impl Iterator<Item = &JsonLogEntry> {
        self.entries.iter().filter(|e| e.is_error())
    }
}

/// The details of one task run against a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonLogEntry {
    pub created: DateTime<Utc>,
    #[serde(rename = "task")]
    pub task_name: String,
    pub entry: String,
    #[serde(rename = "error")]
    pub err: String,
}

impl JsonLogEntry {
    pub fn new(task: &str, entry: &str, err: &str) -> Self {
        Self {
            created: Utc::now(),
            task_name: task.to_string(),
            entry: entry.to_string(),
            err: err.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        !self.err.is_empty()
    }
}
