//! In-memory logs keyed by target

use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::entry::{JsonLog, JsonLogEntry, LogState};
use crate::error::{LogError, Result};

#[derive(Default)]
pub struct JsonLogger {
    logs: RwLock<HashMap<String, JsonLog>>,
}

impl JsonLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn write_entry(&self, target: &str, entry: JsonLogEntry) {
        let mut logs = self.logs.write().await;
        let log = logs.entry(target.to_string()).or_insert_with(|| {
            debug!(target_host = %target, "Creating new logs for target");
            JsonLog::new()
        });
        log.entries.push(entry);
    }

    pub async fn set_state(&self, target: &str, state: LogState) -> Result<()> {
        let mut logs = self.logs.write().await;
        match logs.get_mut(target) {
            Some(log) => {
                log.state = state;
                Ok(())
            }
            None => Err(LogError::TargetNotFound(target.to_string())),
        }
    }

    pub async fn get(&self, target: &str) -> Result<JsonLog> {
        let logs = self.logs.read().await;
        logs.get(target)
            .cloned()
            .ok_or_else(|| LogError::TargetNotFound(target.to_string()))
    }

    pub async fn delete(&self, target: &str) -> Result<()> {
        let mut logs = self.logs.write().await;
        logs.remove(target)
            .map(|_| ())
            .ok_or_else(|| LogError::TargetNotFound(target.to_string()))
    }

    pub async fn targets(&self) -> Vec<String> {
        let logs = self.logs.read().await;
        let mut targets: Vec<String> = logs.keys().cloned().collect();
        targets.sort();
        targets
    }

    pub async fn snapshot(&self) -> HashMap<String, JsonLog> {
        self.logs.read().await.clone()
    }
}
