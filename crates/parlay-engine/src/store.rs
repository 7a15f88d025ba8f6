//! Key/value store for captured command output

use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{EngineError, Result};

/// Named values captured during one host's deployment run.
///
/// Overwrites are allowed; nothing is persisted.
#[derive(Debug, Default)]
pub struct KeyValueStore {
    values: RwLock<HashMap<String, String>>,
}

impl KeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, name: &str, value: impl Into<String>) {
        let mut values = self.values.write().await;
        debug!(key = name, "Storing value");
        values.insert(name.to_string(), value.into());
    }

    pub async fn get(&self, name: &str) -> Result<String> {
        let values = self.values.read().await;
        values
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::KeyNotFound(name.to_string()))
    }

    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.values.read().await.clone()
    }
}
