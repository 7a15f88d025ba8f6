//! Per-host execution context

use std::sync::Arc;

use crate::store::KeyValueStore;

/// Everything an action needs to know about where it runs.
///
/// One context is created for each host at the start of each deployment, so
/// captures never leak between hosts or deployments.
#[derive(Debug, Clone)]
pub struct HostContext {
    /// Unique per engine run
    pub run_id: String,
    pub deployment: String,
    pub host: String,
    pub store: Arc<KeyValueStore>,
}

impl HostContext {
    pub fn new(run_id: &str, deployment: &str, host: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            deployment: deployment.to_string(),
            host: host.to_string(),
            store: Arc::new(KeyValueStore::new()),
        }
    }
}
