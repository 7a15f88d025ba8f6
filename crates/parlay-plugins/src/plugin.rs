//! Action plugin trait and a closure-based implementation

use async_trait::async_trait;
use parlay_core::Action;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::{PluginError, Result};

pub const ENTRY_ACTION_LIST: &str = "ParlayActionList";
pub const ENTRY_ACTION_DETAILS: &str = "ParlayActionDetails";
pub const ENTRY_PLUGIN_INFO: &str = "ParlayPluginInfo";
pub const ENTRY_USAGE: &str = "ParlayUsage";
pub const ENTRY_EXEC: &str = "ParlayExec";

/// A provider of one or more plugin action types.
///
/// Every method maps onto one of the fixed module entry points. Implementations
/// must be safe to call from several hosts' workers at once.
#[async_trait]
pub trait ActionPlugin: Send + Sync {
    /// Where the plugin came from (a module path, or a name for compiled-in plugins)
    fn source(&self) -> &str;

    /// `ParlayActionList`: action identifiers this plugin handles
    async fn action_list(&self) -> Result<Vec<String>>;

    /// `ParlayActionDetails`: one description per identifier, same order
    async fn action_details(&self) -> Result<Vec<String>>;

    /// `ParlayPluginInfo`
    async fn plugin_info(&self) -> Result<String>;

    /// `ParlayUsage`: an example payload for `action`
    async fn usage(&self, action: &str) -> Result<Value>;

    /// `ParlayExec`: turn a payload into follow-up actions for `host`
    async fn exec(&self, action: &str, host: &str, payload: &Value) -> Result<Vec<Action>>;
}

type ExecFn = dyn Fn(&str, &str, &Value) -> Result<Vec<Action>> + Send + Sync;

struct FnAction {
    name: String,
    description: String,
    usage: Value,
}

/// Compiled-in plugin whose actions are plain closures
pub struct FnPlugin {
    name: String,
    info: String,
    actions: Vec<FnAction>,
    exec: Arc<ExecFn>,
}

impl FnPlugin {
    pub fn new<F>(name: impl Into<String>, info: impl Into<String>, exec: F) -> Self
    where
        F: Fn(&str, &str, &Value) -> Result<Vec<Action>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            info: info.into(),
            actions: Vec::new(),
            exec: Arc::new(exec),
        }
    }

    pub fn with_action(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        usage: Value,
    ) -> Self {
        self.actions.push(FnAction {
            name: name.into(),
            description: description.into(),
            usage,
        });
        self
    }
}

impl fmt::Debug for FnPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPlugin")
            .field("name", &self.name)
            .field("actions", &self.actions.iter().map(|a| &a.name).collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl ActionPlugin for FnPlugin {
    fn source(&self) -> &str {
        &self.name
    }

    async fn action_list(&self) -> Result<Vec<String>> {
        Ok(self.actions.iter().map(|a| a.name.clone()).collect())
    }

    async fn action_details(&self) -> Result<Vec<String>> {
        Ok(self.actions.iter().map(|a| a.description.clone()).collect())
    }

    async fn plugin_info(&self) -> Result<String> {
        Ok(self.info.clone())
    }

    async fn usage(&self, action: &str) -> Result<Value> {
        self.actions
            .iter()
            .find(|a| a.name == action)
            .map(|a| a.usage.clone())
            .ok_or_else(|| PluginError::NoHandler(action.to_string()))
    }

    async fn exec(&self, action: &str, host: &str, payload: &Value) -> Result<Vec<Action>> {
        (self.exec)(action, host, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_plugin() -> FnPlugin {
        FnPlugin::new("echo", "Echo plugin", |_, host, payload| {
            let text = payload["text"].as_str().unwrap_or_default();
            Ok(vec![Action::command("echo", format!("echo {} {}", host, text))])
        })
        .with_action("echo/say", "Echo some text", json!({"text": "hello"}))
    }

    #[tokio::test]
    async fn test_fn_plugin_entry_points() {
        let plugin = echo_plugin();
        assert_eq!(plugin.source(), "echo");
        assert_eq!(plugin.action_list().await.unwrap(), vec!["echo/say"]);
        assert_eq!(plugin.action_details().await.unwrap(), vec!["Echo some text"]);
        assert_eq!(plugin.plugin_info().await.unwrap(), "Echo plugin");
        assert_eq!(plugin.usage("echo/say").await.unwrap()["text"], "hello");
    }

    #[tokio::test]
    async fn test_fn_plugin_exec() {
        let plugin = echo_plugin();
        let actions = plugin
            .exec("echo/say", "h1", &json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].command, "echo h1 hi");
    }

    #[tokio::test]
    async fn test_fn_plugin_unknown_usage() {
        let plugin = echo_plugin();
        assert!(matches!(
            plugin.usage("echo/shout").await,
            Err(PluginError::NoHandler(_))
        ));
    }
}
