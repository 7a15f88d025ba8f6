//! Plugin registry: action identifier to plugin dispatch

use parlay_core::Action;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::discovery::scan_plugin_dir;
use crate::error::{PluginError, Result};
use crate::plugin::ActionPlugin;
use crate::process::{ProcessPlugin, DEFAULT_CALL_TIMEOUT};

/// A registered plugin and what it reports about itself
#[derive(Debug, Clone, Serialize)]
pub struct ModuleSummary {
    pub source: String,
    pub info: String,
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionSummary {
    pub action: String,
    pub description: String,
}

/// Handle to the plugin serving one action identifier
#[derive(Clone)]
pub struct ResolvedAction {
    action: String,
    plugin: Arc<dyn ActionPlugin>,
}

impl ResolvedAction {
    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn source(&self) -> &str {
        self.plugin.source()
    }

    /// `ParlayExec` for this action
    pub async fn exec(&self, host: &str, payload: &Value) -> Result<Vec<Action>> {
        self.plugin.exec(&self.action, host, payload).await
    }
}

#[derive(Default)]
struct RegistryState {
    plugins: Vec<(Arc<dyn ActionPlugin>, Vec<String>)>,
    index: HashMap<String, Arc<dyn ActionPlugin>>,
}

pub struct PluginRegistry {
    state: RwLock<RegistryState>,
    call_timeout: Duration,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Per-call timeout for discovered process modules
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Register a plugin under every identifier it lists.
    ///
    /// Nothing is registered if any identifier is already taken.
    pub async fn register(&self, plugin: Arc<dyn ActionPlugin>) -> Result<Vec<String>> {
        let actions = plugin.action_list().await?;

        let mut state = self.state.write().await;
        for action in &actions {
            if let Some(existing) = state.index.get(action) {
                return Err(PluginError::Collision {
                    action: action.clone(),
                    first: existing.source().to_string(),
                    second: plugin.source().to_string(),
                });
            }
        }
        for action in &actions {
            debug!(action = %action, source = plugin.source(), "Registering plugin action");
            state.index.insert(action.clone(), plugin.clone());
        }
        state.plugins.push((plugin, actions.clone()));
        Ok(actions)
    }

    /// Load every `*.plugin` module below `dir`.
    ///
    /// Modules that fail to start or list are logged and skipped; an action
    /// claimed twice fails discovery. Returns the number of modules loaded.
    pub async fn discover(&self, dir: &Path) -> Result<usize> {
        let mut loaded = 0;
        for path in scan_plugin_dir(dir) {
            let module = Arc::new(ProcessPlugin::new(&path).with_call_timeout(self.call_timeout));
            match self.register(module).await {
                Ok(actions) => {
                    info!(module = %path.display(), actions = ?actions, "Loaded plugin module");
                    loaded += 1;
                }
                Err(e @ PluginError::Collision { .. }) => return Err(e),
                Err(e) => {
                    warn!(module = %path.display(), error = %e, "Skipping plugin module");
                }
            }
        }
        Ok(loaded)
    }

    pub async fn resolve(&self, action: &str) -> Result<ResolvedAction> {
        let state = self.state.read().await;
        state
            .index
            .get(action)
            .map(|plugin| ResolvedAction {
                action: action.to_string(),
                plugin: plugin.clone(),
            })
            .ok_or_else(|| PluginError::NoHandler(action.to_string()))
    }

    pub async fn contains(&self, action: &str) -> bool {
        self.state.read().await.index.contains_key(action)
    }

    /// Every registered identifier, sorted
    pub async fn actions(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut actions: Vec<String> = state.index.keys().cloned().collect();
        actions.sort();
        actions
    }

    /// Source and `ParlayPluginInfo` of every registered plugin
    pub async fn list_modules(&self) -> Vec<ModuleSummary> {
        let plugins = self.state.read().await.plugins.clone();

        let mut summaries = Vec::with_capacity(plugins.len());
        for (plugin, actions) in plugins {
            let info = match plugin.plugin_info().await {
                Ok(info) => info,
                Err(e) => {
                    warn!(source = plugin.source(), error = %e, "Unable to read plugin info");
                    String::new()
                }
            };
            summaries.push(ModuleSummary {
                source: plugin.source().to_string(),
                info,
                actions,
            });
        }
        summaries
    }

    /// Pairs of action identifier and description for the plugin at `source`
    pub async fn module_actions(&self, source: &str) -> Result<Vec<ActionSummary>> {
        let plugin = {
            let state = self.state.read().await;
            state
                .plugins
                .iter()
                .find(|(p, _)| p.source() == source)
                .map(|(p, _)| p.clone())
                .ok_or_else(|| PluginError::UnknownModule(source.to_string()))?
        };

        let actions = plugin.action_list().await?;
        let details = plugin.action_details().await?;
        if actions.len() != details.len() {
            warn!(
                source,
                actions = actions.len(),
                details = details.len(),
                "Plugin action list and details differ in length"
            );
        }

        let mut details = details.into_iter();
        Ok(actions
            .into_iter()
            .map(|action| ActionSummary {
                action,
                description: details.next().unwrap_or_default(),
            })
            .collect())
    }

    /// Example action for `action`, with the plugin's usage payload filled in
    pub async fn usage(&self, action: &str) -> Result<Action> {
        let resolved = self.resolve(action).await?;
        let payload = resolved.plugin.usage(action).await?;
        Ok(Action {
            name: format!("Example {}", action),
            action_type: action.to_string(),
            plugin: Some(payload),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::FnPlugin;
    use serde_json::json;

    fn plugin(name: &str, actions: &[&str]) -> Arc<dyn ActionPlugin> {
        let mut p = FnPlugin::new(name, format!("{} plugin", name), |action, host, _| {
            Ok(vec![Action::command(action, format!("echo {}", host))])
        });
        for action in actions {
            p = p.with_action(*action, format!("{} action", action), json!({"n": 1}));
        }
        Arc::new(p)
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        let registry = PluginRegistry::new();
        registry.register(plugin("a", &["a/one", "a/two"])).await.unwrap();

        let resolved = registry.resolve("a/two").await.unwrap();
        assert_eq!(resolved.source(), "a");
        let actions = resolved.exec("h1", &json!({})).await.unwrap();
        assert_eq!(actions[0].name, "a/two");
        assert_eq!(actions[0].command, "echo h1");

        assert_eq!(registry.actions().await, vec!["a/one", "a/two"]);
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let registry = PluginRegistry::new();
        let err = registry.resolve("nope").await.err().unwrap();
        assert_eq!(
            err.to_string(),
            "Action [nope] does not exist or has no plugin associated with it"
        );
    }

    #[tokio::test]
    async fn test_collision_registers_nothing() {
        let registry = PluginRegistry::new();
        registry.register(plugin("a", &["shared"])).await.unwrap();

        let err = registry
            .register(plugin("b", &["b/own", "shared"]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PluginError::Collision { ref action, ref first, ref second }
                if action == "shared" && first == "a" && second == "b"
        ));
        assert!(!registry.contains("b/own").await);
        assert_eq!(registry.resolve("shared").await.unwrap().source(), "a");
    }

    #[tokio::test]
    async fn test_introspection() {
        let registry = PluginRegistry::new();
        registry.register(plugin("a", &["a/one"])).await.unwrap();

        let modules = registry.list_modules().await;
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].info, "a plugin");
        assert_eq!(modules[0].actions, vec!["a/one"]);

        let actions = registry.module_actions("a").await.unwrap();
        assert_eq!(
            actions,
            vec![ActionSummary {
                action: "a/one".into(),
                description: "a/one action".into()
            }]
        );
        assert!(matches!(
            registry.module_actions("zzz").await,
            Err(PluginError::UnknownModule(_))
        ));

        let example = registry.usage("a/one").await.unwrap();
        assert_eq!(example.action_type, "a/one");
        assert_eq!(example.plugin, Some(json!({"n": 1})));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_discover_skips_broken_modules() {
        use crate::test_support::write_script;

        let dir = tempfile::tempdir().unwrap();
        write_script(
            dir.path(),
            "good.plugin",
            "#!/bin/sh\nwhile read -r line; do echo '{\"ok\":[\"good/run\"]}'; done\n",
        );
        write_script(dir.path(), "dead.plugin", "#!/bin/sh\nexit 1\n");
        write_script(dir.path(), "ignored.sh", "#!/bin/sh\nexit 1\n");

        let registry = PluginRegistry::new();
        assert_eq!(registry.discover(dir.path()).await.unwrap(), 1);
        assert_eq!(registry.actions().await, vec!["good/run"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_discover_collision_fails() {
        use crate::test_support::write_script;

        let dir = tempfile::tempdir().unwrap();
        let body = "#!/bin/sh\nwhile read -r line; do echo '{\"ok\":[\"dup/run\"]}'; done\n";
        write_script(dir.path(), "one.plugin", body);
        write_script(dir.path(), "two.plugin", body);

        let registry = PluginRegistry::new();
        assert!(matches!(
            registry.discover(dir.path()).await,
            Err(PluginError::Collision { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_discover_applies_call_timeout() {
        use crate::test_support::write_script;

        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "slow.plugin", "#!/bin/sh\nsleep 10\n");

        let registry = PluginRegistry::new().with_call_timeout(Duration::from_millis(200));
        let started = std::time::Instant::now();
        assert_eq!(registry.discover(dir.path()).await.unwrap(), 0);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(registry.actions().await.is_empty());
    }
}
