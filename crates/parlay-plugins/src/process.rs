//! Plugin modules running as child processes
//!
//! A module is started on first use and kept for the lifetime of the registry.
//! Once its pipe breaks or a call times out it is marked exited and every later
//! call fails with [`PluginError::ModuleExited`]; modules are never restarted.

use async_trait::async_trait;
use parlay_core::Action;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{PluginError, Result};
use crate::plugin::ActionPlugin;
use crate::protocol::{Request, Response};

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

struct ModuleIo {
    // Held so the child is killed when the session is dropped
    _child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

enum Session {
    NotStarted,
    Running(ModuleIo),
    Exited(String),
}

pub struct ProcessPlugin {
    path: PathBuf,
    source: String,
    call_timeout: Duration,
    session: Mutex<Session>,
}

impl ProcessPlugin {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            source: path.display().to_string(),
            path,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            session: Mutex::new(Session::NotStarted),
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn spawn(&self) -> Result<ModuleIo> {
        let mut child = Command::new(&self.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PluginError::Spawn {
                path: self.path.clone(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PluginError::protocol(&self.source, "stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PluginError::protocol(&self.source, "stdout not captured"))?;

        info!(module = %self.source, pid = ?child.id(), "Started plugin module");
        Ok(ModuleIo {
            _child: child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }

    /// One request/response exchange; the session lock is held throughout.
    ///
    /// The module's pipes are taken out of the session for the duration of the
    /// exchange. If the caller drops this future before the reply is read, the
    /// session is left `Exited` and the child is killed with the pipes.
    async fn call(&self, request: &Request) -> Result<Value> {
        let entry = request.entry();
        let mut line = serde_json::to_string(request)?;
        line.push('\n');

        let mut session = self.session.lock().await;
        let abandoned = Session::Exited(format!("{} abandoned before its reply", entry));
        let mut io = match std::mem::replace(&mut *session, abandoned) {
            Session::Running(io) => io,
            Session::NotStarted => match self.spawn() {
                Ok(io) => io,
                Err(e) => {
                    *session = Session::Exited(e.to_string());
                    return Err(e);
                }
            },
            Session::Exited(reason) => {
                *session = Session::Exited(reason.clone());
                return Err(PluginError::ModuleExited {
                    module: self.source.clone(),
                    reason,
                });
            }
        };

        debug!(module = %self.source, entry, "Calling plugin module");
        let exchange = async {
            io.stdin.write_all(line.as_bytes()).await?;
            io.stdin.flush().await?;
            io.stdout.next_line().await
        };

        let outcome = tokio::time::timeout(self.call_timeout, exchange).await;
        let reply = match outcome {
            Ok(Ok(Some(reply))) => reply,
            Ok(Ok(None)) => {
                return Err(self.mark_exited(&mut session, "closed its output".to_string()))
            }
            Ok(Err(e)) => return Err(self.mark_exited(&mut session, e.to_string())),
            Err(_) => {
                // A late reply would desynchronize the stream
                warn!(module = %self.source, entry, "Plugin module timed out");
                *session = Session::Exited(format!("timed out during {}", entry));
                return Err(PluginError::Timeout {
                    module: self.source.clone(),
                    entry,
                    seconds: self.call_timeout.as_secs(),
                });
            }
        };
        *session = Session::Running(io);
        drop(session);

        match serde_json::from_str::<Response>(&reply) {
            Ok(Response::Ok(value)) => Ok(value),
            Ok(Response::Error(message)) => Err(match request {
                Request::Usage { .. } | Request::Exec { .. } => PluginError::Plugin(message),
                _ => PluginError::entry_point(&self.source, entry, message),
            }),
            Err(e) => Err(PluginError::protocol(
                &self.source,
                format!("{} (reply to {}: {:?})", e, entry, reply),
            )),
        }
    }

    fn mark_exited(&self, session: &mut Session, reason: String) -> PluginError {
        warn!(module = %self.source, reason = %reason, "Plugin module exited");
        *session = Session::Exited(reason.clone());
        PluginError::ModuleExited {
            module: self.source.clone(),
            reason,
        }
    }

    async fn call_as<T: serde::de::DeserializeOwned>(&self, request: Request) -> Result<T> {
        let entry = request.entry();
        let value = self.call(&request).await?;
        serde_json::from_value(value).map_err(|e| {
            PluginError::protocol(&self.source, format!("bad {} result: {}", entry, e))
        })
    }
}

#[async_trait]
impl ActionPlugin for ProcessPlugin {
    fn source(&self) -> &str {
        &self.source
    }

    async fn action_list(&self) -> Result<Vec<String>> {
        self.call_as(Request::ActionList).await
    }

    async fn action_details(&self) -> Result<Vec<String>> {
        self.call_as(Request::ActionDetails).await
    }

    async fn plugin_info(&self) -> Result<String> {
        self.call_as(Request::PluginInfo).await
    }

    async fn usage(&self, action: &str) -> Result<Value> {
        self.call(&Request::Usage {
            action: action.to_string(),
        })
        .await
    }

    async fn exec(&self, action: &str, host: &str, payload: &Value) -> Result<Vec<Action>> {
        self.call_as(Request::Exec {
            action: action.to_string(),
            host: host.to_string(),
            payload: payload.clone(),
        })
        .await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_support::write_script;
    use serde_json::json;

    const ECHO_MODULE: &str = r#"#!/bin/sh
while read -r line; do
  case "$line" in
    *ParlayActionList*) echo '{"ok":["echo/say"]}' ;;
    *ParlayActionDetails*) echo '{"ok":["Say something"]}' ;;
    *ParlayPluginInfo*) echo '{"ok":"Echo module"}' ;;
    *ParlayUsage*) echo '{"ok":{"text":"hello"}}' ;;
    *ParlayExec*) echo '{"ok":[{"name":"say","type":"command","command":"echo hello"}]}' ;;
  esac
done
"#;

    #[tokio::test]
    async fn test_process_module_entry_points() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "echo.plugin", ECHO_MODULE);
        let plugin = ProcessPlugin::new(&path);

        assert_eq!(plugin.action_list().await.unwrap(), vec!["echo/say"]);
        assert_eq!(plugin.action_details().await.unwrap(), vec!["Say something"]);
        assert_eq!(plugin.plugin_info().await.unwrap(), "Echo module");
        assert_eq!(plugin.usage("echo/say").await.unwrap(), json!({"text": "hello"}));

        let actions = plugin.exec("echo/say", "h1", &json!({})).await.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].command, "echo hello");
    }

    #[tokio::test]
    async fn test_error_reply_is_call_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(
            dir.path(),
            "grumpy.plugin",
            "#!/bin/sh\nwhile read -r line; do\n  case \"$line\" in\n    *ParlayExec*) echo '{\"error\":\"no way\"}' ;;\n    *) echo '{\"ok\":[]}' ;;\n  esac\ndone\n",
        );
        let plugin = ProcessPlugin::new(&path);

        let err = plugin.exec("x", "h1", &json!(null)).await.unwrap_err();
        assert!(matches!(err, PluginError::Plugin(ref m) if m == "no way"));
        // The module keeps serving
        assert!(plugin.action_list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_reply_is_protocol_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(
            dir.path(),
            "noisy.plugin",
            "#!/bin/sh\nwhile read -r line; do echo 'not json'; done\n",
        );
        let plugin = ProcessPlugin::new(&path);
        assert!(matches!(
            plugin.action_list().await,
            Err(PluginError::Protocol { .. })
        ));
    }

    #[tokio::test]
    async fn test_crashed_module_is_not_restarted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "crash.plugin", "#!/bin/sh\nexit 3\n");
        let plugin = ProcessPlugin::new(&path);

        assert!(matches!(
            plugin.action_list().await,
            Err(PluginError::ModuleExited { .. })
        ));
        assert!(matches!(
            plugin.plugin_info().await,
            Err(PluginError::ModuleExited { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let plugin = ProcessPlugin::new("/nonexistent/ghost.plugin");
        assert!(matches!(
            plugin.action_list().await,
            Err(PluginError::Spawn { .. })
        ));
    }

    #[tokio::test]
    async fn test_call_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "slow.plugin", "#!/bin/sh\nsleep 10\n");
        let plugin = ProcessPlugin::new(&path).with_call_timeout(Duration::from_millis(200));

        assert!(matches!(
            plugin.plugin_info().await,
            Err(PluginError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_dropped_call_does_not_leak_reply() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(
            dir.path(),
            "lagging.plugin",
            "#!/bin/sh\nwhile read -r line; do\n  case \"$line\" in\n    *h1*) sleep 1; echo '{\"ok\":[{\"name\":\"for h1\",\"command\":\"echo h1\"}]}' ;;\n    *) echo '{\"ok\":[{\"name\":\"for h2\",\"command\":\"echo h2\"}]}' ;;\n  esac\ndone\n",
        );
        let plugin = ProcessPlugin::new(&path);

        let first = tokio::time::timeout(
            Duration::from_millis(200),
            plugin.exec("lag/run", "h1", &json!(null)),
        )
        .await;
        assert!(first.is_err());

        // The h1 reply must never be handed to the next caller
        let second = plugin.exec("lag/run", "h2", &json!(null)).await;
        assert!(matches!(second, Err(PluginError::ModuleExited { .. })));
    }
}
