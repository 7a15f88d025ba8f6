//! Line-delimited JSON protocol spoken by plugin modules
//!
//! The host writes one request per line to the module's stdin and reads exactly
//! one response line from its stdout:
//!
//! ```text
//! -> {"entry":"ParlayExec","action":"docker/image","host":"h1","payload":{...}}
//! <- {"ok":[{"name":"load","type":"command",...}]}
//! <- {"error":"imageNames is empty"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::error::{PluginError, Result};
use crate::plugin::{
    ActionPlugin, ENTRY_ACTION_DETAILS, ENTRY_ACTION_LIST, ENTRY_EXEC, ENTRY_PLUGIN_INFO,
    ENTRY_USAGE,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entry")]
pub enum Request {
    #[serde(rename = "ParlayActionList")]
    ActionList,
    #[serde(rename = "ParlayActionDetails")]
    ActionDetails,
    #[serde(rename = "ParlayPluginInfo")]
    PluginInfo,
    #[serde(rename = "ParlayUsage")]
    Usage { action: String },
    #[serde(rename = "ParlayExec")]
    Exec {
        action: String,
        host: String,
        #[serde(default)]
        payload: Value,
    },
}

impl Request {
    pub fn entry(&self) -> &'static str {
        match self {
            Request::ActionList => ENTRY_ACTION_LIST,
            Request::ActionDetails => ENTRY_ACTION_DETAILS,
            Request::PluginInfo => ENTRY_PLUGIN_INFO,
            Request::Usage { .. } => ENTRY_USAGE,
            Request::Exec { .. } => ENTRY_EXEC,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Response {
    Ok(Value),
    Error(String),
}

impl Response {
    fn from_result<T: Serialize>(result: Result<T>) -> Self {
        match result.and_then(|v| serde_json::to_value(v).map_err(PluginError::from)) {
            Ok(value) => Response::Ok(value),
            Err(e) => Response::Error(e.to_string()),
        }
    }
}

/// Answer one request with `plugin`
pub async fn handle(plugin: &dyn ActionPlugin, request: Request) -> Response {
    match request {
        Request::ActionList => Response::from_result(plugin.action_list().await),
        Request::ActionDetails => Response::from_result(plugin.action_details().await),
        Request::PluginInfo => Response::from_result(plugin.plugin_info().await),
        Request::Usage { action } => Response::from_result(plugin.usage(&action).await),
        Request::Exec {
            action,
            host,
            payload,
        } => Response::from_result(plugin.exec(&action, &host, &payload).await),
    }
}

/// Serve `plugin` over an arbitrary line stream until the reader closes.
pub async fn serve_io<R, W>(plugin: &dyn ActionPlugin, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                debug!(entry = request.entry(), "Handling plugin request");
                handle(plugin, request).await
            }
            Err(e) => {
                warn!(error = %e, "Unsupported plugin request");
                Response::Error(format!("unsupported request: {}", e))
            }
        };
        let mut out = serde_json::to_string(&response)?;
        out.push('\n');
        writer.write_all(out.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}

/// Serve `plugin` on the process's stdin/stdout. Used as the body of a
/// plugin module's `main`.
pub async fn serve(plugin: &dyn ActionPlugin) -> Result<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    serve_io(plugin, stdin, tokio::io::stdout()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::FnPlugin;
    use parlay_core::Action;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let req = Request::Exec {
            action: "a/b".into(),
            host: "h1".into(),
            payload: json!({"x": 1}),
        };
        let wire = serde_json::to_value(&req).unwrap();
        assert_eq!(wire["entry"], "ParlayExec");
        assert_eq!(wire["host"], "h1");

        let parsed: Request = serde_json::from_str(r#"{"entry":"ParlayActionList"}"#).unwrap();
        assert_eq!(parsed, Request::ActionList);
    }

    #[test]
    fn test_response_wire_format() {
        let ok: Response = serde_json::from_str(r#"{"ok":["a","b"]}"#).unwrap();
        assert_eq!(ok, Response::Ok(json!(["a", "b"])));
        let err: Response = serde_json::from_str(r#"{"error":"nope"}"#).unwrap();
        assert_eq!(err, Response::Error("nope".into()));
    }

    #[tokio::test]
    async fn test_serve_io_answers_each_line() {
        let plugin = FnPlugin::new("p", "Test plugin", |_, host, _| {
            Ok(vec![Action::command("hi", format!("echo {}", host))])
        })
        .with_action("p/hi", "Say hi", json!({}));

        let input = concat!(
            r#"{"entry":"ParlayPluginInfo"}"#,
            "\n",
            r#"{"entry":"ParlayBogus"}"#,
            "\n",
            r#"{"entry":"ParlayExec","action":"p/hi","host":"h9"}"#,
            "\n"
        );
        let mut output = Vec::new();
        serve_io(&plugin, input.as_bytes(), &mut output).await.unwrap();

        let responses: Vec<Response> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0], Response::Ok(json!("Test plugin")));
        assert!(matches!(&responses[1], Response::Error(e) if e.starts_with("unsupported")));
        match &responses[2] {
            Response::Ok(v) => assert_eq!(v[0]["command"], "echo h9"),
            other => panic!("unexpected response {:?}", other),
        }
    }
}
