//! Command and file-transfer transports
//!
//! The engine never talks to hosts directly. Remote execution goes through a
//! [`Transport`] supplied by the caller; [`LocalTransport`] covers the
//! orchestration host itself.

use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::error::{EngineError, Result};

/// One command invocation on a host
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    pub host: String,
    pub command: String,
    /// Run as this user through sudo
    pub sudo: Option<String>,
    pub stdin: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
}

impl CommandRequest {
    pub fn new(host: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            command: command.into(),
            sudo: None,
            stdin: None,
            timeout: None,
        }
    }

    pub fn with_sudo(mut self, user: Option<&str>) -> Self {
        self.sudo = user.map(String::from);
        self
    }

    pub fn with_stdin(mut self, stdin: Option<Vec<u8>>) -> Self {
        self.stdin = stdin;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Orchestration host to target
    Upload,
    /// Target to orchestration host
    Download,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upload => write!(f, "upload"),
            Direction::Download => write!(f, "download"),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Run a command and return its standard output
    async fn run(&self, request: CommandRequest) -> Result<String>;

    /// Copy a file between the orchestration host and `host`
    async fn copy(
        &self,
        host: &str,
        source: &str,
        destination: &str,
        direction: Direction,
    ) -> Result<()>;

    /// Remove a file on `host`
    async fn remove(&self, host: &str, path: &str) -> Result<()> {
        self.run(CommandRequest::new(host, format!("rm -f {}", shell_quote(path))))
            .await
            .map(|_| ())
    }
}

/// Single-quote `value` for a POSIX shell
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Runs commands with `sh -c` on the orchestration host
#[derive(Debug, Default, Clone)]
pub struct LocalTransport;

impl LocalTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn run(&self, request: CommandRequest) -> Result<String> {
        let host = request.host.as_str();
        let mut cmd = match &request.sudo {
            Some(user) => {
                let mut cmd = Command::new("sudo");
                cmd.args(["-n", "-u", user.as_str(), "sh", "-c", request.command.as_str()]);
                cmd
            }
            None => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(&request.command);
                cmd
            }
        };
        cmd.stdin(if request.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

        trace!(host, command = %request.command, sudo = ?request.sudo, "spawn");
        let mut child = cmd
            .spawn()
            .map_err(|e| EngineError::transport(host, format!("spawn: {}", e)))?;

        if let (Some(input), Some(mut pipe)) = (request.stdin.clone(), child.stdin.take()) {
            // Fed from a task so a chatty child cannot deadlock on a full stdout pipe
            tokio::spawn(async move {
                if let Err(e) = pipe.write_all(&input).await {
                    debug!(error = %e, "stdin closed early");
                }
            });
        }

        let waited = child.wait_with_output();
        let output = match request.timeout {
            Some(limit) => tokio::time::timeout(limit, waited)
                .await
                .map_err(|_| EngineError::Timeout(limit.as_secs()))?,
            None => waited.await,
        }
        .map_err(|e| EngineError::transport(host, format!("wait: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let status = match output.status.code() {
                Some(code) => format!("exit code {}", code),
                None => "terminated by signal".to_string(),
            };
            return Err(EngineError::transport(
                host,
                format!("{}: {}", status, stderr.trim_end()),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn copy(
        &self,
        host: &str,
        source: &str,
        destination: &str,
        direction: Direction,
    ) -> Result<()> {
        debug!(host, source, destination, %direction, "Local copy");
        tokio::fs::copy(source, destination)
            .await
            .map(|_| ())
            .map_err(EngineError::io("copy", source))
    }

    async fn remove(&self, _host: &str, path: &str) -> Result<()> {
        tokio::fs::remove_file(path)
            .await
            .map_err(EngineError::io("remove", path))
    }
}
