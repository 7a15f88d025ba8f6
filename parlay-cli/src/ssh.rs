//! Transport driving the system OpenSSH client
//!
//! Every call becomes an `ssh`/`scp` invocation on the orchestration host, so
//! authentication, host keys and multiplexing follow the operator's ssh config.

use async_trait::async_trait;
use parlay_engine::transport::shell_quote;
use parlay_engine::{CommandRequest, Direction, LocalTransport, Result, Transport};
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct SshTransport {
    user: Option<String>,
    identity: Option<PathBuf>,
    local: LocalTransport,
}

impl SshTransport {
    pub fn new(user: Option<String>, identity: Option<PathBuf>) -> Self {
        Self {
            user,
            identity,
            local: LocalTransport::new(),
        }
    }

    fn destination(&self, host: &str) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, host),
            None => host.to_string(),
        }
    }

    fn options(&self) -> String {
        let mut options = String::from("-o BatchMode=yes");
        if let Some(identity) = &self.identity {
            options.push_str(" -i ");
            options.push_str(&shell_quote(&identity.display().to_string()));
        }
        options
    }

    pub(crate) fn ssh_command(&self, host: &str, command: &str, sudo: Option<&str>) -> String {
        let remote = match sudo {
            Some(user) => format!(
                "sudo -n -u {} sh -c {}",
                shell_quote(user),
                shell_quote(command)
            ),
            None => command.to_string(),
        };
        format!(
            "ssh {} {} -- {}",
            self.options(),
            shell_quote(&self.destination(host)),
            shell_quote(&remote)
        )
    }

    pub(crate) fn scp_command(
        &self,
        host: &str,
        source: &str,
        destination: &str,
        direction: Direction,
    ) -> String {
        let remote = |path: &str| shell_quote(&format!("{}:{}", self.destination(host), path));
        let (from, to) = match direction {
            Direction::Upload => (shell_quote(source), remote(destination)),
            Direction::Download => (remote(source), shell_quote(destination)),
        };
        format!("scp -q {} {} {}", self.options(), from, to)
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn run(&self, request: CommandRequest) -> Result<String> {
        let command = self.ssh_command(&request.host, &request.command, request.sudo.as_deref());
        self.local
            .run(CommandRequest {
                command,
                sudo: None,
                ..request
            })
            .await
    }

    async fn copy(
        &self,
        host: &str,
        source: &str,
        destination: &str,
        direction: Direction,
    ) -> Result<()> {
        let command = self.scp_command(host, source, destination, direction);
        self.local
            .run(CommandRequest::new(host, command))
            .await
            .map(|_| ())
    }
}
