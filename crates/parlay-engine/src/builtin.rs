//! Handlers for the built-in action types

use parlay_core::{CommandSpec, KeySpec, PackageSpec, StdinSource, TransferSpec};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::context::HostContext;
use crate::error::{EngineError, Result};
use crate::transport::{CommandRequest, Direction, Transport};

/// Remote and local transports used by the handlers
#[derive(Clone)]
pub struct Transports {
    pub remote: Arc<dyn Transport>,
    pub local: Arc<dyn Transport>,
}

impl Transports {
    fn select(&self, local: bool) -> &dyn Transport {
        if local {
            self.local.as_ref()
        } else {
            self.remote.as_ref()
        }
    }
}

async fn stdin_bytes(
    transports: &Transports,
    ctx: &HostContext,
    source: Option<&StdinSource<'_>>,
    timeout: Option<Duration>,
) -> Result<Option<Vec<u8>>> {
    match source {
        None => Ok(None),
        Some(StdinSource::LocalCommand(command)) => {
            let request = CommandRequest::new(ctx.host.as_str(), *command).with_timeout(timeout);
            Ok(Some(transports.local.run(request).await?.into_bytes()))
        }
        Some(StdinSource::File(path)) => tokio::fs::read(path)
            .await
            .map(Some)
            .map_err(EngineError::io("read stdin file", *path)),
    }
}

/// Run each command in order; outputs are concatenated and the first failure
/// stops the list.
pub async fn command(
    transports: &Transports,
    ctx: &HostContext,
    spec: &CommandSpec<'_>,
    timeout: Option<Duration>,
) -> Result<String> {
    let stdin = stdin_bytes(transports, ctx, spec.stdin.as_ref(), timeout).await?;
    let transport = transports.select(spec.local);

    let mut output = String::new();
    for command in &spec.commands {
        debug!(host = %ctx.host, command, local = spec.local, "Running command");
        let request = CommandRequest::new(ctx.host.as_str(), *command)
            .with_sudo(spec.sudo)
            .with_stdin(stdin.clone())
            .with_timeout(timeout);
        output.push_str(&transport.run(request).await?);
    }

    if let Some(key) = spec.save_key {
        ctx.store.put(key, output.clone()).await;
    }
    if let Some(path) = spec.save_file {
        tokio::fs::write(path, &output)
            .await
            .map_err(EngineError::io("save output", path))?;
    }
    Ok(output)
}

pub async fn package(
    transports: &Transports,
    ctx: &HostContext,
    spec: &PackageSpec<'_>,
    timeout: Option<Duration>,
) -> Result<String> {
    let request = CommandRequest::new(ctx.host.as_str(), spec.to_command())
        .with_sudo(spec.sudo)
        .with_timeout(timeout);
    transports.remote.run(request).await
}

pub async fn transfer(
    transports: &Transports,
    ctx: &HostContext,
    spec: &TransferSpec<'_>,
    direction: Direction,
) -> Result<String> {
    let remote = transports.remote.as_ref();
    remote
        .copy(&ctx.host, spec.source, spec.destination, direction)
        .await?;

    if spec.file_move {
        match direction {
            Direction::Upload => tokio::fs::remove_file(spec.source)
                .await
                .map_err(EngineError::io("remove moved file", spec.source))?,
            Direction::Download => remote.remove(&ctx.host, spec.source).await?,
        }
    }

    let verb = if spec.file_move { "Moved" } else { "Copied" };
    Ok(match direction {
        Direction::Upload => format!("{} {} to {}:{}", verb, spec.source, ctx.host, spec.destination),
        Direction::Download => format!("{} {}:{} to {}", verb, ctx.host, spec.source, spec.destination),
    })
}

/// Replay a stored value as a command on the target
pub async fn key(
    transports: &Transports,
    ctx: &HostContext,
    spec: &KeySpec<'_>,
    timeout: Option<Duration>,
) -> Result<String> {
    let value = ctx.store.get(spec.name).await?;

    if let Some(path) = spec.file {
        tokio::fs::write(path, &value)
            .await
            .map_err(EngineError::io("write key file", path))?;
    }

    let request = CommandRequest::new(ctx.host.as_str(), value)
        .with_sudo(spec.sudo)
        .with_timeout(timeout);
    transports.remote.run(request).await
}
