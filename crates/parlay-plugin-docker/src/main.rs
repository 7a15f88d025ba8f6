//! Docker plugin module for parlay
//!
//! Speaks the plugin protocol on stdin/stdout. Copy or link the binary into the
//! plugin directory as `docker.plugin`.

use anyhow::{Context, Result};

mod docker;

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries protocol replies, diagnostics must stay on stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("parlay_plugin_docker=info".parse()?),
        )
        .init();

    parlay_plugins::protocol::serve(&docker::DockerPlugin)
        .await
        .context("docker plugin stopped")
}
