//! parlay: run TreasureMap deployments
//!
//! - `run`: validate a map, discover plugins and execute it
//! - `validate`: structural checks only
//! - `plugins`: inspect the plugin modules found in the plugin directory

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use parlay_core::{EngineConfig, TreasureMap};
use parlay_engine::{Engine, LocalTransport, RunReport, Transport};
use parlay_logging::{JsonLog, Logger};
use parlay_plugins::PluginRegistry;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

mod output;
mod ssh;

use ssh::SshTransport;

#[derive(Parser, Debug)]
#[command(name = "parlay")]
#[command(about = "Run TreasureMap deployments across fleets of hosts")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Directory scanned for `*.plugin` modules [env: PARLAY_PLUGIN_DIR]
    #[arg(long, global = true)]
    plugin_dir: Option<PathBuf>,

    /// Mirror every log entry into this file [env: PARLAY_LOG_FILE]
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a TreasureMap
    Run {
        /// Path to the TreasureMap (YAML or JSON)
        map: PathBuf,

        /// Only run this deployment
        #[arg(short, long)]
        deployment: Option<String>,

        /// Run every action on this machine instead of over ssh
        #[arg(long)]
        local: bool,

        /// Remote user for ssh
        #[arg(long)]
        ssh_user: Option<String>,

        /// Identity file for ssh
        #[arg(long)]
        identity: Option<PathBuf>,

        /// Timeout in seconds for actions that declare none
        #[arg(long)]
        default_timeout: Option<u64>,

        /// Print the run report and logs as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check a TreasureMap without running it
    Validate {
        map: PathBuf,
    },
    /// Inspect plugin modules
    Plugins {
        #[command(subcommand)]
        command: PluginCommands,
    },
}

#[derive(Subcommand, Debug)]
enum PluginCommands {
    /// List discovered modules
    List,
    /// List the actions a module serves
    Actions {
        /// Module path as shown by `plugins list`
        module: String,
    },
    /// Print an example action for an action type
    Usage {
        action: String,
    },
}

#[derive(Serialize)]
struct RunOutput<'a> {
    report: &'a RunReport,
    logs: &'a HashMap<String, JsonLog>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Before the subscriber, so RUST_LOG from the environment file applies
    let env_file = parlay_core::config::load_environment();

    // Diagnostics go to stderr so `--json` output stays parseable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("parlay=info".parse()?)
                .add_directive("parlay_engine=info".parse()?)
                .add_directive("parlay_plugins=info".parse()?),
        )
        .init();

    match &env_file {
        Some(path) => info!(path = %path, "Loaded environment file"),
        None => debug!("No environment file found"),
    }

    let args = Args::parse();

    let mut config = EngineConfig::from_env();
    if let Some(dir) = args.plugin_dir {
        config = config.with_plugin_dir(dir);
    }
    if let Some(path) = args.log_file {
        config = config.with_log_file(path);
    }

    match args.command {
        Commands::Run {
            map,
            deployment,
            local,
            ssh_user,
            identity,
            default_timeout,
            json,
        } => {
            if let Some(seconds) = default_timeout {
                config.default_timeout = seconds;
            }
            let transport: Arc<dyn Transport> = if local {
                Arc::new(LocalTransport::new())
            } else {
                Arc::new(SshTransport::new(ssh_user, identity))
            };
            run(config, &map, deployment.as_deref(), transport, json).await
        }
        Commands::Validate { map } => {
            let map = load_map(&map)?;
            map.validate()?;
            println!("{} deployment(s) OK", map.deployments.len());
            Ok(())
        }
        Commands::Plugins { command } => plugins(&config, command).await,
    }
}

fn load_map(path: &Path) -> Result<TreasureMap> {
    TreasureMap::load(path).with_context(|| format!("Failed to load TreasureMap {}", path.display()))
}

async fn discover(config: &EngineConfig) -> Result<Arc<PluginRegistry>> {
    let registry = Arc::new(
        PluginRegistry::new().with_call_timeout(Duration::from_secs(config.plugin_call_timeout)),
    );
    let loaded = registry
        .discover(&config.plugin_dir)
        .await
        .context("Plugin discovery failed")?;
    info!(
        plugin_dir = %config.plugin_dir.display(),
        modules = loaded,
        "Plugin discovery complete"
    );
    Ok(registry)
}

async fn run(
    config: EngineConfig,
    path: &Path,
    only: Option<&str>,
    transport: Arc<dyn Transport>,
    json: bool,
) -> Result<()> {
    let mut map = load_map(path)?;
    if let Some(name) = only {
        map.deployments.retain(|d| d.name == name);
        if map.deployments.is_empty() {
            anyhow::bail!("Deployment [{}] not found in {}", name, path.display());
        }
    }

    let registry = discover(&config).await?;
    let logger = match &config.log_file {
        Some(file) => Logger::with_file(file)
            .await
            .with_context(|| format!("Failed to open log file {}", file.display()))?,
        None => Logger::new(),
    };

    let engine = Engine::new(transport)
        .with_registry(registry)
        .with_logger(logger)
        .with_config(config);

    let token = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, letting in-flight actions finish");
            token.cancel();
        }
    });

    let report = engine.run_map(&map).await?;
    let logs = engine.logger().snapshot().await;

    if json {
        let body = RunOutput {
            report: &report,
            logs: &logs,
        };
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        print!("{}", output::render_run(&report, &logs));
    }
    Ok(())
}

async fn plugins(config: &EngineConfig, command: PluginCommands) -> Result<()> {
    let registry = discover(config).await?;

    match command {
        PluginCommands::List => {
            let modules = registry.list_modules().await;
            if modules.is_empty() {
                println!("No plugins found in {}", config.plugin_dir.display());
            }
            for module in modules {
                println!("{}\n  {}", module.source, module.info);
            }
        }
        PluginCommands::Actions { module } => {
            for summary in registry.module_actions(&module).await? {
                println!("{:<30} {}", summary.action, summary.description);
            }
        }
        PluginCommands::Usage { action } => {
            let example = registry.usage(&action).await?;
            print!("{}", serde_yaml::to_string(&example)?);
        }
    }
    Ok(())
}
