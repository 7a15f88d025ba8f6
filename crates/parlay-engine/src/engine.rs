//! Deployment engine
//!
//! Runs a TreasureMap deployment by deployment:
//! - One worker pool per deployment, sized by its effective worker count
//! - Each worker takes the next host and runs all of its actions in order
//! - Built-in action types are handled in-process, anything else goes
//!   through the plugin registry
//! - Every action outcome lands in the structured [`Logger`] under the host

use futures::future::BoxFuture;
use futures::FutureExt;
use parlay_core::{Action, ActionKind, Deployment, EngineConfig, TreasureMap};
use parlay_logging::{LogState, Logger};
use parlay_plugins::{PluginError, PluginRegistry};
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::builtin::{self, Transports};
use crate::context::HostContext;
use crate::error::{EngineError, Result};
use crate::transport::{Direction, LocalTransport, Transport};

/// How far a host got through its action list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostOutcome {
    /// Every action ran, or failed with ignoreFailure set
    Completed,
    /// Stopped early by an unignored failure or cancellation
    Aborted,
    /// Never started because the run was cancelled
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct HostReport {
    pub host: String,
    pub outcome: HostOutcome,
    /// Values captured on this host during the deployment
    pub store: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeploymentReport {
    pub name: String,
    pub workers: usize,
    /// In declared host order
    pub hosts: Vec<HostReport>,
}

impl DeploymentReport {
    pub fn host(&self, host: &str) -> Option<&HostReport> {
        self.hosts.iter().find(|h| h.host == host)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
    pub deployments: Vec<DeploymentReport>,
}

impl RunReport {
    pub fn deployment(&self, name: &str) -> Option<&DeploymentReport> {
        self.deployments.iter().find(|d| d.name == name)
    }
}

/// Executes deployments against a set of transports.
///
/// Cheap to clone; clones share the registry, logger and cancellation token.
#[derive(Clone)]
pub struct Engine {
    registry: Arc<PluginRegistry>,
    transports: Transports,
    logger: Logger,
    config: EngineConfig,
    cancel: CancellationToken,
}

impl Engine {
    /// Engine running remote work through `remote`
    pub fn new(remote: Arc<dyn Transport>) -> Self {
        Self {
            registry: Arc::new(PluginRegistry::new()),
            transports: Transports {
                remote,
                local: Arc::new(LocalTransport::new()),
            },
            logger: Logger::new(),
            config: EngineConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_registry(mut self, registry: Arc<PluginRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Transport for `commandLocal` and `commandPipeCmd`
    pub fn with_local_transport(mut self, local: Arc<dyn Transport>) -> Self {
        self.transports.local = local;
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop taking new hosts and actions. Work already in flight finishes.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Validate the whole map, then run its deployments in order.
    pub async fn run_map(&self, map: &TreasureMap) -> Result<RunReport> {
        map.validate()?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = chrono::Utc::now();
        info!(run_id = %run_id, deployments = map.deployments.len(), "Starting run");

        let mut deployments = Vec::with_capacity(map.deployments.len());
        for deployment in &map.deployments {
            deployments.push(self.execute_deployment(&run_id, deployment).await);
        }

        info!(run_id = %run_id, "Run finished");
        Ok(RunReport {
            run_id,
            started_at,
            finished_at: chrono::Utc::now(),
            deployments,
        })
    }

    /// Validate and run a single deployment.
    pub async fn run_deployment(&self, deployment: &Deployment) -> Result<DeploymentReport> {
        deployment.validate()?;
        let run_id = uuid::Uuid::new_v4().to_string();
        Ok(self.execute_deployment(&run_id, deployment).await)
    }

    async fn execute_deployment(&self, run_id: &str, deployment: &Deployment) -> DeploymentReport {
        let workers = deployment.worker_count().min(deployment.hosts.len()).max(1);
        info!(
            run_id = %run_id,
            deployment = %deployment.name,
            hosts = deployment.hosts.len(),
            workers,
            "Starting deployment"
        );

        let queue: Arc<Mutex<VecDeque<(usize, String)>>> = Arc::new(Mutex::new(
            deployment.hosts.iter().cloned().enumerate().collect(),
        ));
        let actions: Arc<[Action]> = deployment.actions.clone().into();

        // Reports land here as each host finishes, so a lost worker loses no
        // other host's outcome
        let slots: Arc<Mutex<Vec<Option<HostReport>>>> =
            Arc::new(Mutex::new(vec![None; deployment.hosts.len()]));

        let mut pool = JoinSet::new();
        for worker in 0..workers {
            let engine = self.clone();
            let queue = queue.clone();
            let slots = slots.clone();
            let actions = actions.clone();
            let run_id = run_id.to_string();
            let name = deployment.name.clone();

            pool.spawn(async move {
                loop {
                    if engine.cancel.is_cancelled() {
                        debug!(worker, "Worker stopping, run cancelled");
                        break;
                    }
                    let next = queue.lock().await.pop_front();
                    let Some((index, host)) = next else { break };
                    debug!(worker, host = %host, "Worker took host");
                    let report = engine.run_host(&run_id, &name, &host, &actions).await;
                    slots.lock().await[index] = Some(report);
                }
            });
        }

        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                error!(deployment = %deployment.name, error = %e, "Deployment worker failed");
            }
        }

        let slots = std::mem::take(&mut *slots.lock().await);
        let hosts = slots
            .into_iter()
            .zip(&deployment.hosts)
            .map(|(slot, host)| {
                slot.unwrap_or_else(|| HostReport {
                    host: host.clone(),
                    outcome: HostOutcome::Skipped,
                    store: HashMap::new(),
                })
            })
            .collect();

        info!(run_id = %run_id, deployment = %deployment.name, "Deployment finished");
        DeploymentReport {
            name: deployment.name.clone(),
            workers,
            hosts,
        }
    }

    async fn run_host(
        &self,
        run_id: &str,
        deployment: &str,
        host: &str,
        actions: &[Action],
    ) -> HostReport {
        let ctx = HostContext::new(run_id, deployment, host);

        self.logger
            .write_entry(host, deployment, &format!("Starting deployment [{}]", deployment), "")
            .await;
        if let Err(e) = self.logger.set_state(host, LogState::Running).await {
            warn!(host, error = %e, "Unable to mark host running");
        }

        let mut outcome = HostOutcome::Completed;
        for action in actions {
            if self.cancel.is_cancelled() {
                self.logger
                    .write_entry(host, action.label(), "", &EngineError::Cancelled.to_string())
                    .await;
                outcome = HostOutcome::Aborted;
                break;
            }

            if self.execute_action(&ctx, action, 0).await.is_err() {
                if action.ignore_failure {
                    info!(host, action = action.label(), "Ignoring failed action");
                    continue;
                }
                outcome = HostOutcome::Aborted;
                break;
            }
        }

        let state = match outcome {
            HostOutcome::Completed => LogState::Success,
            _ => LogState::Failed,
        };
        if let Err(e) = self.logger.set_state(host, state).await {
            warn!(host, error = %e, "Unable to set final host state");
        }
        info!(run_id = %run_id, deployment, host, state = %state, "Host finished");

        HostReport {
            host: host.to_string(),
            outcome,
            store: ctx.store.snapshot().await,
        }
    }

    /// Run one action and record its outcome under the host.
    fn execute_action<'a>(
        &'a self,
        ctx: &'a HostContext,
        action: &'a Action,
        depth: usize,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let label = action.label();
            debug!(host = %ctx.host, action = label, action_type = %action.action_type, depth, "Executing action");

            match self.dispatch(ctx, action, depth).await {
                Ok(output) => {
                    self.logger.write_entry(&ctx.host, label, &output, "").await;
                    Ok(())
                }
                Err(e) => {
                    warn!(host = %ctx.host, action = label, error = %e, "Action failed");
                    self.logger
                        .write_entry(&ctx.host, label, "", &e.to_string())
                        .await;
                    Err(e)
                }
            }
        })
    }

    async fn dispatch(&self, ctx: &HostContext, action: &Action, depth: usize) -> Result<String> {
        let timeout = self.timeout_for(action);
        let t = &self.transports;

        match action.kind()? {
            ActionKind::Command(spec) => {
                bounded(timeout, builtin::command(t, ctx, &spec, timeout)).await
            }
            ActionKind::Package(spec) => {
                bounded(timeout, builtin::package(t, ctx, &spec, timeout)).await
            }
            ActionKind::Upload(spec) => {
                bounded(timeout, builtin::transfer(t, ctx, &spec, Direction::Upload)).await
            }
            ActionKind::Download(spec) => {
                bounded(timeout, builtin::transfer(t, ctx, &spec, Direction::Download)).await
            }
            ActionKind::Key(spec) => bounded(timeout, builtin::key(t, ctx, &spec, timeout)).await,
            ActionKind::Plugin {
                action_type,
                payload,
            } => self.expand(ctx, action_type, payload, timeout, depth).await,
        }
    }

    /// Ask the plugin serving `action_type` for follow-up actions and run them in
    /// order on the same host.
    async fn expand(
        &self,
        ctx: &HostContext,
        action_type: &str,
        payload: Option<&Value>,
        timeout: Option<Duration>,
        depth: usize,
    ) -> Result<String> {
        if depth >= self.config.max_expansion_depth {
            return Err(EngineError::ExpansionDepth(self.config.max_expansion_depth));
        }

        let resolved = self.registry.resolve(action_type).await?;
        let payload = payload.cloned().unwrap_or(Value::Null);
        let follow_ups = bounded(timeout, async {
            match AssertUnwindSafe(resolved.exec(&ctx.host, &payload))
                .catch_unwind()
                .await
            {
                Ok(result) => result.map_err(EngineError::from),
                Err(panic) => Err(EngineError::Plugin(PluginError::Panicked {
                    module: resolved.source().to_string(),
                    message: panic_message(panic.as_ref()),
                })),
            }
        })
        .await?;
        debug!(
            host = %ctx.host,
            action_type,
            source = resolved.source(),
            count = follow_ups.len(),
            "Plugin expanded action"
        );

        for follow_up in &follow_ups {
            if self.cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if let Err(e) = self.execute_action(ctx, follow_up, depth + 1).await {
                if !follow_up.ignore_failure {
                    return Err(EngineError::FollowUp {
                        action: follow_up.label().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(format!(
            "Completed {} follow-up action(s) from {}",
            follow_ups.len(),
            resolved.source()
        ))
    }

    fn timeout_for(&self, action: &Action) -> Option<Duration> {
        let seconds = if action.timeout > 0 {
            action.timeout
        } else {
            self.config.default_timeout
        };
        (seconds > 0).then(|| Duration::from_secs(seconds))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn bounded<T>(timeout: Option<Duration>, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| EngineError::Timeout(limit.as_secs()))?,
        None => fut.await,
    }
}
