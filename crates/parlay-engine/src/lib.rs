//! parlay-engine: runs TreasureMap deployments
//!
//! - `engine`: worker pools, per-host action loop, plugin expansion
//! - `builtin`: command, pkg, upload/download and key replay handlers
//! - `transport`: the seam to remote hosts, plus a local implementation
//! - `store`: per-host key/value captures

pub mod builtin;
pub mod context;
pub mod engine;
pub mod error;
pub mod store;
pub mod transport;

pub use context::HostContext;
pub use engine::{DeploymentReport, Engine, HostOutcome, HostReport, RunReport};
pub use error::{EngineError, Result};
pub use store::KeyValueStore;
pub use transport::{CommandRequest, Direction, LocalTransport, Transport};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::engine::{Engine, HostOutcome, RunReport};
    pub use super::transport::{CommandRequest, Direction, LocalTransport, Transport};
    pub use parlay_core::{Action, Deployment, EngineConfig, TreasureMap};
    pub use parlay_logging::{LogState, Logger};
    pub use parlay_plugins::PluginRegistry;
}
