//! Core types and utilities for parlay
//!
//! # Modules
//!
//! - `config`: Environment loading and engine configuration
//! - `error`: Error types and Result alias
//! - `types`: TreasureMap / Deployment / Action document model
//! - `validate`: Structural checks run before any execution

pub mod config;
pub mod error;
pub mod types;
pub mod validate;

// Re-exports
pub use config::EngineConfig;
pub use error::{ActionError, Error, Result, ValidationIssue};
pub use types::*;
