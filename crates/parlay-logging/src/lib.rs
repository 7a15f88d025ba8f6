//! Parlay Logging - Per-Target Execution Logs
//!
//! Every target (host) gets an ordered, append-only list of entries plus a
//! small state machine:
//!
//! ```text
//! absent --write_entry--> Running --set_state--> Success | Failed
//!    ^                                                  |
//!    +--------------------delete_log--------------------+
//! ```
//!
//! Writing never fails the caller. Entries can optionally be mirrored to a file.

pub mod entry;
pub mod error;
pub mod file_logger;
pub mod json_logger;
pub mod logger;

pub use entry::{JsonLog, JsonLogEntry, LogState};
pub use error::{LogError, Result};
pub use logger::Logger;
