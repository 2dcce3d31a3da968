//! bugsift-core: report model, configuration, quality gate and persistence.
//!
//! # Conventions
//!
//! - **Errors**: engine-facing failures are [`error::DetectError`]; storage
//!   and configuration plumbing returns `anyhow::Result` with context.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`).
//! - **Time**: timestamps are microseconds since the Unix epoch (`*_at_us`).

pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod quality;
pub mod store;

pub use config::Config;
pub use error::{DetectError, ErrorCode};
pub use store::{ChangeSet, CommitReceipt, MemoryStore, Store};

/// Current wall-clock time in microseconds since the Unix epoch.
#[must_use]
pub fn now_us() -> i64 {
    chrono::Utc::now().timestamp_micros()
}
