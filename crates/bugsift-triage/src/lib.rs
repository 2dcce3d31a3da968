#![forbid(unsafe_code)]
//! bugsift-triage library.
//!
//! The classification engine: quality gate, duplicate blocking and
//! flagging, recurring promotion, manual overrides and monitoring stats.
//!
//! # Conventions
//!
//! - **Errors**: [`DetectError`](bugsift_core::DetectError) at the public
//!   boundary; `anyhow::Result` inside chain walks.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod chain;
pub mod clock;
pub mod engine;
pub mod locks;
pub mod outcome;
pub mod timeout;

pub use engine::Engine;
pub use outcome::{CandidateMatch, EngineStats, GroupCount, Outcome, ParentCount};
