#![forbid(unsafe_code)]
//! bugsift-search library.
//!
//! Embedding, nearest-neighbour search and hybrid scoring for incoming defect
//! reports.
//!
//! # Conventions
//!
//! - **Errors**: typed [`IndexError`] at the index boundary, `anyhow::Result`
//!   from embedders.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod embed;
pub mod index;
pub mod scoring;
pub mod semantic;

pub use embed::{Embedder, HashEmbedder};
pub use index::{IndexError, IndexStats, Neighbor, RebuildStats, SimilarityIndex};
pub use scoring::{HybridScorer, MatchConfidence, MatchDetails, MetadataField, ScoredMatch};
pub use semantic::OrtEmbedder;
