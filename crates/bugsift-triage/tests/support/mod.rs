//! Shared fixtures for engine integration tests.
//!
//! [`TopicEmbedder`] maps bracketed markers in a title to hand-picked unit
//! vectors, so a test controls vector similarity exactly. With identical
//! metadata on both sides the hybrid score is `0.7 · cosine + 0.3`:
//!
//! | cosine | hybrid | decision |
//! |--------|--------|----------|
//! | 1.0 | 1.00 | block |
//! | 0.7 | 0.79 | flag |
//! | ≤ 0.5 | ≤ 0.65 | create |

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use bugsift_core::{Config, MemoryStore};
use bugsift_search::Embedder;
use bugsift_triage::Engine;
use serde_json::{Value, json};

pub const DIMS: usize = 8;

pub fn axis(i: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIMS];
    v[i] = 1.0;
    v
}

/// Unit vector with cosine `sim` to axis `a`, the rest along axis `b`.
pub fn blend(a: usize, b: usize, sim: f32) -> Vec<f32> {
    let mut v = vec![0.0; DIMS];
    v[a] = sim;
    v[b] = (1.0 - sim * sim).sqrt();
    v
}

pub struct TopicEmbedder {
    topics: Vec<(&'static str, Vec<f32>)>,
}

impl TopicEmbedder {
    pub fn new() -> Self {
        let diagonal = {
            let h = std::f32::consts::FRAC_1_SQRT_2;
            let mut v = vec![0.0; DIMS];
            v[1] = h;
            v[2] = h;
            v
        };
        Self {
            topics: vec![
                ("[root]", axis(0)),
                ("[dup1]", blend(0, 1, 0.7)),
                ("[dup2]", blend(0, 2, 0.7)),
                ("[dup3]", blend(0, 3, 0.7)),
                ("[dup4]", blend(0, 4, 0.7)),
                ("[dup5]", blend(0, 5, 0.7)),
                ("[dup6]", blend(0, 6, 0.7)),
                ("[left]", axis(1)),
                ("[right]", axis(2)),
                ("[between]", diagonal),
                ("[unrelated]", axis(7)),
            ],
        }
    }
}

impl Embedder for TopicEmbedder {
    fn model_name(&self) -> &str {
        "topic-fixture"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self
            .topics
            .iter()
            .find(|(marker, _)| text.contains(marker))
            .map_or_else(|| axis(7), |(_, v)| v.clone()))
    }
}

pub struct SlowEmbedder(pub Duration);

impl Embedder for SlowEmbedder {
    fn model_name(&self) -> &str {
        "slow-fixture"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        std::thread::sleep(self.0);
        Ok(axis(0))
    }
}

pub struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing-fixture"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("connection refused")
    }
}

pub fn config() -> Config {
    let mut config = Config::default();
    config.engine.dimensions = DIMS;
    config
}

pub fn engine_with(embedder: impl Embedder + 'static, config: Config) -> (Engine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(config, store.clone(), Arc::new(embedder)).expect("engine");
    (engine, store)
}

pub fn topic_engine() -> (Engine, Arc<MemoryStore>) {
    engine_with(TopicEmbedder::new(), config())
}

/// A submission that passes every quality check.
pub fn payload(title: &str) -> Value {
    json!({
        "title": title,
        "description": "The app closes immediately after tapping the pay button on the checkout screen.",
        "repro_steps": "1. Add an item to the cart 2. Open checkout 3. Tap pay",
        "reporter": "qa-bot",
        "device": "Pixel 8",
        "build_version": "2.14.3",
        "os_version": "Android 14",
        "region": "EU",
        "severity": "major"
    })
}
