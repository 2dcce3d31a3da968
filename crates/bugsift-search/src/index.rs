//! In-process cosine similarity index.
//!
//! # Structure
//!
//! Vectors are L2-normalised on the way in, so cosine similarity is a dot
//! product. The searchable set lives in a [`FlatIndex`] held behind
//! `RwLock<Arc<_>>`:
//!
//! - `query` clones the `Arc` under a read lock and scans without holding
//!   any lock, so it always observes one complete generation.
//! - `insert` and `remove` mutate through `Arc::make_mut`; a query still
//!   holding the previous generation keeps its own copy.
//!
//! The copy is the price of lock-free scans. A write that lands while any
//! query is mid-scan clones the whole structure, O(n·d), under the write
//! lock. With no scan in flight `make_mut` mutates in place. Sustained
//! concurrent writes against a large index therefore pay one full copy per
//! write; such a load wants batched writes through `rebuild` instead.
//! - `rebuild` builds a fresh structure off to the side and installs it with
//!   a single pointer swap.
//!
//! # Rebuild journal
//!
//! While a rebuild is running, every write is also appended to a journal.
//! Once the fresh structure is built, the journal is replayed onto it under
//! the same mutex that writers take, and only then is the pointer swapped.
//! Writes that landed in both the snapshot and the journal are replayed
//! harmlessly: insert replaces, remove of a missing id is a no-op.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::Serialize;
use tracing::{debug, info, warn};

/// Failures raised by [`SimilarityIndex`].
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("vector has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector for {id} is not usable: {reason}")]
    InvalidVector { id: String, reason: &'static str },

    #[error("an index rebuild is already running")]
    RebuildInProgress,

    #[error("failed to load rebuild snapshot: {0:#}")]
    Snapshot(anyhow::Error),
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub id: String,
    /// Cosine similarity clamped to `[0, 1]`.
    pub similarity: f64,
}

/// Outcome of a [`SimilarityIndex::rebuild`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RebuildStats {
    /// Vectors in the installed structure.
    pub indexed: usize,
    /// Snapshot entries rejected (wrong dimension, non-finite, zero norm).
    pub skipped: usize,
    /// Journalled writes replayed onto the fresh structure.
    pub replayed: usize,
    /// Generation number of the installed structure.
    pub generation: u64,
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub len: usize,
    pub dims: usize,
    pub generation: u64,
    pub rebuilding: bool,
}

#[derive(Debug, Clone)]
enum JournalOp {
    Insert(String, Vec<f32>),
    Remove(String),
}

/// Exact brute-force structure over normalised vectors.
#[derive(Debug, Clone, Default)]
struct FlatIndex {
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
    positions: HashMap<String, usize>,
}

impl FlatIndex {
    fn len(&self) -> usize {
        self.ids.len()
    }

    fn insert(&mut self, id: String, vector: Vec<f32>) {
        if let Some(&slot) = self.positions.get(&id) {
            self.vectors[slot] = vector;
            return;
        }
        self.positions.insert(id.clone(), self.ids.len());
        self.ids.push(id);
        self.vectors.push(vector);
    }

    fn remove(&mut self, id: &str) -> bool {
        let Some(slot) = self.positions.remove(id) else {
            return false;
        };
        self.ids.swap_remove(slot);
        self.vectors.swap_remove(slot);
        if let Some(moved) = self.ids.get(slot) {
            self.positions.insert(moved.clone(), slot);
        }
        true
    }

    fn apply(&mut self, op: JournalOp) {
        match op {
            JournalOp::Insert(id, vector) => self.insert(id, vector),
            JournalOp::Remove(id) => {
                self.remove(&id);
            }
        }
    }

    fn query(&self, normalized: &[f32], k: usize) -> Vec<Neighbor> {
        let mut hits: Vec<Neighbor> = self
            .ids
            .iter()
            .zip(&self.vectors)
            .map(|(id, vector)| Neighbor {
                id: id.clone(),
                similarity: snap_unit(dot(normalized, vector)),
            })
            .collect();

        let k = k.min(hits.len());
        if k == 0 {
            return Vec::new();
        }
        if hits.len() > k {
            hits.select_nth_unstable_by(k - 1, rank);
            hits.truncate(k);
        }
        hits.sort_by(rank);
        hits
    }
}

/// Descending similarity, then ascending id for a total order.
fn rank(a: &Neighbor, b: &Neighbor) -> std::cmp::Ordering {
    b.similarity
        .total_cmp(&a.similarity)
        .then_with(|| a.id.cmp(&b.id))
}

/// Similarities this close to 1.0 are reported as exactly 1.0.
const UNIT_SNAP: f64 = 1e-6;

/// Clamp to `[0, 1]`. A unit vector stored as `f32` scores a few ulps
/// short of 1.0 against itself; snap that back so identical text always
/// reads as identical.
fn snap_unit(similarity: f64) -> f64 {
    if similarity >= 1.0 - UNIT_SNAP {
        1.0
    } else {
        similarity.clamp(0.0, 1.0)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum()
}

/// Mutable access to the current generation, copying it if a query still
/// holds it.
fn writable(current: &mut Arc<FlatIndex>) -> &mut FlatIndex {
    if Arc::strong_count(current) > 1 {
        debug!(len = current.len(), "copying index generation held by a query");
    }
    Arc::make_mut(current)
}

/// Clears the rebuild flag and journal however `rebuild` exits.
struct RebuildGuard<'a> {
    index: &'a SimilarityIndex,
}

impl Drop for RebuildGuard<'_> {
    fn drop(&mut self) {
        self.index.journal().take();
        self.index.rebuilding.store(false, Ordering::SeqCst);
    }
}

/// Thread-safe similarity index with journalled rebuilds.
pub struct SimilarityIndex {
    dims: usize,
    current: RwLock<Arc<FlatIndex>>,
    journal: Mutex<Option<Vec<JournalOp>>>,
    rebuilding: AtomicBool,
    generation: AtomicU64,
}

impl SimilarityIndex {
    #[must_use]
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            current: RwLock::new(Arc::new(FlatIndex::default())),
            journal: Mutex::new(None),
            rebuilding: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub const fn dims(&self) -> usize {
        self.dims
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.snapshot().positions.contains_key(id)
    }

    #[must_use]
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            len: self.len(),
            dims: self.dims,
            generation: self.generation.load(Ordering::SeqCst),
            rebuilding: self.rebuilding.load(Ordering::SeqCst),
        }
    }

    /// Normalise `vector`, rejecting anything the index cannot search.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::DimensionMismatch`] or
    /// [`IndexError::InvalidVector`].
    pub fn prepare(&self, id: &str, vector: &[f32]) -> Result<Vec<f32>, IndexError> {
        if vector.len() != self.dims {
            return Err(IndexError::DimensionMismatch {
                expected: self.dims,
                actual: vector.len(),
            });
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(IndexError::InvalidVector {
                id: id.to_string(),
                reason: "contains NaN or infinity",
            });
        }
        let mut normalized = vector.to_vec();
        crate::embed::normalize(&mut normalized);
        if normalized.iter().all(|v| *v == 0.0) {
            return Err(IndexError::InvalidVector {
                id: id.to_string(),
                reason: "zero norm",
            });
        }
        Ok(normalized)
    }

    /// Add or replace the vector for `id`. Visible to every query issued
    /// after this returns.
    ///
    /// # Errors
    ///
    /// Rejects vectors that [`prepare`](Self::prepare) rejects.
    pub fn insert(&self, id: &str, vector: &[f32]) -> Result<(), IndexError> {
        let normalized = self.prepare(id, vector)?;
        let mut journal = self.journal();
        if let Some(ops) = journal.as_mut() {
            ops.push(JournalOp::Insert(id.to_string(), normalized.clone()));
        }
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        writable(&mut current).insert(id.to_string(), normalized);
        debug!(id, "indexed vector");
        Ok(())
    }

    /// Remove `id`. Returns whether it was present in the current structure.
    pub fn remove(&self, id: &str) -> bool {
        let mut journal = self.journal();
        if let Some(ops) = journal.as_mut() {
            ops.push(JournalOp::Remove(id.to_string()));
        }
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let removed = writable(&mut current).remove(id);
        debug!(id, removed, "removed vector");
        removed
    }

    /// Top `k` neighbours by descending cosine similarity.
    ///
    /// Ties are ordered by id so results are reproducible.
    ///
    /// # Errors
    ///
    /// Rejects query vectors that [`prepare`](Self::prepare) rejects.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        let normalized = self.prepare("<query>", vector)?;
        Ok(self.snapshot().query(&normalized, k))
    }

    /// Replace the contents with a fresh build from a point-in-time snapshot.
    ///
    /// `load` runs after journalling starts, so any write racing with the
    /// snapshot read is replayed onto the fresh structure.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::RebuildInProgress`] if another rebuild is
    /// running, or [`IndexError::Snapshot`] if `load` fails. The current
    /// structure is untouched on error.
    pub fn rebuild<F>(&self, load: F) -> Result<RebuildStats, IndexError>
    where
        F: FnOnce() -> anyhow::Result<Vec<(String, Vec<f32>)>>,
    {
        if self.rebuilding.swap(true, Ordering::SeqCst) {
            return Err(IndexError::RebuildInProgress);
        }
        let _guard = RebuildGuard { index: self };
        *self.journal() = Some(Vec::new());

        let snapshot = load().map_err(IndexError::Snapshot)?;

        let mut fresh = FlatIndex::default();
        let mut skipped = 0;
        for (id, vector) in snapshot {
            match self.prepare(&id, &vector) {
                Ok(normalized) => fresh.insert(id, normalized),
                Err(err) => {
                    warn!(%err, "skipping vector during rebuild");
                    skipped += 1;
                }
            }
        }

        let mut journal = self.journal();
        let ops = journal.take().unwrap_or_default();
        let replayed = ops.len();
        for op in ops {
            fresh.apply(op);
        }
        let indexed = fresh.len();
        {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            *current = Arc::new(fresh);
        }
        drop(journal);

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(indexed, skipped, replayed, generation, "similarity index rebuilt");
        Ok(RebuildStats {
            indexed,
            skipped,
            replayed,
            generation,
        })
    }

    fn snapshot(&self) -> Arc<FlatIndex> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn journal(&self) -> MutexGuard<'_, Option<Vec<JournalOp>>> {
        self.journal.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SimilarityIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityIndex")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(dims: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dims];
        v[axis] = 1.0;
        v
    }

    #[test]
    fn inserted_vector_is_its_own_nearest_neighbor() {
        let index = SimilarityIndex::new(4);
        index.insert("a", &[1.0, 2.0, 0.0, 0.0]).expect("insert");
        index.insert("b", &unit(4, 3)).expect("insert");

        let hits = index.query(&[1.0, 2.0, 0.0, 0.0], 1).expect("query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn self_similarity_is_exactly_one() {
        let index = SimilarityIndex::new(5);
        let vectors = [
            [0.3_f32, 0.7, 0.1, 0.9, 0.2],
            [1.0, 1.0, 1.0, 1.0, 1.0],
            [0.123, -0.456, 0.789, -0.012, 0.345],
        ];
        for (i, v) in vectors.iter().enumerate() {
            index.insert(&format!("r{i}"), v).expect("insert");
        }
        for (i, v) in vectors.iter().enumerate() {
            let hits = index.query(v, 1).expect("query");
            assert_eq!(hits[0].id, format!("r{i}"));
            assert!(hits[0].similarity.to_bits() == 1.0_f64.to_bits());
        }
    }

    #[test]
    fn writes_copy_a_generation_held_by_a_query() {
        let index = SimilarityIndex::new(3);
        index.insert("a", &unit(3, 0)).expect("insert");
        let held = index.snapshot();

        index.insert("b", &unit(3, 1)).expect("insert");
        assert!(index.remove("a"));
        assert_eq!(held.len(), 1);
        assert_eq!(held.query(&unit(3, 0), 5)[0].id, "a");

        drop(held);
        let current = index.snapshot();
        assert_eq!(Arc::strong_count(&current), 2);
        assert_eq!(current.len(), 1);
        assert_eq!(index.query(&unit(3, 1), 5).expect("query")[0].id, "b");
    }

    #[test]
    fn removed_ids_are_never_returned() {
        let index = SimilarityIndex::new(3);
        for (id, axis) in [("a", 0), ("b", 1), ("c", 2)] {
            index.insert(id, &unit(3, axis)).expect("insert");
        }
        assert!(index.remove("a"));
        assert!(!index.remove("a"));

        let hits = index.query(&unit(3, 0), 10).expect("query");
        assert!(hits.iter().all(|h| h.id != "a"));
        assert_eq!(hits.len(), 2);
        assert!(index.contains("c"));
    }

    #[test]
    fn insert_replaces_existing_vector() {
        let index = SimilarityIndex::new(2);
        index.insert("a", &[1.0, 0.0]).expect("insert");
        index.insert("a", &[0.0, 1.0]).expect("replace");
        assert_eq!(index.len(), 1);
        let hits = index.query(&[0.0, 1.0], 1).expect("query");
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn k_is_bounded_by_index_size() {
        let index = SimilarityIndex::new(2);
        index.insert("a", &[1.0, 0.0]).expect("insert");
        assert_eq!(index.query(&[1.0, 0.0], 50).expect("query").len(), 1);
        assert!(index.query(&[1.0, 0.0], 0).expect("query").is_empty());
    }

    #[test]
    fn negative_similarity_clamps_to_zero() {
        let index = SimilarityIndex::new(2);
        index.insert("a", &[1.0, 0.0]).expect("insert");
        let hits = index.query(&[-1.0, 0.0], 1).expect("query");
        assert!(hits[0].similarity.abs() < f64::EPSILON);
    }

    #[test]
    fn equal_scores_order_by_id() {
        let index = SimilarityIndex::new(2);
        index.insert("b", &[1.0, 0.0]).expect("insert");
        index.insert("a", &[2.0, 0.0]).expect("insert");
        let ids: Vec<String> = index
            .query(&[1.0, 0.0], 2)
            .expect("query")
            .into_iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn bad_vectors_are_rejected() {
        let index = SimilarityIndex::new(2);
        assert!(matches!(
            index.insert("a", &[1.0]),
            Err(IndexError::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            index.insert("a", &[f32::NAN, 1.0]),
            Err(IndexError::InvalidVector { .. })
        ));
        assert!(matches!(
            index.insert("a", &[0.0, 0.0]),
            Err(IndexError::InvalidVector { .. })
        ));
        assert!(index.is_empty());
    }

    #[test]
    fn rebuild_replaces_contents_and_counts_skips() {
        let index = SimilarityIndex::new(2);
        index.insert("stale", &[1.0, 0.0]).expect("insert");

        let stats = index
            .rebuild(|| {
                Ok(vec![
                    ("a".to_string(), vec![1.0, 0.0]),
                    ("b".to_string(), vec![0.0, 1.0]),
                    ("bad".to_string(), vec![1.0]),
                ])
            })
            .expect("rebuild");

        assert_eq!(stats.indexed, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.generation, 1);
        assert!(!index.contains("stale"));
        assert!(index.contains("a"));
        assert!(!index.stats().rebuilding);
    }

    #[test]
    fn writes_during_rebuild_are_replayed() {
        let index = SimilarityIndex::new(2);
        index.insert("gone", &[0.0, 1.0]).expect("insert");

        let stats = index
            .rebuild(|| {
                // Writers racing with the snapshot read.
                index.insert("late", &[1.0, 1.0]).expect("insert during rebuild");
                index.remove("gone");
                Ok(vec![
                    ("a".to_string(), vec![1.0, 0.0]),
                    ("gone".to_string(), vec![0.0, 1.0]),
                ])
            })
            .expect("rebuild");

        assert_eq!(stats.replayed, 2);
        assert!(index.contains("late"));
        assert!(index.contains("a"));
        assert!(!index.contains("gone"));
    }

    #[test]
    fn nested_rebuild_is_rejected() {
        let index = SimilarityIndex::new(2);
        let outer = index.rebuild(|| {
            let inner = index.rebuild(|| Ok(Vec::new()));
            assert!(matches!(inner, Err(IndexError::RebuildInProgress)));
            Ok(vec![("a".to_string(), vec![1.0, 0.0])])
        });
        assert!(outer.is_ok());
        assert!(index.contains("a"));
    }

    #[test]
    fn failed_snapshot_keeps_current_contents() {
        let index = SimilarityIndex::new(2);
        index.insert("a", &[1.0, 0.0]).expect("insert");
        let err = index
            .rebuild(|| Err(anyhow::anyhow!("database offline")))
            .expect_err("load fails");
        assert!(err.to_string().contains("database offline"));
        assert!(index.contains("a"));
        assert!(!index.stats().rebuilding);

        // Journal is cleared, so later writes do not leak into the next rebuild.
        index.insert("b", &[0.0, 1.0]).expect("insert");
        let stats = index.rebuild(|| Ok(Vec::new())).expect("rebuild");
        assert_eq!(stats.replayed, 0);
    }
}
