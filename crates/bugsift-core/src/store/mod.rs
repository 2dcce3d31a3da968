//! Persistence contract for the detection engine.
//!
//! The [`Store`] trait is the narrow read/write surface the engine needs:
//! accepted reports, the append-only decision history, the append-only audit
//! log, and the low-quality review queue. Two backends ship with the crate:
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`MemoryStore`] | tests and embedding inside another process |
//! | [`SqliteStore`](crate::db::SqliteStore) | durable single-node deployments |
//!
//! Implementations must be `Send + Sync`; the engine shares one store across
//! worker threads.

pub mod memory;

use anyhow::Result;

use crate::model::{
    AuditEvent, AuditLogEntry, AuditRecord, DuplicateHistoryEntry, HistoryRecord, LowQualityEntry,
    NewLowQuality, Report, ReviewStatus,
};

pub use memory::MemoryStore;

/// Writes belonging to one classification decision.
///
/// Backends apply a change set atomically: either every report upsert,
/// queue write, history entry and audit entry lands, or none does.
///
/// Write order is reports, `queued`, `reviews`, history, audit. When
/// `queued` is set, audit records without a queue link are linked to the
/// newly assigned entry id.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub reports: Vec<Report>,
    pub history: Vec<HistoryRecord>,
    pub audit: Vec<AuditRecord>,
    /// A quality-rejected submission entering the review queue.
    pub queued: Option<NewLowQuality>,
    /// Review decisions on existing queue entries.
    pub reviews: Vec<LowQualityEntry>,
}

impl ChangeSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
            && self.history.is_empty()
            && self.audit.is_empty()
            && self.queued.is_none()
            && self.reviews.is_empty()
    }

    /// `audit` with queue links filled in for a freshly queued entry.
    #[must_use]
    pub fn linked_audit(&self, queued_id: Option<i64>) -> Vec<AuditRecord> {
        self.audit
            .iter()
            .map(|record| {
                let mut record = record.clone();
                if record.low_quality_id.is_none() {
                    record.low_quality_id = queued_id;
                }
                record
            })
            .collect()
    }
}

/// Ids assigned while committing a [`ChangeSet`], in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitReceipt {
    pub history_ids: Vec<i64>,
    pub audit_ids: Vec<i64>,
    /// The stored form of [`ChangeSet::queued`].
    pub queued: Option<LowQualityEntry>,
}

/// Storage backend consumed by the classification engine.
pub trait Store: Send + Sync {
    /// Every searchable report that carries an embedding, as `(id, vector)`.
    fn load_all_vectors(&self) -> Result<Vec<(String, Vec<f32>)>>;

    /// Insert or replace a report.
    fn save_report(&self, report: &Report) -> Result<()>;

    fn get_report(&self, id: &str) -> Result<Option<Report>>;

    /// Direct children of `parent_id`, oldest first.
    fn children_of(&self, parent_id: &str) -> Result<Vec<Report>>;

    /// All reports, oldest first.
    fn list_reports(&self) -> Result<Vec<Report>>;

    /// Append one decision record and return its id.
    fn append_history(&self, record: &HistoryRecord) -> Result<i64>;

    /// History entries, oldest first. With `report_id`, only entries where
    /// the report is the candidate or the parent.
    fn list_history(&self, report_id: Option<&str>) -> Result<Vec<DuplicateHistoryEntry>>;

    /// Append one audit record and return its id.
    fn append_audit(&self, record: &AuditRecord) -> Result<i64>;

    /// Audit entries, oldest first, optionally restricted to one event kind.
    fn list_audit(&self, event: Option<AuditEvent>) -> Result<Vec<AuditLogEntry>>;

    /// Queue a quality-rejected submission for review.
    fn insert_low_quality(&self, entry: &NewLowQuality) -> Result<LowQualityEntry>;

    /// Persist a review decision on an existing entry.
    fn update_low_quality(&self, entry: &LowQualityEntry) -> Result<()>;

    fn get_low_quality(&self, id: i64) -> Result<Option<LowQualityEntry>>;

    /// Queue entries, oldest first, optionally restricted to one status.
    fn list_low_quality(&self, status: Option<ReviewStatus>) -> Result<Vec<LowQualityEntry>>;

    /// Apply a change set atomically.
    ///
    /// The default implementation applies each write in order and is only
    /// atomic for backends whose individual writes cannot fail halfway.
    fn commit(&self, changes: &ChangeSet) -> Result<CommitReceipt> {
        for report in &changes.reports {
            self.save_report(report)?;
        }
        let queued = changes
            .queued
            .as_ref()
            .map(|entry| self.insert_low_quality(entry))
            .transpose()?;
        for review in &changes.reviews {
            self.update_low_quality(review)?;
        }
        let history_ids = changes
            .history
            .iter()
            .map(|record| self.append_history(record))
            .collect::<Result<Vec<_>>>()?;
        let audit_ids = changes
            .linked_audit(queued.as_ref().map(|entry| entry.id))
            .iter()
            .map(|record| self.append_audit(record))
            .collect::<Result<Vec<_>>>()?;
        Ok(CommitReceipt {
            history_ids,
            audit_ids,
            queued,
        })
    }
}
