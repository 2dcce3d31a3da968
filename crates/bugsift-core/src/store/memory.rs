//! In-memory [`Store`] implementation.
//!
//! Everything lives behind one `RwLock`, so a [`ChangeSet`] commit is a
//! single critical section and therefore atomic.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Result, bail};

use super::{ChangeSet, CommitReceipt, Store};
use crate::model::{
    AuditEvent, AuditLogEntry, AuditRecord, DuplicateHistoryEntry, HistoryRecord, LowQualityEntry,
    NewLowQuality, Report, ReviewStatus,
};

#[derive(Default)]
struct Inner {
    reports: HashMap<String, Report>,
    history: Vec<DuplicateHistoryEntry>,
    audit: Vec<AuditLogEntry>,
    low_quality: BTreeMap<i64, LowQualityEntry>,
}

impl Inner {
    fn push_history(&mut self, record: &HistoryRecord) -> i64 {
        let id = next_id(self.history.len());
        self.history.push(DuplicateHistoryEntry {
            id,
            record: record.clone(),
        });
        id
    }

    fn push_audit(&mut self, record: &AuditRecord) -> i64 {
        let id = next_id(self.audit.len());
        self.audit.push(AuditLogEntry {
            id,
            record: record.clone(),
        });
        id
    }

    fn push_low_quality(&mut self, entry: &NewLowQuality) -> LowQualityEntry {
        let id = self.low_quality.keys().next_back().map_or(1, |last| last + 1);
        let stored = entry.clone().into_entry(id);
        self.low_quality.insert(id, stored.clone());
        stored
    }

    fn check_review(&self, entry: &LowQualityEntry) -> Result<()> {
        if !self.low_quality.contains_key(&entry.id) {
            bail!("low-quality entry {} does not exist", entry.id);
        }
        Ok(())
    }
}

fn next_id(len: usize) -> i64 {
    i64::try_from(len).map_or(i64::MAX, |n| n + 1)
}

fn by_creation(a: &Report, b: &Report) -> std::cmp::Ordering {
    a.created_at_us
        .cmp(&b.created_at_us)
        .then_with(|| a.id.cmp(&b.id))
}

/// In-memory store for tests and embedded use.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, to exercise storage-outage paths.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("memory store is rejecting writes");
        }
        Ok(self.inner.write().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Store for MemoryStore {
    fn load_all_vectors(&self) -> Result<Vec<(String, Vec<f32>)>> {
        let inner = self.read();
        let mut reports: Vec<&Report> = inner
            .reports
            .values()
            .filter(|r| r.tag.is_searchable() && r.embedding.is_some())
            .collect();
        reports.sort_by(|a, b| by_creation(a, b));
        Ok(reports
            .into_iter()
            .filter_map(|r| r.embedding.clone().map(|v| (r.id.clone(), v)))
            .collect())
    }

    fn save_report(&self, report: &Report) -> Result<()> {
        self.write()?
            .reports
            .insert(report.id.clone(), report.clone());
        Ok(())
    }

    fn get_report(&self, id: &str) -> Result<Option<Report>> {
        Ok(self.read().reports.get(id).cloned())
    }

    fn children_of(&self, parent_id: &str) -> Result<Vec<Report>> {
        let inner = self.read();
        let mut children: Vec<Report> = inner
            .reports
            .values()
            .filter(|r| r.parent_id.as_deref() == Some(parent_id))
            .cloned()
            .collect();
        children.sort_by(by_creation);
        Ok(children)
    }

    fn list_reports(&self) -> Result<Vec<Report>> {
        let mut reports: Vec<Report> = self.read().reports.values().cloned().collect();
        reports.sort_by(by_creation);
        Ok(reports)
    }

    fn append_history(&self, record: &HistoryRecord) -> Result<i64> {
        Ok(self.write()?.push_history(record))
    }

    fn list_history(&self, report_id: Option<&str>) -> Result<Vec<DuplicateHistoryEntry>> {
        let inner = self.read();
        Ok(inner
            .history
            .iter()
            .filter(|entry| {
                report_id.is_none_or(|id| {
                    entry.record.candidate_report_id.as_deref() == Some(id)
                        || entry.record.parent_report_id.as_deref() == Some(id)
                })
            })
            .cloned()
            .collect())
    }

    fn append_audit(&self, record: &AuditRecord) -> Result<i64> {
        Ok(self.write()?.push_audit(record))
    }

    fn list_audit(&self, event: Option<AuditEvent>) -> Result<Vec<AuditLogEntry>> {
        let inner = self.read();
        Ok(inner
            .audit
            .iter()
            .filter(|entry| event.is_none_or(|e| entry.record.event == e))
            .cloned()
            .collect())
    }

    fn insert_low_quality(&self, entry: &NewLowQuality) -> Result<LowQualityEntry> {
        Ok(self.write()?.push_low_quality(entry))
    }

    fn update_low_quality(&self, entry: &LowQualityEntry) -> Result<()> {
        let mut inner = self.write()?;
        inner.check_review(entry)?;
        inner.low_quality.insert(entry.id, entry.clone());
        Ok(())
    }

    fn get_low_quality(&self, id: i64) -> Result<Option<LowQualityEntry>> {
        Ok(self.read().low_quality.get(&id).cloned())
    }

    fn list_low_quality(&self, status: Option<ReviewStatus>) -> Result<Vec<LowQualityEntry>> {
        Ok(self
            .read()
            .low_quality
            .values()
            .filter(|entry| status.is_none_or(|s| entry.status == s))
            .cloned()
            .collect())
    }

    fn commit(&self, changes: &ChangeSet) -> Result<CommitReceipt> {
        let mut inner = self.write()?;
        // Validate before the first mutation so a bad set leaves no trace.
        for review in &changes.reviews {
            inner.check_review(review)?;
        }
        for report in &changes.reports {
            inner.reports.insert(report.id.clone(), report.clone());
        }
        let queued = changes
            .queued
            .as_ref()
            .map(|entry| inner.push_low_quality(entry));
        for review in &changes.reviews {
            inner.low_quality.insert(review.id, review.clone());
        }
        let history_ids = changes
            .history
            .iter()
            .map(|record| inner.push_history(record))
            .collect();
        let audit_ids = changes
            .linked_audit(queued.as_ref().map(|entry| entry.id))
            .iter()
            .map(|record| inner.push_audit(record))
            .collect();
        Ok(CommitReceipt {
            history_ids,
            audit_ids,
            queued,
        })
    }
}
