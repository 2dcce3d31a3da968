//! Manual override entry points.
//!
//! Invoked by reviewers, never by the engine itself. Each override writes an
//! audit entry carrying before/after snapshots and the acting principal.
//! Overrides that change a report's classification also append a
//! corrective history entry pointing at the entry it supersedes; existing
//! history is never edited.

use bugsift_core::model::{
    AuditEvent, AuditRecord, ClassificationTag, HistoryRecord, LowQualityEntry, MatchMethod,
    Report, ReviewStatus,
};
use bugsift_core::{ChangeSet, DetectError};
use serde_json::json;
use tracing::{info, warn};

use super::{Engine, Review, snapshot};
use crate::chain;
use crate::outcome::Outcome;

/// Confidence recorded when a reviewer sets a parent by hand.
const MANUAL_CONFIDENCE: f64 = 1.0;

fn require_actor(actor: &str) -> Result<&str, DetectError> {
    let actor = actor.trim();
    if actor.is_empty() {
        return Err(DetectError::Validation(
            "manual overrides need a non-blank actor".into(),
        ));
    }
    Ok(actor)
}

fn review_key(entry_id: i64) -> String {
    format!("low-quality:{entry_id}")
}

impl Engine {
    /// Turn a `Duplicate` or `Recurring` report back into a standalone `New`
    /// report. The report stays indexed.
    ///
    /// # Errors
    ///
    /// [`DetectError::ReportNotFound`], or [`DetectError::InvalidTransition`]
    /// when the report is neither `Duplicate` nor `Recurring`.
    pub fn promote_to_new(
        &self,
        report_id: &str,
        actor: &str,
        note: Option<&str>,
    ) -> Result<Report, DetectError> {
        let actor = require_actor(actor)?;
        let _guard = self.lock_root(report_id)?;
        let before = self.report(report_id)?;
        if !matches!(
            before.tag,
            ClassificationTag::Duplicate | ClassificationTag::Recurring
        ) {
            return Err(DetectError::InvalidTransition(format!(
                "{report_id} is {}; only duplicate or recurring reports can be promoted to new",
                before.tag
            )));
        }

        let now = self.clock.next();
        let mut after = before.clone();
        after.tag = ClassificationTag::New;
        after.parent_id = None;
        after.match_confidence = None;
        after.updated_at_us = now;

        let history = self.corrective_history(&before, &after, actor, note, now)?;
        let mut audit = AuditRecord::new(AuditEvent::ReportPromoted, actor, now)
            .report(report_id)
            .before(snapshot(&before.summary()))
            .after(snapshot(&after.summary()));
        if let Some(note) = note {
            audit = audit.reasoning(None, note);
        }

        self.store
            .commit(&ChangeSet {
                reports: vec![after.clone()],
                history: vec![history],
                audit: vec![audit],
                ..ChangeSet::default()
            })
            .map_err(DetectError::Storage)?;

        info!(report = report_id, actor, from = %before.tag, "report promoted to new");
        Ok(after)
    }

    /// Set a report's tag (and parent) directly.
    ///
    /// `Duplicate` requires a parent, `New` and `LowQuality` forbid one,
    /// `Recurring` accepts either. A manually chosen parent is recorded with
    /// confidence 1.0. Moving into or out of `LowQuality` removes the report
    /// from, or restores it to, the similarity index. Reclassifying to the
    /// current state is a no-op and writes nothing.
    ///
    /// # Errors
    ///
    /// [`DetectError::ReportNotFound`] for an unknown report or parent,
    /// [`DetectError::InvalidTransition`] for a tag/parent mismatch, and
    /// [`DetectError::Cycle`] when the parent lies below the report.
    pub fn reclassify(
        &self,
        report_id: &str,
        tag: ClassificationTag,
        parent_id: Option<&str>,
        actor: &str,
        note: Option<&str>,
    ) -> Result<Report, DetectError> {
        let actor = require_actor(actor)?;
        if tag.requires_parent() && parent_id.is_none() {
            return Err(DetectError::InvalidTransition(format!(
                "{tag} reports need a parent"
            )));
        }
        if !tag.allows_parent() && parent_id.is_some() {
            return Err(DetectError::InvalidTransition(format!(
                "{tag} reports cannot have a parent"
            )));
        }

        let _guard = self.lock_root(report_id)?;
        let before = self.report(report_id)?;
        if let Some(parent) = parent_id {
            self.report(parent)?;
            if let Some(path) = chain::would_create_cycle(
                self.store.as_ref(),
                report_id,
                parent,
                self.config.engine.max_chain_depth,
            )
            .map_err(DetectError::Storage)?
            {
                warn!(path = %path.join(" -> "), "reclassification refused: cycle");
                return Err(DetectError::Cycle {
                    report: report_id.to_string(),
                    parent: parent.to_string(),
                });
            }
        }
        if before.tag == tag && before.parent_id.as_deref() == parent_id {
            return Ok(before);
        }

        let now = self.clock.next();
        let mut after = before.clone();
        after.tag = tag;
        after.parent_id = parent_id.map(str::to_string);
        after.match_confidence = parent_id.map(|p| {
            if before.parent_id.as_deref() == Some(p) {
                before.match_confidence.unwrap_or(MANUAL_CONFIDENCE)
            } else {
                MANUAL_CONFIDENCE
            }
        });
        after.updated_at_us = now;
        after
            .check_invariants()
            .map_err(DetectError::InvalidTransition)?;

        let history = self.corrective_history(&before, &after, actor, note, now)?;
        let mut audit = AuditRecord::new(AuditEvent::ClassificationChanged, actor, now)
            .report(report_id)
            .before(snapshot(&before.summary()))
            .after(snapshot(&after.summary()));
        if let Some(note) = note {
            audit = audit.reasoning(None, note);
        }

        self.store
            .commit(&ChangeSet {
                reports: vec![after.clone()],
                history: vec![history],
                audit: vec![audit],
                ..ChangeSet::default()
            })
            .map_err(DetectError::Storage)?;

        match (before.tag.is_searchable(), after.tag.is_searchable()) {
            (true, false) => {
                self.index.remove(report_id);
            }
            (false, true) => {
                if let Some(vector) = &after.embedding {
                    self.index_insert(report_id, vector);
                }
            }
            _ => {}
        }

        info!(
            report = report_id,
            actor,
            from = %before.tag,
            to = %after.tag,
            parent = ?after.parent_id,
            "report reclassified"
        );
        Ok(after)
    }

    /// Mark a report resolved. It stays indexed, but only a `Recurring`
    /// report keeps matching new submissions once resolved.
    ///
    /// # Errors
    ///
    /// [`DetectError::ReportNotFound`], or [`DetectError::InvalidTransition`]
    /// when the report is already resolved.
    pub fn resolve(
        &self,
        report_id: &str,
        actor: &str,
        note: Option<&str>,
    ) -> Result<Report, DetectError> {
        self.set_resolution(report_id, actor, note, true)
    }

    /// Clear a report's resolution so it matches new submissions again.
    ///
    /// # Errors
    ///
    /// [`DetectError::ReportNotFound`], or [`DetectError::InvalidTransition`]
    /// when the report is not resolved.
    pub fn reopen(
        &self,
        report_id: &str,
        actor: &str,
        note: Option<&str>,
    ) -> Result<Report, DetectError> {
        self.set_resolution(report_id, actor, note, false)
    }

    fn set_resolution(
        &self,
        report_id: &str,
        actor: &str,
        note: Option<&str>,
        resolved: bool,
    ) -> Result<Report, DetectError> {
        let actor = require_actor(actor)?;
        let _guard = self.lock_root(report_id)?;
        let before = self.report(report_id)?;
        if before.is_resolved() == resolved {
            let state = if resolved { "already resolved" } else { "not resolved" };
            return Err(DetectError::InvalidTransition(format!("{report_id} is {state}")));
        }

        let now = self.clock.next();
        let mut after = before.clone();
        after.resolved_at_us = resolved.then_some(now);
        after.updated_at_us = now;

        let event = if resolved {
            AuditEvent::ReportResolved
        } else {
            AuditEvent::ReportReopened
        };
        let mut audit = AuditRecord::new(event, actor, now)
            .report(report_id)
            .before(json!({ "resolved_at_us": before.resolved_at_us }))
            .after(json!({ "resolved_at_us": after.resolved_at_us }));
        if let Some(note) = note {
            audit = audit.reasoning(None, note);
        }

        self.store
            .commit(&ChangeSet {
                reports: vec![after.clone()],
                audit: vec![audit],
                ..ChangeSet::default()
            })
            .map_err(DetectError::Storage)?;

        info!(report = report_id, actor, event = %event, "report resolution changed");
        Ok(after)
    }

    /// Accept a queued low-quality submission and run it through detection.
    ///
    /// The entry becomes `Approved` in the same commit as the detection
    /// decision, unless detection times out, in which case it stays
    /// `Pending` and the `NeedsReview` outcome is returned.
    ///
    /// # Errors
    ///
    /// [`DetectError::LowQualityNotFound`], [`DetectError::InvalidTransition`]
    /// for an entry already reviewed, or any error `submit` can return.
    pub fn approve_low_quality(
        &self,
        entry_id: i64,
        actor: &str,
        note: Option<&str>,
    ) -> Result<Outcome, DetectError> {
        let actor = require_actor(actor)?;
        let _guard = self.locks.lock(&review_key(entry_id));
        let entry = self.pending_entry(entry_id)?;

        let review = Review {
            entry: &entry,
            actor,
            note,
        };
        let outcome = self.detect(&entry.submission, Some(entry.quality_score), Some(&review))?;
        if matches!(outcome, Outcome::NeedsReview { .. }) {
            return Ok(outcome);
        }

        info!(entry_id, actor, outcome = outcome.kind(), "low-quality entry approved");
        Ok(outcome)
    }

    /// Discard a queued low-quality submission. The entry is kept for audit.
    ///
    /// # Errors
    ///
    /// [`DetectError::LowQualityNotFound`], or
    /// [`DetectError::InvalidTransition`] for an entry already reviewed.
    pub fn reject_low_quality(
        &self,
        entry_id: i64,
        actor: &str,
        note: Option<&str>,
    ) -> Result<LowQualityEntry, DetectError> {
        let actor = require_actor(actor)?;
        let _guard = self.locks.lock(&review_key(entry_id));
        let entry = self.pending_entry(entry_id)?;

        let now = self.clock.next();
        let mut reviewed = entry.clone();
        reviewed.status = ReviewStatus::Rejected;
        reviewed.reviewed_by = Some(actor.to_string());
        reviewed.review_note = note.map(str::to_string);
        reviewed.reviewed_at_us = Some(now);
        let mut audit = AuditRecord::new(AuditEvent::LowQualityRejected, actor, now)
            .low_quality(entry_id)
            .before(snapshot(&entry))
            .after(snapshot(&reviewed));
        if let Some(note) = note {
            audit = audit.reasoning(None, note);
        }
        self.store
            .commit(&ChangeSet {
                audit: vec![audit],
                reviews: vec![reviewed.clone()],
                ..ChangeSet::default()
            })
            .map_err(DetectError::Storage)?;

        info!(entry_id, actor, "low-quality entry rejected");
        Ok(reviewed)
    }

    fn pending_entry(&self, entry_id: i64) -> Result<LowQualityEntry, DetectError> {
        let entry = self.low_quality_entry(entry_id)?;
        if entry.status.is_terminal() {
            return Err(DetectError::InvalidTransition(format!(
                "low-quality entry {entry_id} is already {}",
                entry.status.as_str()
            )));
        }
        Ok(entry)
    }

    /// History entry recording a manual change to `before`.
    fn corrective_history(
        &self,
        before: &Report,
        after: &Report,
        actor: &str,
        note: Option<&str>,
        now: i64,
    ) -> Result<HistoryRecord, DetectError> {
        let superseded = self
            .store
            .list_history(Some(&before.id))
            .map_err(DetectError::Storage)?
            .into_iter()
            .rev()
            .find(|entry| entry.record.candidate_report_id.as_deref() == Some(before.id.as_str()));

        let submission = superseded.as_ref().map_or_else(
            || snapshot(&before.summary()),
            |entry| entry.record.submission.clone(),
        );
        Ok(HistoryRecord {
            candidate_report_id: Some(before.id.clone()),
            parent_report_id: after.parent_id.clone(),
            match_score: after.match_confidence,
            match_method: MatchMethod::Manual,
            submission,
            submitted_by: Some(actor.to_string()),
            was_blocked: false,
            corrects: superseded.map(|entry| entry.id),
            note: note.map(str::to_string),
            recorded_at_us: now,
        })
    }
}
