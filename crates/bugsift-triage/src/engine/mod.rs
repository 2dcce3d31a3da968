//! Classification engine.
//!
//! `submit` runs one submission through the whole pipeline:
//!
//! ```text
//! validate → quality gate → embed → index query → hybrid score → decide
//!          ↘ LowQuality                                         ↙   ↓   ↘
//!                                                          Block  Flag  Create
//! ```
//!
//! Embedding and querying happen without any lock held. Decisions that can
//! change a chain's recurring count (flag, promotion, overrides) run inside
//! the chain root's critical section, from the final decision through
//! persistence, index update and promotion.
//!
//! Every write belonging to one decision goes to the store as a single
//! [`ChangeSet`]. The index is updated only after the commit succeeds, so a
//! failed write leaves nothing searchable behind.

mod overrides;
mod stats;

use std::sync::Arc;
use std::time::Duration;

use bugsift_core::config::Config;
use bugsift_core::error::Backend;
use bugsift_core::model::{
    AuditEvent, AuditLogEntry, AuditRecord, ClassificationTag, DuplicateHistoryEntry,
    HistoryRecord, LowQualityEntry, MatchMethod, Metadata, NewLowQuality, RawSubmission, Report,
    ReportSummary, ReviewStatus, Submission, generate_report_id,
};
use bugsift_core::quality::{QualityChecker, QualityResult};
use bugsift_core::{ChangeSet, DetectError, Store};
use bugsift_search::{
    Embedder, HybridScorer, IndexError, Neighbor, RebuildStats, ScoredMatch, SimilarityIndex,
};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::chain;
use crate::clock::MonotonicClock;
use crate::locks::{RootGuard, RootLocks};
use crate::outcome::{CandidateMatch, Outcome};
use crate::timeout::{DeadlineError, Deadlines};

/// Hybrid scores this close to the maximum count as tied.
const TIE_EPSILON: f64 = 1e-9;

/// Slack on threshold comparisons, so a score that equals a threshold in
/// exact arithmetic is not pushed below it by rounding.
const THRESHOLD_EPSILON: f64 = 1e-9;

/// Attempts at a collision-free report id before giving up.
const MAX_ID_ATTEMPTS: u32 = 16;

/// Times a root lock is re-taken when the chain moved under us.
const MAX_ROOT_RETRIES: usize = 3;

/// Embedding or query helpers left running past their deadline before
/// further submissions are refused as unavailable.
const MAX_STALLED_CALLS: usize = 16;

/// An existing report scored against the incoming submission.
struct Candidate {
    report: Report,
    scored: ScoredMatch,
}

enum Decision<'a> {
    Block(&'a Candidate),
    Flag(&'a Candidate),
    Create(Option<&'a Candidate>),
}

/// The duplicate-detection and classification engine.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct Engine {
    config: Config,
    store: Arc<dyn Store>,
    embedder: Arc<dyn Embedder>,
    index: Arc<SimilarityIndex>,
    scorer: HybridScorer,
    checker: QualityChecker,
    clock: MonotonicClock,
    locks: RootLocks,
    deadlines: Deadlines,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("model", &self.embedder.model_name())
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Build an engine and load every persisted vector into the index.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::Config`] for an invalid configuration or an
    /// embedder whose dimensionality differs from `engine.dimensions`, and
    /// [`DetectError::Storage`] if the initial load fails.
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, DetectError> {
        config.validate()?;
        if embedder.dims() != config.engine.dimensions {
            return Err(DetectError::Config(format!(
                "embedder {} produces {} dimensions but engine.dimensions is {}",
                embedder.model_name(),
                embedder.dims(),
                config.engine.dimensions
            )));
        }

        let newest = store
            .list_reports()
            .map_err(DetectError::Storage)?
            .iter()
            .map(|r| r.created_at_us)
            .max()
            .unwrap_or(0);

        let engine = Self {
            scorer: HybridScorer::new(config.scoring.clone()),
            checker: QualityChecker::new(config.quality.clone()),
            index: Arc::new(SimilarityIndex::new(embedder.dims())),
            clock: MonotonicClock::starting_after(newest),
            locks: RootLocks::new(),
            deadlines: Deadlines::new(MAX_STALLED_CALLS),
            config,
            store,
            embedder,
        };

        let loaded = engine.rebuild_index()?;
        info!(
            model = engine.embedder.model_name(),
            indexed = loaded.indexed,
            skipped = loaded.skipped,
            "classification engine ready"
        );
        Ok(engine)
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    #[must_use]
    pub fn index(&self) -> &SimilarityIndex {
        &self.index
    }

    /// Classify one JSON payload.
    ///
    /// # Errors
    ///
    /// [`DetectError::Validation`] for a malformed payload,
    /// [`DetectError::Unavailable`] when the embedder or index fails, and
    /// [`DetectError::Storage`] when persistence fails. Nothing is written
    /// in any of these cases, so the call can be retried.
    #[instrument(skip_all)]
    pub fn submit(&self, payload: serde_json::Value) -> Result<Outcome, DetectError> {
        let submission = Submission::from_json(payload)?;
        self.submit_submission(&submission)
    }

    /// Classify an already deserialised payload.
    ///
    /// # Errors
    ///
    /// Same as [`submit`](Self::submit).
    pub fn submit_raw(&self, raw: RawSubmission) -> Result<Outcome, DetectError> {
        let submission = Submission::try_from_raw(raw)?;
        self.submit_submission(&submission)
    }

    fn submit_submission(&self, submission: &Submission) -> Result<Outcome, DetectError> {
        let quality = self.checker.check(submission);
        if !quality.passed {
            return self.queue_low_quality(submission, &quality);
        }
        self.detect(submission, Some(quality.score), None)
    }

    fn queue_low_quality(
        &self,
        submission: &Submission,
        quality: &QualityResult,
    ) -> Result<Outcome, DetectError> {
        let now = self.clock.next();
        let queued = NewLowQuality {
            submission: submission.clone(),
            issues: quality.issues.clone(),
            quality_score: quality.score,
            created_at_us: now,
        };
        let codes: Vec<&str> = quality.issues.iter().map(|i| i.code.as_str()).collect();
        let audit = AuditRecord::new(AuditEvent::LowQualityFlagged, self.actor(), now)
            .after(snapshot(&queued))
            .reasoning(
                None,
                format!("quality score {:.2}: {}", quality.score, codes.join(", ")),
            );

        let receipt = self
            .store
            .commit(&ChangeSet {
                audit: vec![audit],
                queued: Some(queued),
                ..ChangeSet::default()
            })
            .map_err(DetectError::Storage)?;
        let entry = receipt.queued.ok_or_else(|| {
            DetectError::Storage(anyhow::anyhow!("store did not return the queued entry"))
        })?;

        info!(
            entry_id = entry.id,
            score = quality.score,
            issues = ?codes,
            "submission queued for quality review"
        );
        Ok(Outcome::LowQuality {
            entry_id: entry.id,
            score: quality.score,
            issues: quality.issues.clone(),
        })
    }

    /// Embed, search, score and decide. Skips the quality gate.
    ///
    /// With `review`, the queue entry's approval commits in the same change
    /// set as the decision.
    fn detect(
        &self,
        submission: &Submission,
        quality_score: Option<f64>,
        review: Option<&Review<'_>>,
    ) -> Result<Outcome, DetectError> {
        let payload = submission.to_payload();

        let embedder = Arc::clone(&self.embedder);
        let text = submission.embedding_text();
        let embed_limit = Duration::from_millis(self.config.engine.embed_timeout_ms);
        let embedded = match self.deadlines.run(embed_limit, move || embedder.embed(&text)) {
            Ok(embedded) => embedded,
            Err(DeadlineError::Expired(_)) => {
                return self.needs_review(
                    &payload,
                    format!(
                        "embedding timed out after {} ms",
                        self.config.engine.embed_timeout_ms
                    ),
                );
            }
            Err(err) => {
                return Err(DetectError::Unavailable {
                    backend: Backend::Embedding,
                    reason: err.to_string(),
                });
            }
        };
        let vector = embedded.map_err(|err| DetectError::Unavailable {
            backend: Backend::Embedding,
            reason: format!("{err:#}"),
        })?;
        self.index
            .prepare("<submission>", &vector)
            .map_err(|err| DetectError::Unavailable {
                backend: Backend::Embedding,
                reason: err.to_string(),
            })?;

        let index = Arc::clone(&self.index);
        let query_vector = vector.clone();
        let top_k = self.config.engine.top_k;
        let query_limit = Duration::from_millis(self.config.engine.query_timeout_ms);
        let queried = match self
            .deadlines
            .run(query_limit, move || index.query(&query_vector, top_k))
        {
            Ok(queried) => queried,
            Err(DeadlineError::Expired(_)) => {
                return self.needs_review(
                    &payload,
                    format!(
                        "similarity query timed out after {} ms",
                        self.config.engine.query_timeout_ms
                    ),
                );
            }
            Err(err) => {
                return Err(DetectError::Unavailable {
                    backend: Backend::Index,
                    reason: err.to_string(),
                });
            }
        };
        let neighbors = queried.map_err(|err| DetectError::Unavailable {
            backend: Backend::Index,
            reason: err.to_string(),
        })?;

        let candidates = self.score_candidates(&neighbors, &submission.metadata)?;
        let draft = Draft {
            submission,
            payload,
            vector,
            quality_score,
            review,
        };
        match self.decide(&candidates) {
            Decision::Block(best) => self.block(best, &draft),
            Decision::Flag(best) => self.flag(best, &draft),
            Decision::Create(closest) => self.create(closest, &draft),
        }
    }

    /// Score every neighbour that still resolves to a consistent report.
    fn score_candidates(
        &self,
        neighbors: &[Neighbor],
        incoming: &Metadata,
    ) -> Result<Vec<Candidate>, DetectError> {
        let mut candidates = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            let Some(report) = self
                .store
                .get_report(&neighbor.id)
                .map_err(DetectError::Storage)?
            else {
                warn!(candidate = %neighbor.id, "indexed report missing from store; excluded");
                continue;
            };
            if !report.accepts_matches() {
                debug!(
                    candidate = %report.id,
                    tag = %report.tag,
                    resolved = report.is_resolved(),
                    "candidate not matchable; excluded"
                );
                continue;
            }
            if let Some(parent) = report.parent_id.as_deref() {
                if self
                    .store
                    .get_report(parent)
                    .map_err(DetectError::Storage)?
                    .is_none()
                {
                    warn!(candidate = %report.id, %parent, "candidate parent no longer exists; excluded");
                    continue;
                }
            }
            let scored = self
                .scorer
                .score(&report.metadata, incoming, neighbor.similarity);
            debug!(candidate = %report.id, hybrid = scored.hybrid, vector = scored.vector_similarity, "scored candidate");
            candidates.push(Candidate { report, scored });
        }
        Ok(candidates)
    }

    fn decide<'a>(&self, candidates: &'a [Candidate]) -> Decision<'a> {
        let Some(best) = pick_best(candidates) else {
            return Decision::Create(None);
        };
        let thresholds = &self.config.thresholds;
        let score = best.scored.hybrid + THRESHOLD_EPSILON;
        if score >= thresholds.block {
            Decision::Block(best)
        } else if score >= thresholds.flag {
            Decision::Flag(best)
        } else {
            Decision::Create(Some(best))
        }
    }

    fn block(&self, best: &Candidate, draft: &Draft<'_>) -> Result<Outcome, DetectError> {
        let now = self.clock.next();
        let parent_id = best.report.id.clone();
        let confidence = best.scored.hybrid;

        let history = HistoryRecord {
            candidate_report_id: None,
            parent_report_id: Some(parent_id.clone()),
            match_score: Some(confidence),
            match_method: MatchMethod::Hybrid,
            submission: draft.payload.clone(),
            submitted_by: draft.submission.reporter.clone(),
            was_blocked: true,
            corrects: None,
            note: None,
            recorded_at_us: now,
        };
        let audit = AuditRecord::new(AuditEvent::DuplicateBlocked, self.actor(), now)
            .report(parent_id.clone())
            .after(draft.payload.clone())
            .reasoning(Some(confidence), best.scored.details.reasoning());

        let mut changes = ChangeSet {
            history: vec![history],
            audit: vec![audit],
            ..ChangeSet::default()
        };
        if let Some(review) = draft.review {
            review.approve(&mut changes, None, Some(confidence), "blocked", now);
        }
        let receipt = self
            .store
            .commit(&changes)
            .map_err(DetectError::Storage)?;

        info!(parent = %parent_id, score = confidence, "submission blocked as duplicate");
        Ok(Outcome::Blocked {
            parent_id,
            confidence,
            history_id: receipt.history_ids.first().copied().unwrap_or_default(),
            details: best.scored.details.clone(),
        })
    }

    fn flag(&self, best: &Candidate, draft: &Draft<'_>) -> Result<Outcome, DetectError> {
        let guard = self.lock_root(&best.report.id)?;
        let now = self.clock.next();
        let parent_id = best.report.id.clone();
        let confidence = best.scored.hybrid;

        let report = self.new_report(
            draft,
            ClassificationTag::Duplicate,
            Some((parent_id.clone(), confidence)),
            now,
        )?;
        let history = HistoryRecord {
            candidate_report_id: Some(report.id.clone()),
            parent_report_id: Some(parent_id.clone()),
            match_score: Some(confidence),
            match_method: MatchMethod::Hybrid,
            submission: draft.payload.clone(),
            submitted_by: draft.submission.reporter.clone(),
            was_blocked: false,
            corrects: None,
            note: None,
            recorded_at_us: now,
        };
        let audit = AuditRecord::new(AuditEvent::DuplicateFlagged, self.actor(), now)
            .report(report.id.clone())
            .after(snapshot(&report.summary()))
            .reasoning(Some(confidence), best.scored.details.reasoning());

        let mut changes = ChangeSet {
            reports: vec![report.clone()],
            history: vec![history],
            audit: vec![audit],
            ..ChangeSet::default()
        };
        if let Some(review) = draft.review {
            review.approve(
                &mut changes,
                Some(&report.id),
                Some(confidence),
                "flagged_duplicate",
                now,
            );
        }
        let receipt = self
            .store
            .commit(&changes)
            .map_err(DetectError::Storage)?;
        self.index_insert(&report.id, &draft.vector);

        // The report is committed; a failed promotion must not turn into a
        // retryable error or the caller would submit it twice.
        let promoted_root = match self.maybe_promote(guard.key()) {
            Ok(promoted) => promoted,
            Err(err) => {
                error!(root = guard.key(), %err, "recurring promotion failed");
                None
            }
        };
        drop(guard);

        info!(report = %report.id, parent = %parent_id, score = confidence, "submission flagged as duplicate");
        Ok(Outcome::FlaggedDuplicate {
            report_id: report.id,
            parent_id,
            confidence,
            history_id: receipt.history_ids.first().copied().unwrap_or_default(),
            details: best.scored.details.clone(),
            promoted_root,
        })
    }

    fn create(
        &self,
        closest: Option<&Candidate>,
        draft: &Draft<'_>,
    ) -> Result<Outcome, DetectError> {
        let now = self.clock.next();
        let report = self.new_report(draft, ClassificationTag::New, None, now)?;

        let history = HistoryRecord {
            candidate_report_id: Some(report.id.clone()),
            parent_report_id: closest.map(|c| c.report.id.clone()),
            match_score: closest.map(|c| c.scored.hybrid),
            // Without a candidate only the vector search ran.
            match_method: if closest.is_some() {
                MatchMethod::Hybrid
            } else {
                MatchMethod::Vector
            },
            submission: draft.payload.clone(),
            submitted_by: draft.submission.reporter.clone(),
            was_blocked: false,
            corrects: None,
            note: None,
            recorded_at_us: now,
        };
        let mut audit = AuditRecord::new(AuditEvent::ReportCreated, self.actor(), now)
            .report(report.id.clone())
            .after(snapshot(&report.summary()));
        if let Some(c) = closest {
            audit = audit.reasoning(
                Some(c.scored.hybrid),
                format!(
                    "closest match {} below flag threshold; {}",
                    c.report.id,
                    c.scored.details.reasoning()
                ),
            );
        }

        let mut changes = ChangeSet {
            reports: vec![report.clone()],
            history: vec![history],
            audit: vec![audit],
            ..ChangeSet::default()
        };
        if let Some(review) = draft.review {
            review.approve(
                &mut changes,
                Some(&report.id),
                closest.map(|c| c.scored.hybrid),
                "created",
                now,
            );
        }
        let receipt = self
            .store
            .commit(&changes)
            .map_err(DetectError::Storage)?;
        self.index_insert(&report.id, &draft.vector);

        info!(report = %report.id, closest = ?closest.map(|c| c.scored.hybrid), "report created");
        Ok(Outcome::Created {
            report_id: report.id,
            history_id: receipt.history_ids.first().copied().unwrap_or_default(),
            closest: closest.map(|c| CandidateMatch::new(&c.report.id, &c.scored)),
        })
    }

    /// Record a fail-closed outcome. Nothing is created or blocked.
    fn needs_review(
        &self,
        payload: &serde_json::Value,
        reason: String,
    ) -> Result<Outcome, DetectError> {
        let audit = AuditRecord::new(
            AuditEvent::ClassificationIndeterminate,
            self.actor(),
            self.clock.next(),
        )
        .after(payload.clone())
        .reasoning(None, reason.clone());
        let audit_id = self.store.append_audit(&audit).map_err(DetectError::Storage)?;
        warn!(%reason, audit_id, "classification indeterminate; surfaced for manual review");
        Ok(Outcome::NeedsReview { reason, audit_id })
    }

    /// Promote `root_id` to `Recurring` once enough duplicates sit below it.
    ///
    /// Caller holds the root's lock.
    fn maybe_promote(&self, root_id: &str) -> Result<Option<String>, DetectError> {
        let Some(root) = self.store.get_report(root_id).map_err(DetectError::Storage)? else {
            return Ok(None);
        };
        if matches!(
            root.tag,
            ClassificationTag::Recurring | ClassificationTag::LowQuality
        ) {
            return Ok(None);
        }

        let count = chain::count_duplicates(
            self.store.as_ref(),
            root_id,
            self.config.engine.max_chain_depth,
        )
        .map_err(DetectError::Storage)?;
        if count < self.config.engine.recurring_threshold {
            debug!(root = root_id, count, "below recurring threshold");
            return Ok(None);
        }

        let now = self.clock.next();
        let mut promoted = root.clone();
        promoted.tag = ClassificationTag::Recurring;
        promoted.updated_at_us = now;

        let audit = AuditRecord::new(AuditEvent::RecurringPromoted, self.actor(), now)
            .report(root_id)
            .before(snapshot(&root.summary()))
            .after(snapshot(&promoted.summary()))
            .reasoning(None, format!("{count} duplicate reports detected"));
        self.store
            .commit(&ChangeSet {
                reports: vec![promoted],
                audit: vec![audit],
                ..ChangeSet::default()
            })
            .map_err(DetectError::Storage)?;

        info!(root = root_id, count, "root promoted to recurring");
        Ok(Some(root_id.to_string()))
    }

    /// Lock the root of `report_id`'s chain, re-resolving if the chain was
    /// re-parented between the walk and the lock.
    fn lock_root(&self, report_id: &str) -> Result<RootGuard<'_>, DetectError> {
        let depth = self.config.engine.max_chain_depth;
        let mut root = chain::resolve_root(self.store.as_ref(), report_id, depth)
            .map_err(DetectError::Storage)?;
        for _ in 0..MAX_ROOT_RETRIES {
            let guard = self.locks.lock(&root);
            let confirmed = chain::resolve_root(self.store.as_ref(), report_id, depth)
                .map_err(DetectError::Storage)?;
            if confirmed == root {
                return Ok(guard);
            }
            drop(guard);
            root = confirmed;
        }
        warn!(report = report_id, %root, "chain kept moving; locking latest root");
        Ok(self.locks.lock(&root))
    }

    fn new_report(
        &self,
        draft: &Draft<'_>,
        tag: ClassificationTag,
        parent: Option<(String, f64)>,
        now: i64,
    ) -> Result<Report, DetectError> {
        let submission = draft.submission;
        let (parent_id, match_confidence) = match parent {
            Some((id, confidence)) => (Some(id), Some(confidence)),
            None => (None, None),
        };
        Ok(Report {
            id: self.allocate_id(now, &submission.embedding_text())?,
            title: submission.title.clone(),
            description: submission.description.clone(),
            repro_steps: submission.repro_steps.clone(),
            logs: submission.logs.clone(),
            reporter: submission.reporter.clone(),
            metadata: submission.metadata.clone(),
            embedding: Some(draft.vector.clone()),
            tag,
            parent_id,
            match_confidence,
            quality_score: draft.quality_score,
            created_at_us: now,
            updated_at_us: now,
            resolved_at_us: None,
        })
    }

    fn allocate_id(&self, now: i64, text: &str) -> Result<String, DetectError> {
        for attempt in 0..MAX_ID_ATTEMPTS {
            let id = generate_report_id(now, text, attempt);
            if self
                .store
                .get_report(&id)
                .map_err(DetectError::Storage)?
                .is_none()
            {
                return Ok(id);
            }
            debug!(%id, attempt, "report id collision");
        }
        Err(DetectError::Storage(anyhow::anyhow!(
            "no free report id after {MAX_ID_ATTEMPTS} attempts"
        )))
    }

    fn index_insert(&self, id: &str, vector: &[f32]) {
        if let Err(err) = self.index.insert(id, vector) {
            error!(report = id, %err, "committed report could not be indexed; run rebuild-index");
        }
    }

    fn actor(&self) -> &str {
        &self.config.engine.actor
    }

    /// Summaries of every report below `report_id`, oldest first.
    ///
    /// # Errors
    ///
    /// [`DetectError::ReportNotFound`] for an unknown id.
    pub fn get_duplicates(&self, report_id: &str) -> Result<Vec<ReportSummary>, DetectError> {
        self.report(report_id)?;
        let mut below = chain::descendants(
            self.store.as_ref(),
            report_id,
            self.config.engine.max_chain_depth,
        )
        .map_err(DetectError::Storage)?;
        below.sort_by(|a, b| {
            a.created_at_us
                .cmp(&b.created_at_us)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(below.iter().map(Report::summary).collect())
    }

    /// Rebuild the similarity index from the store.
    ///
    /// Safe to call on a schedule; writes racing with it are preserved.
    ///
    /// # Errors
    ///
    /// [`DetectError::RebuildInProgress`] if a rebuild is already running,
    /// [`DetectError::Storage`] if the snapshot cannot be read.
    pub fn rebuild_index(&self) -> Result<RebuildStats, DetectError> {
        self.index
            .rebuild(|| self.store.load_all_vectors())
            .map_err(|err| match err {
                IndexError::RebuildInProgress => DetectError::RebuildInProgress,
                IndexError::Snapshot(source) => DetectError::Storage(source),
                other => DetectError::Unavailable {
                    backend: Backend::Index,
                    reason: other.to_string(),
                },
            })
    }

    /// # Errors
    ///
    /// [`DetectError::ReportNotFound`] for an unknown id.
    pub fn report(&self, report_id: &str) -> Result<Report, DetectError> {
        self.store
            .get_report(report_id)
            .map_err(DetectError::Storage)?
            .ok_or_else(|| DetectError::ReportNotFound(report_id.to_string()))
    }

    /// # Errors
    ///
    /// [`DetectError::LowQualityNotFound`] for an unknown id.
    pub fn low_quality_entry(&self, entry_id: i64) -> Result<LowQualityEntry, DetectError> {
        self.store
            .get_low_quality(entry_id)
            .map_err(DetectError::Storage)?
            .ok_or(DetectError::LowQualityNotFound(entry_id))
    }

    /// # Errors
    ///
    /// Propagates store failures.
    pub fn low_quality_queue(
        &self,
        status: Option<ReviewStatus>,
    ) -> Result<Vec<LowQualityEntry>, DetectError> {
        self.store
            .list_low_quality(status)
            .map_err(DetectError::Storage)
    }

    /// # Errors
    ///
    /// Propagates store failures.
    pub fn history(
        &self,
        report_id: Option<&str>,
    ) -> Result<Vec<DuplicateHistoryEntry>, DetectError> {
        self.store
            .list_history(report_id)
            .map_err(DetectError::Storage)
    }

    /// # Errors
    ///
    /// Propagates store failures.
    pub fn audit_log(&self, event: Option<AuditEvent>) -> Result<Vec<AuditLogEntry>, DetectError> {
        self.store.list_audit(event).map_err(DetectError::Storage)
    }
}

/// Inputs shared by the three decision paths.
struct Draft<'a> {
    submission: &'a Submission,
    payload: serde_json::Value,
    vector: Vec<f32>,
    quality_score: Option<f64>,
    review: Option<&'a Review<'a>>,
}

/// A reviewer approving a queued submission.
struct Review<'a> {
    entry: &'a LowQualityEntry,
    actor: &'a str,
    note: Option<&'a str>,
}

impl Review<'_> {
    /// Approval writes for a decision that produced `report_id`.
    fn approve(
        &self,
        changes: &mut ChangeSet,
        report_id: Option<&str>,
        confidence: Option<f64>,
        kind: &str,
        now: i64,
    ) {
        let mut reviewed = self.entry.clone();
        reviewed.status = ReviewStatus::Approved;
        reviewed.report_id = report_id.map(str::to_string);
        reviewed.reviewed_by = Some(self.actor.to_string());
        reviewed.review_note = self.note.map(str::to_string);
        reviewed.reviewed_at_us = Some(now);

        let mut audit = AuditRecord::new(AuditEvent::LowQualityApproved, self.actor, now)
            .low_quality(self.entry.id)
            .before(snapshot(self.entry))
            .after(snapshot(&reviewed))
            .reasoning(confidence, format!("approved; detection outcome {kind}"));
        if let Some(report_id) = report_id {
            audit = audit.report(report_id);
        }
        changes.reviews.push(reviewed);
        changes.audit.push(audit);
    }
}

/// Highest hybrid score; ties go to the oldest report, then the smallest id.
fn pick_best(candidates: &[Candidate]) -> Option<&Candidate> {
    let top = candidates
        .iter()
        .map(|c| c.scored.hybrid)
        .fold(f64::NEG_INFINITY, f64::max);
    candidates
        .iter()
        .filter(|c| top - c.scored.hybrid <= TIE_EPSILON)
        .min_by(|a, b| {
            a.report
                .created_at_us
                .cmp(&b.report.created_at_us)
                .then_with(|| a.report.id.cmp(&b.report.id))
        })
}

fn snapshot<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}
