//! Append-only decision history and audit records.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// How a history entry's match score was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    /// Cosine similarity only.
    Vector,
    /// Vector similarity blended with metadata similarity.
    Hybrid,
    /// A human decided.
    Manual,
}

impl MatchMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Hybrid => "hybrid",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vector" => Ok(Self::Vector),
            "hybrid" => Ok(Self::Hybrid),
            "manual" => Ok(Self::Manual),
            other => Err(format!("unknown match method '{other}'")),
        }
    }
}

/// One classification decision, before the store assigns it an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Report created by the decision. `None` when the submission was blocked.
    pub candidate_report_id: Option<String>,
    /// Report the submission was matched against, if any.
    pub parent_report_id: Option<String>,
    pub match_score: Option<f64>,
    pub match_method: MatchMethod,
    /// Submission exactly as accepted, so blocked payloads stay recoverable.
    pub submission: serde_json::Value,
    pub submitted_by: Option<String>,
    pub was_blocked: bool,
    /// Earlier entry this one supersedes (manual corrections only).
    pub corrects: Option<i64>,
    pub note: Option<String>,
    pub recorded_at_us: i64,
}

/// A persisted [`HistoryRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateHistoryEntry {
    pub id: i64,
    #[serde(flatten)]
    pub record: HistoryRecord,
}

/// Kind of state change captured in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    ReportCreated,
    DuplicateFlagged,
    DuplicateBlocked,
    RecurringPromoted,
    LowQualityFlagged,
    LowQualityApproved,
    LowQualityRejected,
    ReportPromoted,
    ClassificationChanged,
    ClassificationIndeterminate,
    ReportResolved,
    ReportReopened,
}

impl AuditEvent {
    pub const ALL: [Self; 12] = [
        Self::ReportCreated,
        Self::DuplicateFlagged,
        Self::DuplicateBlocked,
        Self::RecurringPromoted,
        Self::LowQualityFlagged,
        Self::LowQualityApproved,
        Self::LowQualityRejected,
        Self::ReportPromoted,
        Self::ClassificationChanged,
        Self::ClassificationIndeterminate,
        Self::ReportResolved,
        Self::ReportReopened,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReportCreated => "report_created",
            Self::DuplicateFlagged => "duplicate_flagged",
            Self::DuplicateBlocked => "duplicate_blocked",
            Self::RecurringPromoted => "recurring_promoted",
            Self::LowQualityFlagged => "low_quality_flagged",
            Self::LowQualityApproved => "low_quality_approved",
            Self::LowQualityRejected => "low_quality_rejected",
            Self::ReportPromoted => "report_promoted",
            Self::ClassificationChanged => "classification_changed",
            Self::ClassificationIndeterminate => "classification_indeterminate",
            Self::ReportResolved => "report_resolved",
            Self::ReportReopened => "report_reopened",
        }
    }

    /// Whether a human triggered this kind of change.
    #[must_use]
    pub const fn is_manual(self) -> bool {
        matches!(
            self,
            Self::LowQualityApproved
                | Self::LowQualityRejected
                | Self::ReportPromoted
                | Self::ClassificationChanged
                | Self::ReportResolved
                | Self::ReportReopened
        )
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == normalized)
            .ok_or_else(|| format!("unknown audit event '{s}'"))
    }
}

/// A state change, before the store assigns it an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub event: AuditEvent,
    pub report_id: Option<String>,
    pub low_quality_id: Option<i64>,
    /// Acting principal. Automatic decisions use the engine's actor name.
    pub actor: String,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    /// Model confidence behind an automatic decision.
    pub confidence: Option<f64>,
    pub reasoning: Option<String>,
    pub recorded_at_us: i64,
}

impl AuditRecord {
    #[must_use]
    pub fn new(event: AuditEvent, actor: impl Into<String>, recorded_at_us: i64) -> Self {
        Self {
            event,
            report_id: None,
            low_quality_id: None,
            actor: actor.into(),
            before: None,
            after: None,
            confidence: None,
            reasoning: None,
            recorded_at_us,
        }
    }

    #[must_use]
    pub fn report(mut self, id: impl Into<String>) -> Self {
        self.report_id = Some(id.into());
        self
    }

    #[must_use]
    pub const fn low_quality(mut self, id: i64) -> Self {
        self.low_quality_id = Some(id);
        self
    }

    #[must_use]
    pub fn before(mut self, state: serde_json::Value) -> Self {
        self.before = Some(state);
        self
    }

    #[must_use]
    pub fn after(mut self, state: serde_json::Value) -> Self {
        self.after = Some(state);
        self
    }

    #[must_use]
    pub fn reasoning(mut self, confidence: Option<f64>, reasoning: impl Into<String>) -> Self {
        self.confidence = confidence;
        self.reasoning = Some(reasoning.into());
        self
    }
}

/// A persisted [`AuditRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    #[serde(flatten)]
    pub record: AuditRecord,
}
