//! Results returned to the service layer.

use bugsift_core::model::ClassificationTag;
use bugsift_core::quality::QualityIssue;
use bugsift_search::{MatchDetails, ScoredMatch};
use serde::Serialize;

/// Best-scoring existing report considered for a submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateMatch {
    pub report_id: String,
    pub hybrid: f64,
    pub vector_similarity: f64,
    pub metadata_similarity: f64,
    pub details: MatchDetails,
}

impl CandidateMatch {
    pub(crate) fn new(report_id: &str, scored: &ScoredMatch) -> Self {
        Self {
            report_id: report_id.to_string(),
            hybrid: scored.hybrid,
            vector_similarity: scored.vector_similarity,
            metadata_similarity: scored.metadata_similarity,
            details: scored.details.clone(),
        }
    }
}

/// What happened to one submission.
///
/// Duplicates and quality rejections are expected business results, never
/// errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Accepted as a new report.
    Created {
        report_id: String,
        history_id: i64,
        /// Closest existing report, if any scored below the flag threshold.
        closest: Option<CandidateMatch>,
    },
    /// Accepted, tagged `Duplicate` and linked to `parent_id`.
    FlaggedDuplicate {
        report_id: String,
        parent_id: String,
        confidence: f64,
        history_id: i64,
        details: MatchDetails,
        /// Root promoted to `Recurring` by this decision.
        promoted_root: Option<String>,
    },
    /// Rejected as a near-certain duplicate of `parent_id`; nothing created.
    Blocked {
        parent_id: String,
        confidence: f64,
        history_id: i64,
        details: MatchDetails,
    },
    /// Failed the quality gate and queued for manual review.
    LowQuality {
        entry_id: i64,
        score: f64,
        issues: Vec<QualityIssue>,
    },
    /// Classification could not complete in time; neither created nor
    /// blocked.
    NeedsReview { reason: String, audit_id: i64 },
}

impl Outcome {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::FlaggedDuplicate { .. } => "flagged_duplicate",
            Self::Blocked { .. } => "blocked",
            Self::LowQuality { .. } => "low_quality",
            Self::NeedsReview { .. } => "needs_review",
        }
    }

    /// Id of the report this outcome created, if any.
    #[must_use]
    pub fn report_id(&self) -> Option<&str> {
        match self {
            Self::Created { report_id, .. } | Self::FlaggedDuplicate { report_id, .. } => {
                Some(report_id)
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn parent_id(&self) -> Option<&str> {
        match self {
            Self::FlaggedDuplicate { parent_id, .. } | Self::Blocked { parent_id, .. } => {
                Some(parent_id)
            }
            _ => None,
        }
    }

    #[must_use]
    pub const fn confidence(&self) -> Option<f64> {
        match self {
            Self::FlaggedDuplicate { confidence, .. } | Self::Blocked { confidence, .. } => {
                Some(*confidence)
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn issues(&self) -> Option<&[QualityIssue]> {
        match self {
            Self::LowQuality { issues, .. } => Some(issues),
            _ => None,
        }
    }
}

/// Aggregate counters for external monitoring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStats {
    /// Accepted reports of every tag.
    pub total: usize,
    /// Reports created as duplicates plus submissions blocked as duplicates.
    pub duplicates_detected: usize,
    pub duplicates_blocked: usize,
    pub recurring: usize,
    /// Reports marked resolved, whatever their tag.
    pub resolved: usize,
    /// Low-quality queue entries in any status.
    pub low_quality_count: usize,
    pub low_quality_pending: usize,
    pub low_quality_approved: usize,
    pub low_quality_rejected: usize,
    /// Mean quality score over accepted reports that carry one.
    pub avg_quality_score: Option<f64>,
    /// Mean match score over automatic decisions that had a candidate.
    pub avg_similarity_score: Option<f64>,
    /// Blocked submissions as a percentage of all accepted-or-blocked ones.
    pub prevention_rate: f64,
    pub top_parents: Vec<ParentCount>,
    pub by_region: Vec<GroupCount>,
    /// Region breakdown restricted to `Duplicate` reports.
    pub duplicates_by_region: Vec<GroupCount>,
    /// Most common build versions, largest first.
    pub by_build: Vec<GroupCount>,
    pub index_len: usize,
    pub index_generation: u64,
}

/// Number of reports sharing one metadata value. Reports without the
/// field are counted under `unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupCount {
    pub key: String,
    pub count: usize,
}

/// A report and how many direct duplicates point at it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParentCount {
    pub report_id: String,
    pub title: String,
    pub tag: ClassificationTag,
    pub duplicate_count: usize,
}
