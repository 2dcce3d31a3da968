use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::submission::Submission;
use crate::quality::QualityIssue;

/// Review state of a quality-rejected submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown review status '{other}'")),
        }
    }
}

/// A submission held back by the quality gate.
///
/// No embedding is computed until a reviewer approves the entry, at which
/// point the submission runs through the full detection pipeline and
/// `report_id` records what it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowQualityEntry {
    pub id: i64,
    pub submission: Submission,
    pub issues: Vec<QualityIssue>,
    pub quality_score: f64,
    pub status: ReviewStatus,
    pub report_id: Option<String>,
    pub reviewed_by: Option<String>,
    pub review_note: Option<String>,
    pub created_at_us: i64,
    pub reviewed_at_us: Option<i64>,
}

/// Fields needed to queue a new entry; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLowQuality {
    pub submission: Submission,
    pub issues: Vec<QualityIssue>,
    pub quality_score: f64,
    pub created_at_us: i64,
}

impl NewLowQuality {
    #[must_use]
    pub fn into_entry(self, id: i64) -> LowQualityEntry {
        LowQualityEntry {
            id,
            submission: self.submission,
            issues: self.issues,
            quality_score: self.quality_score,
            status: ReviewStatus::Pending,
            report_id: None,
            reviewed_by: None,
            review_note: None,
            created_at_us: self.created_at_us,
            reviewed_at_us: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_is_open() {
        assert!(!ReviewStatus::Pending.is_terminal());
        assert!(ReviewStatus::Approved.is_terminal());
        assert!(ReviewStatus::Rejected.is_terminal());
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Approved".parse::<ReviewStatus>(), Ok(ReviewStatus::Approved));
        assert!("archived".parse::<ReviewStatus>().is_err());
    }
}
