use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Classification applied to an accepted report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationTag {
    New,
    Duplicate,
    Recurring,
    LowQuality,
}

impl ClassificationTag {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Duplicate => "duplicate",
            Self::Recurring => "recurring",
            Self::LowQuality => "low_quality",
        }
    }

    /// Whether a report carrying this tag must reference a parent.
    #[must_use]
    pub const fn requires_parent(self) -> bool {
        matches!(self, Self::Duplicate)
    }

    /// Whether a report carrying this tag may reference a parent.
    ///
    /// Recurring roots have no parent; a Recurring report inside a chain does.
    #[must_use]
    pub const fn allows_parent(self) -> bool {
        matches!(self, Self::Duplicate | Self::Recurring)
    }

    /// Whether reports with this tag take part in similarity search.
    #[must_use]
    pub const fn is_searchable(self) -> bool {
        !matches!(self, Self::LowQuality)
    }
}

impl fmt::Display for ClassificationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassificationTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "new" => Ok(Self::New),
            "duplicate" => Ok(Self::Duplicate),
            "recurring" => Ok(Self::Recurring),
            "low_quality" | "lowquality" => Ok(Self::LowQuality),
            other => Err(format!("unknown classification tag '{other}'")),
        }
    }
}

/// Ordinal defect severity. Lower rank is more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Major,
    Minor,
    Trivial,
}

impl Severity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Trivial => "trivial",
        }
    }

    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::Major => 1,
            Self::Minor => 2,
            Self::Trivial => 3,
        }
    }

    /// Largest possible distance between two ranks.
    pub const MAX_DISTANCE: u8 = 3;
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" | "blocker" => Ok(Self::Critical),
            "major" | "high" => Ok(Self::Major),
            "minor" | "medium" | "low" => Ok(Self::Minor),
            "trivial" | "cosmetic" => Ok(Self::Trivial),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// Structured environment metadata attached to a report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub device: Option<String>,
    pub build_version: Option<String>,
    pub os_version: Option<String>,
    pub region: Option<String>,
    pub severity: Option<Severity>,
    pub priority: Option<String>,
}

/// An accepted defect record.
///
/// Invariants maintained by the classification engine:
/// - `Duplicate` ⇒ `parent_id` is set; `New`/`LowQuality` ⇒ `parent_id` is unset.
/// - `match_confidence.is_some() == parent_id.is_some()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub title: String,
    pub description: String,
    pub repro_steps: Option<String>,
    pub logs: Option<String>,
    pub reporter: Option<String>,
    pub metadata: Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub tag: ClassificationTag,
    pub parent_id: Option<String>,
    pub match_confidence: Option<f64>,
    pub quality_score: Option<f64>,
    pub created_at_us: i64,
    pub updated_at_us: i64,
    pub resolved_at_us: Option<i64>,
}

impl Report {
    /// Check the parent/tag/confidence invariant.
    ///
    /// # Errors
    ///
    /// Returns a description of the violated rule.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.tag.requires_parent() && self.parent_id.is_none() {
            return Err(format!("{} is {} but has no parent", self.id, self.tag));
        }
        if !self.tag.allows_parent() && self.parent_id.is_some() {
            return Err(format!("{} is {} but has a parent", self.id, self.tag));
        }
        if self.parent_id.is_some() != self.match_confidence.is_some() {
            return Err(format!(
                "{} must carry a match confidence exactly when it has a parent",
                self.id
            ));
        }
        if let Some(confidence) = self.match_confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(format!("{} has confidence {confidence} outside [0, 1]", self.id));
            }
        }
        if self.parent_id.as_deref() == Some(self.id.as_str()) {
            return Err(format!("{} references itself as parent", self.id));
        }
        Ok(())
    }

    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.resolved_at_us.is_some()
    }

    /// Whether the report can still be matched against new submissions.
    /// Resolved reports drop out unless the defect is known to recur.
    #[must_use]
    pub const fn accepts_matches(&self) -> bool {
        self.tag.is_searchable()
            && (!self.is_resolved() || matches!(self.tag, ClassificationTag::Recurring))
    }

    /// Lightweight projection used by duplicate listings.
    #[must_use]
    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            tag: self.tag,
            parent_id: self.parent_id.clone(),
            match_confidence: self.match_confidence,
            created_at_us: self.created_at_us,
        }
    }
}

/// Summary row returned by duplicate listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub id: String,
    pub title: String,
    pub tag: ClassificationTag,
    pub parent_id: Option<String>,
    pub match_confidence: Option<f64>,
    pub created_at_us: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(tag: ClassificationTag, parent: Option<&str>, confidence: Option<f64>) -> Report {
        Report {
            id: "bug-0001".into(),
            title: "Checkout crashes on submit".into(),
            description: "desc".into(),
            repro_steps: None,
            logs: None,
            reporter: None,
            metadata: Metadata::default(),
            embedding: None,
            tag,
            parent_id: parent.map(str::to_string),
            match_confidence: confidence,
            quality_score: None,
            created_at_us: 1,
            updated_at_us: 1,
            resolved_at_us: None,
        }
    }

    #[test]
    fn tag_round_trips_through_str() {
        for tag in [
            ClassificationTag::New,
            ClassificationTag::Duplicate,
            ClassificationTag::Recurring,
            ClassificationTag::LowQuality,
        ] {
            assert_eq!(tag.as_str().parse::<ClassificationTag>(), Ok(tag));
        }
        assert_eq!("Low-Quality".parse::<ClassificationTag>(), Ok(ClassificationTag::LowQuality));
        assert!("closed".parse::<ClassificationTag>().is_err());
    }

    #[test]
    fn severity_ranks_are_ordinal() {
        assert!(Severity::Critical < Severity::Trivial);
        assert_eq!(Severity::Trivial.rank() - Severity::Critical.rank(), Severity::MAX_DISTANCE);
        assert_eq!("HIGH".parse::<Severity>(), Ok(Severity::Major));
    }

    #[test]
    fn duplicate_without_parent_is_rejected() {
        let r = report(ClassificationTag::Duplicate, None, None);
        assert!(r.check_invariants().is_err());
    }

    #[test]
    fn new_with_parent_is_rejected() {
        let r = report(ClassificationTag::New, Some("bug-0000"), Some(0.8));
        assert!(r.check_invariants().is_err());
    }

    #[test]
    fn confidence_must_follow_parent() {
        let r = report(ClassificationTag::Duplicate, Some("bug-0000"), None);
        assert!(r.check_invariants().is_err());
        let r = report(ClassificationTag::Duplicate, Some("bug-0000"), Some(0.75));
        assert!(r.check_invariants().is_ok());
    }

    #[test]
    fn recurring_root_may_stand_alone() {
        let r = report(ClassificationTag::Recurring, None, None);
        assert!(r.check_invariants().is_ok());
    }

    #[test]
    fn resolved_reports_stop_matching_unless_recurring() {
        let mut r = report(ClassificationTag::New, None, None);
        assert!(r.accepts_matches());
        r.resolved_at_us = Some(5);
        assert!(r.is_resolved());
        assert!(!r.accepts_matches());
        r.tag = ClassificationTag::Recurring;
        assert!(r.accepts_matches());
        r.tag = ClassificationTag::LowQuality;
        r.resolved_at_us = None;
        assert!(!r.accepts_matches());
    }

    #[test]
    fn self_parent_is_rejected() {
        let r = report(ClassificationTag::Duplicate, Some("bug-0001"), Some(0.8));
        assert!(r.check_invariants().is_err());
    }
}
