//! Hybrid duplicate scoring.
//!
//! Combines the vector similarity of two reports with a weighted match over
//! their structured metadata:
//!
//! ```text
//! metadata = Σ wᵢ · subᵢ / Σ wᵢ
//! hybrid   = w_v · vector + w_m · metadata − cross_region_penalty
//! ```
//!
//! | Field | Sub-score |
//! |-------|-----------|
//! | device | 1 on case-insensitive match, else 0 |
//! | build_version | 1 on match, 0.5 on same `major.minor`, else 0 |
//! | region | 1 on case-insensitive match, else 0 |
//! | os_version | 1 on match, else 0 |
//! | severity | `1 − |Δrank| / 3` |
//!
//! A field missing on either side contributes the configured neutral score.
//! The region penalty only applies when both regions are known and differ.
//! The result is clamped to `[0, 1]`.

use bugsift_core::config::ScoringConfig;
use bugsift_core::model::{Metadata, Severity};
use serde::{Deserialize, Serialize};

/// Metadata field taking part in scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataField {
    Device,
    BuildVersion,
    Region,
    OsVersion,
    Severity,
}

impl MetadataField {
    pub const ALL: [Self; 5] = [
        Self::Device,
        Self::BuildVersion,
        Self::Region,
        Self::OsVersion,
        Self::Severity,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Device => "device",
            Self::BuildVersion => "build_version",
            Self::Region => "region",
            Self::OsVersion => "os_version",
            Self::Severity => "severity",
        }
    }
}

impl std::fmt::Display for MetadataField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse confidence derived from how many metadata fields agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchConfidence {
    /// Three or more fields match exactly.
    High,
    Medium,
    Low,
}

impl MatchConfidence {
    #[must_use]
    pub const fn from_matching(count: usize) -> Self {
        match count {
            0 => Self::Low,
            1 | 2 => Self::Medium,
            _ => Self::High,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Explanation attached to a scored candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchDetails {
    /// Fields with a perfect sub-score.
    pub matching_fields: Vec<MetadataField>,
    /// Fields known on both sides that do not fully agree.
    pub differing_fields: Vec<MetadataField>,
    pub confidence: MatchConfidence,
}

impl MatchDetails {
    /// One-line human summary, stored as the reasoning on audit entries.
    #[must_use]
    pub fn reasoning(&self) -> String {
        let join = |fields: &[MetadataField]| {
            if fields.is_empty() {
                "none".to_string()
            } else {
                fields
                    .iter()
                    .copied()
                    .map(MetadataField::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        };
        format!(
            "{} confidence; matching: {}; differing: {}",
            self.confidence.as_str(),
            join(&self.matching_fields),
            join(&self.differing_fields)
        )
    }
}

/// Score for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMatch {
    pub hybrid: f64,
    pub vector_similarity: f64,
    pub metadata_similarity: f64,
    pub details: MatchDetails,
}

/// Stateless scorer over a fixed configuration.
#[derive(Debug, Clone)]
pub struct HybridScorer {
    config: ScoringConfig,
}

impl HybridScorer {
    #[must_use]
    pub const fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score `candidate` against `incoming` given their vector similarity.
    #[must_use]
    pub fn score(
        &self,
        candidate: &Metadata,
        incoming: &Metadata,
        vector_similarity: f64,
    ) -> ScoredMatch {
        let vector_similarity = clamp_unit(vector_similarity);
        let weights = &self.config.fields;
        let neutral = self.config.neutral_score;

        let mut weighted = 0.0;
        let mut matching_fields = Vec::new();
        let mut differing_fields = Vec::new();

        for field in MetadataField::ALL {
            let (sub, known) = match field_score(field, candidate, incoming) {
                Some(sub) => (sub, true),
                None => (neutral, false),
            };
            weighted += weight_of(weights, field) * sub;
            if known {
                if sub >= 1.0 {
                    matching_fields.push(field);
                } else {
                    differing_fields.push(field);
                }
            }
        }

        let total = weights.total();
        let metadata_similarity = if total > 0.0 {
            clamp_unit(weighted / total)
        } else {
            neutral
        };

        let mut hybrid = self.config.vector_weight.mul_add(
            vector_similarity,
            self.config.metadata_weight * metadata_similarity,
        );
        if regions_differ(candidate, incoming) {
            hybrid -= self.config.cross_region_penalty;
        }

        let confidence = MatchConfidence::from_matching(matching_fields.len());
        ScoredMatch {
            hybrid: clamp_unit(hybrid),
            vector_similarity,
            metadata_similarity,
            details: MatchDetails {
                matching_fields,
                differing_fields,
                confidence,
            },
        }
    }
}

const fn weight_of(weights: &bugsift_core::config::FieldWeights, field: MetadataField) -> f64 {
    match field {
        MetadataField::Device => weights.device,
        MetadataField::BuildVersion => weights.build_version,
        MetadataField::Region => weights.region,
        MetadataField::OsVersion => weights.os_version,
        MetadataField::Severity => weights.severity,
    }
}

/// Sub-score for one field, or `None` when either side lacks it.
fn field_score(field: MetadataField, a: &Metadata, b: &Metadata) -> Option<f64> {
    match field {
        MetadataField::Device => {
            both(a.device.as_deref(), b.device.as_deref()).map(|(x, y)| exact_ci(x, y))
        }
        MetadataField::BuildVersion => {
            both(a.build_version.as_deref(), b.build_version.as_deref())
                .map(|(x, y)| build_score(x, y))
        }
        MetadataField::Region => {
            both(a.region.as_deref(), b.region.as_deref()).map(|(x, y)| exact_ci(x, y))
        }
        MetadataField::OsVersion => both(a.os_version.as_deref(), b.os_version.as_deref())
            .map(|(x, y)| if x == y { 1.0 } else { 0.0 }),
        MetadataField::Severity => match (a.severity, b.severity) {
            (Some(x), Some(y)) => Some(severity_score(x, y)),
            _ => None,
        },
    }
}

fn both<'a>(a: Option<&'a str>, b: Option<&'a str>) -> Option<(&'a str, &'a str)> {
    let a = a.map(str::trim).filter(|s| !s.is_empty())?;
    let b = b.map(str::trim).filter(|s| !s.is_empty())?;
    Some((a, b))
}

fn exact_ci(a: &str, b: &str) -> f64 {
    if a.eq_ignore_ascii_case(b) { 1.0 } else { 0.0 }
}

fn build_score(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    match (major_minor(a), major_minor(b)) {
        (Some(x), Some(y)) if x == y => 0.5,
        _ => 0.0,
    }
}

/// `"v2.14.3-beta"` → `("2", "14")`.
fn major_minor(version: &str) -> Option<(&str, &str)> {
    let version = version.trim_start_matches(['v', 'V']);
    let mut parts = version.split(['.', '-', '+']);
    let major = parts.next().filter(|p| !p.is_empty())?;
    let minor = parts.next().filter(|p| !p.is_empty())?;
    Some((major, minor))
}

fn severity_score(a: Severity, b: Severity) -> f64 {
    let distance = a.rank().abs_diff(b.rank());
    1.0 - f64::from(distance) / f64::from(Severity::MAX_DISTANCE)
}

fn regions_differ(a: &Metadata, b: &Metadata) -> bool {
    both(a.region.as_deref(), b.region.as_deref()).is_some_and(|(x, y)| exact_ci(x, y) < 1.0)
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(device: &str, build: &str, region: &str, os: &str, severity: Severity) -> Metadata {
        Metadata {
            device: Some(device.into()),
            build_version: Some(build.into()),
            os_version: Some(os.into()),
            region: Some(region.into()),
            severity: Some(severity),
            priority: None,
        }
    }

    fn scorer() -> HybridScorer {
        HybridScorer::new(ScoringConfig::default())
    }

    #[test]
    fn identical_metadata_and_vector_scores_one() {
        let m = meta("Pixel 8", "2.14.3", "EU", "Android 14", Severity::Major);
        let scored = scorer().score(&m, &m, 1.0);
        assert!((scored.hybrid - 1.0).abs() < 1e-9);
        assert!((scored.metadata_similarity - 1.0).abs() < 1e-9);
        assert_eq!(scored.details.confidence, MatchConfidence::High);
        assert_eq!(scored.details.matching_fields.len(), 5);
        assert!(scored.details.differing_fields.is_empty());
    }

    #[test]
    fn missing_metadata_is_neutral() {
        let scored = scorer().score(&Metadata::default(), &Metadata::default(), 1.0);
        assert!((scored.metadata_similarity - 0.5).abs() < 1e-9);
        assert!((scored.hybrid - 0.85).abs() < 1e-9);
        assert_eq!(scored.details.confidence, MatchConfidence::Low);
        assert!(scored.details.matching_fields.is_empty());
        assert!(scored.details.differing_fields.is_empty());
    }

    #[test]
    fn device_match_ignores_case() {
        let a = Metadata {
            device: Some("pixel 8".into()),
            ..Metadata::default()
        };
        let b = Metadata {
            device: Some("Pixel 8".into()),
            ..Metadata::default()
        };
        let scored = scorer().score(&a, &b, 0.0);
        assert_eq!(scored.details.matching_fields, [MetadataField::Device]);
        assert_eq!(scored.details.confidence, MatchConfidence::Medium);
    }

    #[test]
    fn build_versions_share_major_minor() {
        assert!((build_score("2.14.3", "2.14.3") - 1.0).abs() < f64::EPSILON);
        assert!((build_score("2.14.3", "v2.14.9") - 0.5).abs() < f64::EPSILON);
        assert!(build_score("2.14.3", "2.15.0").abs() < f64::EPSILON);
        assert!(build_score("nightly", "2.14").abs() < f64::EPSILON);
    }

    #[test]
    fn severity_distance_is_normalised() {
        assert!((severity_score(Severity::Major, Severity::Major) - 1.0).abs() < 1e-9);
        assert!((severity_score(Severity::Critical, Severity::Trivial)).abs() < 1e-9);
        let one_step = severity_score(Severity::Major, Severity::Minor);
        assert!((one_step - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn cross_region_penalty_applies_only_when_both_known() {
        let eu = meta("Pixel 8", "2.14.3", "EU", "Android 14", Severity::Major);
        let us = meta("Pixel 8", "2.14.3", "US", "Android 14", Severity::Major);
        let scored = scorer().score(&eu, &us, 1.0);
        // metadata = (0.2 + 0.3 + 0 + 0.15 + 0.15) / 1.0 = 0.8
        let expected = 0.3f64.mul_add(0.8, 0.7) - 0.05;
        assert!((scored.hybrid - expected).abs() < 1e-9);
        assert_eq!(scored.details.differing_fields, [MetadataField::Region]);

        let unknown = Metadata {
            region: None,
            ..eu.clone()
        };
        let scored = scorer().score(&unknown, &us, 1.0);
        let expected = 0.3f64.mul_add(0.9, 0.7);
        assert!((scored.hybrid - expected).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_vector_similarity_is_clamped() {
        let m = Metadata::default();
        assert!((scorer().score(&m, &m, 1.7).vector_similarity - 1.0).abs() < f64::EPSILON);
        assert!(scorer().score(&m, &m, -0.4).vector_similarity.abs() < f64::EPSILON);
        assert!(scorer().score(&m, &m, f64::NAN).vector_similarity.abs() < f64::EPSILON);
    }

    #[test]
    fn reasoning_lists_fields() {
        let a = meta("Pixel 8", "2.14.3", "EU", "Android 14", Severity::Major);
        let b = meta("Pixel 8", "2.14.3", "EU", "Android 13", Severity::Minor);
        let text = scorer().score(&a, &b, 0.9).details.reasoning();
        assert_eq!(
            text,
            "high confidence; matching: device, build_version, region; differing: os_version, severity"
        );
    }
}
