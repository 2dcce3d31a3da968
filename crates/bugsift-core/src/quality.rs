//! Submission quality checks.
//!
//! The checker is a pure function of a [`Submission`] and a [`QualityConfig`].
//! Every rule runs independently and contributes an [`IssueCode`]; the
//! composite score is `1 - Σ penalties`, floored at zero.
//!
//! A submission passes when its score reaches `min_quality_score` and no hard
//! issue (missing title or description) is present.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::config::QualityConfig;
use crate::model::Submission;

/// Minimum letters before the uppercase heuristic applies.
const UPPERCASE_MIN_LETTERS: usize = 20;
/// Minimum words before the unique-word heuristic applies.
const REPETITION_MIN_WORDS: usize = 5;
/// Minimum non-space characters before the symbol heuristic applies.
const SYMBOL_MIN_CHARS: usize = 10;
/// A description of adequate length with fewer words than this is a blob.
const MIN_DESCRIPTION_WORDS: usize = 3;

/// Machine-readable quality issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    MissingTitle,
    TitleTooShort,
    GenericTitle,
    MissingDescription,
    DescriptionTooShort,
    LowQualityDescription,
    MissingReproSteps,
    ReproStepsTooShort,
    MissingLogs,
    MissingDeviceInfo,
    MissingBuildVersion,
    MissingRegion,
    ExcessiveRepetition,
    ExcessiveUppercase,
    ExcessiveSymbols,
}

/// Reviewer-facing grouping of issue codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Critical,
    Major,
    Minor,
}

impl IssueCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingTitle => "missing_title",
            Self::TitleTooShort => "title_too_short",
            Self::GenericTitle => "generic_title",
            Self::MissingDescription => "missing_description",
            Self::DescriptionTooShort => "description_too_short",
            Self::LowQualityDescription => "low_quality_description",
            Self::MissingReproSteps => "missing_repro_steps",
            Self::ReproStepsTooShort => "repro_steps_too_short",
            Self::MissingLogs => "missing_logs",
            Self::MissingDeviceInfo => "missing_device_info",
            Self::MissingBuildVersion => "missing_build_version",
            Self::MissingRegion => "missing_region",
            Self::ExcessiveRepetition => "excessive_repetition",
            Self::ExcessiveUppercase => "excessive_uppercase",
            Self::ExcessiveSymbols => "excessive_symbols",
        }
    }

    /// Deduction from the composite score.
    #[must_use]
    pub const fn penalty(self) -> f64 {
        match self {
            Self::MissingTitle | Self::MissingDescription => 0.3,
            Self::LowQualityDescription | Self::MissingReproSteps => 0.2,
            Self::DescriptionTooShort | Self::MissingDeviceInfo | Self::MissingBuildVersion => {
                0.15
            }
            Self::TitleTooShort
            | Self::GenericTitle
            | Self::ReproStepsTooShort
            | Self::MissingLogs
            | Self::MissingRegion
            | Self::ExcessiveRepetition
            | Self::ExcessiveUppercase
            | Self::ExcessiveSymbols => 0.1,
        }
    }

    #[must_use]
    pub const fn severity(self) -> IssueSeverity {
        match self {
            Self::MissingTitle | Self::MissingDescription => IssueSeverity::Critical,
            Self::DescriptionTooShort
            | Self::LowQualityDescription
            | Self::MissingReproSteps
            | Self::MissingDeviceInfo
            | Self::MissingBuildVersion => IssueSeverity::Major,
            _ => IssueSeverity::Minor,
        }
    }

    /// Hard issues fail a submission regardless of its score.
    #[must_use]
    pub const fn is_hard(self) -> bool {
        matches!(self.severity(), IssueSeverity::Critical)
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An issue code plus reviewer-facing text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub code: IssueCode,
    pub message: String,
}

impl QualityIssue {
    #[must_use]
    pub fn new(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityResult {
    pub passed: bool,
    pub score: f64,
    pub issues: Vec<QualityIssue>,
}

impl QualityResult {
    #[must_use]
    pub fn has(&self, code: IssueCode) -> bool {
        self.issues.iter().any(|issue| issue.code == code)
    }

    #[must_use]
    pub fn codes(&self) -> Vec<IssueCode> {
        self.issues.iter().map(|issue| issue.code).collect()
    }
}

/// Quality gate applied before a submission may enter similarity search.
#[derive(Debug, Clone)]
pub struct QualityChecker {
    config: QualityConfig,
    generic_titles: HashSet<String>,
}

impl QualityChecker {
    #[must_use]
    pub fn new(config: QualityConfig) -> Self {
        let generic_titles = config
            .generic_titles
            .iter()
            .map(|t| normalize_title(t))
            .collect();
        Self {
            config,
            generic_titles,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &QualityConfig {
        &self.config
    }

    #[must_use]
    pub fn check(&self, submission: &Submission) -> QualityResult {
        let cfg = &self.config;
        let mut issues = Vec::new();

        let title = submission.title.trim();
        if title.is_empty() {
            issues.push(QualityIssue::new(IssueCode::MissingTitle, "Title is required"));
        } else if self.generic_titles.contains(&normalize_title(title)) {
            issues.push(QualityIssue::new(
                IssueCode::GenericTitle,
                format!("Title '{title}' is too generic to triage"),
            ));
        } else if title.chars().count() < cfg.min_title_length {
            issues.push(QualityIssue::new(
                IssueCode::TitleTooShort,
                format!("Title must be at least {} characters", cfg.min_title_length),
            ));
        }

        let description = submission.description.trim();
        if description.is_empty() {
            issues.push(QualityIssue::new(
                IssueCode::MissingDescription,
                "Description is required",
            ));
        } else if description.chars().count() < cfg.min_description_length {
            issues.push(QualityIssue::new(
                IssueCode::DescriptionTooShort,
                format!(
                    "Description must be at least {} characters",
                    cfg.min_description_length
                ),
            ));
        } else if description.split_whitespace().count() < MIN_DESCRIPTION_WORDS {
            issues.push(QualityIssue::new(
                IssueCode::LowQualityDescription,
                "Description does not read as prose",
            ));
        }

        if cfg.require_repro_steps {
            match submission.repro_steps.as_deref().map(str::trim) {
                None | Some("") => issues.push(QualityIssue::new(
                    IssueCode::MissingReproSteps,
                    "Reproduction steps are required",
                )),
                Some(steps) if steps.chars().count() < cfg.min_repro_steps_length => {
                    issues.push(QualityIssue::new(
                        IssueCode::ReproStepsTooShort,
                        format!(
                            "Reproduction steps must be at least {} characters",
                            cfg.min_repro_steps_length
                        ),
                    ));
                }
                Some(_) => {}
            }
        }

        if cfg.require_logs && submission.logs.as_deref().is_none_or(|l| l.trim().is_empty()) {
            issues.push(QualityIssue::new(IssueCode::MissingLogs, "Logs are required"));
        }

        if cfg.require_environment {
            let meta = &submission.metadata;
            if meta.device.is_none() {
                issues.push(QualityIssue::new(
                    IssueCode::MissingDeviceInfo,
                    "Device information is missing",
                ));
            }
            if meta.build_version.is_none() {
                issues.push(QualityIssue::new(
                    IssueCode::MissingBuildVersion,
                    "Build version is missing",
                ));
            }
            if meta.region.is_none() {
                issues.push(QualityIssue::new(IssueCode::MissingRegion, "Region is missing"));
            }
        }

        let prose = [
            Some(title),
            Some(description),
            submission.repro_steps.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|s| !s.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" ");
        if !prose.is_empty() {
            self.text_heuristics(&prose, &mut issues);
        }

        let penalty: f64 = issues.iter().map(|issue| issue.code.penalty()).sum();
        let score = round4((1.0 - penalty).max(0.0));
        let hard = issues.iter().any(|issue| issue.code.is_hard());
        let passed = !hard && score >= cfg.min_quality_score;

        QualityResult {
            passed,
            score,
            issues,
        }
    }

    fn text_heuristics(&self, text: &str, issues: &mut Vec<QualityIssue>) {
        let cfg = &self.config;

        let words: Vec<String> = text.split_whitespace().map(str::to_lowercase).collect();
        let unique = words.iter().collect::<HashSet<_>>().len();
        let repeated_words = words.len() >= REPETITION_MIN_WORDS
            && (unique as f64) / (words.len() as f64) < cfg.unique_word_ratio;
        if repeated_words || longest_char_run(text) > cfg.max_char_run {
            issues.push(QualityIssue::new(
                IssueCode::ExcessiveRepetition,
                "Text repeats the same words or characters",
            ));
        }

        let letters = text.chars().filter(|c| c.is_alphabetic()).count();
        let upper = text.chars().filter(|c| c.is_uppercase()).count();
        if letters >= UPPERCASE_MIN_LETTERS && (upper as f64) / (letters as f64) > cfg.uppercase_ratio
        {
            issues.push(QualityIssue::new(
                IssueCode::ExcessiveUppercase,
                "Text is mostly uppercase",
            ));
        }

        let visible = text.chars().filter(|c| !c.is_whitespace()).count();
        let symbols = text
            .chars()
            .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
            .count();
        if visible >= SYMBOL_MIN_CHARS && (symbols as f64) / (visible as f64) > cfg.symbol_ratio {
            issues.push(QualityIssue::new(
                IssueCode::ExcessiveSymbols,
                "Text is mostly punctuation or symbols",
            ));
        }
    }
}

fn normalize_title(title: &str) -> String {
    title
        .trim()
        .trim_end_matches(['!', '?', '.'])
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Longest run of one repeated non-whitespace character.
fn longest_char_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut previous: Option<char> = None;
    for c in text.chars() {
        if c.is_whitespace() {
            current = 0;
            previous = None;
            continue;
        }
        if previous == Some(c) {
            current += 1;
        } else {
            current = 1;
            previous = Some(c);
        }
        longest = longest.max(current);
    }
    longest
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Metadata;

    fn submission(title: &str, description: &str) -> Submission {
        Submission {
            title: title.into(),
            description: description.into(),
            repro_steps: Some("1. Open the app 2. Tap checkout 3. Observe crash".into()),
            logs: None,
            reporter: None,
            metadata: Metadata {
                device: Some("Pixel 8".into()),
                build_version: Some("4.2.1".into()),
                region: Some("EU".into()),
                ..Metadata::default()
            },
        }
    }

    fn checker() -> QualityChecker {
        QualityChecker::new(QualityConfig::default())
    }

    const GOOD_DESCRIPTION: &str =
        "Tapping the pay button on the checkout screen closes the app without any error dialog.";

    #[test]
    fn complete_submission_passes_with_full_score() {
        let result = checker().check(&submission("Checkout crashes on pay", GOOD_DESCRIPTION));
        assert!(result.passed, "issues: {:?}", result.codes());
        assert!((result.score - 1.0).abs() < f64::EPSILON);
        assert!(result.issues.is_empty());
    }

    #[test]
    fn tiny_title_and_empty_description_fail_hard() {
        let mut sub = submission("x", "");
        sub.repro_steps = None;
        sub.metadata = Metadata::default();
        let result = checker().check(&sub);

        assert!(!result.passed);
        assert!(result.has(IssueCode::MissingDescription));
        assert!(result.has(IssueCode::TitleTooShort));
        assert!(result.score < 0.7);
    }

    #[test]
    fn hard_issue_fails_even_with_lenient_threshold() {
        let cfg = QualityConfig {
            min_quality_score: 0.0,
            ..QualityConfig::default()
        };
        let result = QualityChecker::new(cfg).check(&submission("Checkout crashes on pay", ""));
        assert!(!result.passed);
        assert!(result.has(IssueCode::MissingDescription));
    }

    #[test]
    fn denylisted_titles_are_generic() {
        for title in ["bug", "Help!", "  not   working "] {
            let result = checker().check(&submission(title, GOOD_DESCRIPTION));
            assert!(result.has(IssueCode::GenericTitle), "{title} should be generic");
            assert!(!result.has(IssueCode::TitleTooShort));
        }
    }

    #[test]
    fn missing_environment_is_penalised_only_when_required() {
        let mut sub = submission("Checkout crashes on pay", GOOD_DESCRIPTION);
        sub.metadata = Metadata::default();

        let strict = checker().check(&sub);
        assert!(strict.has(IssueCode::MissingDeviceInfo));
        assert!(strict.has(IssueCode::MissingBuildVersion));
        assert!(strict.has(IssueCode::MissingRegion));
        assert!((strict.score - 0.6).abs() < 1e-9);
        assert!(!strict.passed);

        let lenient = QualityChecker::new(QualityConfig {
            require_environment: false,
            ..QualityConfig::default()
        })
        .check(&sub);
        assert!(lenient.passed);
    }

    #[test]
    fn score_at_threshold_passes() {
        let mut sub = submission("Checkout crashes on pay", GOOD_DESCRIPTION);
        sub.metadata.device = None;
        sub.metadata.build_version = None;
        let result = checker().check(&sub);
        assert!((result.score - 0.7).abs() < f64::EPSILON);
        assert!(result.passed);
    }

    #[test]
    fn shouting_is_flagged() {
        let mut sub = submission(
            "CHECKOUT CRASHES ON PAY",
            "THE APP CLOSES EVERY SINGLE TIME I PRESS THE PAY BUTTON ON CHECKOUT",
        );
        sub.repro_steps = None;
        let result = checker().check(&sub);
        assert!(result.has(IssueCode::ExcessiveUppercase));
    }

    #[test]
    fn repeated_characters_are_flagged() {
        let result = checker().check(&submission(
            "Checkout crashes on pay",
            "It crashes!!!!!!!!!!!! every single time that I press the pay button on checkout",
        ));
        assert!(result.has(IssueCode::ExcessiveRepetition));
    }

    #[test]
    fn repeated_words_are_flagged() {
        let spam = "crash ".repeat(20);
        let mut sub = submission("crash crash crash crash", &spam);
        sub.repro_steps = None;
        let result = checker().check(&sub);
        assert!(result.has(IssueCode::ExcessiveRepetition));
    }

    #[test]
    fn single_token_description_is_low_quality() {
        let blob = "a".repeat(3) + &"b".repeat(3) + &"c".repeat(3) + &"d1e2f3g4h5".repeat(5);
        let result = checker().check(&submission("Checkout crashes on pay", &blob));
        assert!(result.has(IssueCode::LowQualityDescription));
    }

    #[test]
    fn logs_required_when_configured() {
        let cfg = QualityConfig {
            require_logs: true,
            ..QualityConfig::default()
        };
        let result =
            QualityChecker::new(cfg).check(&submission("Checkout crashes on pay", GOOD_DESCRIPTION));
        assert!(result.has(IssueCode::MissingLogs));
    }

    #[test]
    fn severity_classes_match_catalogue() {
        assert_eq!(IssueCode::MissingTitle.severity(), IssueSeverity::Critical);
        assert_eq!(IssueCode::MissingReproSteps.severity(), IssueSeverity::Major);
        assert_eq!(IssueCode::MissingRegion.severity(), IssueSeverity::Minor);
        assert!(IssueCode::MissingDescription.is_hard());
        assert!(!IssueCode::GenericTitle.is_hard());
    }

    #[test]
    fn char_run_ignores_whitespace() {
        assert_eq!(longest_char_run("aa  aaa b"), 3);
        assert_eq!(longest_char_run(""), 0);
    }
}
