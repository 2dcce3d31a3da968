use std::fmt;

/// Machine-readable error codes surfaced to the service layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigInvalid,
    ValidationFailed,
    ReportNotFound,
    LowQualityNotFound,
    InvalidTransition,
    ParentCycle,
    EmbeddingUnavailable,
    IndexUnavailable,
    RebuildInProgress,
    StorageFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigInvalid => "E1001",
            Self::ValidationFailed => "E1002",
            Self::ReportNotFound => "E2001",
            Self::LowQualityNotFound => "E2002",
            Self::InvalidTransition => "E2003",
            Self::ParentCycle => "E2004",
            Self::EmbeddingUnavailable => "E4001",
            Self::IndexUnavailable => "E4002",
            Self::RebuildInProgress => "E4003",
            Self::StorageFailed => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigInvalid => "Configuration invalid",
            Self::ValidationFailed => "Submission failed structural validation",
            Self::ReportNotFound => "Report not found",
            Self::LowQualityNotFound => "Low-quality entry not found",
            Self::InvalidTransition => "Invalid classification transition",
            Self::ParentCycle => "Parent reference would create a cycle",
            Self::EmbeddingUnavailable => "Embedding backend unavailable",
            Self::IndexUnavailable => "Similarity index unavailable",
            Self::RebuildInProgress => "Index rebuild already in progress",
            Self::StorageFailed => "Storage operation failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigInvalid => Some("Fix .bugsift/config.toml and restart."),
            Self::ValidationFailed => Some("Send both `title` and `description` fields."),
            Self::ReportNotFound | Self::LowQualityNotFound => None,
            Self::InvalidTransition => {
                Some("Only Duplicate or Recurring reports can be promoted back to New.")
            }
            Self::ParentCycle => Some("Pick a parent outside this report's duplicate chain."),
            Self::EmbeddingUnavailable | Self::IndexUnavailable => {
                Some("Retry the submission; nothing was stored.")
            }
            Self::RebuildInProgress => Some("Wait for the running rebuild to finish."),
            Self::StorageFailed => Some("Check database availability and disk space, then retry."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Backend that failed to answer in time or at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Embedding,
    Index,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Embedding => f.write_str("embedding backend"),
            Self::Index => f.write_str("similarity index"),
        }
    }
}

/// Failures returned by the detection engine and its collaborators.
///
/// Quality rejections and duplicate matches are *outcomes*, never errors.
/// Only structural validation, infrastructure failures, and invalid manual
/// overrides surface here.
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    /// The submission is structurally malformed (missing keys, oversized fields).
    #[error("invalid submission: {0}")]
    Validation(String),

    /// Embedding or index backend unreachable; nothing was persisted.
    #[error("{backend} unavailable: {reason}")]
    Unavailable { backend: Backend, reason: String },

    /// Persistence failed.
    #[error("storage failure: {0:#}")]
    Storage(anyhow::Error),

    #[error("report {0} not found")]
    ReportNotFound(String),

    #[error("low-quality entry {0} not found")]
    LowQualityNotFound(i64),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("setting parent {parent} on {report} would create a cycle")]
    Cycle { report: String, parent: String },

    #[error("an index rebuild is already running")]
    RebuildInProgress,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl DetectError {
    /// Machine-readable code for this failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::ValidationFailed,
            Self::Unavailable {
                backend: Backend::Embedding,
                ..
            } => ErrorCode::EmbeddingUnavailable,
            Self::Unavailable {
                backend: Backend::Index,
                ..
            } => ErrorCode::IndexUnavailable,
            Self::Storage(_) => ErrorCode::StorageFailed,
            Self::ReportNotFound(_) => ErrorCode::ReportNotFound,
            Self::LowQualityNotFound(_) => ErrorCode::LowQualityNotFound,
            Self::InvalidTransition(_) => ErrorCode::InvalidTransition,
            Self::Cycle { .. } => ErrorCode::ParentCycle,
            Self::RebuildInProgress => ErrorCode::RebuildInProgress,
            Self::Config(_) => ErrorCode::ConfigInvalid,
        }
    }

    /// Whether the caller may safely retry the same request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::Storage(_) | Self::RebuildInProgress
        )
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}
