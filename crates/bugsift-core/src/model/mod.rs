pub mod history;
pub mod id;
pub mod low_quality;
pub mod report;
pub mod submission;

pub use history::{
    AuditEvent, AuditLogEntry, AuditRecord, DuplicateHistoryEntry, HistoryRecord, MatchMethod,
};
pub use id::{generate_report_id, is_report_id};
pub use low_quality::{LowQualityEntry, NewLowQuality, ReviewStatus};
pub use report::{ClassificationTag, Metadata, Report, ReportSummary, Severity};
pub use submission::{RawSubmission, Submission};
