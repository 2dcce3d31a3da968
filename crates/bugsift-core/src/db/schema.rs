//! SQLite schema for the bugsift store.
//!
//! - `reports` holds the latest state of every accepted report, including its
//!   embedding as a little-endian `f32` BLOB
//! - `duplicate_history` and `audit_log` are append-only; triggers reject
//!   `UPDATE` and `DELETE`
//! - `low_quality_queue` holds quality-rejected submissions awaiting review

/// Migration v1: reports, decision history and audit log.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS reports (
    report_id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    repro_steps TEXT,
    logs TEXT,
    reporter TEXT,
    device TEXT,
    build_version TEXT,
    os_version TEXT,
    region TEXT,
    severity TEXT CHECK (severity IS NULL OR severity IN ('critical', 'major', 'minor', 'trivial')),
    priority TEXT,
    embedding BLOB,
    embedding_dims INTEGER,
    tag TEXT NOT NULL CHECK (tag IN ('new', 'duplicate', 'recurring', 'low_quality')),
    parent_id TEXT REFERENCES reports(report_id),
    match_confidence REAL CHECK (match_confidence IS NULL OR (match_confidence >= 0.0 AND match_confidence <= 1.0)),
    quality_score REAL,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL,
    resolved_at_us INTEGER,
    CHECK (report_id <> parent_id),
    CHECK ((parent_id IS NULL) = (match_confidence IS NULL)),
    CHECK (tag <> 'duplicate' OR parent_id IS NOT NULL),
    CHECK (tag NOT IN ('new', 'low_quality') OR parent_id IS NULL)
);

CREATE TABLE IF NOT EXISTS duplicate_history (
    history_id INTEGER PRIMARY KEY AUTOINCREMENT,
    candidate_report_id TEXT,
    parent_report_id TEXT,
    match_score REAL,
    match_method TEXT NOT NULL CHECK (match_method IN ('vector', 'hybrid', 'manual')),
    submission_json TEXT NOT NULL,
    submitted_by TEXT,
    was_blocked INTEGER NOT NULL CHECK (was_blocked IN (0, 1)),
    corrects INTEGER REFERENCES duplicate_history(history_id),
    note TEXT,
    recorded_at_us INTEGER NOT NULL,
    CHECK (was_blocked = 0 OR candidate_report_id IS NULL)
);

CREATE TABLE IF NOT EXISTS audit_log (
    audit_id INTEGER PRIMARY KEY AUTOINCREMENT,
    event TEXT NOT NULL,
    report_id TEXT,
    low_quality_id INTEGER,
    actor TEXT NOT NULL CHECK (length(trim(actor)) > 0),
    before_json TEXT,
    after_json TEXT,
    confidence REAL,
    reasoning TEXT,
    recorded_at_us INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_reports_parent
    ON reports(parent_id, created_at_us);

CREATE INDEX IF NOT EXISTS idx_reports_tag_created
    ON reports(tag, created_at_us);

CREATE INDEX IF NOT EXISTS idx_history_candidate
    ON duplicate_history(candidate_report_id);

CREATE INDEX IF NOT EXISTS idx_history_parent
    ON duplicate_history(parent_report_id);

CREATE INDEX IF NOT EXISTS idx_audit_event_recorded
    ON audit_log(event, recorded_at_us);
";

/// Migration v2: low-quality review queue and append-only guards.
pub const MIGRATION_V2_SQL: &str = r"
CREATE TABLE IF NOT EXISTS low_quality_queue (
    entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
    submission_json TEXT NOT NULL,
    issues_json TEXT NOT NULL,
    quality_score REAL NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'approved', 'rejected')),
    report_id TEXT REFERENCES reports(report_id),
    reviewed_by TEXT,
    review_note TEXT,
    created_at_us INTEGER NOT NULL,
    reviewed_at_us INTEGER
);

CREATE INDEX IF NOT EXISTS idx_low_quality_status_created
    ON low_quality_queue(status, created_at_us);

CREATE TRIGGER IF NOT EXISTS duplicate_history_no_update
BEFORE UPDATE ON duplicate_history
BEGIN
    SELECT RAISE(ABORT, 'duplicate_history is append-only');
END;

CREATE TRIGGER IF NOT EXISTS duplicate_history_no_delete
BEFORE DELETE ON duplicate_history
BEGIN
    SELECT RAISE(ABORT, 'duplicate_history is append-only');
END;

CREATE TRIGGER IF NOT EXISTS audit_log_no_update
BEFORE UPDATE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'audit_log is append-only');
END;

CREATE TRIGGER IF NOT EXISTS audit_log_no_delete
BEFORE DELETE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'audit_log is append-only');
END;
";

/// Indexes expected after the latest migration.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_reports_parent",
    "idx_reports_tag_created",
    "idx_history_candidate",
    "idx_history_parent",
    "idx_audit_event_recorded",
    "idx_low_quality_status_created",
];

/// Triggers expected after the latest migration.
pub const REQUIRED_TRIGGERS: &[&str] = &[
    "duplicate_history_no_update",
    "duplicate_history_no_delete",
    "audit_log_no_update",
    "audit_log_no_delete",
];
