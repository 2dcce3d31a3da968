//! [`Store`] backed by a single SQLite connection.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension, Row, params, types::Type};

use super::{blob_to_vec, open_database, open_in_memory, vec_to_blob};
use crate::model::{
    AuditEvent, AuditLogEntry, AuditRecord, ClassificationTag, DuplicateHistoryEntry,
    HistoryRecord, LowQualityEntry, Metadata, NewLowQuality, Report, ReviewStatus, Severity,
};
use crate::store::{ChangeSet, CommitReceipt, Store};

const REPORT_COLUMNS: &str = "report_id, title, description, repro_steps, logs, reporter, \
     device, build_version, os_version, region, severity, priority, embedding, tag, parent_id, \
     match_confidence, quality_score, created_at_us, updated_at_us, resolved_at_us";

const HISTORY_COLUMNS: &str = "history_id, candidate_report_id, parent_report_id, match_score, \
     match_method, submission_json, submitted_by, was_blocked, corrects, note, recorded_at_us";

const AUDIT_COLUMNS: &str = "audit_id, event, report_id, low_quality_id, actor, before_json, \
     after_json, confidence, reasoning, recorded_at_us";

const LOW_QUALITY_COLUMNS: &str = "entry_id, submission_json, issues_json, quality_score, status, \
     report_id, reviewed_by, review_note, created_at_us, reviewed_at_us";

/// SQLite-backed store.
///
/// One connection behind a mutex: SQLite serializes writers anyway, and the
/// engine keeps storage calls short.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating and migrating if needed) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_connection(open_database(path)?))
    }

    /// A fresh private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn in_memory() -> Result<Self> {
        Ok(Self::from_connection(open_in_memory()?))
    }

    #[must_use]
    pub const fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, message.into())
}

fn parse_column<T>(row: &Row<'_>, column: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(column)?;
    raw.parse().map_err(|err| conversion_error(column, err))
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, column: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(column)?;
    serde_json::from_str(&raw).map_err(|err| conversion_error(column, err.to_string()))
}

fn optional_json_column(
    row: &Row<'_>,
    column: usize,
) -> rusqlite::Result<Option<serde_json::Value>> {
    let raw: Option<String> = row.get(column)?;
    raw.map(|s| serde_json::from_str(&s).map_err(|err| conversion_error(column, err.to_string())))
        .transpose()
}

fn row_to_report(row: &Row<'_>) -> rusqlite::Result<Report> {
    let severity: Option<String> = row.get(10)?;
    let severity = severity
        .map(|s| s.parse::<Severity>().map_err(|err| conversion_error(10, err)))
        .transpose()?;
    let embedding: Option<Vec<u8>> = row.get(12)?;

    Ok(Report {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        repro_steps: row.get(3)?,
        logs: row.get(4)?,
        reporter: row.get(5)?,
        metadata: Metadata {
            device: row.get(6)?,
            build_version: row.get(7)?,
            os_version: row.get(8)?,
            region: row.get(9)?,
            severity,
            priority: row.get(11)?,
        },
        embedding: embedding.map(|blob| blob_to_vec(&blob)),
        tag: parse_column::<ClassificationTag>(row, 13)?,
        parent_id: row.get(14)?,
        match_confidence: row.get(15)?,
        quality_score: row.get(16)?,
        created_at_us: row.get(17)?,
        updated_at_us: row.get(18)?,
        resolved_at_us: row.get(19)?,
    })
}

fn row_to_history(row: &Row<'_>) -> rusqlite::Result<DuplicateHistoryEntry> {
    Ok(DuplicateHistoryEntry {
        id: row.get(0)?,
        record: HistoryRecord {
            candidate_report_id: row.get(1)?,
            parent_report_id: row.get(2)?,
            match_score: row.get(3)?,
            match_method: parse_column(row, 4)?,
            submission: json_column(row, 5)?,
            submitted_by: row.get(6)?,
            was_blocked: row.get(7)?,
            corrects: row.get(8)?,
            note: row.get(9)?,
            recorded_at_us: row.get(10)?,
        },
    })
}

fn row_to_audit(row: &Row<'_>) -> rusqlite::Result<AuditLogEntry> {
    Ok(AuditLogEntry {
        id: row.get(0)?,
        record: AuditRecord {
            event: parse_column::<AuditEvent>(row, 1)?,
            report_id: row.get(2)?,
            low_quality_id: row.get(3)?,
            actor: row.get(4)?,
            before: optional_json_column(row, 5)?,
            after: optional_json_column(row, 6)?,
            confidence: row.get(7)?,
            reasoning: row.get(8)?,
            recorded_at_us: row.get(9)?,
        },
    })
}

fn row_to_low_quality(row: &Row<'_>) -> rusqlite::Result<LowQualityEntry> {
    Ok(LowQualityEntry {
        id: row.get(0)?,
        submission: json_column(row, 1)?,
        issues: json_column(row, 2)?,
        quality_score: row.get(3)?,
        status: parse_column::<ReviewStatus>(row, 4)?,
        report_id: row.get(5)?,
        reviewed_by: row.get(6)?,
        review_note: row.get(7)?,
        created_at_us: row.get(8)?,
        reviewed_at_us: row.get(9)?,
    })
}

// ---------------------------------------------------------------------------
// Writes (shared by single calls and transactional commits)
// ---------------------------------------------------------------------------

fn upsert_report(conn: &Connection, report: &Report) -> Result<()> {
    let m = &report.metadata;
    let embedding = report.embedding.as_deref().map(vec_to_blob);
    let dims = report
        .embedding
        .as_ref()
        .map(|v| i64::try_from(v.len()))
        .transpose()
        .context("embedding dimension overflow")?;

    conn.execute(
        "INSERT INTO reports (
            report_id, title, description, repro_steps, logs, reporter,
            device, build_version, os_version, region, severity, priority,
            embedding, embedding_dims, tag, parent_id, match_confidence, quality_score,
            created_at_us, updated_at_us, resolved_at_us
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)
        ON CONFLICT(report_id) DO UPDATE SET
            title = excluded.title,
            description = excluded.description,
            repro_steps = excluded.repro_steps,
            logs = excluded.logs,
            reporter = excluded.reporter,
            device = excluded.device,
            build_version = excluded.build_version,
            os_version = excluded.os_version,
            region = excluded.region,
            severity = excluded.severity,
            priority = excluded.priority,
            embedding = excluded.embedding,
            embedding_dims = excluded.embedding_dims,
            tag = excluded.tag,
            parent_id = excluded.parent_id,
            match_confidence = excluded.match_confidence,
            quality_score = excluded.quality_score,
            updated_at_us = excluded.updated_at_us,
            resolved_at_us = excluded.resolved_at_us",
        params![
            report.id,
            report.title,
            report.description,
            report.repro_steps,
            report.logs,
            report.reporter,
            m.device,
            m.build_version,
            m.os_version,
            m.region,
            m.severity.map(Severity::as_str),
            m.priority,
            embedding,
            dims,
            report.tag.as_str(),
            report.parent_id,
            report.match_confidence,
            report.quality_score,
            report.created_at_us,
            report.updated_at_us,
            report.resolved_at_us,
        ],
    )
    .with_context(|| format!("upsert report {}", report.id))?;
    Ok(())
}

fn insert_history(conn: &Connection, record: &HistoryRecord) -> Result<i64> {
    let submission =
        serde_json::to_string(&record.submission).context("serialize submission payload")?;
    conn.execute(
        "INSERT INTO duplicate_history (
            candidate_report_id, parent_report_id, match_score, match_method,
            submission_json, submitted_by, was_blocked, corrects, note, recorded_at_us
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            record.candidate_report_id,
            record.parent_report_id,
            record.match_score,
            record.match_method.as_str(),
            submission,
            record.submitted_by,
            record.was_blocked,
            record.corrects,
            record.note,
            record.recorded_at_us,
        ],
    )
    .context("append duplicate history")?;
    Ok(conn.last_insert_rowid())
}

fn insert_audit(conn: &Connection, record: &AuditRecord) -> Result<i64> {
    let before = record
        .before
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .context("serialize audit before-state")?;
    let after = record
        .after
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .context("serialize audit after-state")?;
    conn.execute(
        "INSERT INTO audit_log (
            event, report_id, low_quality_id, actor, before_json, after_json,
            confidence, reasoning, recorded_at_us
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            record.event.as_str(),
            record.report_id,
            record.low_quality_id,
            record.actor,
            before,
            after,
            record.confidence,
            record.reasoning,
            record.recorded_at_us,
        ],
    )
    .with_context(|| format!("append audit {}", record.event))?;
    Ok(conn.last_insert_rowid())
}

fn queue_entry(conn: &Connection, entry: &NewLowQuality) -> Result<LowQualityEntry> {
    let submission = serde_json::to_string(&entry.submission).context("serialize submission")?;
    let issues = serde_json::to_string(&entry.issues).context("serialize quality issues")?;
    conn.execute(
        "INSERT INTO low_quality_queue (
            submission_json, issues_json, quality_score, status, created_at_us
        ) VALUES (?1, ?2, ?3, 'pending', ?4)",
        params![submission, issues, entry.quality_score, entry.created_at_us],
    )
    .context("queue low-quality submission")?;
    Ok(entry.clone().into_entry(conn.last_insert_rowid()))
}

fn record_review(conn: &Connection, entry: &LowQualityEntry) -> Result<()> {
    let changed = conn
        .execute(
            "UPDATE low_quality_queue
             SET status = ?2, report_id = ?3, reviewed_by = ?4, review_note = ?5,
                 reviewed_at_us = ?6
             WHERE entry_id = ?1",
            params![
                entry.id,
                entry.status.as_str(),
                entry.report_id,
                entry.reviewed_by,
                entry.review_note,
                entry.reviewed_at_us,
            ],
        )
        .with_context(|| format!("update low-quality entry {}", entry.id))?;
    if changed == 0 {
        bail!("low-quality entry {} does not exist", entry.id);
    }
    Ok(())
}

fn query_reports<P: rusqlite::Params>(conn: &Connection, filter: &str, args: P) -> Result<Vec<Report>> {
    let sql =
        format!("SELECT {REPORT_COLUMNS} FROM reports {filter} ORDER BY created_at_us, report_id");
    let mut stmt = conn.prepare(&sql).context("prepare report query")?;
    let rows = stmt
        .query_map(args, row_to_report)
        .context("query reports")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("decode report row")?;
    Ok(rows)
}

impl Store for SqliteStore {
    fn load_all_vectors(&self) -> Result<Vec<(String, Vec<f32>)>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT report_id, embedding FROM reports
                 WHERE embedding IS NOT NULL AND tag <> 'low_quality'
                 ORDER BY created_at_us, report_id",
            )
            .context("prepare vector load")?;
        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let blob: Vec<u8> = row.get(1)?;
                Ok((id, blob_to_vec(&blob)))
            })
            .context("load vectors")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("decode vector row")?;
        Ok(rows)
    }

    fn save_report(&self, report: &Report) -> Result<()> {
        upsert_report(&self.conn(), report)
    }

    fn get_report(&self, id: &str) -> Result<Option<Report>> {
        let conn = self.conn();
        let sql = format!("SELECT {REPORT_COLUMNS} FROM reports WHERE report_id = ?1");
        conn.query_row(&sql, params![id], row_to_report)
            .optional()
            .with_context(|| format!("load report {id}"))
    }

    fn children_of(&self, parent_id: &str) -> Result<Vec<Report>> {
        query_reports(&self.conn(), "WHERE parent_id = ?1", params![parent_id])
    }

    fn list_reports(&self) -> Result<Vec<Report>> {
        query_reports(&self.conn(), "", params![])
    }

    fn append_history(&self, record: &HistoryRecord) -> Result<i64> {
        insert_history(&self.conn(), record)
    }

    fn list_history(&self, report_id: Option<&str>) -> Result<Vec<DuplicateHistoryEntry>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {HISTORY_COLUMNS} FROM duplicate_history
             WHERE ?1 IS NULL OR candidate_report_id = ?1 OR parent_report_id = ?1
             ORDER BY history_id"
        );
        let mut stmt = conn.prepare(&sql).context("prepare history query")?;
        let rows = stmt
            .query_map(params![report_id], row_to_history)
            .context("query history")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("decode history row")?;
        Ok(rows)
    }

    fn append_audit(&self, record: &AuditRecord) -> Result<i64> {
        insert_audit(&self.conn(), record)
    }

    fn list_audit(&self, event: Option<AuditEvent>) -> Result<Vec<AuditLogEntry>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_log
             WHERE ?1 IS NULL OR event = ?1
             ORDER BY audit_id"
        );
        let mut stmt = conn.prepare(&sql).context("prepare audit query")?;
        let rows = stmt
            .query_map(params![event.map(AuditEvent::as_str)], row_to_audit)
            .context("query audit log")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("decode audit row")?;
        Ok(rows)
    }

    fn insert_low_quality(&self, entry: &NewLowQuality) -> Result<LowQualityEntry> {
        queue_entry(&self.conn(), entry)
    }

    fn update_low_quality(&self, entry: &LowQualityEntry) -> Result<()> {
        record_review(&self.conn(), entry)
    }

    fn get_low_quality(&self, id: i64) -> Result<Option<LowQualityEntry>> {
        let conn = self.conn();
        let sql = format!("SELECT {LOW_QUALITY_COLUMNS} FROM low_quality_queue WHERE entry_id = ?1");
        conn.query_row(&sql, params![id], row_to_low_quality)
            .optional()
            .with_context(|| format!("load low-quality entry {id}"))
    }

    fn list_low_quality(&self, status: Option<ReviewStatus>) -> Result<Vec<LowQualityEntry>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {LOW_QUALITY_COLUMNS} FROM low_quality_queue
             WHERE ?1 IS NULL OR status = ?1
             ORDER BY created_at_us, entry_id"
        );
        let mut stmt = conn.prepare(&sql).context("prepare low-quality query")?;
        let rows = stmt
            .query_map(params![status.map(ReviewStatus::as_str)], row_to_low_quality)
            .context("query low-quality queue")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("decode low-quality row")?;
        Ok(rows)
    }

    fn commit(&self, changes: &ChangeSet) -> Result<CommitReceipt> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("begin decision transaction")?;

        for report in &changes.reports {
            upsert_report(&tx, report)?;
        }
        let queued = changes
            .queued
            .as_ref()
            .map(|entry| queue_entry(&tx, entry))
            .transpose()?;
        for review in &changes.reviews {
            record_review(&tx, review)?;
        }
        let history_ids = changes
            .history
            .iter()
            .map(|record| insert_history(&tx, record))
            .collect::<Result<Vec<_>>>()?;
        let audit_ids = changes
            .linked_audit(queued.as_ref().map(|entry| entry.id))
            .iter()
            .map(|record| insert_audit(&tx, record))
            .collect::<Result<Vec<_>>>()?;

        tx.commit().context("commit decision transaction")?;
        Ok(CommitReceipt {
            history_ids,
            audit_ids,
            queued,
        })
    }
}
