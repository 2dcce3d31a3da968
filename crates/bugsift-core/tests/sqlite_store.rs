//! SQLite store behaviour: persistence across reopen, atomic commits, and
//! append-only guarantees for history and audit tables.

use bugsift_core::db::SqliteStore;
use bugsift_core::model::{
    AuditEvent, AuditRecord, ClassificationTag, HistoryRecord, MatchMethod, Metadata,
    NewLowQuality, Report, ReviewStatus, Severity, Submission,
};
use bugsift_core::quality::{IssueCode, QualityChecker};
use bugsift_core::store::{ChangeSet, Store};
use bugsift_core::config::QualityConfig;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn report(id: &str, created: i64, tag: ClassificationTag, parent: Option<&str>) -> Report {
    Report {
        id: id.into(),
        title: format!("Checkout crash {id}"),
        description: "Pay button closes the app".into(),
        repro_steps: Some("1. open checkout 2. tap pay".into()),
        logs: None,
        reporter: Some("qa-bot".into()),
        metadata: Metadata {
            device: Some("Pixel 8".into()),
            build_version: Some("4.2.1".into()),
            os_version: Some("Android 14".into()),
            region: Some("EU".into()),
            severity: Some(Severity::Major),
            priority: Some("P1".into()),
        },
        embedding: Some(vec![0.6, 0.8, 0.0]),
        tag,
        parent_id: parent.map(str::to_string),
        match_confidence: parent.map(|_| 0.78),
        quality_score: Some(1.0),
        created_at_us: created,
        updated_at_us: created,
        resolved_at_us: None,
    }
}

fn history(candidate: Option<&str>, parent: &str, blocked: bool) -> HistoryRecord {
    HistoryRecord {
        candidate_report_id: candidate.map(str::to_string),
        parent_report_id: Some(parent.into()),
        match_score: Some(0.9),
        match_method: MatchMethod::Hybrid,
        submission: serde_json::json!({ "title": "Checkout crash" }),
        submitted_by: Some("qa-bot".into()),
        was_blocked: blocked,
        corrects: None,
        note: None,
        recorded_at_us: 100,
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[test]
fn reports_survive_reopen_with_embeddings() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("bugsift.sqlite3");

    {
        let store = SqliteStore::open(&path).expect("open");
        store
            .save_report(&report("bug-0000000001", 1, ClassificationTag::New, None))
            .expect("save root");
        store
            .save_report(&report(
                "bug-0000000002",
                2,
                ClassificationTag::Duplicate,
                Some("bug-0000000001"),
            ))
            .expect("save child");
    }

    let store = SqliteStore::open(&path).expect("reopen");
    let root = store
        .get_report("bug-0000000001")
        .expect("query")
        .expect("root exists");
    assert_eq!(root.embedding, Some(vec![0.6, 0.8, 0.0]));
    assert_eq!(root.metadata.severity, Some(Severity::Major));

    let children = store.children_of("bug-0000000001").expect("children");
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].match_confidence, Some(0.78));

    let vectors = store.load_all_vectors().expect("vectors");
    assert_eq!(vectors.len(), 2);
}

#[test]
fn save_report_updates_in_place() {
    let store = SqliteStore::in_memory().expect("store");
    let mut r = report("bug-0000000001", 1, ClassificationTag::New, None);
    store.save_report(&r).expect("insert");

    r.tag = ClassificationTag::Recurring;
    r.updated_at_us = 50;
    store.save_report(&r).expect("update");

    let loaded = store
        .get_report("bug-0000000001")
        .expect("query")
        .expect("exists");
    assert_eq!(loaded.tag, ClassificationTag::Recurring);
    assert_eq!(loaded.updated_at_us, 50);
    assert_eq!(loaded.created_at_us, 1);
    assert_eq!(store.list_reports().expect("list").len(), 1);
}

#[test]
fn duplicate_without_existing_parent_is_rejected() {
    let store = SqliteStore::in_memory().expect("store");
    let orphan = report(
        "bug-0000000002",
        2,
        ClassificationTag::Duplicate,
        Some("bug-missing000"),
    );
    assert!(store.save_report(&orphan).is_err());
}

// ---------------------------------------------------------------------------
// Change sets
// ---------------------------------------------------------------------------

#[test]
fn commit_is_all_or_nothing() {
    let store = SqliteStore::in_memory().expect("store");
    store
        .save_report(&report("bug-0000000001", 1, ClassificationTag::New, None))
        .expect("root");

    let bad = ChangeSet {
        reports: vec![report(
            "bug-0000000002",
            2,
            ClassificationTag::Duplicate,
            Some("bug-0000000001"),
        )],
        history: vec![history(Some("bug-0000000002"), "bug-0000000001", false)],
        // Blank actor violates the audit_log CHECK constraint.
        audit: vec![AuditRecord::new(AuditEvent::DuplicateFlagged, "  ", 100)],
        ..ChangeSet::default()
    };
    assert!(store.commit(&bad).is_err());
    assert!(store.get_report("bug-0000000002").expect("query").is_none());
    assert!(store.list_history(None).expect("history").is_empty());

    let good = ChangeSet {
        audit: vec![AuditRecord::new(AuditEvent::DuplicateFlagged, "bugsift", 100)
            .report("bug-0000000002")],
        ..bad
    };
    let receipt = store.commit(&good).expect("commit");
    assert_eq!(receipt.history_ids.len(), 1);
    assert_eq!(receipt.audit_ids.len(), 1);
    assert_eq!(store.list_history(Some("bug-0000000001")).expect("history").len(), 1);
}

#[test]
fn blocked_history_keeps_payload() {
    let store = SqliteStore::in_memory().expect("store");
    store
        .save_report(&report("bug-0000000001", 1, ClassificationTag::New, None))
        .expect("root");
    let id = store
        .append_history(&history(None, "bug-0000000001", true))
        .expect("append");

    let entries = store.list_history(Some("bug-0000000001")).expect("history");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, id);
    assert!(entries[0].record.was_blocked);
    assert_eq!(entries[0].record.submission["title"], "Checkout crash");
}

#[test]
fn audit_filter_by_event() {
    let store = SqliteStore::in_memory().expect("store");
    store
        .append_audit(
            &AuditRecord::new(AuditEvent::ReportCreated, "bugsift", 1)
                .after(serde_json::json!({ "tag": "new" })),
        )
        .expect("append");
    store
        .append_audit(&AuditRecord::new(AuditEvent::ReportPromoted, "alice", 2))
        .expect("append");

    let promoted = store
        .list_audit(Some(AuditEvent::ReportPromoted))
        .expect("list");
    assert_eq!(promoted.len(), 1);
    assert_eq!(promoted[0].record.actor, "alice");

    let all = store.list_audit(None).expect("list");
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].record.after, Some(serde_json::json!({ "tag": "new" })));
}

// ---------------------------------------------------------------------------
// Low-quality queue
// ---------------------------------------------------------------------------

#[test]
fn low_quality_entries_keep_issues_and_status() {
    let store = SqliteStore::in_memory().expect("store");
    let submission = Submission {
        title: "x".into(),
        description: String::new(),
        repro_steps: None,
        logs: None,
        reporter: Some("anon".into()),
        metadata: Metadata::default(),
    };
    let quality = QualityChecker::new(QualityConfig::default()).check(&submission);

    let mut entry = store
        .insert_low_quality(&NewLowQuality {
            submission,
            issues: quality.issues.clone(),
            quality_score: quality.score,
            created_at_us: 10,
        })
        .expect("insert");
    assert_eq!(entry.status, ReviewStatus::Pending);

    entry.status = ReviewStatus::Rejected;
    entry.reviewed_by = Some("alice".into());
    entry.reviewed_at_us = Some(20);
    store.update_low_quality(&entry).expect("update");

    let loaded = store
        .get_low_quality(entry.id)
        .expect("query")
        .expect("exists");
    assert_eq!(loaded.status, ReviewStatus::Rejected);
    assert!(loaded.issues.iter().any(|i| i.code == IssueCode::MissingDescription));
    assert!(store.list_low_quality(Some(ReviewStatus::Pending)).expect("list").is_empty());
}

#[test]
fn updating_missing_low_quality_entry_fails() {
    let store = SqliteStore::in_memory().expect("store");
    let ghost = NewLowQuality {
        submission: Submission {
            title: "t".into(),
            description: "d".into(),
            repro_steps: None,
            logs: None,
            reporter: None,
            metadata: Metadata::default(),
        },
        issues: vec![],
        quality_score: 0.5,
        created_at_us: 1,
    }
    .into_entry(99);
    assert!(store.update_low_quality(&ghost).is_err());
}

fn thin_submission() -> NewLowQuality {
    NewLowQuality {
        submission: Submission {
            title: "x".into(),
            description: String::new(),
            repro_steps: None,
            logs: None,
            reporter: None,
            metadata: Metadata::default(),
        },
        issues: vec![],
        quality_score: 0.1,
        created_at_us: 5,
    }
}

#[test]
fn queued_entry_rolls_back_with_its_audit() {
    let store = SqliteStore::in_memory().expect("store");
    let bad = ChangeSet {
        audit: vec![AuditRecord::new(AuditEvent::LowQualityFlagged, " ", 5)],
        queued: Some(thin_submission()),
        ..ChangeSet::default()
    };
    assert!(store.commit(&bad).is_err());
    assert!(store.list_low_quality(None).expect("list").is_empty());

    let good = ChangeSet {
        audit: vec![AuditRecord::new(AuditEvent::LowQualityFlagged, "bugsift", 5)],
        ..bad
    };
    let receipt = store.commit(&good).expect("commit");
    let queued = receipt.queued.expect("queued");
    let audit = store.list_audit(Some(AuditEvent::LowQualityFlagged)).expect("list");
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].record.low_quality_id, Some(queued.id));
}

#[test]
fn review_and_report_commit_together() {
    let store = SqliteStore::in_memory().expect("store");
    let mut entry = store.insert_low_quality(&thin_submission()).expect("insert");
    entry.status = ReviewStatus::Approved;
    entry.report_id = Some("bug-0000000001".into());
    entry.reviewed_by = Some("carol".into());

    let bad = ChangeSet {
        reports: vec![report("bug-0000000001", 1, ClassificationTag::New, None)],
        reviews: vec![entry.clone()],
        audit: vec![AuditRecord::new(AuditEvent::LowQualityApproved, "", 6)],
        ..ChangeSet::default()
    };
    assert!(store.commit(&bad).is_err());
    assert!(store.get_report("bug-0000000001").expect("query").is_none());
    let pending = store.get_low_quality(entry.id).expect("query").expect("exists");
    assert_eq!(pending.status, ReviewStatus::Pending);

    let good = ChangeSet {
        audit: vec![AuditRecord::new(AuditEvent::LowQualityApproved, "carol", 6)
            .low_quality(entry.id)],
        ..bad
    };
    store.commit(&good).expect("commit");
    let approved = store.get_low_quality(entry.id).expect("query").expect("exists");
    assert_eq!(approved.status, ReviewStatus::Approved);
    assert_eq!(approved.report_id.as_deref(), Some("bug-0000000001"));
}
