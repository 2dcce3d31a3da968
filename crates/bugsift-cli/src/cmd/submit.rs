//! `bsift submit`: classify one incoming report.
//!
//! The report comes either from a JSON document (`--file`, `-` for stdin)
//! or from individual flags. Duplicate and low-quality results are normal
//! outcomes and exit 0.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bugsift_core::model::RawSubmission;
use bugsift_triage::Outcome;
use clap::Args;

use super::Session;
use crate::output::{pretty_kv, pretty_section, render_mode, score};

#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// JSON document holding the report; `-` reads stdin.
    #[arg(long, short = 'f', conflicts_with_all = ["title", "description"])]
    pub file: Option<PathBuf>,

    #[arg(long, required_unless_present = "file")]
    pub title: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long = "repro-steps")]
    pub repro_steps: Option<String>,

    #[arg(long)]
    pub logs: Option<String>,

    #[arg(long)]
    pub reporter: Option<String>,

    #[arg(long)]
    pub device: Option<String>,

    #[arg(long = "build")]
    pub build_version: Option<String>,

    #[arg(long = "os")]
    pub os_version: Option<String>,

    #[arg(long)]
    pub region: Option<String>,

    /// critical, major, minor or trivial (aliases such as `high` accepted).
    #[arg(long)]
    pub severity: Option<String>,

    #[arg(long)]
    pub priority: Option<String>,
}

impl SubmitArgs {
    fn to_raw(&self) -> RawSubmission {
        RawSubmission {
            title: self.title.clone(),
            description: self.description.clone(),
            repro_steps: self.repro_steps.clone(),
            logs: self.logs.clone(),
            reporter: self.reporter.clone(),
            device: self.device.clone(),
            build_version: self.build_version.clone(),
            os_version: self.os_version.clone(),
            region: self.region.clone(),
            severity: self.severity.clone(),
            priority: self.priority.clone(),
        }
    }
}

fn read_document(path: &Path) -> Result<serde_json::Value> {
    let reader: Box<dyn Read> = if path.as_os_str() == "-" {
        Box::new(io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(path).with_context(|| format!("open {}", path.display()))?,
        ))
    };
    serde_json::from_reader(reader).with_context(|| format!("parse JSON from {}", path.display()))
}

pub fn run_submit(args: &SubmitArgs, session: &Session) -> Result<()> {
    let outcome = match &args.file {
        Some(path) => session.engine.submit(read_document(path)?)?,
        None => session.engine.submit_raw(args.to_raw())?,
    };
    render_mode(session.output, &outcome, render_text, render_pretty)
}

fn render_text(outcome: &Outcome, w: &mut dyn Write) -> io::Result<()> {
    match outcome {
        Outcome::Created { report_id, .. } => writeln!(w, "created {report_id}"),
        Outcome::FlaggedDuplicate {
            report_id,
            parent_id,
            confidence,
            promoted_root,
            ..
        } => {
            writeln!(w, "flagged_duplicate {report_id} parent={parent_id} score={confidence:.4}")?;
            if let Some(root) = promoted_root {
                writeln!(w, "recurring {root}")?;
            }
            Ok(())
        }
        Outcome::Blocked {
            parent_id,
            confidence,
            ..
        } => writeln!(w, "blocked parent={parent_id} score={confidence:.4}"),
        Outcome::LowQuality {
            entry_id,
            score,
            issues,
        } => {
            let codes: Vec<&str> = issues.iter().map(|i| i.code.as_str()).collect();
            writeln!(w, "low_quality entry={entry_id} score={score:.2} issues={}", codes.join(","))
        }
        Outcome::NeedsReview { reason, audit_id } => {
            writeln!(w, "needs_review audit={audit_id} reason={reason}")
        }
    }
}

fn render_pretty(outcome: &Outcome, w: &mut dyn Write) -> io::Result<()> {
    match outcome {
        Outcome::Created {
            report_id, closest, ..
        } => {
            pretty_section(w, "Report created")?;
            pretty_kv(w, "Report", report_id)?;
            if let Some(c) = closest {
                pretty_kv(
                    w,
                    "Closest",
                    format!("{} ({}, below flag threshold)", c.report_id, score(Some(c.hybrid))),
                )?;
            }
        }
        Outcome::FlaggedDuplicate {
            report_id,
            parent_id,
            confidence,
            details,
            promoted_root,
            ..
        } => {
            pretty_section(w, "Flagged as duplicate")?;
            pretty_kv(w, "Report", report_id)?;
            pretty_kv(w, "Parent", parent_id)?;
            pretty_kv(w, "Confidence", score(Some(*confidence)))?;
            pretty_kv(w, "Reasoning", details.reasoning())?;
            if let Some(root) = promoted_root {
                pretty_kv(w, "Recurring", format!("{root} promoted"))?;
            }
        }
        Outcome::Blocked {
            parent_id,
            confidence,
            details,
            ..
        } => {
            pretty_section(w, "Blocked: duplicate of an existing report")?;
            pretty_kv(w, "Existing", parent_id)?;
            pretty_kv(w, "Confidence", score(Some(*confidence)))?;
            pretty_kv(w, "Reasoning", details.reasoning())?;
        }
        Outcome::LowQuality {
            entry_id,
            score: quality,
            issues,
        } => {
            pretty_section(w, "Queued for quality review")?;
            pretty_kv(w, "Entry", entry_id.to_string())?;
            pretty_kv(w, "Score", score(Some(*quality)))?;
            for issue in issues {
                writeln!(w, "  - {}: {}", issue.code, issue.message)?;
            }
        }
        Outcome::NeedsReview { reason, audit_id } => {
            pretty_section(w, "Needs manual review")?;
            pretty_kv(w, "Reason", reason)?;
            pretty_kv(w, "Audit entry", audit_id.to_string())?;
        }
    }
    Ok(())
}
