//! `bsift audit` and `bsift history`: read the append-only logs.

use std::io::{self, Write};

use anyhow::Result;
use bugsift_core::model::{AuditEvent, AuditLogEntry, DuplicateHistoryEntry};
use clap::Args;

use super::Session;
use crate::output::{micros_to_local, pretty_section, render_mode, score};

#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Only entries of this kind, e.g. `duplicate_blocked`.
    #[arg(long)]
    pub event: Option<AuditEvent>,

    /// Only entries touching this report.
    #[arg(long)]
    pub report: Option<String>,

    /// Show only the newest N entries.
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Only entries involving this report.
    pub id: Option<String>,

    /// Show only the newest N entries.
    #[arg(long)]
    pub limit: Option<usize>,
}

fn newest<T>(mut entries: Vec<T>, limit: Option<usize>) -> Vec<T> {
    if let Some(limit) = limit {
        let skip = entries.len().saturating_sub(limit);
        entries.drain(..skip);
    }
    entries
}

pub fn run_audit(args: &AuditArgs, session: &Session) -> Result<()> {
    let mut entries = session.engine.audit_log(args.event)?;
    if let Some(report) = &args.report {
        entries.retain(|e| e.record.report_id.as_deref() == Some(report.as_str()));
    }
    let entries = newest(entries, args.limit);
    render_mode(
        session.output,
        &entries,
        |e, w| render_audit_text(e, w),
        |e, w| render_audit_pretty(e, w),
    )
}

fn render_audit_text(entries: &[AuditLogEntry], w: &mut dyn Write) -> io::Result<()> {
    for e in entries {
        let r = &e.record;
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}\t{}",
            e.id,
            r.recorded_at_us,
            r.event,
            r.actor,
            r.report_id.as_deref().unwrap_or("-"),
            r.reasoning.as_deref().unwrap_or("")
        )?;
    }
    Ok(())
}

fn render_audit_pretty(entries: &[AuditLogEntry], w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("Audit log ({})", entries.len()))?;
    for e in entries {
        let r = &e.record;
        let subject = match (&r.report_id, r.low_quality_id) {
            (Some(report), _) => report.clone(),
            (None, Some(entry)) => format!("queue #{entry}"),
            (None, None) => "-".to_string(),
        };
        writeln!(
            w,
            "#{:<5} {}  {:<28} {:<16} by {}",
            e.id,
            micros_to_local(r.recorded_at_us),
            r.event.as_str(),
            subject,
            r.actor
        )?;
        if let Some(reasoning) = &r.reasoning {
            writeln!(w, "       {reasoning}")?;
        }
    }
    Ok(())
}

pub fn run_history(args: &HistoryArgs, session: &Session) -> Result<()> {
    let entries = newest(session.engine.history(args.id.as_deref())?, args.limit);
    render_mode(
        session.output,
        &entries,
        |e, w| render_history_text(e, w),
        |e, w| render_history_pretty(e, w),
    )
}

fn render_history_text(entries: &[DuplicateHistoryEntry], w: &mut dyn Write) -> io::Result<()> {
    for e in entries {
        let r = &e.record;
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            e.id,
            r.recorded_at_us,
            r.candidate_report_id.as_deref().unwrap_or("-"),
            r.parent_report_id.as_deref().unwrap_or("-"),
            score(r.match_score),
            r.match_method,
            if r.was_blocked { "blocked" } else { "accepted" }
        )?;
    }
    Ok(())
}

fn render_history_pretty(entries: &[DuplicateHistoryEntry], w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("Decision history ({})", entries.len()))?;
    for e in entries {
        let r = &e.record;
        let decision = if r.was_blocked {
            format!("blocked against {}", r.parent_report_id.as_deref().unwrap_or("-"))
        } else {
            match (&r.candidate_report_id, &r.parent_report_id) {
                (Some(c), Some(p)) => format!("{c} -> {p}"),
                (Some(c), None) => c.clone(),
                _ => "-".to_string(),
            }
        };
        writeln!(
            w,
            "#{:<5} {}  {:<7} {:>5}  {}",
            e.id,
            micros_to_local(r.recorded_at_us),
            r.match_method.as_str(),
            score(r.match_score),
            decision
        )?;
        if let Some(corrected) = r.corrects {
            writeln!(w, "       corrects #{corrected}")?;
        }
    }
    Ok(())
}
