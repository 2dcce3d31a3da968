//! `bsift review`: work the low-quality queue.

use std::io::{self, Write};

use anyhow::Result;
use bugsift_core::model::{LowQualityEntry, ReviewStatus};
use clap::{Args, Subcommand};
use tracing::info;

use super::Session;
use crate::output::{micros_to_local, pretty_kv, pretty_section, render_mode, score};

#[derive(Subcommand, Debug)]
pub enum ReviewCommand {
    /// List queued submissions.
    List(ListArgs),
    /// Accept a submission and run it through duplicate detection.
    Approve(DecisionArgs),
    /// Discard a submission; the entry is kept for audit.
    Reject(DecisionArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// pending, approved or rejected.
    #[arg(long, default_value = "pending", conflicts_with = "all")]
    pub status: ReviewStatus,

    /// Include entries in every status.
    #[arg(long)]
    pub all: bool,
}

#[derive(Args, Debug)]
pub struct DecisionArgs {
    pub entry_id: i64,

    #[arg(long)]
    pub note: Option<String>,
}

pub fn run_review(command: &ReviewCommand, session: &Session) -> Result<()> {
    match command {
        ReviewCommand::List(args) => run_list(args, session),
        ReviewCommand::Approve(args) => {
            let outcome = session.engine.approve_low_quality(
                args.entry_id,
                &session.actor,
                args.note.as_deref(),
            )?;
            info!(entry = args.entry_id, outcome = outcome.kind(), "approved");
            render_mode(
                session.output,
                &outcome,
                |o, w| writeln!(w, "approved {} -> {}", args.entry_id, o.kind()),
                |o, w| {
                    pretty_section(w, &format!("Entry {} approved", args.entry_id))?;
                    pretty_kv(w, "Outcome", o.kind())?;
                    if let Some(id) = o.report_id() {
                        pretty_kv(w, "Report", id)?;
                    }
                    if let Some(parent) = o.parent_id() {
                        pretty_kv(w, "Parent", format!("{parent} ({})", score(o.confidence())))?;
                    }
                    Ok(())
                },
            )
        }
        ReviewCommand::Reject(args) => {
            let entry = session.engine.reject_low_quality(
                args.entry_id,
                &session.actor,
                args.note.as_deref(),
            )?;
            render_mode(
                session.output,
                &entry,
                |e, w| writeln!(w, "rejected {}", e.id),
                |e, w| {
                    pretty_section(w, &format!("Entry {} rejected", e.id))?;
                    pretty_kv(w, "By", e.reviewed_by.as_deref().unwrap_or("-"))
                },
            )
        }
    }
}

fn run_list(args: &ListArgs, session: &Session) -> Result<()> {
    let status = (!args.all).then_some(args.status);
    let entries = session.engine.low_quality_queue(status)?;
    render_mode(
        session.output,
        &entries,
        |e, w| render_text(e, w),
        |e, w| render_pretty(e, w),
    )
}

fn render_text(entries: &[LowQualityEntry], w: &mut dyn Write) -> io::Result<()> {
    for e in entries {
        let codes: Vec<&str> = e.issues.iter().map(|i| i.code.as_str()).collect();
        writeln!(
            w,
            "{}\t{}\t{:.2}\t{}\t{}",
            e.id,
            e.status,
            e.quality_score,
            codes.join(","),
            e.submission.title
        )?;
    }
    Ok(())
}

fn render_pretty(entries: &[LowQualityEntry], w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("Quality review queue ({})", entries.len()))?;
    for e in entries {
        writeln!(
            w,
            "#{:<5} {:<9} {:.2}  {}  {}",
            e.id,
            e.status.as_str(),
            e.quality_score,
            micros_to_local(e.created_at_us),
            e.submission.title
        )?;
        for issue in &e.issues {
            writeln!(w, "        - {}", issue.message)?;
        }
        if let Some(reviewer) = &e.reviewed_by {
            writeln!(w, "        reviewed by {reviewer}")?;
        }
    }
    Ok(())
}
