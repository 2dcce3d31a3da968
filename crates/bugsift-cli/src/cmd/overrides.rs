//! `bsift promote`, `bsift reclassify`, `bsift resolve` and `bsift reopen`:
//! manual corrections.

use std::io::Write;

use anyhow::Result;
use bugsift_core::model::{ClassificationTag, Report};
use clap::Args;
use serde::Serialize;

use super::Session;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode, score};

#[derive(Args, Debug)]
pub struct PromoteArgs {
    /// Duplicate or recurring report to make standalone.
    pub id: String,

    #[arg(long)]
    pub note: Option<String>,
}

#[derive(Args, Debug)]
pub struct ReclassifyArgs {
    pub id: String,

    /// new, duplicate, recurring or low_quality.
    #[arg(long)]
    pub tag: ClassificationTag,

    /// Parent report; required for `duplicate`.
    #[arg(long)]
    pub parent: Option<String>,

    #[arg(long)]
    pub note: Option<String>,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    pub id: String,

    #[arg(long)]
    pub note: Option<String>,
}

#[derive(Serialize)]
struct Resolution<'a> {
    id: &'a str,
    tag: ClassificationTag,
    resolved_at_us: Option<i64>,
}

pub fn run_promote(args: &PromoteArgs, session: &Session) -> Result<()> {
    let report = session
        .engine
        .promote_to_new(&args.id, &session.actor, args.note.as_deref())?;
    render_report(session.output, &report, "Promoted to new")
}

pub fn run_reclassify(args: &ReclassifyArgs, session: &Session) -> Result<()> {
    let report = session.engine.reclassify(
        &args.id,
        args.tag,
        args.parent.as_deref(),
        &session.actor,
        args.note.as_deref(),
    )?;
    render_report(session.output, &report, "Reclassified")
}

pub fn run_resolve(args: &ResolveArgs, session: &Session) -> Result<()> {
    let report = session
        .engine
        .resolve(&args.id, &session.actor, args.note.as_deref())?;
    render_resolution(session.output, &report)
}

pub fn run_reopen(args: &ResolveArgs, session: &Session) -> Result<()> {
    let report = session
        .engine
        .reopen(&args.id, &session.actor, args.note.as_deref())?;
    render_resolution(session.output, &report)
}

fn render_resolution(mode: OutputMode, report: &Report) -> Result<()> {
    let resolution = Resolution {
        id: &report.id,
        tag: report.tag,
        resolved_at_us: report.resolved_at_us,
    };
    let state = |r: &Resolution<'_>| if r.resolved_at_us.is_some() { "resolved" } else { "open" };
    render_mode(
        mode,
        &resolution,
        |r, w| writeln!(w, "{}\t{}\t{}", r.id, r.tag, state(r)),
        |r, w| {
            pretty_section(w, &format!("Report {}", r.id))?;
            pretty_kv(w, "Tag", r.tag.as_str())?;
            pretty_kv(w, "State", state(r))
        },
    )
}

fn render_report(mode: OutputMode, report: &Report, heading: &str) -> Result<()> {
    render_mode(
        mode,
        &report.summary(),
        |r, w| {
            writeln!(
                w,
                "{}\t{}\t{}",
                r.id,
                r.tag,
                r.parent_id.as_deref().unwrap_or("-")
            )
        },
        |r, w| {
            pretty_section(w, &format!("{heading}: {}", r.id))?;
            pretty_kv(w, "Tag", r.tag.as_str())?;
            pretty_kv(w, "Parent", r.parent_id.as_deref().unwrap_or("-"))?;
            pretty_kv(w, "Confidence", score(r.match_confidence))
        },
    )
}
