//! `bsift show`: one report with its chain position and decision history.

use std::io::{self, Write};

use anyhow::Result;
use bugsift_core::model::{ClassificationTag, DuplicateHistoryEntry, Metadata, Report, Severity};
use bugsift_triage::chain;
use clap::Args;
use serde::Serialize;

use super::Session;
use crate::output::{micros_to_local, pretty_kv, pretty_rule, pretty_section, render_mode, score};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Report id, e.g. `bug-3f9a2c1d7e`.
    pub id: String,
}

/// Report detail as emitted in JSON output. The embedding is omitted.
#[derive(Debug, Serialize)]
pub struct ShowReport {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repro_steps: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporter: Option<String>,
    pub metadata: Metadata,
    pub tag: ClassificationTag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Root of the chain this report belongs to.
    pub root_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    pub duplicate_count: usize,
    pub indexed: bool,
    pub history: Vec<DuplicateHistoryEntry>,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

impl ShowReport {
    fn new(
        report: Report,
        root_id: String,
        duplicate_count: usize,
        indexed: bool,
        history: Vec<DuplicateHistoryEntry>,
    ) -> Self {
        Self {
            id: report.id,
            title: report.title,
            description: report.description,
            repro_steps: report.repro_steps,
            logs: report.logs,
            reporter: report.reporter,
            metadata: report.metadata,
            tag: report.tag,
            parent_id: report.parent_id,
            root_id,
            match_confidence: report.match_confidence,
            quality_score: report.quality_score,
            duplicate_count,
            indexed,
            history,
            created_at_us: report.created_at_us,
            updated_at_us: report.updated_at_us,
        }
    }
}

pub fn run_show(args: &ShowArgs, session: &Session) -> Result<()> {
    let engine = &session.engine;
    let report = engine.report(&args.id)?;
    let depth = engine.config().engine.max_chain_depth;
    let root_id = chain::resolve_root(engine.store(), &report.id, depth)?;
    let duplicate_count = chain::count_duplicates(engine.store(), &report.id, depth)?;
    let history = engine.history(Some(&report.id))?;
    let indexed = engine.index().contains(&report.id);

    let view = ShowReport::new(report, root_id, duplicate_count, indexed, history);
    render_mode(session.output, &view, render_text, render_pretty)
}

fn render_text(view: &ShowReport, w: &mut dyn Write) -> io::Result<()> {
    writeln!(
        w,
        "{}\t{}\t{}\t{}\t{}",
        view.id,
        view.tag,
        view.parent_id.as_deref().unwrap_or("-"),
        score(view.match_confidence),
        view.title
    )
}

fn render_pretty(view: &ShowReport, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("{}  {}", view.id, view.title))?;
    pretty_kv(w, "Tag", view.tag.as_str())?;
    if let Some(parent) = &view.parent_id {
        pretty_kv(w, "Parent", format!("{parent} ({})", score(view.match_confidence)))?;
    }
    if view.root_id != view.id {
        pretty_kv(w, "Chain root", &view.root_id)?;
    }
    pretty_kv(w, "Duplicates", view.duplicate_count.to_string())?;
    pretty_kv(w, "Quality", score(view.quality_score))?;
    pretty_kv(w, "Indexed", if view.indexed { "yes" } else { "no" })?;
    if let Some(reporter) = &view.reporter {
        pretty_kv(w, "Reporter", reporter)?;
    }
    pretty_kv(w, "Created", micros_to_local(view.created_at_us))?;
    pretty_kv(w, "Updated", micros_to_local(view.updated_at_us))?;

    let meta = &view.metadata;
    for (key, value) in [
        ("Device", meta.device.as_deref()),
        ("Build", meta.build_version.as_deref()),
        ("OS", meta.os_version.as_deref()),
        ("Region", meta.region.as_deref()),
        ("Severity", meta.severity.map(Severity::as_str)),
        ("Priority", meta.priority.as_deref()),
    ] {
        if let Some(value) = value {
            pretty_kv(w, key, value)?;
        }
    }

    writeln!(w)?;
    writeln!(w, "{}", view.description)?;
    if let Some(steps) = &view.repro_steps {
        writeln!(w)?;
        writeln!(w, "Steps to reproduce:")?;
        writeln!(w, "{steps}")?;
    }

    if !view.history.is_empty() {
        writeln!(w)?;
        pretty_section(w, "History")?;
        for entry in &view.history {
            let record = &entry.record;
            writeln!(
                w,
                "#{:<5} {}  {:<7} {}{}",
                entry.id,
                micros_to_local(record.recorded_at_us),
                record.match_method.as_str(),
                score(record.match_score),
                record
                    .corrects
                    .map_or_else(String::new, |c| format!("  corrects #{c}")),
            )?;
        }
        pretty_rule(w)?;
    }
    Ok(())
}
