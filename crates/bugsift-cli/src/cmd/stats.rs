//! `bsift stats`: aggregate counters for dashboards and scripts.

use std::io::{self, Write};

use anyhow::Result;
use bugsift_triage::{EngineStats, GroupCount};

use super::Session;
use crate::output::{pretty_kv, pretty_rule, pretty_section, render_mode, score};

pub fn run_stats(session: &Session) -> Result<()> {
    let stats = session.engine.stats()?;
    render_mode(session.output, &stats, render_text, render_pretty)
}

fn render_text(s: &EngineStats, w: &mut dyn Write) -> io::Result<()> {
    for (key, value) in [
        ("total", s.total.to_string()),
        ("duplicates_detected", s.duplicates_detected.to_string()),
        ("duplicates_blocked", s.duplicates_blocked.to_string()),
        ("recurring", s.recurring.to_string()),
        ("resolved", s.resolved.to_string()),
        ("low_quality", s.low_quality_count.to_string()),
        ("low_quality_pending", s.low_quality_pending.to_string()),
        ("avg_quality_score", score(s.avg_quality_score)),
        ("avg_similarity_score", score(s.avg_similarity_score)),
        ("prevention_rate", format!("{:.2}", s.prevention_rate)),
        ("index_len", s.index_len.to_string()),
    ] {
        writeln!(w, "{key}={value}")?;
    }
    for (prefix, groups) in [
        ("region", &s.by_region),
        ("duplicate_region", &s.duplicates_by_region),
        ("build", &s.by_build),
    ] {
        for g in groups {
            writeln!(w, "{prefix}.{}={}", g.key, g.count)?;
        }
    }
    Ok(())
}

fn pretty_groups(w: &mut dyn Write, title: &str, groups: &[GroupCount]) -> io::Result<()> {
    if groups.is_empty() {
        return Ok(());
    }
    writeln!(w)?;
    pretty_section(w, title)?;
    for g in groups {
        writeln!(w, "{:>4}  {}", g.count, g.key)?;
    }
    Ok(())
}

fn render_pretty(s: &EngineStats, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, "Reports")?;
    pretty_kv(w, "Accepted", s.total.to_string())?;
    pretty_kv(w, "Recurring", s.recurring.to_string())?;
    pretty_kv(w, "Resolved", s.resolved.to_string())?;
    pretty_kv(w, "Avg quality", score(s.avg_quality_score))?;
    writeln!(w)?;

    pretty_section(w, "Duplicates")?;
    pretty_kv(w, "Detected", s.duplicates_detected.to_string())?;
    pretty_kv(w, "Blocked", s.duplicates_blocked.to_string())?;
    pretty_kv(w, "Prevention", format!("{:.2}%", s.prevention_rate))?;
    pretty_kv(w, "Avg match", score(s.avg_similarity_score))?;
    writeln!(w)?;

    pretty_section(w, "Quality review")?;
    pretty_kv(w, "Queued", s.low_quality_count.to_string())?;
    pretty_kv(w, "Pending", s.low_quality_pending.to_string())?;
    pretty_kv(w, "Approved", s.low_quality_approved.to_string())?;
    pretty_kv(w, "Rejected", s.low_quality_rejected.to_string())?;

    if !s.top_parents.is_empty() {
        writeln!(w)?;
        pretty_section(w, "Most duplicated")?;
        for p in &s.top_parents {
            writeln!(
                w,
                "{:>4}  {:<16} {:<10} {}",
                p.duplicate_count,
                p.report_id,
                p.tag.as_str(),
                p.title
            )?;
        }
        pretty_rule(w)?;
    }
    pretty_groups(w, "By region", &s.by_region)?;
    pretty_groups(w, "Duplicates by region", &s.duplicates_by_region)?;
    pretty_groups(w, "By build", &s.by_build)?;
    writeln!(w)?;
    pretty_kv(
        w,
        "Index",
        format!("{} vectors, generation {}", s.index_len, s.index_generation),
    )
}
