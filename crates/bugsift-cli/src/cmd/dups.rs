//! `bsift dups`: every report below a report in its duplicate chain.

use std::io::{self, Write};

use anyhow::Result;
use bugsift_core::model::ReportSummary;
use clap::Args;

use super::Session;
use crate::output::{micros_to_local, pretty_rule, pretty_section, render_mode, score};

#[derive(Args, Debug)]
pub struct DupsArgs {
    /// Report whose duplicates to list.
    pub id: String,
}

pub fn run_dups(args: &DupsArgs, session: &Session) -> Result<()> {
    let dups = session.engine.get_duplicates(&args.id)?;
    render_mode(
        session.output,
        &dups,
        |dups, w| render_text(dups, w),
        |dups, w| render_pretty(&args.id, dups, w),
    )
}

fn render_text(dups: &[ReportSummary], w: &mut dyn Write) -> io::Result<()> {
    for d in dups {
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}",
            d.id,
            d.tag,
            d.parent_id.as_deref().unwrap_or("-"),
            score(d.match_confidence),
            d.title
        )?;
    }
    Ok(())
}

fn render_pretty(root: &str, dups: &[ReportSummary], w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("Duplicates of {root} ({})", dups.len()))?;
    if dups.is_empty() {
        writeln!(w, "none")?;
        return Ok(());
    }
    for d in dups {
        writeln!(
            w,
            "{:<16} {:<10} {:>5}  {}  {}",
            d.id,
            d.tag.as_str(),
            score(d.match_confidence),
            micros_to_local(d.created_at_us),
            d.title
        )?;
        if d.parent_id.as_deref() != Some(root) {
            if let Some(parent) = &d.parent_id {
                writeln!(w, "{:<16} via {parent}", "")?;
            }
        }
    }
    pretty_rule(w)
}
