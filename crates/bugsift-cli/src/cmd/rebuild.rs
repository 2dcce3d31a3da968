//! `bsift rebuild-index`: reload the similarity index from the database.

use std::io::Write;

use anyhow::Result;
use tracing::info;

use super::Session;
use crate::output::{pretty_kv, pretty_section, render_mode};

pub fn run_rebuild(session: &Session) -> Result<()> {
    let stats = session.engine.rebuild_index()?;
    info!(
        indexed = stats.indexed,
        skipped = stats.skipped,
        generation = stats.generation,
        "index rebuilt"
    );
    render_mode(
        session.output,
        &stats,
        |s, w| {
            writeln!(
                w,
                "indexed={} skipped={} replayed={} generation={}",
                s.indexed, s.skipped, s.replayed, s.generation
            )
        },
        |s, w| {
            pretty_section(w, "Index rebuilt")?;
            pretty_kv(w, "Indexed", s.indexed.to_string())?;
            pretty_kv(w, "Skipped", s.skipped.to_string())?;
            pretty_kv(w, "Replayed", s.replayed.to_string())?;
            pretty_kv(w, "Generation", s.generation.to_string())
        },
    )
}
