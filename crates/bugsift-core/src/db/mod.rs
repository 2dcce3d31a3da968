//! SQLite persistence.
//!
//! Runtime defaults:
//! - `journal_mode = WAL` so readers proceed while a decision commits
//! - `busy_timeout = 5s` to absorb transient lock contention
//! - `foreign_keys = ON` so parent references always resolve

pub mod migrations;
pub mod schema;
pub mod store;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::{path::Path, time::Duration};

pub use store::SqliteStore;

/// Busy timeout used for store connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default database location relative to the project root.
pub const DEFAULT_DB_RELATIVE_PATH: &str = ".bugsift/bugsift.sqlite3";

/// Open (or create) the database, apply runtime pragmas, and migrate the
/// schema to the latest version.
///
/// # Errors
///
/// Returns an error if opening, configuring or migrating the database fails.
pub fn open_database(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create database directory {}", parent.display()))?;
    }

    let mut conn =
        Connection::open(path).with_context(|| format!("open database {}", path.display()))?;

    configure_connection(&conn).context("configure sqlite pragmas")?;
    let version = migrations::migrate(&mut conn).context("apply schema migrations")?;
    tracing::debug!(path = %path.display(), schema_version = version, "opened database");

    Ok(conn)
}

/// Open a private in-memory database with the full schema.
///
/// # Errors
///
/// Returns an error if configuring or migrating the database fails.
pub fn open_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory().context("open in-memory database")?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("enable foreign keys")?;
    migrations::migrate(&mut conn).context("apply schema migrations")?;
    Ok(conn)
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

/// Encode an embedding as little-endian `f32` bytes.
#[must_use]
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`].
#[must_use]
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
