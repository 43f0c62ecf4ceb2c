pub mod migrations;
pub mod schema;

use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

use crate::embedding::codec::EMBEDDING_BYTES;
use crate::error::Result;

/// Open (or create) the knowledge database at the given path with WAL
/// journaling, a bounded busy timeout, and the schema migrated to current.
pub fn open_database(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut conn = Connection::open(path)?;

    // WAL keeps committed upserts intact across a crash and lets readers
    // proceed while a writer holds the lock.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.busy_timeout(busy_timeout)?;

    schema::init_schema(&conn)?;
    migrations::run_migrations(&mut conn)?;

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Open a read-only connection to an existing, already migrated database.
pub fn open_reader(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(busy_timeout)?;
    Ok(conn)
}

/// Open a migrated in-memory database. Used by tests and throwaway stores.
pub fn open_memory_database() -> Result<Connection> {
    let mut conn = Connection::open_in_memory()?;
    schema::init_schema(&conn)?;
    migrations::run_migrations(&mut conn)?;
    Ok(conn)
}

/// Result of [`check_database_health`].
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub integrity_ok: bool,
    pub integrity_details: String,
    pub schema_version: u32,
    pub embedding_tier: Option<String>,
    pub chunk_count: u64,
    /// `source_id`s whose embedding blob has the wrong size.
    pub corrupt_embeddings: Vec<String>,
}

/// Run `PRAGMA integrity_check` and look for undecodable embedding blobs.
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let integrity_details: String =
        conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
    let schema_version = migrations::get_schema_version(conn)?;
    let embedding_tier = migrations::get_embedding_tier(conn)?;
    let chunk_count: i64 =
        conn.query_row("SELECT COUNT(*) FROM knowledge_chunks", [], |row| row.get(0))?;

    let mut stmt = conn.prepare(
        "SELECT source_id FROM knowledge_chunks \
         WHERE typeof(embedding) != 'blob' OR length(embedding) != ?1 ORDER BY source_id",
    )?;
    let corrupt_embeddings = stmt
        .query_map([EMBEDDING_BYTES as i64], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(HealthReport {
        integrity_ok: integrity_details == "ok",
        integrity_details,
        schema_version,
        embedding_tier,
        chunk_count: chunk_count as u64,
        corrupt_embeddings,
    })
}
