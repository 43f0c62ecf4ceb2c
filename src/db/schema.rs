//! SQL DDL for the knowledge store.
//!
//! Creates the version-1 layout of `knowledge_chunks` plus `schema_meta`.
//! Later columns are added by [`super::migrations`]. All DDL uses
//! `IF NOT EXISTS` so initialization is idempotent.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS knowledge_chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id TEXT NOT NULL UNIQUE,
    chunk_type TEXT NOT NULL CHECK(chunk_type IN
        ('error_resolution','task_outcome','directive_summary','conversation','code_change')),
    content TEXT NOT NULL,
    embedding BLOB NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    domain_tag TEXT NOT NULL DEFAULT 'general' CHECK(domain_tag IN
        ('frontend','backend','devops','security','testing','general')),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_type ON knowledge_chunks(chunk_type);
CREATE INDEX IF NOT EXISTS idx_chunks_domain ON knowledge_chunks(domain_tag);
CREATE INDEX IF NOT EXISTS idx_chunks_created ON knowledge_chunks(created_at);

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;
    Ok(())
}
