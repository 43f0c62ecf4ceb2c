//! Forward-only schema migration framework.
//!
//! Tracks the schema version in `schema_meta` and runs sequential migrations
//! to bring the database up to [`CURRENT_SCHEMA_VERSION`].

use rusqlite::{Connection, OptionalExtension};

/// The schema version that the current binary expects.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Get the current schema version from the database.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    Ok(get_meta(conn, "schema_version")?
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0))
}

/// Read a `schema_meta` value.
pub fn get_meta(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = ?1",
        [key],
        |row| row.get::<_, String>(0),
    )
    .optional()
}

/// Insert or replace a `schema_meta` value.
pub fn set_meta(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

/// Name of the embedding tier that produced the stored vectors, if recorded.
pub fn get_embedding_tier(conn: &Connection) -> rusqlite::Result<Option<String>> {
    get_meta(conn, "embedding_tier")
}

pub fn set_embedding_tier(conn: &Connection, tier: &str) -> rusqlite::Result<()> {
    set_meta(conn, "embedding_tier", tier)
}

/// Run any pending migrations. Each step runs in its own transaction.
pub fn run_migrations(conn: &mut Connection) -> rusqlite::Result<()> {
    let mut version = get_schema_version(conn)?;
    tracing::debug!(schema_version = version, target = CURRENT_SCHEMA_VERSION, "checking migrations");

    while version < CURRENT_SCHEMA_VERSION {
        let next = version + 1;
        tracing::info!(from = version, to = next, "running migration");

        let tx = conn.transaction()?;
        match next {
            2 => migrate_v1_to_v2(&tx)?,
            _ => {
                tracing::error!(version = next, "unknown migration target");
                break;
            }
        }
        set_meta(&tx, "schema_version", &next.to_string())?;
        tx.commit()?;
        version = next;
    }

    Ok(())
}

/// Migration v1 → v2: chunks become project-scoped.
fn migrate_v1_to_v2(conn: &Connection) -> rusqlite::Result<()> {
    let has_project: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM pragma_table_info('knowledge_chunks') WHERE name = 'project'",
        [],
        |row| row.get(0),
    )?;
    if !has_project {
        conn.execute(
            "ALTER TABLE knowledge_chunks ADD COLUMN project TEXT NOT NULL DEFAULT ''",
            [],
        )?;
    }
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_chunks_project ON knowledge_chunks(project)",
        [],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::init_schema(&conn).unwrap();
        conn
    }

    fn has_column(conn: &Connection, column: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) > 0 FROM pragma_table_info('knowledge_chunks') WHERE name = ?1",
            [column],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn fresh_db_starts_at_version_1() {
        let conn = test_db();
        assert_eq!(get_schema_version(&conn).unwrap(), 1);
        assert!(!has_column(&conn, "project"));
    }

    #[test]
    fn run_migrations_upgrades_to_current() {
        let mut conn = test_db();
        run_migrations(&mut conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
        assert!(has_column(&conn, "project"));
    }

    #[test]
    fn migrations_are_idempotent() {
        let mut conn = test_db();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn v2_keeps_existing_rows_with_empty_project() {
        let mut conn = test_db();
        conn.execute(
            "INSERT INTO knowledge_chunks (source_id, chunk_type, content, embedding, created_at) \
             VALUES ('old-1', 'conversation', 'legacy', x'00', '2026-01-01T00:00:00.000000Z')",
            [],
        )
        .unwrap();

        run_migrations(&mut conn).unwrap();

        let project: String = conn
            .query_row(
                "SELECT project FROM knowledge_chunks WHERE source_id = 'old-1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(project, "");
    }

    #[test]
    fn embedding_tier_round_trips() {
        let conn = test_db();
        assert!(get_embedding_tier(&conn).unwrap().is_none());
        set_embedding_tier(&conn, "tfidf").unwrap();
        assert_eq!(get_embedding_tier(&conn).unwrap().as_deref(), Some("tfidf"));
    }
}
