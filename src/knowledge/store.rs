//! Durable keyed chunk storage.
//!
//! [`ChunkStore`] owns one writer connection for a knowledge file plus a few
//! read-only connections, so searches proceed while an upsert holds the
//! writer. In-memory stores have no readers and read through the writer.
//! Every operation takes its connection lock with a bounded wait and fails
//! with [`KnowledgeError::Busy`] rather than blocking forever. Writes run in
//! `BEGIN IMMEDIATE` transactions so concurrent upserts never interleave.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use serde::Serialize;

use super::types::{
    format_timestamp, parse_timestamp, truncate_content, validate_source_id, ChunkType, DomainTag,
    KnowledgeChunk, ProjectScope,
};
use crate::db::{self, migrations, HealthReport};
use crate::embedding::{codec, EmbeddingTier};
use crate::error::{KnowledgeError, Result};

const SELECT_COLUMNS: &str = "SELECT source_id, chunk_type, content, project, domain_tag, \
                              metadata, embedding, created_at FROM knowledge_chunks";

/// Default bounded wait for the connection lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
/// Read-only connections opened alongside the writer for file-backed stores.
const READ_CONNECTIONS: usize = 4;

/// Whether an upsert created a row or overwrote one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Exact-match pre-filter for [`ChunkStore::get_candidates`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFilter {
    pub project: ProjectScope,
    pub chunk_type: Option<ChunkType>,
    pub domain: Option<DomainTag>,
}

impl CandidateFilter {
    pub fn new(project: ProjectScope) -> Self {
        Self {
            project,
            chunk_type: None,
            domain: None,
        }
    }

    pub fn chunk_type(mut self, chunk_type: Option<ChunkType>) -> Self {
        self.chunk_type = chunk_type;
        self
    }

    pub fn domain(mut self, domain: Option<DomainTag>) -> Self {
        self.domain = domain;
        self
    }
}

/// Live candidates plus the ids of rows that could not be decoded.
#[derive(Debug, Default)]
pub struct CandidateSet {
    pub chunks: Vec<KnowledgeChunk>,
    pub skipped: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct PruneReport {
    pub removed: u64,
    pub by_type: BTreeMap<ChunkType, u64>,
}

pub struct ChunkStore {
    conn: Mutex<Option<Connection>>,
    readers: Vec<Mutex<Option<Connection>>>,
    next_reader: AtomicUsize,
    lock_timeout: Duration,
}

impl ChunkStore {
    /// Open (or create) the store file. `lock_timeout` bounds both the
    /// in-process lock wait and SQLite's busy handler.
    pub fn open(path: impl AsRef<Path>, lock_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        let conn = db::open_database(path, lock_timeout)?;
        let readers = (0..READ_CONNECTIONS)
            .map(|_| db::open_reader(path, lock_timeout).map(|c| Mutex::new(Some(c))))
            .collect::<Result<Vec<_>>>()?;
        let mut store = Self::from_connection(conn, lock_timeout);
        store.readers = readers;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = db::open_memory_database()?;
        Ok(Self::from_connection(conn, DEFAULT_LOCK_TIMEOUT))
    }

    /// Wrap an already migrated connection.
    pub fn from_connection(conn: Connection, lock_timeout: Duration) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
            readers: Vec::new(),
            next_reader: AtomicUsize::new(0),
            lock_timeout,
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self
            .conn
            .try_lock_for(self.lock_timeout)
            .ok_or(KnowledgeError::Busy {
                waited: self.lock_timeout,
            })?;
        let conn = guard.as_mut().ok_or(KnowledgeError::Closed)?;
        f(conn)
    }

    /// Run a read on any free reader, waiting on one in rotation if all are
    /// busy. Falls back to the writer when the store has no readers.
    fn with_reader<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        if self.readers.is_empty() {
            return self.with_conn(|conn| f(conn));
        }
        let guard = match self.readers.iter().find_map(|r| r.try_lock()) {
            Some(guard) => guard,
            None => {
                let idx = self.next_reader.fetch_add(1, Ordering::Relaxed) % self.readers.len();
                self.readers[idx]
                    .try_lock_for(self.lock_timeout)
                    .ok_or(KnowledgeError::Busy {
                        waited: self.lock_timeout,
                    })?
            }
        };
        let conn = guard.as_ref().ok_or(KnowledgeError::Closed)?;
        f(conn)
    }

    /// Insert or overwrite by `source_id`.
    ///
    /// Content is truncated to [`super::types::MAX_CONTENT_CHARS`]. Changing
    /// the `chunk_type` of an existing `source_id` is rejected.
    pub fn upsert(&self, chunk: &KnowledgeChunk) -> Result<UpsertOutcome> {
        validate_source_id(&chunk.source_id)?;
        if chunk.content.trim().is_empty() {
            return Err(KnowledgeError::validation("content must not be empty"));
        }
        if !chunk.metadata.is_object() {
            return Err(KnowledgeError::validation("metadata must be a JSON object"));
        }
        let blob = codec::encode(&chunk.embedding)?;
        let metadata = chunk.metadata.to_string();
        let content = truncate_content(&chunk.content);
        let created_at = format_timestamp(chunk.created_at);

        self.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT chunk_type FROM knowledge_chunks WHERE source_id = ?1",
                    params![chunk.source_id],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(existing) = &existing {
                if existing != chunk.chunk_type.as_str() {
                    return Err(KnowledgeError::validation(format!(
                        "chunk_type of {} is {existing} and cannot change to {}",
                        chunk.source_id, chunk.chunk_type
                    )));
                }
            }

            tx.execute(
                "INSERT INTO knowledge_chunks \
                 (source_id, chunk_type, content, project, domain_tag, metadata, embedding, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                 ON CONFLICT(source_id) DO UPDATE SET \
                 content = excluded.content, embedding = excluded.embedding, \
                 metadata = excluded.metadata, domain_tag = excluded.domain_tag, \
                 project = excluded.project, created_at = excluded.created_at",
                params![
                    chunk.source_id,
                    chunk.chunk_type.as_str(),
                    content,
                    chunk.project,
                    chunk.domain_tag.as_str(),
                    metadata,
                    blob,
                    created_at,
                ],
            )?;
            tx.commit()?;

            let outcome = if existing.is_some() {
                UpsertOutcome::Updated
            } else {
                UpsertOutcome::Inserted
            };
            tracing::debug!(
                source_id = %chunk.source_id,
                chunk_type = %chunk.chunk_type,
                project = %chunk.project,
                ?outcome,
                "chunk upserted"
            );
            Ok(outcome)
        })
    }

    pub fn get(&self, source_id: &str) -> Result<Option<KnowledgeChunk>> {
        self.with_reader(|conn| {
            let raw = conn
                .query_row(
                    &format!("{SELECT_COLUMNS} WHERE source_id = ?1"),
                    params![source_id],
                    RawRow::from_row,
                )
                .optional()?;
            raw.map(RawRow::decode).transpose()
        })
    }

    /// Every non-expired chunk matching `filter`, newest first.
    ///
    /// Rows that fail to decode are left out of `chunks` and reported by
    /// `source_id` in `skipped`; one bad row never fails the whole read.
    pub fn get_candidates(&self, filter: &CandidateFilter, now: DateTime<Utc>) -> Result<CandidateSet> {
        let mut sql = format!("{SELECT_COLUMNS} WHERE 1 = 1");
        let mut args: Vec<String> = Vec::new();
        if let Some(project) = filter.project.as_project() {
            args.push(project.to_string());
            sql.push_str(&format!(" AND project = ?{}", args.len()));
        }
        if let Some(chunk_type) = filter.chunk_type {
            args.push(chunk_type.as_str().to_string());
            sql.push_str(&format!(" AND chunk_type = ?{}", args.len()));
        }
        if let Some(domain) = filter.domain {
            args.push(domain.as_str().to_string());
            sql.push_str(&format!(" AND domain_tag = ?{}", args.len()));
        }
        sql.push_str(" ORDER BY created_at DESC, source_id ASC");

        let rows = self.with_reader(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(args.iter()), RawRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let mut set = CandidateSet::default();
        for raw in rows {
            match raw.decode() {
                Ok(chunk) => {
                    if !chunk.chunk_type.policy().retention.is_expired(chunk.created_at, now) {
                        set.chunks.push(chunk);
                    }
                }
                Err(KnowledgeError::CorruptRecord { source_id, reason }) => {
                    tracing::warn!(%source_id, %reason, "skipping corrupt chunk");
                    set.skipped.push(source_id);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(set)
    }

    pub fn delete(&self, source_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM knowledge_chunks WHERE source_id = ?1",
                params![source_id],
            )?;
            Ok(n > 0)
        })
    }

    /// Remove every chunk owned by `project`. Returns how many went.
    pub fn delete_project(&self, project: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM knowledge_chunks WHERE project = ?1",
                params![project],
            )?;
            tracing::info!(project, removed = n, "project knowledge deleted");
            Ok(n as u64)
        })
    }

    /// Delete every chunk older than its type's retention window.
    pub fn prune(&self, now: DateTime<Utc>) -> Result<PruneReport> {
        self.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut report = PruneReport::default();

            for chunk_type in ChunkType::ALL {
                let Some(window) = chunk_type.policy().retention.window() else {
                    continue;
                };
                let cutoff = format_timestamp(now - window);
                let n = tx.execute(
                    "DELETE FROM knowledge_chunks WHERE chunk_type = ?1 AND created_at < ?2",
                    params![chunk_type.as_str(), cutoff],
                )? as u64;
                if n > 0 {
                    report.by_type.insert(chunk_type, n);
                    report.removed += n;
                }
            }

            tx.commit()?;
            tracing::info!(removed = report.removed, "pruned expired chunks");
            Ok(report)
        })
    }

    /// Stored chunk counts per type, optionally for one project.
    pub fn count_chunks(&self, project: Option<&str>) -> Result<BTreeMap<ChunkType, u64>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT chunk_type, COUNT(*) FROM knowledge_chunks \
                 WHERE ?1 IS NULL OR project = ?1 GROUP BY chunk_type",
            )?;
            let rows = stmt
                .query_map(params![project], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(rows
                .into_iter()
                .filter_map(|(t, n)| t.parse::<ChunkType>().ok().map(|t| (t, n as u64)))
                .collect())
        })
    }

    /// `(source_id, content)` for every stored chunk, in insertion order.
    pub fn contents(&self) -> Result<Vec<(String, String)>> {
        self.with_reader(|conn| {
            let mut stmt =
                conn.prepare("SELECT source_id, content FROM knowledge_chunks ORDER BY id")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Replace one chunk's vector without touching anything else.
    pub fn update_embedding(&self, source_id: &str, embedding: &[f32]) -> Result<bool> {
        let blob = codec::encode(embedding)?;
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE knowledge_chunks SET embedding = ?1 WHERE source_id = ?2",
                params![blob, source_id],
            )?;
            Ok(n > 0)
        })
    }

    /// The tier that produced the stored vectors, if recorded.
    pub fn embedding_tier(&self) -> Result<Option<EmbeddingTier>> {
        self.with_reader(|conn| {
            Ok(migrations::get_embedding_tier(conn)?.and_then(|t| t.parse().ok()))
        })
    }

    pub fn set_embedding_tier(&self, tier: EmbeddingTier) -> Result<()> {
        self.with_conn(|conn| Ok(migrations::set_embedding_tier(conn, tier.as_str())?))
    }

    pub fn health(&self) -> Result<HealthReport> {
        self.with_conn(|conn| db::check_database_health(conn))
    }

    /// Release every connection. Later operations fail with
    /// [`KnowledgeError::Closed`]; closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        for reader in &self.readers {
            let mut guard = reader
                .try_lock_for(self.lock_timeout)
                .ok_or(KnowledgeError::Busy {
                    waited: self.lock_timeout,
                })?;
            if let Some(conn) = guard.take() {
                conn.close().map_err(|(_, e)| KnowledgeError::from(e))?;
            }
        }

        let mut guard = self
            .conn
            .try_lock_for(self.lock_timeout)
            .ok_or(KnowledgeError::Busy {
                waited: self.lock_timeout,
            })?;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| KnowledgeError::from(e))?;
            tracing::debug!("knowledge store closed");
        }
        Ok(())
    }

    /// False while another caller holds the writer past the lock timeout.
    pub fn is_closed(&self) -> bool {
        self.conn
            .try_lock_for(self.lock_timeout)
            .is_some_and(|guard| guard.is_none())
    }
}

/// A row as read from SQLite, before any decoding that can fail.
struct RawRow {
    source_id: String,
    chunk_type: String,
    content: String,
    project: String,
    domain_tag: String,
    metadata: String,
    embedding: Value,
    created_at: String,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            source_id: row.get(0)?,
            chunk_type: row.get(1)?,
            content: row.get(2)?,
            project: row.get(3)?,
            domain_tag: row.get(4)?,
            metadata: row.get(5)?,
            embedding: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn decode(self) -> Result<KnowledgeChunk> {
        let source_id = self.source_id;
        let corrupt = |reason: String| KnowledgeError::CorruptRecord {
            source_id: source_id.clone(),
            reason,
        };

        let chunk_type = self.chunk_type.parse::<ChunkType>().map_err(&corrupt)?;
        let domain_tag = self.domain_tag.parse::<DomainTag>().map_err(&corrupt)?;
        let embedding = match &self.embedding {
            Value::Blob(bytes) => codec::decode(bytes).map_err(|e| corrupt(e.to_string()))?,
            other => return Err(corrupt(format!("embedding is {:?}, not a blob", other.data_type()))),
        };
        let created_at = parse_timestamp(&self.created_at)
            .ok_or_else(|| corrupt(format!("bad timestamp {:?}", self.created_at)))?;
        let metadata = serde_json::from_str(&self.metadata)
            .map_err(|e| corrupt(format!("bad metadata: {e}")))?;

        Ok(KnowledgeChunk {
            source_id: source_id.clone(),
            chunk_type,
            content: self.content,
            project: self.project,
            domain_tag,
            metadata,
            embedding,
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EMBEDDING_DIM;
    use chrono::Duration as ChronoDuration;

    fn chunk(source_id: &str, chunk_type: ChunkType, content: &str) -> KnowledgeChunk {
        KnowledgeChunk {
            source_id: source_id.into(),
            chunk_type,
            content: content.into(),
            project: "api".into(),
            domain_tag: DomainTag::General,
            metadata: serde_json::json!({}),
            embedding: vec![0.5; EMBEDDING_DIM],
            created_at: Utc::now(),
        }
    }

    fn all_in(project: &str) -> CandidateFilter {
        CandidateFilter::new(ProjectScope::project(project))
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let store = ChunkStore::open_in_memory().unwrap();
        let c = chunk("e1", ChunkType::ErrorResolution, "Fix: add timeout");
        assert_eq!(store.upsert(&c).unwrap(), UpsertOutcome::Inserted);

        let got = store.get("e1").unwrap().unwrap();
        assert_eq!(got.content, "Fix: add timeout");
        assert_eq!(got.chunk_type, ChunkType::ErrorResolution);
        assert_eq!(got.embedding.len(), EMBEDDING_DIM);
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn chunk_type_is_immutable() {
        let store = ChunkStore::open_in_memory().unwrap();
        store.upsert(&chunk("x", ChunkType::Conversation, "a")).unwrap();
        let err = store
            .upsert(&chunk("x", ChunkType::ErrorResolution, "b"))
            .unwrap_err();
        assert!(matches!(err, KnowledgeError::Validation(_)));
        assert_eq!(store.get("x").unwrap().unwrap().content, "a");
    }

    #[test]
    fn upsert_rejects_bad_input_before_io() {
        let store = ChunkStore::open_in_memory().unwrap();
        let mut c = chunk("", ChunkType::Conversation, "a");
        assert!(matches!(store.upsert(&c), Err(KnowledgeError::Validation(_))));

        c.source_id = "ok".into();
        c.content = "   ".into();
        assert!(matches!(store.upsert(&c), Err(KnowledgeError::Validation(_))));

        c.content = "body".into();
        c.embedding = vec![0.1; 3];
        assert!(matches!(
            store.upsert(&c),
            Err(KnowledgeError::EncodingMismatch(_))
        ));
    }

    #[test]
    fn long_content_is_truncated() {
        let store = ChunkStore::open_in_memory().unwrap();
        let long = "a".repeat(5000);
        store.upsert(&chunk("long", ChunkType::Conversation, &long)).unwrap();
        let got = store.get("long").unwrap().unwrap();
        assert_eq!(got.content.len(), super::super::types::MAX_CONTENT_CHARS);
    }

    #[test]
    fn candidates_filter_by_type_and_domain() {
        let store = ChunkStore::open_in_memory().unwrap();
        let mut sec = chunk("s", ChunkType::ErrorResolution, "jwt");
        sec.domain_tag = DomainTag::Security;
        store.upsert(&sec).unwrap();
        store.upsert(&chunk("g", ChunkType::ErrorResolution, "misc")).unwrap();
        store.upsert(&chunk("t", ChunkType::TaskOutcome, "task")).unwrap();

        let errors = store
            .get_candidates(&all_in("api").chunk_type(Some(ChunkType::ErrorResolution)), Utc::now())
            .unwrap();
        assert_eq!(errors.chunks.len(), 2);

        let security = store
            .get_candidates(&all_in("api").domain(Some(DomainTag::Security)), Utc::now())
            .unwrap();
        assert_eq!(security.chunks.len(), 1);
        assert_eq!(security.chunks[0].source_id, "s");
    }

    #[test]
    fn expired_chunks_are_not_candidates_even_before_prune() {
        let store = ChunkStore::open_in_memory().unwrap();
        let mut old = chunk("old", ChunkType::Conversation, "old chat");
        old.created_at = Utc::now() - ChronoDuration::days(45);
        store.upsert(&old).unwrap();

        let set = store.get_candidates(&all_in("api"), Utc::now()).unwrap();
        assert!(set.chunks.is_empty());
        assert!(store.get("old").unwrap().is_some(), "still stored until prune");
    }

    #[test]
    fn corrupt_rows_are_skipped_and_reported() {
        let store = ChunkStore::open_in_memory().unwrap();
        store.upsert(&chunk("good", ChunkType::Conversation, "fine")).unwrap();
        store
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO knowledge_chunks \
                     (source_id, chunk_type, content, project, embedding, created_at) \
                     VALUES ('bad', 'conversation', 'x', 'api', x'00010203', ?1)",
                    params![format_timestamp(Utc::now())],
                )?;
                Ok(())
            })
            .unwrap();

        let set = store.get_candidates(&all_in("api"), Utc::now()).unwrap();
        assert_eq!(set.chunks.len(), 1);
        assert_eq!(set.skipped, vec!["bad".to_string()]);
        assert!(matches!(
            store.get("bad"),
            Err(KnowledgeError::CorruptRecord { .. })
        ));
    }

    #[test]
    fn delete_and_delete_project() {
        let store = ChunkStore::open_in_memory().unwrap();
        store.upsert(&chunk("a", ChunkType::Conversation, "a")).unwrap();
        store.upsert(&chunk("b", ChunkType::Conversation, "b")).unwrap();
        let mut other = chunk("c", ChunkType::Conversation, "c");
        other.project = "web".into();
        store.upsert(&other).unwrap();

        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());
        assert_eq!(store.delete_project("api").unwrap(), 1);
        assert_eq!(store.contents().unwrap().len(), 1);
    }

    #[test]
    fn count_chunks_by_type_and_project() {
        let store = ChunkStore::open_in_memory().unwrap();
        store.upsert(&chunk("e", ChunkType::ErrorResolution, "e")).unwrap();
        store.upsert(&chunk("t1", ChunkType::TaskOutcome, "t1")).unwrap();
        let mut t2 = chunk("t2", ChunkType::TaskOutcome, "t2");
        t2.project = "web".into();
        store.upsert(&t2).unwrap();

        let all = store.count_chunks(None).unwrap();
        assert_eq!(all[&ChunkType::TaskOutcome], 2);
        let api = store.count_chunks(Some("api")).unwrap();
        assert_eq!(api[&ChunkType::TaskOutcome], 1);
        assert_eq!(api[&ChunkType::ErrorResolution], 1);
    }

    #[test]
    fn update_embedding_replaces_vector() {
        let store = ChunkStore::open_in_memory().unwrap();
        store.upsert(&chunk("a", ChunkType::Conversation, "a")).unwrap();
        assert!(store.update_embedding("a", &vec![0.25; EMBEDDING_DIM]).unwrap());
        assert_eq!(store.get("a").unwrap().unwrap().embedding[0], 0.25);
        assert!(!store.update_embedding("nope", &vec![0.25; EMBEDDING_DIM]).unwrap());
    }

    #[test]
    fn embedding_tier_is_recorded() {
        let store = ChunkStore::open_in_memory().unwrap();
        assert_eq!(store.embedding_tier().unwrap(), None);
        store.set_embedding_tier(EmbeddingTier::Statistical).unwrap();
        assert_eq!(store.embedding_tier().unwrap(), Some(EmbeddingTier::Statistical));
    }

    #[test]
    fn operations_after_close_fail() {
        let store = ChunkStore::open_in_memory().unwrap();
        store.close().unwrap();
        assert!(store.is_closed());
        assert!(matches!(store.get("a"), Err(KnowledgeError::Closed)));
        assert!(matches!(
            store.upsert(&chunk("a", ChunkType::Conversation, "a")),
            Err(KnowledgeError::Closed)
        ));
        store.close().unwrap();
    }

    #[test]
    fn reads_do_not_wait_for_the_writer() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ChunkStore::open(dir.path().join("k.db"), Duration::from_millis(50)).unwrap();
        store.upsert(&chunk("e1", ChunkType::ErrorResolution, "Fix: add timeout")).unwrap();

        let _writer = store.conn.lock();
        assert_eq!(store.count_chunks(None).unwrap()[&ChunkType::ErrorResolution], 1);
        assert!(store.get("e1").unwrap().is_some());
        assert!(!store.is_closed());
        assert!(matches!(
            store.upsert(&chunk("e2", ChunkType::ErrorResolution, "b")),
            Err(KnowledgeError::Busy { .. })
        ));
    }

    #[test]
    fn concurrent_readers_see_committed_rows() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ChunkStore::open(dir.path().join("k.db"), DEFAULT_LOCK_TIMEOUT).unwrap();
        for i in 0..10 {
            store
                .upsert(&chunk(&format!("t{i}"), ChunkType::TaskOutcome, "done"))
                .unwrap();
        }

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..5 {
                        let set = store.get_candidates(&all_in("api"), Utc::now()).unwrap();
                        assert_eq!(set.chunks.len(), 10);
                    }
                });
            }
        });

        store.close().unwrap();
        assert!(store.is_closed());
        assert!(matches!(store.count_chunks(None), Err(KnowledgeError::Closed)));
    }

    #[test]
    fn held_lock_times_out_as_busy() {
        let conn = db::open_memory_database().unwrap();
        let store = ChunkStore::from_connection(conn, Duration::from_millis(20));
        let _held = store.conn.lock();
        let err = store.count_chunks(None).unwrap_err();
        assert!(matches!(err, KnowledgeError::Busy { .. }));
        assert!(err.is_retryable());
    }
}
