//! [`KnowledgeBase`]: one store plus one embedder, behind the operations a
//! host application actually calls.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::classify::classify;
use super::debug::{DebugInvestigator, DebugLimits, DebugQuery, DebugReport};
use super::search::{SearchEngine, SearchRequest, SearchResult};
use super::store::{ChunkStore, PruneReport, UpsertOutcome};
use super::types::{
    derive_source_id, truncate_content, validate_source_id, ChunkType, DomainTag, KnowledgeChunk,
};
use crate::config::HindsightConfig;
use crate::db::HealthReport;
use crate::embedding::{Embedder, EmbeddingTier};
use crate::error::{KnowledgeError, Result};

/// Texts embedded per batch during [`KnowledgeBase::re_embed`].
const RE_EMBED_BATCH: usize = 32;

/// A chunk to ingest. Anything left unset is derived.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub chunk_type: ChunkType,
    pub content: String,
    pub source_id: Option<String>,
    pub project: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: Option<DateTime<Utc>>,
}

impl NewChunk {
    pub fn new(chunk_type: ChunkType, content: impl Into<String>) -> Self {
        Self {
            chunk_type,
            content: content.into(),
            source_id: None,
            project: None,
            metadata: serde_json::json!({}),
            created_at: None,
        }
    }

    pub fn source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Backdate the chunk. Defaults to now.
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub source_id: String,
    pub outcome: UpsertOutcome,
    pub domain_tag: DomainTag,
    pub embedding_tier: EmbeddingTier,
}

/// Store summary. Also the shape the remote service returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeStatus {
    #[serde(default)]
    pub total_chunks: u64,
    #[serde(default)]
    pub by_type: BTreeMap<String, u64>,
    #[serde(default)]
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_tier: Option<EmbeddingTier>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReEmbedReport {
    pub total: usize,
    pub updated: usize,
    pub embedding_tier: EmbeddingTier,
}

pub struct KnowledgeBase {
    store: ChunkStore,
    embedder: Embedder,
    limits: DebugLimits,
    default_project: String,
}

impl KnowledgeBase {
    /// Open the configured store file and probe embedding tiers.
    pub fn open(config: &HindsightConfig) -> Result<Self> {
        let store = ChunkStore::open(config.resolved_db_path(), config.lock_timeout())?;
        let embedder = Embedder::from_config(&config.embedding);
        Self::from_parts(store, embedder, config)
    }

    /// Assemble from an opened store and embedder.
    ///
    /// Fits embedding tiers to stored contents and checks that the stored
    /// vectors came from the tier now active.
    pub fn from_parts(store: ChunkStore, embedder: Embedder, config: &HindsightConfig) -> Result<Self> {
        refit_from_store(&store, &embedder)?;

        let active = embedder.active_tier();
        match store.embedding_tier()? {
            None => store.set_embedding_tier(active)?,
            Some(stored) if stored != active => tracing::warn!(
                stored = %stored,
                active = %active,
                "stored vectors come from a different embedding tier; run `hindsight re-embed`"
            ),
            Some(_) => {}
        }

        Ok(Self {
            store,
            embedder,
            limits: DebugLimits::from(&config.debug),
            default_project: config.storage.default_project.clone(),
        })
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    pub fn default_project(&self) -> &str {
        &self.default_project
    }

    pub fn active_tier(&self) -> EmbeddingTier {
        self.embedder.active_tier()
    }

    /// Classify, embed and upsert one chunk.
    pub fn ingest(&self, chunk: NewChunk) -> Result<IngestOutcome> {
        if chunk.content.trim().is_empty() {
            return Err(KnowledgeError::validation("content must not be empty"));
        }
        let content = truncate_content(&chunk.content).to_string();
        let source_id = chunk
            .source_id
            .unwrap_or_else(|| derive_source_id(&content));
        validate_source_id(&source_id)?;
        let project = chunk
            .project
            .unwrap_or_else(|| self.default_project.clone());

        let domain_tag = classify(&content);
        let embedding = self.embedder.embed(&content);

        let outcome = self.store.upsert(&KnowledgeChunk {
            source_id: source_id.clone(),
            chunk_type: chunk.chunk_type,
            content: content.clone(),
            project,
            domain_tag,
            metadata: chunk.metadata,
            embedding,
            created_at: chunk.created_at.unwrap_or_else(Utc::now),
        })?;

        // The fit tracks stored rows: one more on insert, a replaced row on update.
        match outcome {
            UpsertOutcome::Inserted => self.embedder.observe(&[content.as_str()]),
            UpsertOutcome::Updated => refit_from_store(&self.store, &self.embedder)?,
        }

        Ok(IngestOutcome {
            source_id,
            outcome,
            domain_tag,
            embedding_tier: self.embedder.active_tier(),
        })
    }

    pub fn ingest_error(&self, source_id: &str, content: &str, project: &str) -> Result<IngestOutcome> {
        self.ingest(
            NewChunk::new(ChunkType::ErrorResolution, content)
                .source_id(source_id)
                .project(project),
        )
    }

    pub fn ingest_task(&self, source_id: &str, content: &str, project: &str) -> Result<IngestOutcome> {
        self.ingest(
            NewChunk::new(ChunkType::TaskOutcome, content)
                .source_id(source_id)
                .project(project),
        )
    }

    pub fn ingest_code_change(
        &self,
        source_id: &str,
        content: &str,
        project: &str,
    ) -> Result<IngestOutcome> {
        self.ingest(
            NewChunk::new(ChunkType::CodeChange, content)
                .source_id(source_id)
                .project(project),
        )
    }

    pub fn search_engine(&self) -> SearchEngine<'_> {
        SearchEngine::new(&self.store, &self.embedder)
    }

    pub fn search(&self, request: &SearchRequest) -> Result<SearchResult> {
        self.search_engine().search(request)
    }

    pub fn investigator(&self) -> DebugInvestigator<'_> {
        DebugInvestigator::new(self.search_engine(), self.limits)
    }

    pub fn investigate(&self, query: &DebugQuery) -> Result<DebugReport> {
        self.investigator().investigate(query)
    }

    pub fn quick_check(&self, query: &DebugQuery) -> Result<bool> {
        self.investigator().quick_check(query)
    }

    pub fn prune(&self) -> Result<PruneReport> {
        let report = self.store.prune(Utc::now())?;
        if report.removed > 0 {
            refit_from_store(&self.store, &self.embedder)?;
        }
        Ok(report)
    }

    pub fn status(&self, project: Option<&str>) -> Result<KnowledgeStatus> {
        let counts = self.store.count_chunks(project)?;
        let total_chunks: u64 = counts.values().sum();
        Ok(KnowledgeStatus {
            total_chunks,
            by_type: counts
                .into_iter()
                .map(|(t, n)| (t.as_str().to_string(), n))
                .collect(),
            ready: true,
            embedding_tier: Some(self.embedder.active_tier()),
        })
    }

    pub fn health(&self) -> Result<HealthReport> {
        self.store.health()
    }

    pub fn delete(&self, source_id: &str) -> Result<bool> {
        let deleted = self.store.delete(source_id)?;
        if deleted {
            refit_from_store(&self.store, &self.embedder)?;
        }
        Ok(deleted)
    }

    pub fn delete_project(&self, project: &str) -> Result<u64> {
        let deleted = self.store.delete_project(project)?;
        if deleted > 0 {
            refit_from_store(&self.store, &self.embedder)?;
        }
        Ok(deleted)
    }

    /// Recompute every stored vector with the active tier and record it.
    pub fn re_embed(&self) -> Result<ReEmbedReport> {
        self.re_embed_with_progress(|_, _| {})
    }

    /// [`Self::re_embed`], calling `progress(done, total)` after each batch.
    pub fn re_embed_with_progress(
        &self,
        mut progress: impl FnMut(usize, usize),
    ) -> Result<ReEmbedReport> {
        let contents = self.store.contents()?;
        let mut updated = 0;
        let mut done = 0;

        for batch in contents.chunks(RE_EMBED_BATCH) {
            let texts: Vec<&str> = batch.iter().map(|(_, c)| c.as_str()).collect();
            let vectors = self.embedder.embed_batch(&texts);
            for ((source_id, _), vector) in batch.iter().zip(vectors) {
                if self.store.update_embedding(source_id, &vector)? {
                    updated += 1;
                }
            }
            done += batch.len();
            progress(done, contents.len());
        }

        let tier = self.embedder.active_tier();
        self.store.set_embedding_tier(tier)?;
        tracing::info!(total = contents.len(), updated, tier = %tier, "re-embedded stored chunks");

        Ok(ReEmbedReport {
            total: contents.len(),
            updated,
            embedding_tier: tier,
        })
    }

    pub fn close(&self) -> Result<()> {
        self.store.close()
    }
}

/// Fit embedding tiers over exactly the rows now stored.
fn refit_from_store(store: &ChunkStore, embedder: &Embedder) -> Result<()> {
    let contents = store.contents()?;
    let texts: Vec<&str> = contents.iter().map(|(_, c)| c.as_str()).collect();
    embedder.refit(&texts);
    tracing::debug!(documents = texts.len(), "embedding tiers fitted to store");
    Ok(())
}
