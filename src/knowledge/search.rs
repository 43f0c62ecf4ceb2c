//! Ranked similarity search over stored chunks.
//!
//! Pipeline: validate → embed query → exact-match pre-filter in the store →
//! cosine similarity → weighted score → deterministic sort → truncate.
//!
//! The weighted score is `similarity × type weight × recency boost`. Type
//! weights come from [`ChunkType::policy`]; the recency boost never exceeds
//! 1.0 and never increases with age. Only candidates with positive similarity
//! are ranked, so a heavier weight or a fresher chunk always scores higher.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::store::{CandidateFilter, ChunkStore};
use super::types::{ChunkType, DomainTag, KnowledgeChunk, ProjectScope, ScoredChunk};
use crate::embedding::{cosine_similarity, Embedder, EmbeddingTier};
use crate::error::{KnowledgeError, Result};

pub const DEFAULT_TOP_K: usize = 5;
/// Raw similarity floor applied unless a request sets its own.
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.35;

/// Chunks younger than this get the full recency boost.
const RECENCY_GRACE_DAYS: f64 = 7.0;
/// Days over which the boost declines from 1.0 to [`RECENCY_FLOOR`].
const RECENCY_DECAY_DAYS: f64 = 90.0;
const RECENCY_FLOOR: f64 = 0.9;

/// Named chunk-type filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    All,
    Errors,
    Tasks,
    Code,
    Conversations,
    Directives,
}

impl SearchMode {
    pub fn chunk_type(self) -> Option<ChunkType> {
        match self {
            Self::All => None,
            Self::Errors => Some(ChunkType::ErrorResolution),
            Self::Tasks => Some(ChunkType::TaskOutcome),
            Self::Code => Some(ChunkType::CodeChange),
            Self::Conversations => Some(ChunkType::Conversation),
            Self::Directives => Some(ChunkType::DirectiveSummary),
        }
    }

    pub fn from_chunk_type(chunk_type: Option<ChunkType>) -> Self {
        match chunk_type {
            None => Self::All,
            Some(ChunkType::ErrorResolution) => Self::Errors,
            Some(ChunkType::TaskOutcome) => Self::Tasks,
            Some(ChunkType::CodeChange) => Self::Code,
            Some(ChunkType::Conversation) => Self::Conversations,
            Some(ChunkType::DirectiveSummary) => Self::Directives,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Errors => "errors",
            Self::Tasks => "tasks",
            Self::Code => "code",
            Self::Conversations => "conversations",
            Self::Directives => "directives",
        }
    }
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "errors" => Ok(Self::Errors),
            "tasks" => Ok(Self::Tasks),
            "code" => Ok(Self::Code),
            "conversations" => Ok(Self::Conversations),
            "directives" => Ok(Self::Directives),
            _ => Err(format!(
                "unknown search mode: {s} (expected all, errors, tasks, code, conversations or directives)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub chunk_type: Option<ChunkType>,
    pub domain: Option<DomainTag>,
    pub project: ProjectScope,
    pub top_k: usize,
    /// Drop candidates whose raw similarity falls below this. `None` keeps
    /// every candidate with positive similarity.
    pub min_similarity: Option<f32>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, project: ProjectScope) -> Self {
        Self {
            query: query.into(),
            chunk_type: None,
            domain: None,
            project,
            top_k: DEFAULT_TOP_K,
            min_similarity: Some(DEFAULT_MIN_SIMILARITY),
        }
    }

    pub fn chunk_type(mut self, chunk_type: ChunkType) -> Self {
        self.chunk_type = Some(chunk_type);
        self
    }

    pub fn mode(mut self, mode: SearchMode) -> Self {
        self.chunk_type = mode.chunk_type();
        self
    }

    pub fn domain(mut self, domain: Option<DomainTag>) -> Self {
        self.domain = domain;
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn min_similarity(mut self, floor: Option<f32>) -> Self {
        self.min_similarity = floor;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(KnowledgeError::validation("query must not be empty"));
        }
        if self.top_k == 0 {
            return Err(KnowledgeError::validation("top_k must be at least 1"));
        }
        if let Some(floor) = self.min_similarity {
            if !floor.is_finite() || !(0.0..=1.0).contains(&floor) {
                return Err(KnowledgeError::validation(format!(
                    "min_similarity must be within [0, 1], got {floor}"
                )));
            }
        }
        if let ProjectScope::Project(p) = &self.project {
            if p.is_empty() {
                return Err(KnowledgeError::validation("project must not be empty"));
            }
        }
        Ok(())
    }
}

/// Ranked results of one query. Also the shape the remote service returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub mode: SearchMode,
    #[serde(default)]
    pub results: Vec<ScoredChunk>,
    /// Tier that embedded the query; unknown for remote results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_tier: Option<EmbeddingTier>,
    /// `source_id`s of candidates skipped as corrupt.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_records: Vec<String>,
}

impl SearchResult {
    pub fn count(&self) -> usize {
        self.results.len()
    }

    pub fn has_results(&self) -> bool {
        !self.results.is_empty()
    }

    /// Highest-scoring result.
    pub fn top_match(&self) -> Option<&ScoredChunk> {
        self.results.first()
    }
}

/// Boost applied for chunk age: 1.0 for the first week, then a linear
/// decline to 0.9 over the following 90 days, flat afterwards.
pub fn recency_boost(age: Duration) -> f64 {
    let days = age.num_seconds() as f64 / 86_400.0;
    if days <= RECENCY_GRACE_DAYS {
        return 1.0;
    }
    let decay = ((days - RECENCY_GRACE_DAYS) / RECENCY_DECAY_DAYS).min(1.0);
    1.0 - (1.0 - RECENCY_FLOOR) * decay
}

/// `similarity × type weight × recency boost`, with similarity clamped at 0
/// so a heavier weight or fresher chunk can never lower the score.
pub fn weighted_score(
    similarity: f32,
    chunk_type: ChunkType,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> f64 {
    f64::from(similarity.max(0.0)) * chunk_type.policy().score_weight * recency_boost(now - created_at)
}

/// Score, sort and truncate `candidates` against `query`.
///
/// Candidates at or below zero similarity (or NaN) are not matches and are
/// dropped before scoring. Ordering is total: score descending, then newer
/// `created_at`, then `source_id` ascending.
pub fn rank(
    query: &[f32],
    candidates: Vec<KnowledgeChunk>,
    top_k: usize,
    min_similarity: Option<f32>,
    now: DateTime<Utc>,
) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = candidates
        .into_iter()
        .filter_map(|chunk| {
            let similarity = cosine_similarity(query, &chunk.embedding);
            if similarity.is_nan()
                || similarity <= 0.0
                || min_similarity.is_some_and(|floor| similarity < floor)
            {
                return None;
            }
            let score = weighted_score(similarity, chunk.chunk_type, chunk.created_at, now);
            Some(ScoredChunk {
                source_id: chunk.source_id,
                chunk_type: chunk.chunk_type,
                content: chunk.content,
                project: chunk.project,
                domain_tag: chunk.domain_tag,
                metadata: chunk.metadata,
                similarity,
                score,
                created_at: Some(chunk.created_at),
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.source_id.cmp(&b.source_id))
    });
    scored.truncate(top_k);
    scored
}

/// Read-only query front over a store and an embedder.
pub struct SearchEngine<'a> {
    store: &'a ChunkStore,
    embedder: &'a Embedder,
}

impl<'a> SearchEngine<'a> {
    pub fn new(store: &'a ChunkStore, embedder: &'a Embedder) -> Self {
        Self { store, embedder }
    }

    pub fn search(&self, request: &SearchRequest) -> Result<SearchResult> {
        self.search_at(request, Utc::now())
    }

    /// [`Self::search`] with an explicit clock, for reproducible ranking.
    pub fn search_at(&self, request: &SearchRequest, now: DateTime<Utc>) -> Result<SearchResult> {
        request.validate()?;

        let query_vector = self.embedder.embed(&request.query);
        let filter = CandidateFilter::new(request.project.clone())
            .chunk_type(request.chunk_type)
            .domain(request.domain);
        let candidates = self.store.get_candidates(&filter, now)?;
        let considered = candidates.chunks.len();

        let results = rank(
            &query_vector,
            candidates.chunks,
            request.top_k,
            request.min_similarity,
            now,
        );

        tracing::debug!(
            query_len = request.query.len(),
            mode = %SearchMode::from_chunk_type(request.chunk_type),
            considered,
            returned = results.len(),
            skipped = candidates.skipped.len(),
            "search complete"
        );

        Ok(SearchResult {
            query: request.query.clone(),
            mode: SearchMode::from_chunk_type(request.chunk_type),
            results,
            embedding_tier: Some(self.embedder.active_tier()),
            skipped_records: candidates.skipped,
        })
    }

    /// Past error resolutions.
    pub fn errors(&self, query: &str, project: &str, top_k: usize) -> Result<SearchResult> {
        self.typed(query, project, top_k, ChunkType::ErrorResolution)
    }

    pub fn tasks(&self, query: &str, project: &str, top_k: usize) -> Result<SearchResult> {
        self.typed(query, project, top_k, ChunkType::TaskOutcome)
    }

    pub fn code_changes(&self, query: &str, project: &str, top_k: usize) -> Result<SearchResult> {
        self.typed(query, project, top_k, ChunkType::CodeChange)
    }

    pub fn conversations(&self, query: &str, project: &str, top_k: usize) -> Result<SearchResult> {
        self.typed(query, project, top_k, ChunkType::Conversation)
    }

    fn typed(
        &self,
        query: &str,
        project: &str,
        top_k: usize,
        chunk_type: ChunkType,
    ) -> Result<SearchResult> {
        let request = SearchRequest::new(query, ProjectScope::project(project))
            .chunk_type(chunk_type)
            .top_k(top_k);
        self.search(&request)
    }
}
