#![allow(dead_code)]

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use hindsight::config::HindsightConfig;
use hindsight::embedding::{Embedder, EmbeddingProvider, EmbeddingTier, EMBEDDING_DIM};
use hindsight::knowledge::{ChunkStore, ChunkType, DomainTag, KnowledgeBase, KnowledgeChunk};

/// Axis reserved for text the fixture provider has no vector for.
pub const UNKNOWN_AXIS: usize = EMBEDDING_DIM - 1;

/// A deterministic 384-dim unit vector along `axis`.
pub fn unit(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[axis % EMBEDDING_DIM] = 1.0;
    v
}

/// A unit vector whose cosine similarity to `unit(0)` is `similarity`.
/// `axis` picks the orthogonal component so distinct calls stay distinct.
pub fn vector_with_similarity(similarity: f32, axis: usize) -> Vec<f32> {
    assert!(axis != 0 && axis != UNKNOWN_AXIS);
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[0] = similarity;
    v[axis] = (1.0 - similarity * similarity).sqrt();
    v
}

/// Maps exact texts to chosen vectors, so tests control similarity.
#[derive(Default)]
pub struct FixtureProvider {
    vectors: HashMap<String, Vec<f32>>,
}

impl FixtureProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }
}

impl EmbeddingProvider for FixtureProvider {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| unit(UNKNOWN_AXIS)))
    }

    fn tier(&self) -> EmbeddingTier {
        EmbeddingTier::Semantic
    }
}

pub fn memory_store() -> ChunkStore {
    ChunkStore::open_in_memory().unwrap()
}

/// In-memory knowledge base embedding through `provider`.
pub fn fixture_kb(provider: FixtureProvider) -> KnowledgeBase {
    KnowledgeBase::from_parts(
        memory_store(),
        Embedder::new(vec![Box::new(provider)]),
        &HindsightConfig::default(),
    )
    .unwrap()
}

pub fn chunk(
    source_id: &str,
    chunk_type: ChunkType,
    project: &str,
    embedding: Vec<f32>,
    created_at: DateTime<Utc>,
) -> KnowledgeChunk {
    KnowledgeChunk {
        source_id: source_id.to_string(),
        chunk_type,
        content: format!("content of {source_id}"),
        project: project.to_string(),
        domain_tag: DomainTag::General,
        metadata: serde_json::json!({}),
        embedding,
        created_at,
    }
}

pub fn days_ago(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    now - Duration::days(days)
}
