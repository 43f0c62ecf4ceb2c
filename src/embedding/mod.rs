//! Text-to-vector embedding with graceful quality degradation.
//!
//! Three backends implement [`EmbeddingProvider`], ordered by quality:
//!
//! | Tier | Backend | Similar inputs → similar vectors |
//! |------|---------|----------------------------------|
//! | [`EmbeddingTier::Semantic`] | all-MiniLM-L6-v2 via ONNX Runtime | yes, by meaning |
//! | [`EmbeddingTier::Statistical`] | incrementally fitted TF-IDF, feature-hashed | yes, by shared terms |
//! | [`EmbeddingTier::Hash`] | SHA-256 expansion | no, exact matches only |
//!
//! [`Embedder`] picks the best tier once at startup and falls back one tier
//! down if the active backend ever fails. Callers never see an embedding
//! error; they can ask [`Embedder::active_tier`] what quality to expect.

pub mod codec;
pub mod hash;
pub mod onnx;
pub mod tfidf;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use hash::HashProvider;

/// Number of dimensions in every vector, whatever the backend.
pub const EMBEDDING_DIM: usize = 384;

/// Which backend produced a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingTier {
    Semantic,
    Statistical,
    Hash,
}

impl EmbeddingTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Statistical => "statistical",
            Self::Hash => "hash",
        }
    }

    /// Whether near-identical inputs land near each other. False for the hash
    /// tier, which only supports exact-match deduplication.
    pub fn supports_fuzzy_recall(&self) -> bool {
        !matches!(self, Self::Hash)
    }
}

impl std::fmt::Display for EmbeddingTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EmbeddingTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "semantic" => Ok(Self::Semantic),
            "statistical" => Ok(Self::Statistical),
            "hash" => Ok(Self::Hash),
            _ => Err(format!("unknown embedding tier: {s}")),
        }
    }
}

/// One embedding backend.
///
/// Implementations produce vectors of exactly [`EMBEDDING_DIM`] dimensions.
/// All methods are synchronous; callers in async contexts should use
/// `tokio::task::spawn_blocking`.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    /// Embed a batch. Implementations may override for batched inference.
    fn embed_batch(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }

    fn tier(&self) -> EmbeddingTier;

    /// Feed newly stored texts into any fitted state the backend keeps.
    fn observe(&self, _texts: &[&str]) {}

    /// Discard fitted state and fit again over exactly `texts`.
    fn refit(&self, _texts: &[&str]) {}
}

impl<T: EmbeddingProvider + ?Sized> EmbeddingProvider for Arc<T> {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        (**self).embed(text)
    }

    fn embed_batch(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts)
    }

    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    fn tier(&self) -> EmbeddingTier {
        (**self).tier()
    }

    fn observe(&self, texts: &[&str]) {
        (**self).observe(texts)
    }

    fn refit(&self, texts: &[&str]) {
        (**self).refit(texts)
    }
}

/// Tiered front over the available backends.
///
/// `tiers` is ordered best-first; the deterministic hash tier always sits
/// behind them so [`Embedder::embed`] cannot fail.
pub struct Embedder {
    tiers: Vec<Box<dyn EmbeddingProvider>>,
    active: AtomicUsize,
    fallback: HashProvider,
}

impl Embedder {
    pub fn new(tiers: Vec<Box<dyn EmbeddingProvider>>) -> Self {
        Self {
            tiers,
            active: AtomicUsize::new(0),
            fallback: HashProvider,
        }
    }

    /// Only the hash tier. Useful when exact-match dedup is all that's needed.
    pub fn hash_only() -> Self {
        Self::new(Vec::new())
    }

    /// Probe backends in preference order according to `config.provider`
    /// (`auto`, `onnx`, `tfidf`, `hash`).
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        let mut tiers: Vec<Box<dyn EmbeddingProvider>> = Vec::new();

        let want_onnx = match config.provider.as_str() {
            "auto" | "onnx" => true,
            "tfidf" | "hash" => false,
            other => {
                tracing::warn!(provider = other, "unknown embedding provider, probing all tiers");
                true
            }
        };

        if want_onnx {
            match onnx::OnnxProvider::new(config) {
                Ok(provider) => tiers.push(Box::new(provider)),
                Err(e) => tracing::warn!(
                    error = %format!("{e:#}"),
                    "semantic embedding tier unavailable, falling back to statistical tier"
                ),
            }
        }
        if config.provider != "hash" {
            tiers.push(Box::new(tfidf::TfIdfProvider::new()));
        }

        let embedder = Self::new(tiers);
        tracing::info!(tier = %embedder.active_tier(), "embedding tier selected");
        embedder
    }

    pub fn active_tier(&self) -> EmbeddingTier {
        self.tiers
            .get(self.active.load(Ordering::Acquire))
            .map(|t| t.tier())
            .unwrap_or(EmbeddingTier::Hash)
    }

    pub fn supports_fuzzy_recall(&self) -> bool {
        self.active_tier().supports_fuzzy_recall()
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        loop {
            let idx = self.active.load(Ordering::Acquire);
            let Some(tier) = self.tiers.get(idx) else {
                return self.fallback.vector(text);
            };
            match tier.embed(text).and_then(check_dimensions) {
                Ok(v) => return v,
                Err(e) => self.demote(idx, &e),
            }
        }
    }

    pub fn embed_batch(&self, texts: &[&str]) -> Vec<Vec<f32>> {
        if texts.is_empty() {
            return Vec::new();
        }
        loop {
            let idx = self.active.load(Ordering::Acquire);
            let Some(tier) = self.tiers.get(idx) else {
                return texts.iter().map(|t| self.fallback.vector(t)).collect();
            };
            let batch = tier.embed_batch(texts).and_then(|vs| {
                anyhow::ensure!(
                    vs.len() == texts.len(),
                    "backend returned {} vectors for {} texts",
                    vs.len(),
                    texts.len()
                );
                vs.into_iter().map(check_dimensions).collect()
            });
            match batch {
                Ok(vs) => return vs,
                Err(e) => self.demote(idx, &e),
            }
        }
    }

    /// Let fitted tiers learn from newly stored `texts`.
    pub fn observe(&self, texts: &[&str]) {
        for tier in &self.tiers {
            tier.observe(texts);
        }
    }

    /// Rebuild fitted tiers over exactly the stored `texts`.
    pub fn refit(&self, texts: &[&str]) {
        for tier in &self.tiers {
            tier.refit(texts);
        }
    }

    /// Move past a failing tier. Only the thread that wins the transition
    /// logs, so each demotion warns exactly once.
    fn demote(&self, from: usize, err: &anyhow::Error) {
        if self
            .active
            .compare_exchange(from, from + 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let next = self
                .tiers
                .get(from + 1)
                .map(|t| t.tier())
                .unwrap_or(EmbeddingTier::Hash);
            tracing::warn!(
                failed = %self.tiers[from].tier(),
                next = %next,
                error = %format!("{err:#}"),
                "embedding tier failed, degrading"
            );
        }
    }
}

fn check_dimensions(v: Vec<f32>) -> anyhow::Result<Vec<f32>> {
    anyhow::ensure!(
        v.len() == EMBEDDING_DIM,
        "expected {EMBEDDING_DIM} dimensions, got {}",
        v.len()
    );
    Ok(v)
}

/// L2-normalize a vector. Returns the input unchanged if its norm is zero.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

/// Cosine similarity in `[-1, 1]`; 0.0 for zero vectors or mismatched lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}
