//! Statistical tier: incrementally fitted TF-IDF, projected by signed feature
//! hashing onto [`EMBEDDING_DIM`] buckets.
//!
//! Projection is deterministic across runs: a term always lands in
//! `u64(sha256(term)[0..8]) % 384` with the sign taken from bit 0 of byte 8.
//! IDF weights depend on the fitted corpus, so scores drift slightly as more
//! text is observed; the bucket layout never changes.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use sha2::{Digest, Sha256};

use super::{l2_normalize, EmbeddingProvider, EmbeddingTier, EMBEDDING_DIM};

/// Lowercased alphanumeric runs of at least two characters.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(|t| t.to_lowercase())
        .collect()
}

#[derive(Debug, Default)]
struct Vocabulary {
    documents: u64,
    doc_freq: HashMap<String, u64>,
}

impl Vocabulary {
    fn absorb(&mut self, texts: &[&str]) {
        for text in texts {
            let unique: BTreeSet<String> = tokenize(text).into_iter().collect();
            for term in unique {
                *self.doc_freq.entry(term).or_insert(0) += 1;
            }
            self.documents += 1;
        }
    }

    fn idf(&self, term: &str) -> f32 {
        let df = self.doc_freq.get(term).copied().unwrap_or(0);
        (((1 + self.documents) as f64 / (1 + df) as f64).ln() + 1.0) as f32
    }
}

#[derive(Debug, Default)]
pub struct TfIdfProvider {
    vocab: RwLock<Vocabulary>,
}

impl TfIdfProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents observed so far.
    pub fn documents(&self) -> u64 {
        self.vocab
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .documents
    }
}

fn bucket(term: &str) -> (usize, f32) {
    let digest = Sha256::digest(term.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    let index = (u64::from_le_bytes(head) % EMBEDDING_DIM as u64) as usize;
    let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
    (index, sign)
}

impl EmbeddingProvider for TfIdfProvider {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let tokens = tokenize(text);
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        if tokens.is_empty() {
            return Ok(v);
        }

        // BTreeMap keeps the accumulation order stable between runs.
        let mut counts: BTreeMap<&str, u32> = BTreeMap::new();
        for t in &tokens {
            *counts.entry(t.as_str()).or_insert(0) += 1;
        }

        let vocab = self
            .vocab
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let len = tokens.len() as f32;
        for (term, count) in counts {
            let (index, sign) = bucket(term);
            v[index] += sign * (count as f32 / len) * vocab.idf(term);
        }

        Ok(l2_normalize(&v))
    }

    fn tier(&self) -> EmbeddingTier {
        EmbeddingTier::Statistical
    }

    fn observe(&self, texts: &[&str]) {
        self.vocab
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .absorb(texts);
    }

    fn refit(&self, texts: &[&str]) {
        let mut fresh = Vocabulary::default();
        fresh.absorb(texts);
        *self
            .vocab
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = fresh;
    }
}
