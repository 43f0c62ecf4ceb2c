//! Deterministic hash tier.
//!
//! Expands SHA-256 in counter mode into a fixed-length pseudo-vector. Equal
//! inputs give equal vectors; similar inputs give unrelated ones.

use sha2::{Digest, Sha256};

use super::{l2_normalize, EmbeddingProvider, EmbeddingTier, EMBEDDING_DIM};

/// Only this many leading characters feed the hash.
const HASHED_PREFIX_CHARS: usize = 500;

/// 32-byte digest → eight 4-byte words per block.
const WORDS_PER_BLOCK: usize = 8;

#[derive(Debug, Default, Clone, Copy)]
pub struct HashProvider;

impl HashProvider {
    /// The infallible form of [`EmbeddingProvider::embed`].
    pub fn vector(&self, text: &str) -> Vec<f32> {
        let prefix: String = text.chars().take(HASHED_PREFIX_CHARS).collect();
        let blocks = EMBEDDING_DIM.div_ceil(WORDS_PER_BLOCK);

        let mut raw = Vec::with_capacity(EMBEDDING_DIM);
        for block in 0..blocks as u32 {
            let mut hasher = Sha256::new();
            hasher.update(prefix.as_bytes());
            hasher.update(block.to_le_bytes());
            let digest = hasher.finalize();
            for word in digest.chunks_exact(4) {
                let n = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
                raw.push((n as f64 / u32::MAX as f64 * 2.0 - 1.0) as f32);
            }
        }
        raw.truncate(EMBEDDING_DIM);
        l2_normalize(&raw)
    }
}

impl EmbeddingProvider for HashProvider {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(self.vector(text))
    }

    fn tier(&self) -> EmbeddingTier {
        EmbeddingTier::Hash
    }
}
