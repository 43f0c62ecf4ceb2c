//! Semantic tier: all-MiniLM-L6-v2 through ONNX Runtime.
//!
//! Tokenizes, runs the transformer, mean-pools token embeddings under the
//! attention mask, and L2-normalizes. Construction fails when the model or
//! tokenizer files are missing, which is how [`super::Embedder`] probes for
//! this tier.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::{l2_normalize, EmbeddingProvider, EmbeddingTier, EMBEDDING_DIM};
use crate::config::EmbeddingConfig;

/// all-MiniLM-L6-v2 was trained at 256 tokens.
const MAX_SEQ_LEN: usize = 256;

pub const MODEL_FILE: &str = "model.onnx";
pub const TOKENIZER_FILE: &str = "tokenizer.json";

pub struct OnnxProvider {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

impl OnnxProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let cache_dir = crate::config::expand_tilde(&config.cache_dir);
        Self::from_dir(&cache_dir)
    }

    pub fn from_dir(dir: &Path) -> Result<Self> {
        let model_path = dir.join(MODEL_FILE);
        let tokenizer_path = dir.join(TOKENIZER_FILE);

        anyhow::ensure!(
            model_path.exists(),
            "ONNX model not found at {}. Run `hindsight model download` first.",
            model_path.display()
        );
        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer not found at {}. Run `hindsight model download` first.",
            tokenizer_path.display()
        );

        let session = Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(&model_path)
            .context("failed to load ONNX model")?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to set truncation: {e}"))?;
        tokenizer.with_padding(Some(tokenizers::PaddingParams {
            strategy: tokenizers::PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        tracing::info!(model = %model_path.display(), "semantic embedding model loaded");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }
}

impl EmbeddingProvider for OnnxProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .context("model returned no embedding")
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("tokenization failed: {e}"))?;

        let batch = encodings.len();
        let seq_len = encodings.first().map(|e| e.get_ids().len()).unwrap_or(0);

        let ids: Vec<i64> = encodings
            .iter()
            .flat_map(|e| e.get_ids().iter().map(|&id| id as i64))
            .collect();
        let mask: Vec<i64> = encodings
            .iter()
            .flat_map(|e| e.get_attention_mask().iter().map(|&m| m as i64))
            .collect();
        // Single-segment input: token_type_ids are all zero.
        let type_ids = vec![0i64; batch * seq_len];

        let shape = vec![batch as i64, seq_len as i64];
        let ids_tensor = Tensor::from_array((shape.clone(), ids.into_boxed_slice()))?;
        let mask_tensor = Tensor::from_array((shape.clone(), mask.clone().into_boxed_slice()))?;
        let type_tensor = Tensor::from_array((shape, type_ids.into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("session lock poisoned: {e}"))?;

        let outputs = session.run(ort::inputs! {
            "input_ids" => ids_tensor,
            "attention_mask" => mask_tensor,
            "token_type_ids" => type_tensor,
        })?;

        // Output naming differs between exports; fall back to the first output.
        let hidden = outputs
            .get("token_embeddings")
            .or_else(|| outputs.get("last_hidden_state"))
            .unwrap_or_else(|| &outputs[0]);

        let (dims, data) = hidden
            .try_extract_tensor::<f32>()
            .context("failed to extract token embeddings")?;
        let dims: &[i64] = &dims;
        anyhow::ensure!(
            dims.len() == 3 && dims[2] == EMBEDDING_DIM as i64,
            "unexpected hidden state shape {dims:?}, expected [batch, seq, {EMBEDDING_DIM}]"
        );
        let out_seq = dims[1] as usize;

        Ok((0..batch)
            .map(|b| mean_pool(data, &mask[b * seq_len..(b + 1) * seq_len], b, out_seq))
            .collect())
    }

    fn tier(&self) -> EmbeddingTier {
        EmbeddingTier::Semantic
    }
}

/// Average the token vectors of row `b` where the attention mask is set.
fn mean_pool(data: &[f32], mask: &[i64], b: usize, out_seq: usize) -> Vec<f32> {
    let mut sum = vec![0.0f32; EMBEDDING_DIM];
    let mut count = 0.0f32;

    for (s, &m) in mask.iter().enumerate().take(out_seq) {
        if m == 0 {
            continue;
        }
        let offset = (b * out_seq + s) * EMBEDDING_DIM;
        for (acc, x) in sum.iter_mut().zip(&data[offset..offset + EMBEDDING_DIM]) {
            *acc += x;
        }
        count += 1.0;
    }

    if count > 0.0 {
        sum.iter_mut().for_each(|x| *x /= count);
    }
    l2_normalize(&sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn mean_pool_ignores_masked_tokens() {
        let mut data = vec![0.0f32; 2 * EMBEDDING_DIM];
        data[0] = 2.0;
        data[EMBEDDING_DIM + 1] = 100.0;
        let pooled = mean_pool(&data, &[1, 0], 0, 2);
        assert!((pooled[0] - 1.0).abs() < 1e-6);
        assert_eq!(pooled[1], 0.0);
    }

    #[test]
    fn missing_model_files_fail_construction() {
        let dir = tempfile::tempdir().unwrap();
        let err = OnnxProvider::from_dir(dir.path()).err().unwrap();
        assert!(err.to_string().contains("model download"));
    }

    fn test_config() -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "onnx".into(),
            ..EmbeddingConfig::default()
        }
    }

    #[test]
    #[ignore] // Requires model files. Run with: cargo test -- --ignored
    fn embed_produces_unit_vectors() {
        let provider = OnnxProvider::new(&test_config()).unwrap();
        let v = provider.embed("Hello world").unwrap();
        assert_eq!(v.len(), EMBEDDING_DIM);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    #[ignore]
    fn similar_errors_are_close() {
        let provider = OnnxProvider::new(&test_config()).unwrap();
        let a = provider.embed("JWT refresh failing").unwrap();
        let b = provider.embed("Fix: JWT refresh needs 30s timeout").unwrap();
        let c = provider.embed("CSS grid collapses in Safari").unwrap();
        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }
}
