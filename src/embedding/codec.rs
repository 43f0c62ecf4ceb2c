//! Fixed-size binary encoding for stored vectors.
//!
//! A vector is exactly [`EMBEDDING_DIM`] little-endian IEEE-754 `f32`s with no
//! header, length prefix, or version tag. Any blob of a different size is
//! rejected rather than reinterpreted.

use super::EMBEDDING_DIM;
use crate::error::{KnowledgeError, Result};

/// Size in bytes of an encoded vector.
pub const EMBEDDING_BYTES: usize = EMBEDDING_DIM * std::mem::size_of::<f32>();

/// Encode a vector. Fails on wrong length or non-finite components.
pub fn encode(vector: &[f32]) -> Result<Vec<u8>> {
    if vector.len() != EMBEDDING_DIM {
        return Err(KnowledgeError::EncodingMismatch(format!(
            "expected {EMBEDDING_DIM} dimensions, got {}",
            vector.len()
        )));
    }
    check_finite(vector)?;

    let mut bytes = Vec::with_capacity(EMBEDDING_BYTES);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    Ok(bytes)
}

/// Decode a blob produced by [`encode`]. The same checks apply on the way
/// out, so a row written by anything else cannot smuggle in NaN or infinity.
pub fn decode(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() != EMBEDDING_BYTES {
        return Err(KnowledgeError::EncodingMismatch(format!(
            "expected {EMBEDDING_BYTES} bytes, got {}",
            blob.len()
        )));
    }
    let vector: Vec<f32> = blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    check_finite(&vector)?;
    Ok(vector)
}

fn check_finite(vector: &[f32]) -> Result<()> {
    match vector.iter().position(|v| !v.is_finite()) {
        Some(pos) => Err(KnowledgeError::EncodingMismatch(format!(
            "component {pos} is {}",
            vector[pos]
        ))),
        None => Ok(()),
    }
}
