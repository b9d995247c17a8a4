//! Similarity primitives and the embedding byte codec.
//!
//! Kept dependency-free beyond `sha2`/`hex` for the content hash: cosine
//! similarity and the float codec are simple enough that pulling in a
//! vector-math crate would just be indirection.

use sha2::{Digest, Sha256};

use crate::error::Error;

/// Cosine similarity between two equal-length f32 vectors, in `[-1, 1]`.
///
/// Accumulates in f64 for numerical stability on very small magnitudes,
/// then narrows to f32 on return. Zero-norm vectors (either side) score 0
/// rather than NaN.
pub fn cosine(a: &[f32], b: &[f32]) -> Result<f32, Error> {
    if a.len() != b.len() {
        return Err(Error::DimensionMismatch {
            a: a.len(),
            b: b.len(),
        });
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let x = x as f64;
        let y = y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    let score = dot / (norm_a.sqrt() * norm_b.sqrt());
    // Guard against tiny float overshoot past the mathematical [-1, 1] range.
    Ok(score.clamp(-1.0, 1.0) as f32)
}

/// Little-endian, 4 bytes per f32 element. `encode(&[]) == []`.
pub fn encode(v: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len() * 4);
    for x in v {
        out.extend_from_slice(&x.to_le_bytes());
    }
    out
}

/// Inverse of [`encode`]. `decode(&[]) == []`.
///
/// Trailing bytes that don't make up a full 4-byte element are ignored;
/// well-formed input never produces any.
pub fn decode(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// SHA-256 over `title || "\n\n" || body`, hex-encoded lowercase.
pub fn content_hash(title: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"\n\n");
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize())
}
