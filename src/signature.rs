//! Page feature signatures and similarity math.
//!
//! A [`PageSignature`] is an opaque fixed-length feature vector computed by
//! an external layout-analysis stage; this crate never inspects individual
//! components. Signatures are compared only via cosine similarity and are
//! never mutated after creation.
//!
//! Also provides the BLOB encoding used to persist signatures in SQLite:
//! - [`PageSignature::to_blob`] — little-endian `f32` bytes
//! - [`PageSignature::from_blob`] — decode a stored BLOB

use anyhow::{bail, Result};

/// Upper bound on signature dimensionality. The upstream layout stage
/// emits 10 features today; the cap leaves room without admitting
/// arbitrarily large vectors into the store.
pub const MAX_SIGNATURE_DIMS: usize = 64;

/// An opaque page feature vector, immutable after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSignature {
    features: Vec<f32>,
}

impl PageSignature {
    /// Wrap a feature vector, validating dimensionality.
    pub fn new(features: Vec<f32>) -> Result<Self> {
        if features.is_empty() {
            bail!("signature must have at least one feature");
        }
        if features.len() > MAX_SIGNATURE_DIMS {
            bail!(
                "signature has {} features, max is {}",
                features.len(),
                MAX_SIGNATURE_DIMS
            );
        }
        Ok(Self { features })
    }

    pub fn features(&self) -> &[f32] {
        &self.features
    }

    pub fn dims(&self) -> usize {
        self.features.len()
    }

    /// Encode as little-endian `f32` bytes for SQLite BLOB storage.
    pub fn to_blob(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.features.len() * 4);
        for &v in &self.features {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    /// Decode a stored BLOB back into a signature.
    pub fn from_blob(blob: &[u8]) -> Result<Self> {
        let features: Vec<f32> = blob
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Self::new(features)
    }

    /// Cosine similarity to another signature.
    ///
    /// Returns a value in `[-1.0, 1.0]`; `0.0` for vectors of different
    /// lengths or degenerate (all-zero) vectors.
    pub fn similarity(&self, other: &PageSignature) -> f32 {
        cosine_similarity(&self.features, &other.features)
    }
}

/// Compute cosine similarity between two feature vectors.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_vectors() {
        assert!((cosine_similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_orthogonal_vectors() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_similar_vectors() {
        let sim = cosine_similarity(&[1.0, 1.0], &[1.1, 0.9]);
        assert!(sim > 0.99 && sim < 1.0);
    }

    #[test]
    fn test_mismatched_lengths_are_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_blob_roundtrip() {
        let sig = PageSignature::new(vec![0.1, 0.2, 0.3, 0.8, 0.9]).unwrap();
        let decoded = PageSignature::from_blob(&sig.to_blob()).unwrap();
        assert_eq!(sig, decoded);
    }

    #[test]
    fn test_empty_signature_rejected() {
        assert!(PageSignature::new(vec![]).is_err());
    }

    #[test]
    fn test_oversized_signature_rejected() {
        assert!(PageSignature::new(vec![0.1; MAX_SIGNATURE_DIMS + 1]).is_err());
    }
}
