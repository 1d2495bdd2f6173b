//! Distance metrics for vector similarity calculations.
//!
//! A [`DistanceMetric`] is computed between one in-memory query vector and one stored
//! vector addressed as raw bytes inside a [`crate::storage::MappedRegion`] -- the kernel
//! never materializes the stored vector into an owned `Vec<f32>`.

use crate::codec::ByteCodec;
use serde::{Deserialize, Serialize};

/// Distance metric used to rank stored vectors against a query vector.
///
/// Lower is always better across all three variants, matching the scoring contract of
/// [`crate::search::top_k_scored`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// `1 - cosine_similarity(q, v)`. Unaffected by vector magnitude.
    Cosine,
    /// `Σ |qᵢ - vᵢ|`. Supports early exit past a threshold.
    Manhattan,
    /// `Σ (qᵢ - vᵢ)²`. Supports early exit past a threshold.
    L2Squared,
}

impl DistanceMetric {
    /// True for metrics whose partial sum only grows as more dimensions are folded in,
    /// making early-exit against a threshold sound.
    #[must_use]
    pub const fn is_monotone(self) -> bool {
        matches!(self, Self::Manhattan | Self::L2Squared)
    }
}

/// Computes distances between an in-memory query vector and vectors addressed directly
/// inside a mapped region's byte slice.
pub struct DistanceKernel;

impl DistanceKernel {
    /// Computes the distance from `query` to the `D`-float vector stored at
    /// `stored_vector_bytes` (exactly `query.len() * 4` bytes), using `metric`.
    ///
    /// `threshold` only affects [`DistanceMetric::Manhattan`] and
    /// [`DistanceMetric::L2Squared`]: once the running sum exceeds a strictly-positive
    /// threshold, the accumulation stops early and [`f32::MAX`] is returned. A threshold
    /// of `0.0` disables early exit.
    ///
    /// # Panics
    ///
    /// Panics if `stored_vector_bytes.len() != query.len() * 4`; callers always slice
    /// the mapped region to the exact vector width before calling this.
    #[must_use]
    pub fn distance(
        query: &[f32],
        stored_vector_bytes: &[u8],
        metric: DistanceMetric,
        threshold: f32,
    ) -> f32 {
        assert_eq!(
            stored_vector_bytes.len(),
            query.len() * 4,
            "stored vector byte length must match query dimension"
        );

        match metric {
            DistanceMetric::Cosine => Self::cosine(query, stored_vector_bytes),
            DistanceMetric::Manhattan => {
                Self::monotone(query, stored_vector_bytes, threshold, |a, b| (a - b).abs())
            }
            DistanceMetric::L2Squared => {
                Self::monotone(query, stored_vector_bytes, threshold, |a, b| (a - b) * (a - b))
            }
        }
    }

    fn cosine(query: &[f32], stored: &[u8]) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_q = 0.0f32;
        let mut norm_v = 0.0f32;

        for (i, &q) in query.iter().enumerate() {
            let v = Self::read_component(stored, i);
            dot += q * v;
            norm_q += q * q;
            norm_v += v * v;
        }

        if norm_q == 0.0 || norm_v == 0.0 {
            return 1.0;
        }

        1.0 - dot / (norm_q.sqrt() * norm_v.sqrt())
    }

    fn monotone(query: &[f32], stored: &[u8], threshold: f32, term: impl Fn(f32, f32) -> f32) -> f32 {
        let mut sum = 0.0f32;
        for (i, &q) in query.iter().enumerate() {
            let v = Self::read_component(stored, i);
            sum += term(q, v);
            if threshold > 0.0 && sum > threshold {
                return f32::MAX;
            }
        }
        sum
    }

    fn read_component(stored: &[u8], index: usize) -> f32 {
        let start = index * 4;
        ByteCodec::read_f32(&stored[start..start + 4]).expect("slice is exactly 4 bytes")
    }
}
