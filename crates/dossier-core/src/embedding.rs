//! Embedding provider trait and vector utilities.
//!
//! [`Embedder`] is the contract the pipelines require from an embedding
//! service: single and batched embedding with a fixed dimensionality.
//! Concrete providers (OpenAI-style, Ollama) live in the application crate;
//! tests supply deterministic stubs.

use async_trait::async_trait;

use crate::error::Result;

/// An embedding service with a fixed output dimension.
///
/// The same provider configuration must be used for stored vectors and
/// query vectors; a dimension mismatch between the two silently returns
/// zero or garbage matches, so the pipelines check every returned vector
/// against [`dims`](Embedder::dims).
#[async_trait]
pub trait Embedder: Send + Sync {
    /// The model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// The embedding vector dimensionality this deployment is pinned to.
    fn dims(&self) -> usize;

    /// Embed a single text (used for queries).
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, returning one vector per input in input
    /// order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors or vectors of
/// different lengths.
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
