//! Arbitrary-length text embedding over a provider-agnostic capability.
//!
//! Short texts go straight to the provider; long texts are chunked,
//! embedded chunk by chunk, and combined by length-weighted averaging.
//! The service fails closed: callers always get a vector back, never an
//! error. A zero vector of the provider's dimension means total failure;
//! an empty vector means the chunked path produced nothing usable.

use crate::chunking::{prioritize_chunks, split_text_into_chunks};
use nb_core::{EmbeddingProvider, DEFAULT_EMBEDDING_DIM};
use std::sync::Arc;
use tracing::{debug, info, warn};

const DIRECT_EMBED_LIMIT: usize = 8000;
const SHORT_TEXT_THRESHOLD: usize = 50;
const CHUNK_SIZE: usize = 5000;
const CHUNK_OVERLAP: usize = 200;
const MAX_CHUNKS: usize = 10;
const EDGE_CHUNK_WEIGHT: f32 = 1.5;

pub struct EmbeddingService {
    provider: Arc<dyn EmbeddingProvider>,
}

impl EmbeddingService {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Probe the provider's embedding dimension with a canary call.
    /// Falls back to the documented default when the provider is
    /// unreachable.
    pub async fn dimension(&self) -> usize {
        match self.provider.embed_text("dimension probe").await {
            Ok(v) if !v.is_empty() => v.len(),
            _ => {
                warn!(
                    default = DEFAULT_EMBEDDING_DIM,
                    "could not probe embedding dimension, using default"
                );
                DEFAULT_EMBEDDING_DIM
            }
        }
    }

    /// Embed `text` into a single vector. Never errors outward.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        if text.trim().is_empty() {
            warn!("embedding requested for empty text, returning zero vector");
            return vec![0.0; self.dimension().await];
        }

        // Very short texts embed poorly; pad with a synthetic context
        // sentence before calling the provider.
        let padded;
        let text = if text.trim().chars().count() < SHORT_TEXT_THRESHOLD {
            let lead: String = text.trim().chars().take(20).collect();
            padded = format!("{}\n\nThis is an article about {}.", text.trim(), lead);
            debug!(len = padded.len(), "padded short text for embedding");
            padded.as_str()
        } else {
            text
        };

        if text.chars().count() <= DIRECT_EMBED_LIMIT {
            match self.provider.embed_text(text).await {
                Ok(embedding) if !embedding.is_empty() => {
                    debug!(dim = embedding.len(), "direct embedding succeeded");
                    return embedding;
                }
                Ok(_) => warn!("provider returned an empty embedding, trying chunked path"),
                Err(e) => warn!(error = %e, "direct embedding failed, trying chunked path"),
            }
        } else {
            info!(
                len = text.chars().count(),
                "text too long for direct embedding, chunking"
            );
        }

        self.embed_chunked(text).await
    }

    /// Chunk, embed each chunk, combine by weighted average. Returns an
    /// empty vector when no chunk could be embedded.
    async fn embed_chunked(&self, text: &str) -> Vec<f32> {
        let chunks = split_text_into_chunks(text, CHUNK_SIZE, CHUNK_OVERLAP, MAX_CHUNKS);
        if chunks.is_empty() {
            warn!("no chunks produced from text");
            return Vec::new();
        }
        let chunks = prioritize_chunks(chunks, MAX_CHUNKS);
        let total = chunks.len();

        let mut embeddings = Vec::with_capacity(total);
        let mut weights = Vec::with_capacity(total);

        for (i, chunk) in chunks.iter().enumerate() {
            match self.provider.embed_text(chunk).await {
                Ok(embedding) if !embedding.is_empty() => {
                    let mut weight = chunk.chars().count() as f32;
                    // First and last chunk usually carry the lead and the
                    // conclusion; weight them up.
                    if i == 0 || i == total - 1 {
                        weight *= EDGE_CHUNK_WEIGHT;
                    }
                    embeddings.push(embedding);
                    weights.push(weight);
                    debug!(chunk = i + 1, total, "embedded chunk");
                }
                Ok(_) => warn!(chunk = i + 1, total, "empty embedding for chunk, skipping"),
                Err(e) => warn!(chunk = i + 1, total, error = %e, "chunk embedding failed, skipping"),
            }
        }

        if embeddings.is_empty() {
            warn!("no chunk embeddings succeeded");
            return Vec::new();
        }
        if embeddings.len() == 1 {
            return embeddings.pop().unwrap_or_default();
        }

        let combined = weighted_average(&embeddings, &weights);
        info!(chunks = embeddings.len(), "combined chunk embeddings");
        combined
    }
}

fn weighted_average(embeddings: &[Vec<f32>], weights: &[f32]) -> Vec<f32> {
    let dim = embeddings[0].len();
    let mut total_weight: f32 = weights.iter().sum();
    let uniform;
    let weights = if total_weight > 0.0 {
        weights
    } else {
        uniform = vec![1.0; embeddings.len()];
        total_weight = embeddings.len() as f32;
        &uniform
    };

    let mut combined = vec![0.0f32; dim];
    for (embedding, weight) in embeddings.iter().zip(weights) {
        let w = weight / total_weight;
        for (acc, value) in combined.iter_mut().zip(embedding) {
            *acc += value * w;
        }
    }

    // Normalize to unit length so chunk count does not change magnitude.
    let magnitude = combined.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in combined.iter_mut() {
            *value /= magnitude;
        }
    }
    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nb_core::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a fixed vector per call index, or fails on listed calls.
    #[derive(Debug)]
    struct ScriptedProvider {
        vectors: Vec<Vec<f32>>,
        fail_all: bool,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn cycling(vectors: Vec<Vec<f32>>) -> Self {
            Self {
                vectors,
                fail_all: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                vectors: Vec::new(),
                fail_all: true,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn embed_text(&self, _text: &str) -> Result<Vec<f32>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_all {
                return Err(nb_core::Error::Inference("scripted failure".to_string()));
            }
            Ok(self.vectors[call % self.vectors.len()].clone())
        }
    }

    #[tokio::test]
    async fn empty_text_yields_zero_vector_of_provider_dimension() {
        let provider = Arc::new(ScriptedProvider::cycling(vec![vec![0.5; 4]]));
        let service = EmbeddingService::new(provider);
        let embedding = service.embed("").await;
        assert_eq!(embedding, vec![0.0; 4]);
    }

    #[tokio::test]
    async fn empty_text_defaults_to_768_when_provider_unreachable() {
        let service = EmbeddingService::new(Arc::new(ScriptedProvider::failing()));
        let embedding = service.embed("   ").await;
        assert_eq!(embedding.len(), DEFAULT_EMBEDDING_DIM);
        assert!(embedding.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn direct_path_returns_provider_vector() {
        let provider = Arc::new(ScriptedProvider::cycling(vec![vec![1.0, 2.0, 3.0]]));
        let service = EmbeddingService::new(provider);
        let text = "a reasonably sized text that goes straight to the provider";
        assert_eq!(service.embed(text).await, vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn total_chunk_failure_returns_empty_vector() {
        let service = EmbeddingService::new(Arc::new(ScriptedProvider::failing()));
        let text = "sentence. ".repeat(1000);
        assert!(service.embed(&text).await.is_empty());
    }

    #[test]
    fn equal_weight_average_of_orthogonal_units_is_normalized_diagonal() {
        // Two orthogonal unit chunk embeddings, both carrying the 1.5x
        // edge multiplier and equal lengths: the weighted average
        // degenerates to a simple average, then unit normalization.
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        let combined = weighted_average(&[a, b], &[1.5 * 100.0, 1.5 * 100.0]);
        let expected = 1.0 / 2.0_f32.sqrt();
        assert!((combined[0] - expected).abs() < 1e-6);
        assert!((combined[1] - expected).abs() < 1e-6);
    }

    #[test]
    fn identical_chunks_average_to_the_chunk() {
        let v = vec![0.6, 0.8];
        let combined = weighted_average(&[v.clone(), v.clone()], &[150.0, 150.0]);
        assert!((combined[0] - 0.6).abs() < 1e-6);
        assert!((combined[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn zero_weights_fall_back_to_uniform() {
        let combined = weighted_average(&[vec![1.0, 0.0], vec![0.0, 1.0]], &[0.0, 0.0]);
        assert!(combined[0] > 0.0 && combined[1] > 0.0);
    }
}
