//! Embedding-service client.
//!
//! The embedding service is an external collaborator: a batch of texts goes
//! out, an order-preserving batch of fixed-dimension, L2-normalized vectors
//! comes back. [`EmbeddingProvider`] is the seam; [`HttpEmbeddingClient`]
//! speaks the service's wire shape, and [`MockEmbeddingProvider`] gives
//! tests a deterministic stand-in.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use url::Url;

use crate::types::FathomError;

/// Dimensionality of every embedding in an index.
pub const EMBEDDING_DIM: usize = 384;

/// Batch text-to-vector capability.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds `texts` in order. Output length equals input length and every
    /// vector has the same dimensionality. An empty batch yields an empty
    /// result without touching the service.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, FathomError>;

    /// Embeds a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, FathomError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| FathomError::Embedding("service returned no vector".into()))
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
    normalize: bool,
}

/// HTTP client for the embedding service.
///
/// Posts `{"inputs": [...], "normalize": true}` and expects a float matrix
/// back, one row per input text.
#[derive(Clone)]
pub struct HttpEmbeddingClient {
    client: Client,
    endpoint: Url,
}

impl HttpEmbeddingClient {
    pub fn new(client: Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, FathomError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&EmbedRequest {
                inputs: texts,
                normalize: true,
            })
            .send()
            .await?
            .error_for_status()?;

        let vectors: Vec<Vec<f32>> = response.json().await?;
        if vectors.len() != texts.len() {
            return Err(FathomError::Embedding(format!(
                "service returned {} vectors for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|vector| vector.len() != EMBEDDING_DIM) {
            return Err(FathomError::Embedding(format!(
                "embedding dimension mismatch: expected {EMBEDDING_DIM}, got {}",
                bad.len()
            )));
        }
        Ok(vectors)
    }
}

/// Deterministic embedding provider for tests and offline runs.
///
/// Each text hashes to a one-hot unit vector, so identical texts always map
/// to identical embeddings and distinct texts almost always differ.
#[derive(Debug, Clone)]
pub struct MockEmbeddingProvider {
    dim: usize,
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self { dim: EMBEDDING_DIM }
    }

    pub fn with_dim(dim: usize) -> Self {
        Self { dim }
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, FathomError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut hasher = DefaultHasher::new();
                text.hash(&mut hasher);
                let mut vector = vec![0.0f32; self.dim];
                vector[(hasher.finish() as usize) % self.dim] = 1.0;
                vector
            })
            .collect())
    }
}
