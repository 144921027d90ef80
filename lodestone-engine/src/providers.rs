//! Embedding providers.
//!
//! The engine consumes embeddings through the [`Embedder`] trait. The
//! production implementation talks to an OpenAI-compatible embeddings
//! endpoint; the mock produces deterministic unit vectors from a text
//! hash so tests never touch the network.

use async_trait::async_trait;
use lodestone_core::{EmbeddingConfig, Error, Result};
use lodestone_index::math;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Trait for embedding providers.
///
/// Implementations must be safe for concurrent calls: the embedding
/// client is process-wide and is always invoked outside library locks.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate a unit-norm embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Model identifier, used as the embedding cache key component.
    fn model(&self) -> &str;

    /// Expected dimension, when the provider knows it up front.
    fn dimension_hint(&self) -> Option<usize>;
}

/// Build the provider named in the configuration.
pub fn embedder_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.to_lowercase().as_str() {
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config.clone())?)),
        "mock" => Ok(Arc::new(MockEmbedder::new(config.dimension.unwrap_or(384)))),
        other => Err(Error::config(format!("unknown embedding provider: {other}"))),
    }
}

/// OpenAI-compatible embedding provider.
#[derive(Debug)]
pub struct OpenAiEmbedder {
    client: Client,
    config: EmbeddingConfig,
}

#[derive(Serialize)]
struct EmbeddingRequest {
    input: Vec<String>,
    model: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            Error::config("embedding API key not configured; set OPENAI_API_KEY")
        })?;

        let mut headers = reqwest::header::HeaderMap::new();
        let auth_header = format!("Bearer {api_key}")
            .parse()
            .map_err(|e| Error::config(format!("invalid authorization header: {e}")))?;
        headers.insert("Authorization", auth_header);

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::config(format!("failed to build http client: {e}")))?;

        info!(model = %config.model, "initialized OpenAI embedding provider");
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let texts = [text.to_string()];
        let embeddings = self.embed_batch(&texts).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::embedding("provider returned no embedding"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        debug!(count = texts.len(), "requesting embeddings");

        let request = EmbeddingRequest {
            input: texts.to_vec(),
            model: self.config.model.clone(),
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::embedding(format!("embedding request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::embedding(format!(
                "embedding API error {status}: {body}"
            )));
        }

        let response: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::embedding(format!("malformed embedding response: {e}")))?;

        if response.data.len() != texts.len() {
            return Err(Error::embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.data.len()
            )));
        }

        response
            .data
            .into_iter()
            .map(|row| {
                let mut v = row.embedding;
                math::normalize(&mut v)?;
                Ok(v)
            })
            .collect()
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn dimension_hint(&self) -> Option<usize> {
        self.config.dimension.or(match self.config.model.as_str() {
            "text-embedding-3-small" => Some(1536),
            "text-embedding-3-large" => Some(3072),
            _ => None,
        })
    }
}

/// Deterministic mock provider for tests and offline use.
///
/// The vector is seeded from a hash of the text, so equal texts map to
/// equal embeddings and distinct texts scatter across the unit sphere.
/// The dimension can be switched at runtime to exercise
/// dimension-mismatch handling.
pub struct MockEmbedder {
    dimension: AtomicUsize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: AtomicUsize::new(dimension.max(1)),
        }
    }

    /// Change the dimension of subsequently produced vectors.
    pub fn set_dimension(&self, dimension: usize) {
        self.dimension.store(dimension.max(1), Ordering::SeqCst);
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        text.hash(&mut hasher);
        let mut rng = StdRng::seed_from_u64(hasher.finish());
        let dimension = self.dimension.load(Ordering::SeqCst);
        let mut v: Vec<f32> = (0..dimension).map(|_| rng.random::<f32>() - 0.5).collect();
        if math::normalize(&mut v).is_err() {
            // Astronomically unlikely all-zero draw; fall back to a basis vector.
            v = vec![0.0; dimension];
            v[0] = 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector_for(text))
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn dimension_hint(&self) -> Option<usize> {
        Some(self.dimension.load(Ordering::SeqCst))
    }
}
