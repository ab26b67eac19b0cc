//! Text embedding providers
//!
//! The semantic scorer treats the embedding model as a black box behind
//! [`Embedder`]. Two providers ship here: a deterministic feature-hashing
//! embedder that needs no model at all, and a client for OpenAI-compatible
//! `/embeddings` endpoints (which is how sentence-transformer models such as
//! all-MiniLM-L6-v2 are usually served).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::{EmbeddingConfig, EmbeddingProvider};
use crate::similarity::normalize;

/// Embedding provider failure
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("Embedding model unavailable: {0}")]
    Unavailable(String),

    #[error("Embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed embedding response: {0}")]
    MalformedResponse(String),

    #[error("API key variable {0} is not set")]
    MissingApiKey(String),
}

/// Text to fixed-length vector
///
/// Implementations must return the same vector for identical input within a
/// run, and report failures as errors rather than empty vectors.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

impl<E: Embedder + ?Sized> Embedder for Arc<E> {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        (**self).embed(text)
    }
}

/// Build the provider selected by configuration
pub fn from_config(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, EmbedError> {
    match config.provider {
        EmbeddingProvider::Hashing => Ok(Arc::new(HashingEmbedder::new(config.dimension))),
        EmbeddingProvider::Http => Ok(Arc::new(HttpEmbedder::new(config)?)),
    }
}

/// Bag-of-words feature hashing over normalized tokens.
///
/// Each token is hashed with SHA-256; the first eight bytes pick a bucket and
/// the ninth picks the sign. Texts sharing vocabulary land close together,
/// which is enough for offline runs and tests. Text with no tokens embeds to
/// the zero vector.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in normalize(text).split_whitespace() {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }
        Ok(vector)
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible embeddings endpoint.
///
/// Uses the blocking reqwest client; construct and drop it outside of an
/// async runtime context.
pub struct HttpEmbedder {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbedError> {
        let api_key = match &config.api_key_env {
            Some(var) => Some(
                std::env::var(var).map_err(|_| EmbedError::MissingApiKey(var.clone()))?,
            ),
            None => None,
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
        })
    }
}

impl Embedder for HttpEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut request = self.client.post(&self.endpoint).json(&EmbeddingRequest {
            model: &self.model,
            input: text,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().map_err(|e| {
            if e.is_connect() {
                EmbedError::Unavailable(format!("{}: {}", self.endpoint, e))
            } else {
                EmbedError::Http(e)
            }
        })?;
        let body: EmbeddingResponse = response.error_for_status()?.json()?;

        let embedding = body
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbedError::MalformedResponse("response has no data".to_string()))?;

        if embedding.is_empty() {
            return Err(EmbedError::MalformedResponse(
                "embedding vector is empty".to_string(),
            ));
        }

        debug!(model = %self.model, dimension = embedding.len(), "embedded text");
        Ok(embedding)
    }
}
