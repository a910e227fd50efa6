//! Embedding providers and the batched ingestion embedder.
//!
//! Two HTTP providers implement the core [`Embedder`] trait:
//!
//! - **[`OpenAiEmbedder`]**: OpenAI-compatible `POST /v1/embeddings` with
//!   batching, retry, and backoff.
//! - **[`OllamaEmbedder`]**: a local Ollama instance's `/api/embed`.
//!
//! Retry strategy for both: HTTP 429 and 5xx retry with exponential backoff
//! (1s, 2s, 4s, ... capped at 2^5); other 4xx fail immediately; network
//! errors retry.
//!
//! [`EmbeddingBatcher`] drives ingestion embedding: sequential bounded
//! batches with an inter-batch delay to bound load on the service. A batch
//! failure is logged and its chunks are skipped; partial success is
//! acceptable and visible in the report.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use dossier_core::embedding::Embedder;
use dossier_core::error::{Error, Result};

use crate::config::EmbeddingConfig;

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1/embeddings";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Create the configured [`Embedder`].
///
/// Fails with [`Error::Configuration`] before any network call when the
/// provider cannot be constructed (missing model, dims, or API key).
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        other => Err(Error::Configuration(format!(
            "unknown embedding provider '{other}'"
        ))),
    }
}

fn require_model(config: &EmbeddingConfig) -> Result<String> {
    config
        .model
        .clone()
        .ok_or_else(|| Error::Configuration("embedding.model is required".into()))
}

fn require_dims(config: &EmbeddingConfig) -> Result<usize> {
    match config.dims {
        Some(dims) if dims > 0 => Ok(dims),
        _ => Err(Error::Configuration("embedding.dims must be > 0".into())),
    }
}

fn http_client(config: &EmbeddingConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| Error::external("embedding service", e))
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(5))
}

/// OpenAI-compatible embedding provider.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = require_model(config)?;
        let dims = require_dims(config)?;
        let api_key = config.api_key.clone().ok_or_else(|| {
            Error::Configuration(format!(
                "embedding API key not set (expected in ${})",
                config.api_key_env
            ))
        })?;

        Ok(Self {
            client: http_client(config)?,
            url: config
                .api_url
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_URL.to_string()),
            api_key,
            model,
            dims,
            max_retries: config.max_retries,
        })
    }
}

#[derive(Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiRow>,
}

#[derive(Deserialize)]
struct OpenAiRow {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::external("embedding service", "empty embedding response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
            "dimensions": self.dims,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let resp = self
                .client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let parsed: OpenAiResponse = response
                            .json()
                            .await
                            .map_err(|e| Error::external("embedding service", e))?;
                        return order_rows(parsed, texts.len());
                    }

                    // Rate limited or server error: retry.
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(Error::external(
                            "embedding service",
                            format!("HTTP {status}: {body_text}"),
                        ));
                        continue;
                    }

                    // Other client errors are not retryable.
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(Error::external(
                        "embedding service",
                        format!("HTTP {status}: {body_text}"),
                    ));
                }
                Err(e) => {
                    last_err = Some(Error::external("embedding service", e));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::external("embedding service", "embedding failed after retries")))
    }
}

/// Reassemble response rows in input order, using the explicit index field
/// rather than trusting response ordering.
fn order_rows(response: OpenAiResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    if response.data.len() != expected {
        return Err(Error::DataIntegrity(format!(
            "embedding count mismatch: sent {expected} texts, received {}",
            response.data.len()
        )));
    }

    let mut rows = response.data;
    rows.sort_by_key(|row| row.index);
    Ok(rows.into_iter().map(|row| row.embedding).collect())
}

/// Local Ollama embedding provider.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = require_model(config)?;
        let dims = require_dims(config)?;

        Ok(Self {
            client: http_client(config)?,
            url: config
                .api_url
                .clone()
                .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string()),
            model,
            dims,
            max_retries: config.max_retries,
        })
    }
}

#[derive(Deserialize)]
struct OllamaResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::external("embedding service", "empty embedding response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let endpoint = format!("{}/api/embed", self.url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let resp = self.client.post(&endpoint).json(&body).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let parsed: OllamaResponse = response
                            .json()
                            .await
                            .map_err(|e| Error::external("embedding service", e))?;
                        if parsed.embeddings.len() != texts.len() {
                            return Err(Error::DataIntegrity(format!(
                                "embedding count mismatch: sent {} texts, received {}",
                                texts.len(),
                                parsed.embeddings.len()
                            )));
                        }
                        return Ok(parsed.embeddings);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(Error::external(
                            "embedding service",
                            format!("HTTP {status}: {body_text}"),
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(Error::external(
                        "embedding service",
                        format!("HTTP {status}: {body_text}"),
                    ));
                }
                Err(e) => {
                    last_err = Some(Error::external(
                        "embedding service",
                        format!("connection error (is Ollama running at {}?): {e}", self.url),
                    ));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::external("embedding service", "embedding failed after retries")))
    }
}

/// Outcome of embedding an ordered chunk list: one slot per chunk, `None`
/// where the chunk's batch failed or its vector had the wrong dimension.
#[derive(Debug)]
pub struct BatchReport {
    pub vectors: Vec<Option<Vec<f32>>>,
    pub attempted: usize,
    pub generated: usize,
}

/// Sequential, delayed batch loop over an [`Embedder`].
pub struct EmbeddingBatcher {
    batch_size: usize,
    delay: Duration,
}

impl EmbeddingBatcher {
    pub fn new(batch_size: usize, delay: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            delay,
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self::new(config.batch_size, Duration::from_millis(config.batch_delay_ms))
    }

    /// Embed `texts` in bounded batches, preserving order and identity.
    ///
    /// Batch failures are logged and skipped; every returned vector is
    /// checked against the provider's fixed dimension, and mismatches are
    /// logged as data-integrity errors and dropped.
    pub async fn embed_all(&self, embedder: &dyn Embedder, texts: &[String]) -> BatchReport {
        let expected_dims = embedder.dims();
        let mut vectors: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut generated = 0usize;
        let batch_count = texts.len().div_ceil(self.batch_size);

        for (batch_no, batch) in texts.chunks(self.batch_size).enumerate() {
            match embedder.embed_batch(batch).await {
                Ok(batch_vectors) if batch_vectors.len() != batch.len() => {
                    warn!(
                        batch = batch_no,
                        sent = batch.len(),
                        received = batch_vectors.len(),
                        "embedding batch returned wrong vector count; skipping batch"
                    );
                    vectors.extend(std::iter::repeat_with(|| None).take(batch.len()));
                }
                Ok(batch_vectors) => {
                    for vector in batch_vectors {
                        if vector.len() == expected_dims {
                            generated += 1;
                            vectors.push(Some(vector));
                        } else {
                            warn!(
                                got = vector.len(),
                                expected = expected_dims,
                                "embedding dimension mismatch; dropping vector"
                            );
                            vectors.push(None);
                        }
                    }
                }
                Err(e) => {
                    warn!(batch = batch_no, error = %e, "embedding batch failed; skipping its chunks");
                    vectors.extend(std::iter::repeat_with(|| None).take(batch.len()));
                }
            }

            if batch_no + 1 < batch_count && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }

        BatchReport {
            attempted: texts.len(),
            generated,
            vectors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Embedder that fails any batch containing the marker text and returns
    /// a wrong-dimension vector for another marker.
    struct MarkerEmbedder;

    #[async_trait]
    impl Embedder for MarkerEmbedder {
        fn model_name(&self) -> &str {
            "marker"
        }

        fn dims(&self) -> usize {
            3
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut v = self.embed_batch(&[text.to_string()]).await?;
            Ok(v.pop().unwrap())
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if texts.iter().any(|t| t.contains("FAIL")) {
                return Err(Error::external("embedding service", "simulated outage"));
            }
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("SHORT") {
                        vec![1.0]
                    } else {
                        vec![t.len() as f32, 1.0, 0.0]
                    }
                })
                .collect())
        }
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn all_batches_succeed() {
        let batcher = EmbeddingBatcher::new(2, Duration::ZERO);
        let report = batcher
            .embed_all(&MarkerEmbedder, &texts(&["one", "two", "three"]))
            .await;
        assert_eq!(report.attempted, 3);
        assert_eq!(report.generated, 3);
        assert!(report.vectors.iter().all(Option::is_some));
    }

    #[tokio::test]
    async fn failed_batch_is_skipped_not_fatal() {
        let batcher = EmbeddingBatcher::new(1, Duration::ZERO);
        let report = batcher
            .embed_all(&MarkerEmbedder, &texts(&["one", "FAIL here", "three"]))
            .await;
        assert_eq!(report.attempted, 3);
        assert_eq!(report.generated, 2);
        assert!(report.vectors[0].is_some());
        assert!(report.vectors[1].is_none());
        assert!(report.vectors[2].is_some());
    }

    #[tokio::test]
    async fn wrong_dimension_vector_is_dropped() {
        let batcher = EmbeddingBatcher::new(10, Duration::ZERO);
        let report = batcher.embed_all(&MarkerEmbedder, &texts(&["ok", "SHORT"])).await;
        assert_eq!(report.generated, 1);
        assert!(report.vectors[0].is_some());
        assert!(report.vectors[1].is_none());
    }

    #[tokio::test]
    async fn order_is_preserved_across_batches() {
        let batcher = EmbeddingBatcher::new(2, Duration::ZERO);
        let input = texts(&["a", "bb", "ccc", "dddd", "eeeee"]);
        let report = batcher.embed_all(&MarkerEmbedder, &input).await;
        for (text, slot) in input.iter().zip(&report.vectors) {
            assert_eq!(slot.as_ref().unwrap()[0], text.len() as f32);
        }
    }

    #[test]
    fn rows_reorder_by_index() {
        let response = OpenAiResponse {
            data: vec![
                OpenAiRow { index: 1, embedding: vec![2.0] },
                OpenAiRow { index: 0, embedding: vec![1.0] },
            ],
        };
        let ordered = order_rows(response, 2).unwrap();
        assert_eq!(ordered, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn row_count_mismatch_is_integrity_error() {
        let response = OpenAiResponse {
            data: vec![OpenAiRow { index: 0, embedding: vec![1.0] }],
        };
        assert!(matches!(order_rows(response, 2), Err(Error::DataIntegrity(_))));
    }

    #[test]
    fn provider_construction_requires_credentials() {
        let config = EmbeddingConfig {
            model: Some("text-embedding-3-small".to_string()),
            dims: Some(512),
            api_key: None,
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            OpenAiEmbedder::new(&config),
            Err(Error::Configuration(_))
        ));
        // Ollama needs no key.
        assert!(OllamaEmbedder::new(&config).is_ok());
    }
}
