//! REST vector-index client.
//!
//! Implements the core [`VectorIndex`] trait against a serverless vector
//! index speaking the usual REST dialect: `POST /vectors/upsert`,
//! `POST /vectors/delete`, and `POST /query` with an `Api-Key` header and
//! `$eq` metadata filters. Batching is internal and bounded: upserts in
//! batches of 100 by default, deletes in batches of 1000.
//!
//! Failure posture follows the pipelines' recovery model: a delete batch
//! failure is logged as a warning and the remaining batches still run (the
//! ids are named in the log so operators can reconcile orphans); an upsert
//! batch failure is logged and its vectors are excluded from the written
//! count; a query failure is an error the retrieval pipeline converts into
//! an empty namespace.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use dossier_core::error::{Error, Result};
use dossier_core::index::{IndexMatch, ScopeFilter, VectorIndex, VectorMetadata, VectorRecord};
use dossier_core::models::Namespace;

use crate::config::IndexConfig;

pub struct RestVectorIndex {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    upsert_batch_size: usize,
    delete_batch_size: usize,
}

impl RestVectorIndex {
    /// Build the client from configuration.
    ///
    /// Fails with [`Error::Configuration`] before any network call when the
    /// index URL or API key is missing.
    pub fn new(config: &IndexConfig) -> Result<Self> {
        let base_url = config
            .api_url
            .clone()
            .ok_or_else(|| Error::Configuration("index.api_url is required".into()))?;
        let api_key = config.api_key.clone().ok_or_else(|| {
            Error::Configuration(format!(
                "vector index API key not set (expected in ${})",
                config.api_key_env
            ))
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::external("vector index", e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            upsert_batch_size: config.upsert_batch_size.max(1),
            delete_batch_size: config.delete_batch_size.max(1),
        })
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::external("vector index", e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::external(
                "vector index",
                format!("HTTP {status}: {body_text}"),
            ));
        }

        Ok(response)
    }
}

fn filter_json(filter: &ScopeFilter) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    map.insert(
        "owner_id".to_string(),
        serde_json::json!({ "$eq": filter.owner_id }),
    );
    if let Some(client_id) = &filter.client_id {
        map.insert("client_id".to_string(), serde_json::json!({ "$eq": client_id }));
    }
    if let Some(source_type) = filter.source_type {
        map.insert(
            "source_type".to_string(),
            serde_json::json!({ "$eq": source_type.as_str() }),
        );
    }
    serde_json::Value::Object(map)
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<WireMatch>,
}

#[derive(Deserialize)]
struct WireMatch {
    id: String,
    score: f32,
    metadata: VectorMetadata,
}

#[async_trait]
impl VectorIndex for RestVectorIndex {
    async fn upsert(&self, namespace: Namespace, records: &[VectorRecord]) -> Result<usize> {
        let mut written = 0usize;
        let mut last_err = None;

        for batch in records.chunks(self.upsert_batch_size) {
            let vectors: Vec<serde_json::Value> = batch
                .iter()
                .map(|record| {
                    serde_json::json!({
                        "id": record.id,
                        "values": record.vector,
                        "metadata": record.metadata,
                    })
                })
                .collect();

            let body = serde_json::json!({
                "vectors": vectors,
                "namespace": namespace.as_str(),
            });

            match self.post("/vectors/upsert", body).await {
                Ok(_) => written += batch.len(),
                Err(e) => {
                    warn!(
                        namespace = namespace.as_str(),
                        batch_len = batch.len(),
                        error = %e,
                        "vector upsert batch failed; its chunks will be missing from the index"
                    );
                    last_err = Some(e);
                }
            }
        }

        if written == 0 && !records.is_empty() {
            return Err(last_err
                .unwrap_or_else(|| Error::external("vector index", "no vectors written")));
        }
        Ok(written)
    }

    async fn delete(&self, namespace: Namespace, ids: &[String]) -> Result<()> {
        for batch in ids.chunks(self.delete_batch_size) {
            let body = serde_json::json!({
                "ids": batch,
                "namespace": namespace.as_str(),
            });

            // A failed delete batch must not abort the operation, but the
            // surviving ids are potential orphans and are named in the log.
            if let Err(e) = self.post("/vectors/delete", body).await {
                warn!(
                    namespace = namespace.as_str(),
                    ids = ?batch,
                    error = %e,
                    "vector delete batch failed; stale vectors may remain"
                );
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        namespace: Namespace,
        vector: &[f32],
        top_k: usize,
        filter: &ScopeFilter,
    ) -> Result<Vec<IndexMatch>> {
        let body = serde_json::json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
            "filter": filter_json(filter),
            "namespace": namespace.as_str(),
        });

        let response = self.post("/query", body).await?;
        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| Error::external("vector index", e))?;

        Ok(parsed
            .matches
            .into_iter()
            .map(|m| IndexMatch {
                id: m.id,
                score: m.score,
                metadata: m.metadata,
            })
            .collect())
    }
}
