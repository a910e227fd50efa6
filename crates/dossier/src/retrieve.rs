//! Retrieval pipeline orchestration.
//!
//! Embeds the incoming question with the same provider configuration used
//! at ingestion, fans the query out across the selected namespaces
//! concurrently (each with its own timeout), merges and re-ranks every
//! returned chunk, and assembles the capped, source-grouped context bundle
//! for the answer-generation consumer.
//!
//! A failed or timed-out namespace contributes zero matches and is logged;
//! retrieval still returns results merged from the remaining namespaces.

use anyhow::Result;
use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, warn};

use dossier_core::bundle::{self, BundleBreakdown, ContextBundle};
use dossier_core::embedding::Embedder;
use dossier_core::error::Error;
use dossier_core::index::{ScopeFilter, VectorIndex};
use dossier_core::intent;
use dossier_core::models::Namespace;
use dossier_core::rank::{rerank, RankWeights, RetrievedChunk};

use crate::config::Config;

/// Caller overrides for the per-namespace top-K defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopKOverrides {
    pub meetings: Option<usize>,
    pub documents: Option<usize>,
    pub knowledge_base: Option<usize>,
}

impl TopKOverrides {
    fn get(&self, namespace: Namespace) -> Option<usize> {
        match namespace {
            Namespace::Meetings => self.meetings,
            Namespace::Documents => self.documents,
            Namespace::KnowledgeBase => self.knowledge_base,
        }
    }
}

/// Retrieval request. An empty `source_filters` means all namespaces.
#[derive(Debug, Clone, Default)]
pub struct RetrievalRequest {
    pub query: String,
    /// Client/entity scope for the client-partitioned namespaces.
    pub scope_id: String,
    pub source_filters: Vec<Namespace>,
    pub top_k: TopKOverrides,
}

/// Observability counters returned with every bundle.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalMetadata {
    pub total_chunks_retrieved: usize,
    pub top_chunks_selected: usize,
    pub breakdown: BundleBreakdown,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResponse {
    pub query: String,
    pub scope_id: String,
    pub context: ContextBundle,
    pub metadata: RetrievalMetadata,
}

pub async fn retrieve(
    config: &Config,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    request: RetrievalRequest,
) -> Result<RetrievalResponse> {
    if request.query.trim().is_empty() {
        return Err(Error::Validation("query is required".into()).into());
    }
    if request.scope_id.trim().is_empty() {
        return Err(Error::Validation("scope_id is required".into()).into());
    }

    let query_vector = embedder.embed(&request.query).await?;
    if query_vector.len() != embedder.dims() {
        return Err(Error::DataIntegrity(format!(
            "query embedding dimension {} does not match the configured {}",
            query_vector.len(),
            embedder.dims()
        ))
        .into());
    }

    let namespaces: Vec<Namespace> = if request.source_filters.is_empty() {
        Namespace::ALL.to_vec()
    } else {
        request.source_filters.clone()
    };

    let per_namespace_timeout = std::time::Duration::from_secs(config.retrieval.namespace_timeout_secs);
    let query_vector_ref = &query_vector;

    // Namespace queries have no ordering dependency; run them concurrently,
    // each behind its own timeout so one slow partition cannot block the
    // others.
    let queries = namespaces.iter().map(|&namespace| {
        let top_k = request
            .top_k
            .get(namespace)
            .unwrap_or_else(|| config.retrieval.top_k(namespace));
        let filter = ScopeFilter {
            owner_id: config.scope.owner_id.clone(),
            client_id: namespace.client_scoped().then(|| request.scope_id.clone()),
            source_type: Some(namespace.source_type()),
        };

        async move {
            match timeout(
                per_namespace_timeout,
                index.query(namespace, query_vector_ref, top_k, &filter),
            )
            .await
            {
                Ok(Ok(matches)) => {
                    debug!(namespace = namespace.as_str(), matches = matches.len(), "namespace query done");
                    matches
                }
                Ok(Err(e)) => {
                    warn!(namespace = namespace.as_str(), error = %e, "namespace query failed; treating as empty");
                    Vec::new()
                }
                Err(_) => {
                    warn!(namespace = namespace.as_str(), "namespace query timed out; treating as empty");
                    Vec::new()
                }
            }
        }
    });

    let retrieved: Vec<RetrievedChunk> = join_all(queries)
        .await
        .into_iter()
        .flatten()
        .map(RetrievedChunk::from)
        .collect();
    let total_chunks_retrieved = retrieved.len();

    let query_intent = intent::classify(&request.query);
    debug!(?query_intent, total_chunks_retrieved, "re-ranking");

    let ranked = rerank(retrieved, query_intent, &RankWeights::default(), Utc::now());
    let context = bundle::assemble(ranked, config.retrieval.bundle_cap);

    let metadata = RetrievalMetadata {
        total_chunks_retrieved,
        top_chunks_selected: context.total(),
        breakdown: context.breakdown(),
    };

    Ok(RetrievalResponse {
        query: request.query,
        scope_id: request.scope_id,
        context,
        metadata,
    })
}
