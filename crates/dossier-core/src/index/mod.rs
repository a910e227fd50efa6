//! Vector-index abstraction.
//!
//! The [`VectorIndex`] trait covers the three operations the pipelines
//! need: upserting chunk vectors with provenance metadata, deleting a
//! document's stale vectors, and scoped top-K similarity queries against a
//! single [`Namespace`] partition. The application crate provides the REST
//! client; [`memory::InMemoryIndex`] backs tests.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Namespace, SourceType};

/// Metadata stored alongside every vector.
///
/// Duplicates the chunk's scope fields and text so retrieval never needs a
/// second lookup, plus source-specific provenance: title/url/page for
/// documents, meeting date/speaker/time-range/playback link for
/// transcripts, title/url for knowledge-base items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub chunk_id: String,
    pub document_id: String,
    pub owner_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub source_type: SourceType,
    pub text: String,
    pub chunk_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playback_url: Option<String>,
}

impl VectorMetadata {
    /// The timestamp recency scoring keys off: the meeting date when
    /// present, otherwise the chunk creation date.
    pub fn recency_timestamp(&self) -> Option<DateTime<Utc>> {
        self.meeting_date.or(self.created_at)
    }
}

/// A vector ready for upsert: id (the chunk id), embedding, metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: VectorMetadata,
}

/// A similarity-scored match returned from a namespace query.
#[derive(Debug, Clone)]
pub struct IndexMatch {
    pub id: String,
    pub score: f32,
    pub metadata: VectorMetadata,
}

/// Scoping applied to a namespace query. The owner scope is always
/// present; the client scope applies only to client-partitioned
/// namespaces; the source type pins the partition's canonical content.
#[derive(Debug, Clone)]
pub struct ScopeFilter {
    pub owner_id: String,
    pub client_id: Option<String>,
    pub source_type: Option<SourceType>,
}

/// A partitioned vector index.
///
/// Upserts are idempotent by vector id: re-upserting an id overwrites, it
/// never duplicates. Implementations batch internally; a delete batch
/// failure is logged and skipped rather than aborting the operation.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Write vectors with metadata. Returns the number durably written,
    /// which may be less than `records.len()` if batches failed.
    async fn upsert(&self, namespace: Namespace, records: &[VectorRecord]) -> Result<usize>;

    /// Remove the given vector ids from a namespace.
    async fn delete(&self, namespace: Namespace, ids: &[String]) -> Result<()>;

    /// Top-K similarity query scoped by `filter`.
    async fn query(
        &self,
        namespace: Namespace,
        vector: &[f32],
        top_k: usize,
        filter: &ScopeFilter,
    ) -> Result<Vec<IndexMatch>>;
}
