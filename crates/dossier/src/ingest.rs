//! Ingestion pipeline orchestration.
//!
//! Takes a registered document plus its extracted raw text and drives it
//! through chunking, batched embedding, and the vector index:
//!
//! 1. Validate the request and load the document record.
//! 2. Skip unchanged content (same hash, already embedded) unless forced.
//! 3. Chunk: sliding window for documents and knowledge-base items,
//!    speaker-aware packing for transcripts.
//! 4. Delete the previous chunk set's vectors, then persist the new chunks
//!    (delete-before-insert; scoped per document).
//! 5. Embed in sequential bounded batches; failed batches are skipped.
//! 6. Upsert the surviving vectors with full provenance metadata.
//!
//! Any unrecoverable failure persists its reason on the document
//! (`status = failed`); re-submitting the ingest retries from `received`.
//! Concurrent reprocessing of the same document is not safe; callers
//! serialize per document.

use anyhow::Result;
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use dossier_core::chunk::sliding_chunks;
use dossier_core::embedding::Embedder;
use dossier_core::error::Error;
use dossier_core::index::{VectorIndex, VectorMetadata, VectorRecord};
use dossier_core::models::{Chunk, ChunkSpan, ProcessingStatus, SourceDocument, SourceType};
use dossier_core::transcript::{self, TranscriptBudget};

use crate::catalog;
use crate::config::Config;
use crate::embedding::EmbeddingBatcher;

/// Ingestion request: the document must already be registered with its
/// scope fields set; `raw_text` comes from the text-extraction collaborator.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub document_id: String,
    pub raw_text: String,
    /// Reprocess even if the content hash is unchanged.
    pub force: bool,
}

/// Outcome of an ingestion run.
#[derive(Debug, Clone)]
pub struct IngestSummary {
    pub document_id: String,
    pub chunks_created: usize,
    pub embeddings_generated: usize,
    pub status: ProcessingStatus,
}

pub async fn ingest_document(
    config: &Config,
    pool: &SqlitePool,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    request: IngestRequest,
) -> Result<IngestSummary> {
    if request.document_id.trim().is_empty() {
        return Err(Error::Validation("document_id is required".into()).into());
    }
    if request.raw_text.trim().is_empty() {
        return Err(Error::Validation("raw_text is required".into()).into());
    }

    let document = catalog::get_document(pool, &request.document_id)
        .await?
        .ok_or_else(|| {
            Error::Validation(format!("unknown document '{}'", request.document_id))
        })?;

    let content_hash = hash_text(&request.raw_text);
    if !request.force
        && document.status == ProcessingStatus::Embedded
        && document.content_hash.as_deref() == Some(content_hash.as_str())
    {
        info!(
            document_id = %document.id,
            "content unchanged and already embedded; skipping (use force to reprocess)"
        );
        return Ok(IngestSummary {
            document_id: document.id,
            chunks_created: document.chunk_count,
            embeddings_generated: 0,
            status: ProcessingStatus::Embedded,
        });
    }

    match run_pipeline(config, pool, embedder, index, &document, &request, &content_hash).await {
        Ok(summary) => Ok(summary),
        Err(e) => {
            // Persist the reason so the failure can be inspected and the
            // ingest retried later.
            if let Err(persist_err) = catalog::mark_failed(pool, &document.id, &e.to_string()).await
            {
                warn!(document_id = %document.id, error = %persist_err, "failed to persist failure reason");
            }
            Err(e)
        }
    }
}

async fn run_pipeline(
    config: &Config,
    pool: &SqlitePool,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    document: &SourceDocument,
    request: &IngestRequest,
    content_hash: &str,
) -> Result<IngestSummary> {
    let chunks = build_chunks(config, document, &request.raw_text)?;
    if chunks.is_empty() {
        return Err(Error::Validation(format!(
            "document '{}' produced no chunks",
            document.id
        ))
        .into());
    }
    info!(document_id = %document.id, chunks = chunks.len(), "chunked document");

    let namespace = document.source_type.namespace();

    // Tear down the previous content version before inserting the new one.
    // A failed delete is logged inside the index client; stale ids that
    // survive are orphans until the next reprocess.
    let stale_ids = catalog::chunk_ids(pool, &document.id).await?;
    if !stale_ids.is_empty() {
        info!(document_id = %document.id, stale = stale_ids.len(), "deleting previous vectors");
        if let Err(e) = index.delete(namespace, &stale_ids).await {
            warn!(document_id = %document.id, error = %e, "stale vector delete failed; orphans may remain");
        }
    }

    catalog::replace_chunks(pool, &document.id, &chunks).await?;
    catalog::set_status(pool, &document.id, ProcessingStatus::Chunked).await?;

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let batcher = EmbeddingBatcher::from_config(&config.embedding);
    let report = batcher.embed_all(embedder, &texts).await;
    info!(
        document_id = %document.id,
        attempted = report.attempted,
        generated = report.generated,
        "embedding complete"
    );

    if report.generated == 0 {
        return Err(Error::external("embedding service", "no embeddings generated").into());
    }

    let records: Vec<VectorRecord> = chunks
        .iter()
        .zip(&report.vectors)
        .filter_map(|(chunk, slot)| {
            slot.as_ref().map(|vector| VectorRecord {
                id: chunk.id.clone(),
                vector: vector.clone(),
                metadata: vector_metadata(document, chunk),
            })
        })
        .collect();

    let written = index.upsert(namespace, &records).await?;
    if written < records.len() {
        warn!(
            document_id = %document.id,
            written,
            submitted = records.len(),
            "some vector batches were not written"
        );
    }

    catalog::finish_ingest(
        pool,
        &document.id,
        chunks.len(),
        request.raw_text.chars().count(),
        content_hash,
    )
    .await?;

    Ok(IngestSummary {
        document_id: document.id.clone(),
        chunks_created: chunks.len(),
        embeddings_generated: written,
        status: ProcessingStatus::Embedded,
    })
}

/// Chunk raw text along the path its source type dictates.
fn build_chunks(
    config: &Config,
    document: &SourceDocument,
    raw_text: &str,
) -> dossier_core::Result<Vec<Chunk>> {
    let now = Utc::now();

    let chunk = |index: usize, text: String, span: ChunkSpan, speaker: Option<String>| Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document.id.clone(),
        index,
        text,
        span,
        source_type: document.source_type,
        owner_id: document.owner_id.clone(),
        client_id: document.client_id.clone(),
        opening_speaker: speaker,
        created_at: now,
    };

    match document.source_type {
        SourceType::Transcript => {
            let normalized = transcript::normalize_transcript(raw_text);
            let segments = transcript::parse_segments(&normalized);
            let budget = TranscriptBudget {
                token_budget: config.transcript.token_budget,
                overlap_tokens: config.transcript.overlap_tokens,
                chars_per_token: config.transcript.chars_per_token,
            };
            Ok(transcript::build_chunks(&segments, &budget)?
                .into_iter()
                .enumerate()
                .map(|(i, t)| {
                    chunk(
                        i,
                        t.text,
                        ChunkSpan::Seconds {
                            start: t.start_seconds,
                            end: t.end_seconds,
                        },
                        Some(t.opening_speaker),
                    )
                })
                .collect())
        }
        SourceType::Document | SourceType::KnowledgeBaseItem => Ok(sliding_chunks(
            raw_text,
            config.chunking.window_chars,
            config.chunking.overlap_chars,
        )?
        .into_iter()
        .enumerate()
        .map(|(i, w)| {
            chunk(
                i,
                w.text,
                ChunkSpan::Chars {
                    start: w.start,
                    end: w.end,
                },
                None,
            )
        })
        .collect()),
    }
}

/// Full provenance metadata stored alongside a chunk's vector.
fn vector_metadata(document: &SourceDocument, chunk: &Chunk) -> VectorMetadata {
    let (start_seconds, end_seconds) = match chunk.span {
        ChunkSpan::Seconds { start, end } => (Some(start), Some(end)),
        ChunkSpan::Chars { .. } => (None, None),
    };

    VectorMetadata {
        chunk_id: chunk.id.clone(),
        document_id: document.id.clone(),
        owner_id: chunk.owner_id.clone(),
        client_id: chunk.client_id.clone(),
        source_type: chunk.source_type,
        text: chunk.text.clone(),
        chunk_index: chunk.index,
        created_at: Some(chunk.created_at),
        title: document.title.clone(),
        url: document.url.clone(),
        page_number: None,
        meeting_date: match chunk.source_type {
            SourceType::Transcript => document.content_date,
            _ => None,
        },
        speaker: chunk.opening_speaker.clone(),
        start_seconds,
        end_seconds,
        playback_url: document.playback_url.clone(),
    }
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
