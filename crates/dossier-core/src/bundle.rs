//! Context bundle assembly.
//!
//! Truncates the merged ranked list to a global cap, then partitions the
//! survivors by source type into named groups, each item carrying its
//! group-specific provenance. Because the cap is global, a low-scoring
//! namespace can be excluded from the bundle entirely; that is intended
//! behavior, not a defect.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::SourceType;
use crate::rank::ScoredChunk;

/// Default global cap on bundled chunks.
pub const DEFAULT_BUNDLE_CAP: usize = 20;

/// A bundled transcript chunk with meeting provenance.
#[derive(Debug, Clone, Serialize)]
pub struct MeetingContext {
    pub chunk_id: String,
    pub text: String,
    pub similarity_score: f64,
    pub final_score: f64,
    pub recording_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playback_url: Option<String>,
}

/// A bundled document chunk with document provenance.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentContext {
    pub chunk_id: String,
    pub text: String,
    pub similarity_score: f64,
    pub final_score: f64,
    pub document_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    pub chunk_index: usize,
}

/// A bundled knowledge-base chunk with item provenance.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeBaseContext {
    pub chunk_id: String,
    pub text: String,
    pub similarity_score: f64,
    pub final_score: f64,
    pub item_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub chunk_index: usize,
}

/// The structured, source-grouped context handed to the answer-generation
/// consumer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextBundle {
    pub meetings: Vec<MeetingContext>,
    pub documents: Vec<DocumentContext>,
    pub knowledge_base: Vec<KnowledgeBaseContext>,
}

/// Per-group counts, reported for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BundleBreakdown {
    pub meetings: usize,
    pub documents: usize,
    pub knowledge_base: usize,
}

impl ContextBundle {
    pub fn breakdown(&self) -> BundleBreakdown {
        BundleBreakdown {
            meetings: self.meetings.len(),
            documents: self.documents.len(),
            knowledge_base: self.knowledge_base.len(),
        }
    }

    pub fn total(&self) -> usize {
        self.meetings.len() + self.documents.len() + self.knowledge_base.len()
    }
}

/// Cap the ranked list at `cap` chunks, then group by source type.
///
/// Every chunk within the cap lands in exactly one group; relative order
/// within each group follows the merged ranking.
pub fn assemble(ranked: Vec<ScoredChunk>, cap: usize) -> ContextBundle {
    let mut bundle = ContextBundle::default();

    for chunk in ranked.into_iter().take(cap) {
        match chunk.source_type {
            SourceType::Transcript => bundle.meetings.push(MeetingContext {
                chunk_id: chunk.chunk_id,
                text: chunk.text,
                similarity_score: chunk.similarity_score,
                final_score: chunk.final_score,
                recording_id: chunk.metadata.document_id,
                recording_title: chunk.metadata.title,
                meeting_date: chunk.metadata.meeting_date,
                speaker: chunk.metadata.speaker,
                start_seconds: chunk.metadata.start_seconds,
                end_seconds: chunk.metadata.end_seconds,
                playback_url: chunk.metadata.playback_url,
            }),
            SourceType::Document => bundle.documents.push(DocumentContext {
                chunk_id: chunk.chunk_id,
                text: chunk.text,
                similarity_score: chunk.similarity_score,
                final_score: chunk.final_score,
                document_id: chunk.metadata.document_id,
                title: chunk.metadata.title,
                url: chunk.metadata.url,
                page_number: chunk.metadata.page_number,
                chunk_index: chunk.metadata.chunk_index,
            }),
            SourceType::KnowledgeBaseItem => bundle.knowledge_base.push(KnowledgeBaseContext {
                chunk_id: chunk.chunk_id,
                text: chunk.text,
                similarity_score: chunk.similarity_score,
                final_score: chunk.final_score,
                item_id: chunk.metadata.document_id,
                title: chunk.metadata.title,
                url: chunk.metadata.url,
                chunk_index: chunk.metadata.chunk_index,
            }),
        }
    }

    bundle
}
