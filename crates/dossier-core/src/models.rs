//! Core data models used throughout Dossier.
//!
//! These types represent the source documents, chunks, and transcript
//! segments that flow through the ingestion and retrieval pipelines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a source document's content came from.
///
/// The source type determines which chunking path a document takes at
/// ingestion and which [`Namespace`] its vectors land in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// A meeting transcript with speaker-labeled utterances.
    Transcript,
    /// An uploaded or scraped client document.
    Document,
    /// A reusable knowledge-base item (service sheet, case study, ...).
    KnowledgeBaseItem,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Transcript => "transcript",
            SourceType::Document => "document",
            SourceType::KnowledgeBaseItem => "knowledge_base_item",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "transcript" => Some(SourceType::Transcript),
            "document" => Some(SourceType::Document),
            "knowledge_base_item" => Some(SourceType::KnowledgeBaseItem),
            _ => None,
        }
    }

    /// The index partition this source type's vectors are written to.
    pub fn namespace(self) -> Namespace {
        match self {
            SourceType::Transcript => Namespace::Meetings,
            SourceType::Document => Namespace::Documents,
            SourceType::KnowledgeBaseItem => Namespace::KnowledgeBase,
        }
    }
}

/// A logical partition of the vector index, queried independently.
///
/// `meetings` and `documents` are scoped to an owner *and* a client;
/// `knowledge_base` holds owner-level content reusable across clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    Meetings,
    Documents,
    KnowledgeBase,
}

impl Namespace {
    pub const ALL: [Namespace; 3] = [
        Namespace::Meetings,
        Namespace::Documents,
        Namespace::KnowledgeBase,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Meetings => "meetings",
            Namespace::Documents => "documents",
            Namespace::KnowledgeBase => "knowledge_base",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "meetings" => Some(Namespace::Meetings),
            "documents" => Some(Namespace::Documents),
            "knowledge_base" => Some(Namespace::KnowledgeBase),
            _ => None,
        }
    }

    /// The canonical source type stored in this partition.
    pub fn source_type(self) -> SourceType {
        match self {
            Namespace::Meetings => SourceType::Transcript,
            Namespace::Documents => SourceType::Document,
            Namespace::KnowledgeBase => SourceType::KnowledgeBaseItem,
        }
    }

    /// Whether queries against this partition are additionally scoped to a
    /// specific client. The knowledge base is owner-level only.
    pub fn client_scoped(self) -> bool {
        !matches!(self, Namespace::KnowledgeBase)
    }

    /// Default top-K when the caller does not override it.
    pub fn default_top_k(self) -> usize {
        match self {
            Namespace::Meetings => 10,
            Namespace::Documents => 10,
            Namespace::KnowledgeBase => 6,
        }
    }
}

/// Where a source document currently sits in the ingestion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Received,
    Chunked,
    Embedded,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingStatus::Received => "received",
            ProcessingStatus::Chunked => "chunked",
            ProcessingStatus::Embedded => "embedded",
            ProcessingStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "received" => Some(ProcessingStatus::Received),
            "chunked" => Some(ProcessingStatus::Chunked),
            "embedded" => Some(ProcessingStatus::Embedded),
            "failed" => Some(ProcessingStatus::Failed),
            _ => None,
        }
    }
}

/// A registered source document. The record is created before ingestion
/// (scope fields already set) and its status advances as the pipeline runs.
/// Reprocessing supersedes all prior chunks and vectors.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub id: String,
    /// Owner scope (the tenant all content belongs to).
    pub owner_id: String,
    /// Client/entity scope; `None` for owner-level knowledge-base items.
    pub client_id: Option<String>,
    pub source_type: SourceType,
    pub title: Option<String>,
    pub url: Option<String>,
    /// Playback link for meeting recordings.
    pub playback_url: Option<String>,
    /// Content date (meeting date for transcripts); drives recency scoring.
    pub content_date: Option<DateTime<Utc>>,
    pub status: ProcessingStatus,
    /// Persisted failure reason when `status == Failed`.
    pub error_message: Option<String>,
    /// Length of the most recently ingested raw text, in characters.
    pub text_length: usize,
    pub chunk_count: usize,
    /// Hash of the most recently ingested raw text; an unchanged hash lets
    /// a re-submission skip reprocessing unless forced.
    pub content_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The position a chunk occupies within its source.
///
/// Documents use character offsets; transcripts use second offsets into the
/// recording. Spans are monotonically increasing within a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit", rename_all = "snake_case")]
pub enum ChunkSpan {
    Chars { start: usize, end: usize },
    Seconds { start: u64, end: u64 },
}

/// A bounded slice of source text or transcript: the unit of embedding and
/// retrieval. The chunk id is globally unique and doubles as the vector id.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub index: usize,
    pub text: String,
    pub span: ChunkSpan,
    pub source_type: SourceType,
    pub owner_id: String,
    pub client_id: Option<String>,
    /// Speaker opening the chunk; transcripts only.
    pub opening_speaker: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A parsed speaker utterance. Ephemeral: consumed during transcript chunk
/// building, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptSegment {
    pub speaker: String,
    pub text: String,
    /// Start offset in seconds, explicit or estimated from word count.
    pub start_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_type_round_trips_through_str() {
        for st in [
            SourceType::Transcript,
            SourceType::Document,
            SourceType::KnowledgeBaseItem,
        ] {
            assert_eq!(SourceType::parse(st.as_str()), Some(st));
        }
        assert_eq!(SourceType::parse("bogus"), None);
    }

    #[test]
    fn namespace_scoping_and_defaults() {
        assert!(Namespace::Meetings.client_scoped());
        assert!(Namespace::Documents.client_scoped());
        assert!(!Namespace::KnowledgeBase.client_scoped());

        assert_eq!(Namespace::Meetings.default_top_k(), 10);
        assert_eq!(Namespace::Documents.default_top_k(), 10);
        assert_eq!(Namespace::KnowledgeBase.default_top_k(), 6);
    }

    #[test]
    fn namespace_source_type_is_inverse_of_source_type_namespace() {
        for ns in Namespace::ALL {
            assert_eq!(ns.source_type().namespace(), ns);
        }
    }

    #[test]
    fn status_round_trips_through_str() {
        for st in [
            ProcessingStatus::Received,
            ProcessingStatus::Chunked,
            ProcessingStatus::Embedded,
            ProcessingStatus::Failed,
        ] {
            assert_eq!(ProcessingStatus::parse(st.as_str()), Some(st));
        }
    }
}
