//! End-to-end pipeline tests over a scratch SQLite catalog, the core
//! in-memory vector index, and deterministic stub embedders.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::SqlitePool;

use dossier::catalog::{self, NewDocument};
use dossier::config::{
    CatalogConfig, ChunkingConfig, Config, EmbeddingConfig, IndexConfig, RetrievalConfig,
    ScopeConfig, TranscriptConfig,
};
use dossier::ingest::{ingest_document, IngestRequest};
use dossier::retrieve::{retrieve, RetrievalRequest, TopKOverrides};
use dossier::{db, migrate};
use dossier_core::embedding::Embedder;
use dossier_core::error::{Error, Result as CoreResult};
use dossier_core::index::memory::InMemoryIndex;
use dossier_core::index::{IndexMatch, ScopeFilter, VectorIndex, VectorMetadata, VectorRecord};
use dossier_core::models::{Namespace, ProcessingStatus, SourceType};

const DIMS: usize = 8;

/// Deterministic embedder: the vector is a function of the text alone.
/// Specific batch calls can be made to fail for partial-failure tests.
struct StubEmbedder {
    calls: AtomicUsize,
    fail_on_calls: Vec<usize>,
}

impl StubEmbedder {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_on_calls: Vec::new(),
        }
    }

    fn failing_on(calls: Vec<usize>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_on_calls: calls,
        }
    }

    fn batch_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector_for(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIMS];
        for (i, b) in text.bytes().enumerate() {
            v[i % DIMS] += b as f32;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1.0);
        v.iter().map(|x| x / norm).collect()
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    fn model_name(&self) -> &str {
        "stub-embedder"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
        Ok(Self::vector_for(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_calls.contains(&call) {
            return Err(Error::external("embedding service", "simulated outage"));
        }
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }
}

/// Embedder returning the same unit vector for everything, so every stored
/// chunk scores identical similarity against every query.
struct ConstEmbedder;

#[async_trait]
impl Embedder for ConstEmbedder {
    fn model_name(&self) -> &str {
        "const-embedder"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, _text: &str) -> CoreResult<Vec<f32>> {
        Ok(unit_vector())
    }

    async fn embed_batch(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| unit_vector()).collect())
    }
}

/// Embedder whose output dimension contradicts its declared dimension.
struct WrongDimsEmbedder;

#[async_trait]
impl Embedder for WrongDimsEmbedder {
    fn model_name(&self) -> &str {
        "wrong-dims"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, _text: &str) -> CoreResult<Vec<f32>> {
        Ok(vec![0.5; DIMS + 1])
    }

    async fn embed_batch(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.5; DIMS + 1]).collect())
    }
}

/// Index wrapper that fails queries against one namespace.
struct OutageIndex {
    inner: InMemoryIndex,
    down: Namespace,
}

#[async_trait]
impl VectorIndex for OutageIndex {
    async fn upsert(&self, namespace: Namespace, records: &[VectorRecord]) -> CoreResult<usize> {
        self.inner.upsert(namespace, records).await
    }

    async fn delete(&self, namespace: Namespace, ids: &[String]) -> CoreResult<()> {
        self.inner.delete(namespace, ids).await
    }

    async fn query(
        &self,
        namespace: Namespace,
        vector: &[f32],
        top_k: usize,
        filter: &ScopeFilter,
    ) -> CoreResult<Vec<IndexMatch>> {
        if namespace == self.down {
            return Err(Error::external("vector index", "simulated partition outage"));
        }
        self.inner.query(namespace, vector, top_k, filter).await
    }
}

fn unit_vector() -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    v[0] = 1.0;
    v
}

fn test_config(dir: &Path) -> Config {
    Config {
        catalog: CatalogConfig {
            path: dir.join("catalog.sqlite"),
        },
        scope: ScopeConfig {
            owner_id: "owner-1".to_string(),
        },
        chunking: ChunkingConfig {
            window_chars: 400,
            overlap_chars: 50,
        },
        transcript: TranscriptConfig {
            token_budget: 40,
            overlap_tokens: 8,
            chars_per_token: 4,
        },
        embedding: EmbeddingConfig {
            model: Some("stub-embedder".to_string()),
            dims: Some(DIMS),
            batch_size: 64,
            batch_delay_ms: 0,
            api_key: Some("test-key".to_string()),
            ..EmbeddingConfig::default()
        },
        index: IndexConfig::default(),
        retrieval: RetrievalConfig::default(),
    }
}

async fn setup(dir: &Path) -> (Config, SqlitePool) {
    let config = test_config(dir);
    let pool = db::connect(&config.catalog.path).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    (config, pool)
}

async fn register(
    pool: &SqlitePool,
    config: &Config,
    source_type: SourceType,
    client: Option<&str>,
) -> String {
    catalog::create_document(
        pool,
        &NewDocument {
            owner_id: config.scope.owner_id.clone(),
            client_id: client.map(str::to_string),
            source_type,
            title: Some("Test Document".to_string()),
            url: Some("https://example.com/doc".to_string()),
            playback_url: None,
            content_date: None,
        },
    )
    .await
    .unwrap()
}

fn ingest_request(document_id: &str, raw_text: impl Into<String>) -> IngestRequest {
    IngestRequest {
        document_id: document_id.to_string(),
        raw_text: raw_text.into(),
        force: false,
    }
}

fn metadata(
    id: &str,
    source_type: SourceType,
    owner: &str,
    client: Option<&str>,
) -> VectorMetadata {
    VectorMetadata {
        chunk_id: id.to_string(),
        document_id: format!("doc-{id}"),
        owner_id: owner.to_string(),
        client_id: client.map(str::to_string),
        source_type,
        text: format!("stored text for {id}"),
        chunk_index: 0,
        created_at: None,
        title: None,
        url: None,
        page_number: None,
        meeting_date: None,
        speaker: None,
        start_seconds: None,
        end_seconds: None,
        playback_url: None,
    }
}

fn record(id: &str, source_type: SourceType, client: Option<&str>) -> VectorRecord {
    VectorRecord {
        id: id.to_string(),
        vector: unit_vector(),
        metadata: metadata(id, source_type, "owner-1", client),
    }
}

// Scenario A: a 1000-character document with window 400 / overlap 50 yields
// three chunks, each with one embedding.
#[tokio::test]
async fn ingest_thousand_char_document() {
    let dir = tempfile::tempdir().unwrap();
    let (config, pool) = setup(dir.path()).await;
    let index = InMemoryIndex::new();
    let embedder = StubEmbedder::new();

    let doc_id = register(&pool, &config, SourceType::Document, Some("client-1")).await;
    let summary = ingest_document(
        &config,
        &pool,
        &embedder,
        &index,
        ingest_request(&doc_id, "x".repeat(1000)),
    )
    .await
    .unwrap();

    assert_eq!(summary.chunks_created, 3);
    assert_eq!(summary.embeddings_generated, 3);
    assert_eq!(summary.status, ProcessingStatus::Embedded);
    assert_eq!(index.ids(Namespace::Documents).len(), 3);

    let document = catalog::get_document(&pool, &doc_id).await.unwrap().unwrap();
    assert_eq!(document.status, ProcessingStatus::Embedded);
    assert_eq!(document.chunk_count, 3);
    assert_eq!(document.text_length, 1000);
}

// Scenario B: reprocessing replaces the previous chunk set; old vector ids
// disappear from the index and the new ids appear.
#[tokio::test]
async fn reprocess_supersedes_old_vectors() {
    let dir = tempfile::tempdir().unwrap();
    let (config, pool) = setup(dir.path()).await;
    let index = InMemoryIndex::new();
    let embedder = StubEmbedder::new();

    let doc_id = register(&pool, &config, SourceType::Document, Some("client-1")).await;

    ingest_document(&config, &pool, &embedder, &index, ingest_request(&doc_id, "a".repeat(1000)))
        .await
        .unwrap();
    let old_ids = index.ids(Namespace::Documents);
    assert_eq!(old_ids.len(), 3);

    let summary = ingest_document(
        &config,
        &pool,
        &embedder,
        &index,
        ingest_request(&doc_id, "b".repeat(500)),
    )
    .await
    .unwrap();

    let new_ids = index.ids(Namespace::Documents);
    assert_eq!(summary.chunks_created, 2);
    assert_eq!(new_ids.len(), 2);
    for old in &old_ids {
        assert!(!new_ids.contains(old), "stale vector {old} survived reprocess");
    }

    let document = catalog::get_document(&pool, &doc_id).await.unwrap().unwrap();
    assert_eq!(document.chunk_count, 2);
}

#[tokio::test]
async fn failed_embedding_batch_yields_partial_success() {
    let dir = tempfile::tempdir().unwrap();
    let (mut config, pool) = setup(dir.path()).await;
    config.embedding.batch_size = 1;
    let index = InMemoryIndex::new();
    let embedder = StubEmbedder::failing_on(vec![2]);

    let doc_id = register(&pool, &config, SourceType::Document, Some("client-1")).await;
    let summary = ingest_document(
        &config,
        &pool,
        &embedder,
        &index,
        ingest_request(&doc_id, "c".repeat(1000)),
    )
    .await
    .unwrap();

    assert_eq!(summary.chunks_created, 3);
    assert_eq!(summary.embeddings_generated, 2);
    assert_eq!(summary.status, ProcessingStatus::Embedded);
    assert_eq!(index.ids(Namespace::Documents).len(), 2);
}

#[tokio::test]
async fn unchanged_content_is_skipped_unless_forced() {
    let dir = tempfile::tempdir().unwrap();
    let (config, pool) = setup(dir.path()).await;
    let index = InMemoryIndex::new();
    let embedder = StubEmbedder::new();

    let doc_id = register(&pool, &config, SourceType::Document, Some("client-1")).await;
    let text = "d".repeat(1000);

    ingest_document(&config, &pool, &embedder, &index, ingest_request(&doc_id, text.clone()))
        .await
        .unwrap();
    let calls_after_first = embedder.batch_calls();

    let summary =
        ingest_document(&config, &pool, &embedder, &index, ingest_request(&doc_id, text.clone()))
            .await
            .unwrap();
    assert_eq!(summary.embeddings_generated, 0);
    assert_eq!(summary.chunks_created, 3);
    assert_eq!(embedder.batch_calls(), calls_after_first, "skip must not re-embed");

    let forced = ingest_document(
        &config,
        &pool,
        &embedder,
        &index,
        IngestRequest {
            document_id: doc_id.clone(),
            raw_text: text,
            force: true,
        },
    )
    .await
    .unwrap();
    assert_eq!(forced.embeddings_generated, 3);
    assert!(embedder.batch_calls() > calls_after_first);
}

#[tokio::test]
async fn ingest_rejects_bad_requests_before_external_calls() {
    let dir = tempfile::tempdir().unwrap();
    let (config, pool) = setup(dir.path()).await;
    let index = InMemoryIndex::new();
    let embedder = StubEmbedder::new();

    let err = ingest_document(&config, &pool, &embedder, &index, ingest_request("", "text"))
        .await
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Validation(_))));

    let doc_id = register(&pool, &config, SourceType::Document, None).await;
    let err = ingest_document(&config, &pool, &embedder, &index, ingest_request(&doc_id, "   "))
        .await
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Validation(_))));

    let err = ingest_document(
        &config,
        &pool,
        &embedder,
        &index,
        ingest_request("no-such-document", "text"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Validation(_))));

    assert_eq!(embedder.batch_calls(), 0);
}

#[tokio::test]
async fn total_embedding_failure_marks_document_failed() {
    let dir = tempfile::tempdir().unwrap();
    let (config, pool) = setup(dir.path()).await;
    let index = InMemoryIndex::new();
    let embedder = StubEmbedder::failing_on(vec![1]);

    let doc_id = register(&pool, &config, SourceType::Document, None).await;
    let err = ingest_document(
        &config,
        &pool,
        &embedder,
        &index,
        ingest_request(&doc_id, "e".repeat(300)),
    )
    .await
    .unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::ExternalService { .. })));

    let document = catalog::get_document(&pool, &doc_id).await.unwrap().unwrap();
    assert_eq!(document.status, ProcessingStatus::Failed);
    assert!(document.error_message.is_some());
    assert!(index.ids(Namespace::Documents).is_empty());

    // Retry from the failed state succeeds and clears the reason.
    let healthy = StubEmbedder::new();
    let summary =
        ingest_document(&config, &pool, &healthy, &index, ingest_request(&doc_id, "e".repeat(300)))
            .await
            .unwrap();
    assert_eq!(summary.status, ProcessingStatus::Embedded);
    let document = catalog::get_document(&pool, &doc_id).await.unwrap().unwrap();
    assert_eq!(document.status, ProcessingStatus::Embedded);
    assert!(document.error_message.is_none());
}

#[tokio::test]
async fn transcript_ingest_carries_meeting_provenance() {
    let dir = tempfile::tempdir().unwrap();
    let (config, pool) = setup(dir.path()).await;
    let index = InMemoryIndex::new();
    let embedder = StubEmbedder::new();

    let meeting_date = Utc::now() - Duration::days(3);
    let doc_id = catalog::create_document(
        &pool,
        &NewDocument {
            owner_id: config.scope.owner_id.clone(),
            client_id: Some("client-1".to_string()),
            source_type: SourceType::Transcript,
            title: Some("Weekly sync".to_string()),
            url: None,
            playback_url: Some("https://recordings.example.com/42".to_string()),
            content_date: Some(meeting_date),
        },
    )
    .await
    .unwrap();

    let transcript = "Alice: We walked through the rebrand concepts and the client leaned \
                      towards the second option overall. \
                      Bob: Agreed, though the budget conversation still worries them a lot. \
                      Alice: Let us prepare a revised estimate before the next call happens. \
                      Bob: I will pull the numbers together tomorrow morning for everyone.";

    let summary = ingest_document(
        &config,
        &pool,
        &embedder,
        &index,
        ingest_request(&doc_id, transcript),
    )
    .await
    .unwrap();

    assert!(summary.chunks_created >= 2, "small budget should force several chunks");
    assert_eq!(index.ids(Namespace::Meetings).len(), summary.chunks_created);

    let matches = index
        .query(
            Namespace::Meetings,
            &unit_vector(),
            10,
            &ScopeFilter {
                owner_id: "owner-1".to_string(),
                client_id: Some("client-1".to_string()),
                source_type: Some(SourceType::Transcript),
            },
        )
        .await
        .unwrap();
    assert_eq!(matches.len(), summary.chunks_created);
    for m in &matches {
        assert!(m.metadata.speaker.is_some());
        assert!(m.metadata.start_seconds.is_some());
        assert!(m.metadata.end_seconds.is_some());
        assert_eq!(m.metadata.meeting_date.unwrap().timestamp(), meeting_date.timestamp());
        assert_eq!(m.metadata.playback_url.as_deref(), Some("https://recordings.example.com/42"));
    }
}

// Scenario C: equal similarity, recency, and bonus across namespaces; the
// bundle groups 5 meeting, 3 document, and 2 knowledge-base chunks.
#[tokio::test]
async fn bundle_groups_chunks_by_source_type() {
    let dir = tempfile::tempdir().unwrap();
    let (config, _pool) = setup(dir.path()).await;
    let index = InMemoryIndex::new();

    let meetings: Vec<VectorRecord> = (0..5)
        .map(|i| record(&format!("m{i}"), SourceType::Transcript, Some("client-1")))
        .collect();
    let documents: Vec<VectorRecord> = (0..3)
        .map(|i| record(&format!("d{i}"), SourceType::Document, Some("client-1")))
        .collect();
    let kb: Vec<VectorRecord> = (0..2)
        .map(|i| record(&format!("k{i}"), SourceType::KnowledgeBaseItem, None))
        .collect();

    index.upsert(Namespace::Meetings, &meetings).await.unwrap();
    index.upsert(Namespace::Documents, &documents).await.unwrap();
    index.upsert(Namespace::KnowledgeBase, &kb).await.unwrap();

    let response = retrieve(
        &config,
        &ConstEmbedder,
        &index,
        RetrievalRequest {
            query: "summarize the account".to_string(),
            scope_id: "client-1".to_string(),
            source_filters: Vec::new(),
            top_k: TopKOverrides::default(),
        },
    )
    .await
    .unwrap();

    assert_eq!(response.metadata.total_chunks_retrieved, 10);
    assert_eq!(response.metadata.top_chunks_selected, 10);
    assert_eq!(response.metadata.breakdown.meetings, 5);
    assert_eq!(response.metadata.breakdown.documents, 3);
    assert_eq!(response.metadata.breakdown.knowledge_base, 2);
    assert_eq!(response.context.meetings.len(), 5);
    assert_eq!(response.context.documents.len(), 3);
    assert_eq!(response.context.knowledge_base.len(), 2);
}

// Scenario D: one namespace is down; retrieval still returns the others.
#[tokio::test]
async fn failed_namespace_is_treated_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let (config, _pool) = setup(dir.path()).await;
    let index = OutageIndex {
        inner: InMemoryIndex::new(),
        down: Namespace::Documents,
    };

    index
        .upsert(Namespace::Meetings, &[record("m0", SourceType::Transcript, Some("client-1"))])
        .await
        .unwrap();
    index
        .upsert(Namespace::Documents, &[record("d0", SourceType::Document, Some("client-1"))])
        .await
        .unwrap();
    index
        .upsert(Namespace::KnowledgeBase, &[record("k0", SourceType::KnowledgeBaseItem, None)])
        .await
        .unwrap();

    let response = retrieve(
        &config,
        &ConstEmbedder,
        &index,
        RetrievalRequest {
            query: "summarize the account".to_string(),
            scope_id: "client-1".to_string(),
            source_filters: Vec::new(),
            top_k: TopKOverrides::default(),
        },
    )
    .await
    .unwrap();

    assert_eq!(response.metadata.total_chunks_retrieved, 2);
    assert_eq!(response.metadata.breakdown.documents, 0);
    assert_eq!(response.metadata.breakdown.meetings, 1);
    assert_eq!(response.metadata.breakdown.knowledge_base, 1);
}

#[tokio::test]
async fn source_filters_restrict_the_fan_out() {
    let dir = tempfile::tempdir().unwrap();
    let (config, _pool) = setup(dir.path()).await;
    let index = InMemoryIndex::new();

    index
        .upsert(Namespace::Meetings, &[record("m0", SourceType::Transcript, Some("client-1"))])
        .await
        .unwrap();
    index
        .upsert(Namespace::Documents, &[record("d0", SourceType::Document, Some("client-1"))])
        .await
        .unwrap();

    let response = retrieve(
        &config,
        &ConstEmbedder,
        &index,
        RetrievalRequest {
            query: "summarize the account".to_string(),
            scope_id: "client-1".to_string(),
            source_filters: vec![Namespace::Meetings],
            top_k: TopKOverrides::default(),
        },
    )
    .await
    .unwrap();

    assert_eq!(response.metadata.total_chunks_retrieved, 1);
    assert_eq!(response.metadata.breakdown.meetings, 1);
    assert_eq!(response.metadata.breakdown.documents, 0);
}

#[tokio::test]
async fn retrieval_rejects_missing_query_or_scope() {
    let dir = tempfile::tempdir().unwrap();
    let (config, _pool) = setup(dir.path()).await;
    let index = InMemoryIndex::new();

    let err = retrieve(
        &config,
        &ConstEmbedder,
        &index,
        RetrievalRequest {
            query: "  ".to_string(),
            scope_id: "client-1".to_string(),
            ..RetrievalRequest::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Validation(_))));

    let err = retrieve(
        &config,
        &ConstEmbedder,
        &index,
        RetrievalRequest {
            query: "what happened".to_string(),
            scope_id: String::new(),
            ..RetrievalRequest::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Validation(_))));
}

#[tokio::test]
async fn query_dimension_mismatch_is_an_integrity_error() {
    let dir = tempfile::tempdir().unwrap();
    let (config, _pool) = setup(dir.path()).await;
    let index = InMemoryIndex::new();

    let err = retrieve(
        &config,
        &WrongDimsEmbedder,
        &index,
        RetrievalRequest {
            query: "what happened".to_string(),
            scope_id: "client-1".to_string(),
            ..RetrievalRequest::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::DataIntegrity(_))));
}

// The intent bonus is visible end-to-end: with equal similarity and
// recency, a behavioral query ranks the transcript chunk first.
#[tokio::test]
async fn behavioral_query_prefers_meeting_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let (config, _pool) = setup(dir.path()).await;
    let index = InMemoryIndex::new();

    index
        .upsert(Namespace::Meetings, &[record("m0", SourceType::Transcript, Some("client-1"))])
        .await
        .unwrap();
    index
        .upsert(Namespace::Documents, &[record("d0", SourceType::Document, Some("client-1"))])
        .await
        .unwrap();

    let response = retrieve(
        &config,
        &ConstEmbedder,
        &index,
        RetrievalRequest {
            query: "how does the client feel about the rebrand".to_string(),
            scope_id: "client-1".to_string(),
            ..RetrievalRequest::default()
        },
    )
    .await
    .unwrap();

    let meeting_score = response.context.meetings[0].final_score;
    let document_score = response.context.documents[0].final_score;
    assert!(meeting_score > document_score);
}
