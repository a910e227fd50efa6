//! Source-document and chunk catalog.
//!
//! Persists [`SourceDocument`] records, their processing status, and the
//! chunk rows backing each document's current content version. Chunk
//! replacement is transactional: old rows are deleted and new ones inserted
//! in one transaction, so the catalog never shows a mix of content
//! versions.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use dossier_core::models::{Chunk, ChunkSpan, ProcessingStatus, SourceDocument, SourceType};

/// Fields required to register a document ahead of ingestion.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub owner_id: String,
    pub client_id: Option<String>,
    pub source_type: SourceType,
    pub title: Option<String>,
    pub url: Option<String>,
    pub playback_url: Option<String>,
    pub content_date: Option<DateTime<Utc>>,
}

/// Create a document record in `received` state and return its id.
pub async fn create_document(pool: &SqlitePool, new: &NewDocument) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().timestamp();

    sqlx::query(
        r#"
        INSERT INTO documents
            (id, owner_id, client_id, source_type, title, url, playback_url,
             content_date, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&new.owner_id)
    .bind(&new.client_id)
    .bind(new.source_type.as_str())
    .bind(&new.title)
    .bind(&new.url)
    .bind(&new.playback_url)
    .bind(new.content_date.map(|d| d.timestamp()))
    .bind(ProcessingStatus::Received.as_str())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(id)
}

pub async fn get_document(pool: &SqlitePool, id: &str) -> Result<Option<SourceDocument>> {
    let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let source_type_raw: String = row.get("source_type");
    let Some(source_type) = SourceType::parse(&source_type_raw) else {
        bail!("document {id} has unknown source_type '{source_type_raw}'");
    };
    let status_raw: String = row.get("status");
    let Some(status) = ProcessingStatus::parse(&status_raw) else {
        bail!("document {id} has unknown status '{status_raw}'");
    };

    Ok(Some(SourceDocument {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        client_id: row.get("client_id"),
        source_type,
        title: row.get("title"),
        url: row.get("url"),
        playback_url: row.get("playback_url"),
        content_date: row
            .get::<Option<i64>, _>("content_date")
            .and_then(|ts| DateTime::from_timestamp(ts, 0)),
        status,
        error_message: row.get("error_message"),
        text_length: row.get::<i64, _>("text_length") as usize,
        chunk_count: row.get::<i64, _>("chunk_count") as usize,
        content_hash: row.get("content_hash"),
        created_at: DateTime::from_timestamp(row.get::<i64, _>("created_at"), 0)
            .unwrap_or(DateTime::UNIX_EPOCH),
        updated_at: DateTime::from_timestamp(row.get::<i64, _>("updated_at"), 0)
            .unwrap_or(DateTime::UNIX_EPOCH),
    }))
}

pub async fn set_status(pool: &SqlitePool, id: &str, status: ProcessingStatus) -> Result<()> {
    sqlx::query("UPDATE documents SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(Utc::now().timestamp())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Persist a failure: status `failed` plus the reason, for inspection and
/// retry.
pub async fn mark_failed(pool: &SqlitePool, id: &str, reason: &str) -> Result<()> {
    sqlx::query("UPDATE documents SET status = ?, error_message = ?, updated_at = ? WHERE id = ?")
        .bind(ProcessingStatus::Failed.as_str())
        .bind(reason)
        .bind(Utc::now().timestamp())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Finish a successful ingest: status `embedded`, counts and content hash
/// updated, any stale failure reason cleared.
pub async fn finish_ingest(
    pool: &SqlitePool,
    id: &str,
    chunk_count: usize,
    text_length: usize,
    content_hash: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE documents
        SET status = ?, chunk_count = ?, text_length = ?, content_hash = ?,
            error_message = NULL, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(ProcessingStatus::Embedded.as_str())
    .bind(chunk_count as i64)
    .bind(text_length as i64)
    .bind(content_hash)
    .bind(Utc::now().timestamp())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Ids of the document's current chunk set (its previous content version,
/// when called before replacement).
pub async fn chunk_ids(pool: &SqlitePool, document_id: &str) -> Result<Vec<String>> {
    let rows = sqlx::query("SELECT id FROM chunks WHERE document_id = ? ORDER BY chunk_index")
        .bind(document_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(|row| row.get("id")).collect())
}

/// Replace a document's chunk rows with a new set, transactionally.
pub async fn replace_chunks(pool: &SqlitePool, document_id: &str, chunks: &[Chunk]) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM chunks WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?;

    for chunk in chunks {
        let (span_unit, span_start, span_end) = match chunk.span {
            ChunkSpan::Chars { start, end } => ("chars", start as i64, end as i64),
            ChunkSpan::Seconds { start, end } => ("seconds", start as i64, end as i64),
        };

        sqlx::query(
            r#"
            INSERT INTO chunks
                (id, document_id, chunk_index, text, span_unit, span_start,
                 span_end, opening_speaker, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.index as i64)
        .bind(&chunk.text)
        .bind(span_unit)
        .bind(span_start)
        .bind(span_end)
        .bind(&chunk.opening_speaker)
        .bind(chunk.created_at.timestamp())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}
