//! Request database operations
//!
//! The generation status column is the per-request pipeline lock. Every
//! transition in and out of `inProgress` is a single conditional UPDATE, so
//! several service instances sharing the file stay consistent.

use chrono::Utc;
use civic_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid};
use crate::models::{
    Document, GenerationStatus, Request, RequestStatus, RequestSummary,
};

/// Outcome of trying to take the generation lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationClaim {
    /// This caller moved the request to `inProgress`
    Acquired,
    /// Another run holds the request
    AlreadyInProgress,
    /// No such request, or it was deleted
    NotFound,
}

/// Insert a new request
pub async fn create_request(pool: &SqlitePool, request: &Request) -> Result<()> {
    let pdf_files = serde_json::to_string(&request.pdf_files)?;
    let documents = serde_json::to_string(&request.documents)?;

    sqlx::query(
        r#"
        INSERT INTO requests (
            id, title, description, pdf_files, document_count, documents,
            status, generation_status, created_by, generated_at, last_error,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(request.id.to_string())
    .bind(&request.title)
    .bind(&request.description)
    .bind(pdf_files)
    .bind(request.document_count as i64)
    .bind(documents)
    .bind(request.status.as_i64())
    .bind(request.generation_status.as_str())
    .bind(&request.created_by)
    .bind(request.generated_at.map(|dt| dt.to_rfc3339()))
    .bind(&request.last_error)
    .bind(request.created_at.to_rfc3339())
    .bind(request.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a request (deleted requests included)
pub async fn get_request(pool: &SqlitePool, id: Uuid) -> Result<Option<Request>> {
    let row = sqlx::query(
        r#"
        SELECT id, title, description, pdf_files, document_count, documents,
               status, generation_status, created_by, generated_at, last_error,
               created_at, updated_at
        FROM requests
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|row| request_from_row(&row)).transpose()
}

/// List non-deleted requests, newest first, optionally for one owner
pub async fn list_requests(
    pool: &SqlitePool,
    created_by: Option<&str>,
) -> Result<Vec<RequestSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT id, title, description, pdf_files, document_count,
               generation_status, created_by, created_at
        FROM requests
        WHERE status != 0 AND (?1 IS NULL OR created_by = ?1)
        ORDER BY created_at DESC
        "#,
    )
    .bind(created_by)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let id: String = row.get("id");
            let pdf_files: String = row.get("pdf_files");
            let generation_status: String = row.get("generation_status");
            let created_at: String = row.get("created_at");

            Ok(RequestSummary {
                id: parse_uuid("id", &id)?,
                title: row.get("title"),
                description: row.get("description"),
                pdf_files: serde_json::from_str(&pdf_files)?,
                document_count: row.get::<i64, _>("document_count") as usize,
                generation_status: parse_generation_status(&generation_status)?,
                created_by: row.get("created_by"),
                created_at: parse_timestamp("created_at", &created_at)?,
            })
        })
        .collect()
}

/// Soft delete; returns false when the request is missing or already deleted
pub async fn soft_delete_request(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE requests SET status = 0, updated_at = ? WHERE id = ? AND status != 0",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Compare-and-swap into `inProgress`
///
/// Succeeds only from `draft`, `completed` or `failed` on a non-deleted
/// request. The same statement clears documents, count and last error so the
/// run starts from an empty document list.
pub async fn try_begin_generation(pool: &SqlitePool, id: Uuid) -> Result<GenerationClaim> {
    let result = sqlx::query(
        r#"
        UPDATE requests
        SET generation_status = 'inProgress',
            documents = '[]',
            document_count = 0,
            last_error = NULL,
            updated_at = ?
        WHERE id = ?
          AND status != 0
          AND generation_status IN ('draft', 'completed', 'failed')
        "#,
    )
    .bind(Utc::now().to_rfc3339())
    .bind(id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 1 {
        return Ok(GenerationClaim::Acquired);
    }

    let status: Option<i64> = sqlx::query_scalar("SELECT status FROM requests WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    Ok(match status.and_then(RequestStatus::from_i64) {
        None | Some(RequestStatus::Deleted) => GenerationClaim::NotFound,
        Some(_) => GenerationClaim::AlreadyInProgress,
    })
}

/// Append documents and bump the count in one statement
///
/// Only matches while the request is `inProgress`. Returns the new count, or
/// `None` when no row matched. The stored array is always compact JSON
/// written by this module, so the batch is spliced in textually.
pub async fn append_documents(
    pool: &SqlitePool,
    id: Uuid,
    documents: &[Document],
) -> Result<Option<usize>> {
    if documents.is_empty() {
        let count: Option<i64> = sqlx::query_scalar(
            "SELECT document_count FROM requests WHERE id = ? AND generation_status = 'inProgress'",
        )
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
        return Ok(count.map(|c| c as usize));
    }

    let batch = serde_json::to_string(documents)?;

    let count: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE requests
        SET documents = CASE
                WHEN documents = '[]' THEN ?1
                ELSE substr(documents, 1, length(documents) - 1) || ',' || substr(?1, 2)
            END,
            document_count = document_count + ?2,
            updated_at = ?3
        WHERE id = ?4 AND generation_status = 'inProgress'
        RETURNING document_count
        "#,
    )
    .bind(&batch)
    .bind(documents.len() as i64)
    .bind(Utc::now().to_rfc3339())
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    Ok(count.map(|c| c as usize))
}

/// Current document list of a request
pub async fn load_documents(pool: &SqlitePool, id: Uuid) -> Result<Vec<Document>> {
    let documents: Option<String> = sqlx::query_scalar("SELECT documents FROM requests WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    match documents {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Err(Error::NotFound(format!("request {}", id))),
    }
}

/// Release the lock as `completed`; also activates the request
pub async fn mark_completed(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        r#"
        UPDATE requests
        SET generation_status = 'completed', status = 1, generated_at = ?, updated_at = ?
        WHERE id = ? AND generation_status = 'inProgress'
        "#,
    )
    .bind(&now)
    .bind(&now)
    .bind(id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Release the lock as `failed`, recording the reason
pub async fn mark_failed(pool: &SqlitePool, id: Uuid, error: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE requests
        SET generation_status = 'failed', last_error = ?, updated_at = ?
        WHERE id = ? AND generation_status = 'inProgress'
        "#,
    )
    .bind(error)
    .bind(Utc::now().to_rfc3339())
    .bind(id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Number of requests currently holding the generation lock
pub async fn count_in_progress(pool: &SqlitePool) -> Result<usize> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM requests WHERE generation_status = 'inProgress'",
    )
    .fetch_one(pool)
    .await?;

    Ok(count as usize)
}

/// Fail every run left `inProgress` by a previous process
///
/// Runs live in background tasks of the process that claimed them, so after a
/// restart nothing will ever release these locks. Call once at startup,
/// before serving; assumes one service process per database.
pub async fn fail_stale_generations(pool: &SqlitePool) -> Result<usize> {
    let result = sqlx::query(
        r#"
        UPDATE requests
        SET generation_status = 'failed',
            last_error = 'Generation interrupted: civic-ai was restarted',
            updated_at = ?
        WHERE generation_status = 'inProgress'
        "#,
    )
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() as usize)
}

fn parse_generation_status(value: &str) -> Result<GenerationStatus> {
    value.parse().map_err(Error::Internal)
}

fn request_from_row(row: &SqliteRow) -> Result<Request> {
    let id: String = row.get("id");
    let pdf_files: String = row.get("pdf_files");
    let documents: String = row.get("documents");
    let status: i64 = row.get("status");
    let generation_status: String = row.get("generation_status");
    let generated_at: Option<String> = row.get("generated_at");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Request {
        id: parse_uuid("id", &id)?,
        title: row.get("title"),
        description: row.get("description"),
        pdf_files: serde_json::from_str(&pdf_files)?,
        document_count: row.get::<i64, _>("document_count") as usize,
        documents: serde_json::from_str(&documents)?,
        status: RequestStatus::from_i64(status)
            .ok_or_else(|| Error::Internal(format!("Unknown request status {}", status)))?,
        generation_status: parse_generation_status(&generation_status)?,
        created_by: row.get("created_by"),
        generated_at: generated_at
            .map(|s| parse_timestamp("generated_at", &s))
            .transpose()?,
        last_error: row.get("last_error"),
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}
