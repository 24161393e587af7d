//! Database operations for the documents table.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgExecutor, PgRow};
use sqlx::Row;
use storysync_engine::{Document, RemoteCopy};

/// A stored document row from the database.
#[derive(Debug)]
pub struct StoredDocument {
    pub id: String,
    pub body: serde_json::Value,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
    pub last_writer: Option<String>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for StoredDocument {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredDocument {
            id: row.try_get("id")?,
            body: row.try_get("body")?,
            version: row.try_get("version")?,
            updated_at: row.try_get("updated_at")?,
            last_writer: row.try_get("last_writer")?,
        })
    }
}

impl StoredDocument {
    /// Rebuild the document, trusting the row's own version columns.
    pub fn to_document(&self) -> Result<Document, serde_json::Error> {
        let document: Document = serde_json::from_value(self.body.clone())?;
        Ok(document.stamped(self.updated_at, self.version as u64))
    }

    pub fn to_remote_copy(&self) -> Result<RemoteCopy, serde_json::Error> {
        Ok(RemoteCopy::new(self.to_document()?, self.last_writer.clone()))
    }
}

/// Insert a new document. Returns `false` if the id is taken.
pub async fn insert_document<'e>(
    executor: impl PgExecutor<'e>,
    document: &Document,
) -> Result<bool, sqlx::Error> {
    let body = serde_json::to_value(document).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
    let result = sqlx::query(
        r#"
        INSERT INTO documents (id, body, version, updated_at, last_writer)
        VALUES ($1, $2, $3, $4, NULL)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(&document.id)
    .bind(body)
    .bind(document.version as i64)
    .bind(document.updated_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Fetch a document.
pub async fn get_document<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
) -> Result<Option<StoredDocument>, sqlx::Error> {
    sqlx::query_as::<_, StoredDocument>(
        r#"
        SELECT id, body, version, updated_at, last_writer
        FROM documents
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Fetch a document and hold its row lock until the transaction ends.
pub async fn lock_document<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
) -> Result<Option<StoredDocument>, sqlx::Error> {
    sqlx::query_as::<_, StoredDocument>(
        r#"
        SELECT id, body, version, updated_at, last_writer
        FROM documents
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Overwrite a document at `expected_version`.
///
/// Returns `false` if the row moved on; callers hold the row lock so this
/// only happens if that contract is broken.
pub async fn update_document<'e>(
    executor: impl PgExecutor<'e>,
    document: &Document,
    expected_version: u64,
    writer: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let body = serde_json::to_value(document).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
    let result = sqlx::query(
        r#"
        UPDATE documents
        SET body = $2, version = $3, updated_at = $4, last_writer = $5
        WHERE id = $1 AND version = $6
        "#,
    )
    .bind(&document.id)
    .bind(body)
    .bind(document.version as i64)
    .bind(document.updated_at)
    .bind(writer)
    .bind(expected_version as i64)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Delete a document; its snapshots go with it.
pub async fn delete_document<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM documents WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}
