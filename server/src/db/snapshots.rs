//! Database operations for the snapshots table.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgExecutor, PgRow};
use sqlx::Row;
use storysync_engine::{Document, SnapshotInfo, VersionSnapshot};

/// A stored snapshot row.
#[derive(Debug)]
pub struct StoredSnapshot {
    pub version: i64,
    pub saved_at: DateTime<Utc>,
    pub saved_by: Option<String>,
    pub body: serde_json::Value,
}

impl<'r> sqlx::FromRow<'r, PgRow> for StoredSnapshot {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredSnapshot {
            version: row.try_get("version")?,
            saved_at: row.try_get("saved_at")?,
            saved_by: row.try_get("saved_by")?,
            body: row.try_get("body")?,
        })
    }
}

impl StoredSnapshot {
    pub fn to_snapshot(&self) -> Result<VersionSnapshot, serde_json::Error> {
        let document: Document = serde_json::from_value(self.body.clone())?;
        Ok(VersionSnapshot {
            version: self.version as u64,
            timestamp: self.saved_at,
            saved_by: self.saved_by.clone(),
            document,
        })
    }
}

/// Record a snapshot. Returns `false` if that version is already recorded.
pub async fn insert_snapshot<'e>(
    executor: impl PgExecutor<'e>,
    snapshot: &VersionSnapshot,
) -> Result<bool, sqlx::Error> {
    let body = serde_json::to_value(&snapshot.document)
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
    let result = sqlx::query(
        r#"
        INSERT INTO snapshots (document_id, version, saved_at, saved_by, body)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (document_id, version) DO NOTHING
        "#,
    )
    .bind(&snapshot.document.id)
    .bind(snapshot.version as i64)
    .bind(snapshot.timestamp)
    .bind(&snapshot.saved_by)
    .bind(body)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Drop everything but the newest `retention` snapshots of a document.
pub async fn prune_snapshots<'e>(
    executor: impl PgExecutor<'e>,
    document_id: &str,
    retention: usize,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM snapshots
        WHERE document_id = $1
          AND version NOT IN (
              SELECT version FROM snapshots
              WHERE document_id = $1
              ORDER BY version DESC
              LIMIT $2
          )
        "#,
    )
    .bind(document_id)
    .bind(retention as i64)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Snapshot metadata, newest first.
pub async fn list_snapshots<'e>(
    executor: impl PgExecutor<'e>,
    document_id: &str,
) -> Result<Vec<SnapshotInfo>, sqlx::Error> {
    let rows: Vec<(i64, DateTime<Utc>, Option<String>)> = sqlx::query_as(
        r#"
        SELECT version, saved_at, saved_by
        FROM snapshots
        WHERE document_id = $1
        ORDER BY version DESC
        "#,
    )
    .bind(document_id)
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(version, timestamp, saved_by)| SnapshotInfo {
            version: version as u64,
            timestamp,
            saved_by,
        })
        .collect())
}

/// Fetch one snapshot.
pub async fn get_snapshot<'e>(
    executor: impl PgExecutor<'e>,
    document_id: &str,
    version: u64,
) -> Result<Option<StoredSnapshot>, sqlx::Error> {
    sqlx::query_as::<_, StoredSnapshot>(
        r#"
        SELECT version, saved_at, saved_by, body
        FROM snapshots
        WHERE document_id = $1 AND version = $2
        "#,
    )
    .bind(document_id)
    .bind(version as i64)
    .fetch_optional(executor)
    .await
}
