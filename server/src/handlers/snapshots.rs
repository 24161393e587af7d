//! Snapshot handlers.

use crate::error::Result;
use crate::repository::Repository;
use storysync_engine::SnapshotInfo;

/// Snapshot the current version of a document.
pub async fn record_snapshot(repository: &Repository, id: &str) -> Result<SnapshotInfo> {
    let info = repository.record_snapshot(id).await?;
    tracing::debug!(id, version = info.version, "Snapshot recorded");
    Ok(info)
}
