//! Sync client: one save attempt at a time, no retries.

use crate::error::RemoteResult;
use crate::remote::RemoteStore;
use std::sync::Arc;
use storysync_engine::{
    Document, RemoteMark, SaveOutcome, SaveRequest, SaveTicket, SnapshotInfo, Version,
    VersionSnapshot, WriterId,
};
use tracing::{debug, info, warn};

/// Sends save requests and interprets the remote's answers.
///
/// Retrying is the scheduler's job; a failed attempt is reported once and
/// left alone.
pub struct SyncClient<R> {
    remote: Arc<R>,
    writer: WriterId,
}

impl<R> Clone for SyncClient<R> {
    fn clone(&self) -> Self {
        Self {
            remote: Arc::clone(&self.remote),
            writer: self.writer.clone(),
        }
    }
}

impl<R: RemoteStore> SyncClient<R> {
    pub fn new(remote: Arc<R>, writer: impl Into<WriterId>) -> Self {
        Self {
            remote,
            writer: writer.into(),
        }
    }

    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    pub fn writer(&self) -> &str {
        &self.writer
    }

    /// Fetch the current remote document.
    pub async fn load(&self, id: &str) -> RemoteResult<Document> {
        let document = self.remote.get_document(id).await?;
        info!(id, version = document.version, "loaded document");
        Ok(document)
    }

    /// Build the conditional request for a save ticket.
    pub fn request(&self, ticket: &SaveTicket) -> SaveRequest {
        SaveRequest::new((**ticket.document()).clone(), ticket.base()).with_writer(&*self.writer)
    }

    /// Send one save request.
    ///
    /// Transport and server failures become [`SaveOutcome::Failed`].
    pub async fn attempt_save(&self, request: SaveRequest) -> SaveOutcome {
        let id = request.document.id.clone();
        let base_version = request.base_version;
        debug!(%id, base_version, force = request.force_overwrite, "sending save");

        match self.remote.put_document(&request).await {
            Ok(response) => {
                let outcome = SaveOutcome::from(response);
                match &outcome {
                    SaveOutcome::Accepted(accepted) => {
                        info!(%id, version = accepted.version, "save accepted");
                    }
                    SaveOutcome::Conflict(report) => {
                        warn!(
                            %id,
                            base_version,
                            remote_version = report.remote_document.version,
                            remote_writer = report.remote_writer.as_deref().unwrap_or("unknown"),
                            "save rejected: remote moved on"
                        );
                    }
                    SaveOutcome::Failed { .. } => {}
                }
                outcome
            }
            Err(e) => {
                warn!(%id, base_version, error = %e, "save failed");
                SaveOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Write a retained snapshot back as the newest version.
    ///
    /// This is an ordinary optimistic save of the snapshot's document against
    /// `base`, so it can conflict like any other.
    pub async fn restore_snapshot(
        &self,
        id: &str,
        version: Version,
        base: RemoteMark,
    ) -> RemoteResult<SaveOutcome> {
        let snapshot = self.remote.get_snapshot(id, version).await?;
        info!(id, version, base_version = base.version, "restoring snapshot");
        let request = SaveRequest::new(snapshot.document, base).with_writer(&*self.writer);
        Ok(self.attempt_save(request).await)
    }

    pub async fn list_snapshots(&self, id: &str) -> RemoteResult<Vec<SnapshotInfo>> {
        self.remote.list_snapshots(id).await
    }

    pub async fn snapshot(&self, id: &str, version: Version) -> RemoteResult<VersionSnapshot> {
        self.remote.get_snapshot(id, version).await
    }
}
