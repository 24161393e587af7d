use crate::error::{RemoteError, RemoteResult};
use crate::remote::RemoteStore;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use storysync_engine::{
    Document, RemoteSlot, SaveRequest, SaveResponse, SnapshotInfo, Version, VersionSnapshot,
    DEFAULT_RETENTION, INITIAL_VERSION,
};

/// In-process remote store.
///
/// Uses the same commit rule and snapshot log as the server's memory
/// repository. Outages and latency can be injected for tests.
pub struct MemoryRemote {
    documents: DashMap<String, RemoteSlot>,
    retention: usize,
    available: AtomicBool,
    latency: Option<Duration>,
    put_attempts: AtomicUsize,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            documents: DashMap::new(),
            retention,
            available: AtomicBool::new(true),
            latency: None,
            put_attempts: AtomicUsize::new(0),
        }
    }

    /// Delay every call by `latency` (tokio time, so it can be paused).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Install a document as-is, bypassing creation stamping.
    pub fn seed(&self, document: Document) {
        self.documents.insert(
            document.id.clone(),
            RemoteSlot::new(document, None, self.retention),
        );
    }

    /// Toggle an injected outage.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of `put_document` calls received, including failed ones.
    pub fn put_attempts(&self) -> usize {
        self.put_attempts.load(Ordering::SeqCst)
    }

    /// Current remote copy, if any.
    pub fn current(&self, id: &str) -> Option<Document> {
        self.documents.get(id).map(|slot| slot.document().clone())
    }

    /// Writer of the current version.
    pub fn last_writer(&self, id: &str) -> Option<String> {
        self.documents
            .get(id)
            .and_then(|slot| slot.copy().last_writer.clone())
    }

    async fn enter(&self) -> RemoteResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::Unavailable)
        }
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStore for MemoryRemote {
    async fn get_document(&self, id: &str) -> RemoteResult<Document> {
        self.enter().await?;
        self.current(id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    async fn create_document(&self, document: &Document) -> RemoteResult<Document> {
        self.enter().await?;
        let created = document.stamped(Utc::now(), INITIAL_VERSION);
        match self.documents.entry(created.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(RemoteError::Status {
                status: 409,
                message: format!("document {} already exists", created.id),
            }),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(RemoteSlot::new(created.clone(), None, self.retention));
                Ok(created)
            }
        }
    }

    async fn put_document(&self, request: &SaveRequest) -> RemoteResult<SaveResponse> {
        self.put_attempts.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;

        let id = request.document.id.clone();
        let mut slot = self
            .documents
            .get_mut(&id)
            .ok_or_else(|| RemoteError::NotFound(id.clone()))?;
        Ok(slot.commit(request.clone(), Utc::now())?)
    }

    async fn record_snapshot(&self, id: &str) -> RemoteResult<SnapshotInfo> {
        self.enter().await?;
        let mut slot = self
            .documents
            .get_mut(id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        Ok(slot.record_snapshot())
    }

    async fn list_snapshots(&self, id: &str) -> RemoteResult<Vec<SnapshotInfo>> {
        self.enter().await?;
        self.documents
            .get(id)
            .map(|slot| slot.snapshots().list())
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    async fn get_snapshot(&self, id: &str, version: Version) -> RemoteResult<VersionSnapshot> {
        self.enter().await?;
        let slot = self
            .documents
            .get(id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        slot.snapshots()
            .get(version)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("{id}@{version}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use storysync_engine::{CollectionKind, Entity, RemoteMark};

    fn draft() -> Document {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        Document::new_empty("p-1", "Draft", at)
    }

    #[tokio::test]
    async fn create_then_get() {
        let remote = MemoryRemote::new();
        let created = remote.create_document(&draft()).await.unwrap();
        assert_eq!(created.version, INITIAL_VERSION);

        let fetched = remote.get_document("p-1").await.unwrap();
        assert_eq!(fetched, created);
        assert!(matches!(
            remote.create_document(&draft()).await,
            Err(RemoteError::Status { status: 409, .. })
        ));
    }

    #[tokio::test]
    async fn accepted_put_is_snapshotted() {
        let remote = MemoryRemote::new();
        let created = remote.create_document(&draft()).await.unwrap();

        let edited = created.upsert_entity(
            CollectionKind::Scenes,
            Entity::new("s1", created.updated_at),
        );
        let request = SaveRequest::new(edited, RemoteMark::of(&created)).with_writer("tab-a");
        let response = remote.put_document(&request).await.unwrap();
        assert!(matches!(response, SaveResponse::Accepted(a) if a.version == 2));

        let versions: Vec<_> = remote
            .list_snapshots("p-1")
            .await
            .unwrap()
            .iter()
            .map(|s| s.version)
            .collect();
        assert_eq!(versions, [2, 1]);
        let snapshot = remote.get_snapshot("p-1", 2).await.unwrap();
        assert_eq!(snapshot.saved_by.as_deref(), Some("tab-a"));

        // stale base is a conflict, not an error
        let stale = SaveRequest::new(created.clone(), RemoteMark::of(&created));
        assert!(matches!(
            remote.put_document(&stale).await.unwrap(),
            SaveResponse::Conflict(_)
        ));
        assert_eq!(remote.put_attempts(), 2);
    }

    #[tokio::test]
    async fn record_snapshot_is_idempotent() {
        let remote = MemoryRemote::new();
        remote.create_document(&draft()).await.unwrap();
        remote.record_snapshot("p-1").await.unwrap();
        remote.record_snapshot("p-1").await.unwrap();
        assert_eq!(remote.list_snapshots("p-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn outage_fails_calls() {
        let remote = MemoryRemote::new();
        remote.seed(draft());
        remote.set_available(false);
        assert!(matches!(
            remote.get_document("p-1").await,
            Err(RemoteError::Unavailable)
        ));
        remote.set_available(true);
        assert!(remote.get_document("p-1").await.is_ok());
        assert!(matches!(
            remote.get_document("missing").await,
            Err(RemoteError::NotFound(_))
        ));
    }
}
