use crate::error::{AppError, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use storysync_engine::{
    Document, RemoteSlot, SaveRequest, SaveResponse, SnapshotInfo, Timestamp, Version,
    VersionSnapshot,
};

/// Process-local storage.
///
/// Each document's shard lock covers the commit and its snapshot together.
pub struct MemoryRepository {
    documents: DashMap<String, RemoteSlot>,
    retention: usize,
}

impl MemoryRepository {
    pub fn new(retention: usize) -> Self {
        Self {
            documents: DashMap::new(),
            retention,
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub(super) fn create(&self, document: Document) -> Result<Document> {
        match self.documents.entry(document.id.clone()) {
            Entry::Occupied(_) => Err(AppError::AlreadyExists(document.id)),
            Entry::Vacant(entry) => {
                entry.insert(RemoteSlot::new(document.clone(), None, self.retention));
                Ok(document)
            }
        }
    }

    pub(super) fn get(&self, id: &str) -> Result<Document> {
        self.documents
            .get(id)
            .map(|slot| slot.document().clone())
            .ok_or_else(|| missing(id))
    }

    pub(super) fn save(&self, request: SaveRequest, now: Timestamp) -> Result<SaveResponse> {
        let id = request.document.id.clone();
        let mut slot = self.documents.get_mut(&id).ok_or_else(|| missing(&id))?;
        Ok(slot.commit(request, now)?)
    }

    pub(super) fn delete(&self, id: &str) -> bool {
        self.documents.remove(id).is_some()
    }

    pub(super) fn record_snapshot(&self, id: &str) -> Result<SnapshotInfo> {
        let mut slot = self.documents.get_mut(id).ok_or_else(|| missing(id))?;
        Ok(slot.record_snapshot())
    }

    pub(super) fn list_snapshots(&self, id: &str) -> Result<Vec<SnapshotInfo>> {
        self.documents
            .get(id)
            .map(|slot| slot.snapshots().list())
            .ok_or_else(|| missing(id))
    }

    pub(super) fn get_snapshot(&self, id: &str, version: Version) -> Result<VersionSnapshot> {
        let slot = self.documents.get(id).ok_or_else(|| missing(id))?;
        slot.snapshots()
            .get(version)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("snapshot {id}@{version}")))
    }
}

fn missing(id: &str) -> AppError {
    AppError::NotFound(format!("document {id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use storysync_engine::{RemoteMark, DEFAULT_RETENTION};

    fn t(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
    }

    fn created(repo: &MemoryRepository) -> Document {
        repo.create(Document::new_empty("p-1", "Draft", t(0)))
            .unwrap()
    }

    #[test]
    fn accepted_saves_are_snapshotted_and_pruned() {
        let repo = MemoryRepository::new(3);
        let mut current = created(&repo);

        for i in 1..=5 {
            let request = SaveRequest::new(current.clone(), RemoteMark::of(&current));
            let SaveResponse::Accepted(accepted) = repo.save(request, t(i)).unwrap() else {
                panic!("save {i} should be accepted");
            };
            current = current.stamped(accepted.timestamp, accepted.version);
        }

        let versions: Vec<_> = repo
            .list_snapshots("p-1")
            .unwrap()
            .iter()
            .map(|s| s.version)
            .collect();
        assert_eq!(versions, [6, 5, 4]);
        assert!(matches!(repo.get_snapshot("p-1", 3), Err(AppError::NotFound(_))));
    }

    #[test]
    fn conflict_leaves_document_and_history_alone() {
        let repo = MemoryRepository::new(DEFAULT_RETENTION);
        let v1 = created(&repo);
        let request = SaveRequest::new(v1.clone(), RemoteMark::of(&v1)).with_writer("a");
        repo.save(request, t(1)).unwrap();

        let stale = SaveRequest::new(v1.clone(), RemoteMark::of(&v1)).with_writer("b");
        let SaveResponse::Conflict(report) = repo.save(stale, t(2)).unwrap() else {
            panic!("stale save should conflict");
        };
        assert_eq!(report.remote_document.version, 2);
        assert_eq!(report.remote_writer.as_deref(), Some("a"));
        assert_eq!(repo.list_snapshots("p-1").unwrap().len(), 2);
    }

    #[test]
    fn create_rejects_duplicates_and_delete_removes_history() {
        let repo = MemoryRepository::new(DEFAULT_RETENTION);
        created(&repo);
        assert!(matches!(
            repo.create(Document::new_empty("p-1", "Again", t(5))),
            Err(AppError::AlreadyExists(_))
        ));

        assert!(repo.delete("p-1"));
        assert!(!repo.delete("p-1"));
        assert!(repo.is_empty());
        assert!(matches!(repo.list_snapshots("p-1"), Err(AppError::NotFound(_))));
    }
}
