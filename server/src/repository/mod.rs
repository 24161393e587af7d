//! Document persistence.
//!
//! Both backends apply the same commit rule from `storysync_engine` and write
//! the snapshot of an accepted save atomically with the save itself.

mod memory;

pub use memory::MemoryRepository;

use crate::db::{self, Pool};
use crate::error::{AppError, Result};
use std::sync::Arc;
use storysync_engine::{
    Document, SaveRequest, SaveResponse, SnapshotInfo, Timestamp, Version, VersionSnapshot,
    INITIAL_VERSION,
};

/// Storage backend selected at startup.
#[derive(Clone)]
pub enum Repository {
    Postgres { pool: Pool, retention: usize },
    Memory(Arc<MemoryRepository>),
}

impl Repository {
    pub fn postgres(pool: Pool, retention: usize) -> Self {
        Repository::Postgres {
            pool,
            retention: retention.max(1),
        }
    }

    pub fn memory(retention: usize) -> Self {
        Repository::Memory(Arc::new(MemoryRepository::new(retention)))
    }

    pub fn backend(&self) -> &'static str {
        match self {
            Repository::Postgres { .. } => "postgres",
            Repository::Memory(_) => "memory",
        }
    }

    /// Store a new document at version 1 with the server's timestamp.
    pub async fn create(&self, document: Document, now: Timestamp) -> Result<Document> {
        let created = document.stamped(now, INITIAL_VERSION);
        match self {
            Repository::Postgres { pool, .. } => {
                let mut tx = pool.begin().await?;
                if !db::insert_document(&mut *tx, &created).await? {
                    return Err(AppError::AlreadyExists(created.id));
                }
                db::insert_snapshot(&mut *tx, &VersionSnapshot::of(&created, None)).await?;
                tx.commit().await?;
                Ok(created)
            }
            Repository::Memory(memory) => memory.create(created),
        }
    }

    pub async fn get(&self, id: &str) -> Result<Document> {
        match self {
            Repository::Postgres { pool, .. } => db::get_document(pool, id)
                .await?
                .ok_or_else(|| not_found(id))?
                .to_document()
                .map_err(AppError::from),
            Repository::Memory(memory) => memory.get(id),
        }
    }

    /// Conditional write. A stale base yields a conflict response.
    pub async fn save(&self, request: SaveRequest, now: Timestamp) -> Result<SaveResponse> {
        match self {
            Repository::Postgres { pool, retention } => {
                let id = request.document.id.clone();
                let mut tx = pool.begin().await?;
                let row = db::lock_document(&mut *tx, &id)
                    .await?
                    .ok_or_else(|| not_found(&id))?;
                let mut copy = row.to_remote_copy()?;
                let base_version = copy.document.version;

                let response = copy.commit(request, now)?;
                if let SaveResponse::Accepted(_) = &response {
                    let writer = copy.last_writer.as_deref();
                    if !db::update_document(&mut *tx, &copy.document, base_version, writer).await? {
                        return Err(AppError::Internal(format!(
                            "document {id} changed while locked"
                        )));
                    }
                    let snapshot = VersionSnapshot::of(&copy.document, copy.last_writer.clone());
                    db::insert_snapshot(&mut *tx, &snapshot).await?;
                    db::prune_snapshots(&mut *tx, &id, *retention).await?;
                }
                tx.commit().await?;
                Ok(response)
            }
            Repository::Memory(memory) => memory.save(request, now),
        }
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let deleted = match self {
            Repository::Postgres { pool, .. } => db::delete_document(pool, id).await?,
            Repository::Memory(memory) => memory.delete(id),
        };
        if deleted {
            Ok(())
        } else {
            Err(not_found(id))
        }
    }

    /// Snapshot the current version; recording it twice changes nothing.
    pub async fn record_snapshot(&self, id: &str) -> Result<SnapshotInfo> {
        match self {
            Repository::Postgres { pool, retention } => {
                let mut tx = pool.begin().await?;
                let row = db::lock_document(&mut *tx, id)
                    .await?
                    .ok_or_else(|| not_found(id))?;
                let copy = row.to_remote_copy()?;
                let snapshot = VersionSnapshot::of(&copy.document, copy.last_writer);
                if db::insert_snapshot(&mut *tx, &snapshot).await? {
                    db::prune_snapshots(&mut *tx, id, *retention).await?;
                }
                tx.commit().await?;
                Ok(SnapshotInfo::from(&snapshot))
            }
            Repository::Memory(memory) => memory.record_snapshot(id),
        }
    }

    /// Snapshot metadata, newest first.
    pub async fn list_snapshots(&self, id: &str) -> Result<Vec<SnapshotInfo>> {
        match self {
            Repository::Postgres { pool, .. } => {
                if db::get_document(pool, id).await?.is_none() {
                    return Err(not_found(id));
                }
                Ok(db::list_snapshots(pool, id).await?)
            }
            Repository::Memory(memory) => memory.list_snapshots(id),
        }
    }

    pub async fn get_snapshot(&self, id: &str, version: Version) -> Result<VersionSnapshot> {
        match self {
            Repository::Postgres { pool, .. } => db::get_snapshot(pool, id, version)
                .await?
                .ok_or_else(|| not_found(&format!("{id}@{version}")))?
                .to_snapshot()
                .map_err(AppError::from),
            Repository::Memory(memory) => memory.get_snapshot(id, version),
        }
    }
}

fn not_found(id: &str) -> AppError {
    AppError::NotFound(format!("document {id}"))
}
