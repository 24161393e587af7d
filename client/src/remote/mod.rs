//! Remote store abstraction.
//!
//! The session never talks HTTP directly. It goes through [`RemoteStore`],
//! which has an HTTP implementation for real deployments and an in-process
//! one for tests and offline tooling.

mod http;
mod memory;

pub use http::HttpRemote;
pub use memory::MemoryRemote;

use crate::error::RemoteResult;
use std::future::Future;
use storysync_engine::{Document, SaveRequest, SaveResponse, SnapshotInfo, Version, VersionSnapshot};

/// The authoritative copy of each document and its version history.
///
/// A conflicting save is a normal [`SaveResponse::Conflict`], not an error.
pub trait RemoteStore: Send + Sync + 'static {
    /// Fetch the current document.
    fn get_document(&self, id: &str) -> impl Future<Output = RemoteResult<Document>> + Send;

    /// Create a document; the remote assigns version 1 and its own timestamp.
    fn create_document(
        &self,
        document: &Document,
    ) -> impl Future<Output = RemoteResult<Document>> + Send;

    /// Conditional write.
    fn put_document(
        &self,
        request: &SaveRequest,
    ) -> impl Future<Output = RemoteResult<SaveResponse>> + Send;

    /// Snapshot the current version. Recording a version twice is a no-op.
    fn record_snapshot(&self, id: &str)
        -> impl Future<Output = RemoteResult<SnapshotInfo>> + Send;

    /// Snapshot metadata, newest first.
    fn list_snapshots(
        &self,
        id: &str,
    ) -> impl Future<Output = RemoteResult<Vec<SnapshotInfo>>> + Send;

    /// One retained snapshot.
    fn get_snapshot(
        &self,
        id: &str,
        version: Version,
    ) -> impl Future<Output = RemoteResult<VersionSnapshot>> + Send;
}
