//! The remote side of optimistic concurrency.
//!
//! A [`RemoteCopy`] is the authoritative document plus its last writer. It
//! accepts a [`SaveRequest`] only when the request was based on the version it
//! currently holds (or the request forces an overwrite). Accepted writes get
//! their timestamp and version from the remote, never from the client.
//!
//! A [`RemoteSlot`] pairs that copy with its [`SnapshotLog`] so every store
//! backend records history the same way.

use crate::{
    error::Result, ConflictReport, Document, Error, SaveAccepted, SaveRequest, SaveResponse,
    SnapshotInfo, SnapshotLog, Timestamp, VersionSnapshot, WriterId,
};
use serde::{Deserialize, Serialize};

/// The remote's current copy of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCopy {
    pub document: Document,
    pub last_writer: Option<WriterId>,
}

impl RemoteCopy {
    pub fn new(document: Document, last_writer: Option<WriterId>) -> Self {
        Self {
            document,
            last_writer,
        }
    }

    /// Whether `request` passes the precondition.
    pub fn admits(&self, request: &SaveRequest) -> bool {
        request.force_overwrite || request.base_version == self.document.version
    }

    /// Decide a save attempt and, if accepted, install the new document.
    ///
    /// `now` is the remote clock. The stored timestamp never goes backwards,
    /// even if that clock does.
    pub fn commit(&mut self, request: SaveRequest, now: Timestamp) -> Result<SaveResponse> {
        if request.document.id != self.document.id {
            return Err(Error::DocumentMismatch {
                expected: self.document.id.clone(),
                actual: request.document.id,
            });
        }

        if !self.admits(&request) {
            return Ok(SaveResponse::Conflict(self.conflict_report()));
        }

        let timestamp = now.max(self.document.updated_at);
        let version = self.document.version + 1;
        self.document = request.document.stamped(timestamp, version);
        self.last_writer = request.writer;

        Ok(SaveResponse::Accepted(SaveAccepted { timestamp, version }))
    }

    /// What a rejected writer is told.
    pub fn conflict_report(&self) -> ConflictReport {
        ConflictReport {
            remote_document: self.document.clone(),
            remote_timestamp: self.document.updated_at,
            remote_writer: self.last_writer.clone(),
        }
    }
}

/// One stored document: its current copy and bounded version history.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSlot {
    copy: RemoteCopy,
    snapshots: SnapshotLog,
}

impl RemoteSlot {
    /// Store `document` as-is and record it as the first snapshot.
    pub fn new(document: Document, last_writer: Option<WriterId>, retention: usize) -> Self {
        let mut snapshots = SnapshotLog::new(retention);
        snapshots.record(VersionSnapshot::of(&document, last_writer.clone()));
        Self {
            copy: RemoteCopy::new(document, last_writer),
            snapshots,
        }
    }

    pub fn copy(&self) -> &RemoteCopy {
        &self.copy
    }

    pub fn document(&self) -> &Document {
        &self.copy.document
    }

    pub fn snapshots(&self) -> &SnapshotLog {
        &self.snapshots
    }

    /// [`RemoteCopy::commit`], snapshotting the new version on acceptance.
    pub fn commit(&mut self, request: SaveRequest, now: Timestamp) -> Result<SaveResponse> {
        let response = self.copy.commit(request, now)?;
        if let SaveResponse::Accepted(_) = response {
            let snapshot = self.current_snapshot();
            self.snapshots.record(snapshot);
        }
        Ok(response)
    }

    /// Record the current version. Already recorded versions are kept as they are.
    pub fn record_snapshot(&mut self) -> SnapshotInfo {
        let snapshot = self.current_snapshot();
        let info = SnapshotInfo::from(&snapshot);
        self.snapshots.record(snapshot);
        info
    }

    fn current_snapshot(&self) -> VersionSnapshot {
        VersionSnapshot::of(&self.copy.document, self.copy.last_writer.clone())
    }
}
