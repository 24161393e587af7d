//! Version history kept by the remote.
//!
//! Every accepted write is copied into a [`SnapshotLog`]. The log is
//! append-only with capped retention: once it holds more than `retention`
//! entries the oldest are dropped. Versions in the log are unique and strictly
//! increasing.

use crate::{Document, Timestamp, Version, WriterId};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Number of snapshots kept per document unless configured otherwise.
pub const DEFAULT_RETENTION: usize = 10;

/// A full copy of the document at an accepted version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSnapshot {
    pub version: Version,
    pub timestamp: Timestamp,
    pub saved_by: Option<WriterId>,
    pub document: Document,
}

impl VersionSnapshot {
    /// Snapshot an accepted document, using its own mark.
    pub fn of(document: &Document, saved_by: Option<WriterId>) -> Self {
        Self {
            version: document.version,
            timestamp: document.updated_at,
            saved_by,
            document: document.clone(),
        }
    }
}

/// Metadata about a snapshot (without the document).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotInfo {
    pub version: Version,
    pub timestamp: Timestamp,
    pub saved_by: Option<WriterId>,
}

impl From<&VersionSnapshot> for SnapshotInfo {
    fn from(snapshot: &VersionSnapshot) -> Self {
        Self {
            version: snapshot.version,
            timestamp: snapshot.timestamp,
            saved_by: snapshot.saved_by.clone(),
        }
    }
}

/// Bounded history of accepted versions for one document.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotLog {
    retention: usize,
    /// Oldest first
    entries: VecDeque<VersionSnapshot>,
}

impl SnapshotLog {
    /// Create an empty log keeping at most `retention` snapshots (at least one).
    pub fn new(retention: usize) -> Self {
        let retention = retention.max(1);
        Self {
            retention,
            entries: VecDeque::with_capacity(retention + 1),
        }
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Append a snapshot and evict beyond retention.
    ///
    /// Returns `false` (and records nothing) if the version is not newer than
    /// the latest one already recorded.
    pub fn record(&mut self, snapshot: VersionSnapshot) -> bool {
        if let Some(latest) = self.entries.back() {
            if snapshot.version <= latest.version {
                return false;
            }
        }
        self.entries.push_back(snapshot);
        while self.entries.len() > self.retention {
            self.entries.pop_front();
        }
        true
    }

    /// Snapshot metadata, newest first.
    pub fn list(&self) -> Vec<SnapshotInfo> {
        self.entries.iter().rev().map(SnapshotInfo::from).collect()
    }

    pub fn get(&self, version: Version) -> Option<&VersionSnapshot> {
        self.entries.iter().find(|s| s.version == version)
    }

    pub fn latest(&self) -> Option<&VersionSnapshot> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SnapshotLog {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}
