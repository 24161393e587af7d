//! Wire types exchanged between a session and the remote store.

use crate::{Document, RemoteMark, Timestamp, Version, WriterId};
use serde::{Deserialize, Serialize};

/// A save attempt.
///
/// `base_version` is the precondition: the remote accepts only if its copy
/// is still at that version, unless `force_overwrite` is set.
/// `last_known_timestamp` travels along for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub document: Document,
    pub base_version: Version,
    pub last_known_timestamp: Timestamp,
    #[serde(default)]
    pub force_overwrite: bool,
    /// Identity of the saving session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writer: Option<WriterId>,
}

impl SaveRequest {
    /// Build a conditional save against `base`.
    pub fn new(document: Document, base: RemoteMark) -> Self {
        Self {
            document,
            base_version: base.version,
            last_known_timestamp: base.timestamp,
            force_overwrite: false,
            writer: None,
        }
    }

    pub fn with_writer(mut self, writer: impl Into<WriterId>) -> Self {
        self.writer = Some(writer.into());
        self
    }

    /// Skip the precondition check.
    pub fn forced(mut self) -> Self {
        self.force_overwrite = true;
        self
    }
}

/// Body of an accepted save: the remote's own mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveAccepted {
    pub timestamp: Timestamp,
    pub version: Version,
}

impl From<SaveAccepted> for RemoteMark {
    fn from(accepted: SaveAccepted) -> Self {
        RemoteMark::new(accepted.timestamp, accepted.version)
    }
}

/// Body of a rejected save: what the remote holds now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictReport {
    pub remote_document: Document,
    pub remote_timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_writer: Option<WriterId>,
}

/// The remote's answer to a [`SaveRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum SaveResponse {
    Accepted(SaveAccepted),
    Conflict(ConflictReport),
}

/// A detected divergence between the local and remote documents.
///
/// Held only until resolved; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub local_document: Document,
    pub remote_document: Document,
    pub remote_timestamp: Timestamp,
    pub remote_writer: Option<WriterId>,
}

impl Conflict {
    pub fn new(local_document: Document, report: ConflictReport) -> Self {
        Self {
            local_document,
            remote_document: report.remote_document,
            remote_timestamp: report.remote_timestamp,
            remote_writer: report.remote_writer,
        }
    }

    /// The mark a save resolving this conflict must be based on.
    pub fn remote_mark(&self) -> RemoteMark {
        RemoteMark::new(self.remote_timestamp, self.remote_document.version)
    }
}

/// Result of one save attempt, as seen by the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Accepted(SaveAccepted),
    Conflict(ConflictReport),
    /// Network or server failure; local state is untouched
    Failed { reason: String },
}

impl From<SaveResponse> for SaveOutcome {
    fn from(response: SaveResponse) -> Self {
        match response {
            SaveResponse::Accepted(accepted) => SaveOutcome::Accepted(accepted),
            SaveResponse::Conflict(report) => SaveOutcome::Conflict(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ts(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn request_carries_base_mark() {
        let doc = Document::new_empty("p-1", "Draft", ts(10));
        let request = SaveRequest::new(doc, RemoteMark::new(ts(10), 1)).with_writer("tab-a");
        assert_eq!(request.base_version, 1);
        assert_eq!(request.last_known_timestamp, ts(10));
        assert!(!request.force_overwrite);
        assert!(request.forced().force_overwrite);
    }

    #[test]
    fn response_is_tagged() {
        let accepted = SaveResponse::Accepted(SaveAccepted {
            timestamp: ts(20),
            version: 2,
        });
        let json = serde_json::to_value(&accepted).unwrap();
        assert_eq!(json["result"], "accepted");
        assert_eq!(json["version"], 2);

        let parsed: SaveResponse = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, accepted);
    }

    #[test]
    fn request_json_is_camel_case() {
        let doc = Document::new_empty("p-1", "Draft", ts(10));
        let json = serde_json::to_string(&SaveRequest::new(doc, RemoteMark::new(ts(10), 1))).unwrap();
        assert!(json.contains("baseVersion"));
        assert!(json.contains("lastKnownTimestamp"));
        assert!(json.contains("forceOverwrite"));
        assert!(!json.contains("writer"));
    }

    #[test]
    fn conflict_remote_mark() {
        let remote = Document::new_empty("p-1", "Draft", ts(10)).stamped(ts(30), 4);
        let conflict = Conflict::new(
            Document::new_empty("p-1", "Draft", ts(10)),
            ConflictReport {
                remote_document: remote,
                remote_timestamp: ts(30),
                remote_writer: Some("tab-b".into()),
            },
        );
        assert_eq!(conflict.remote_mark(), RemoteMark::new(ts(30), 4));
    }
}
