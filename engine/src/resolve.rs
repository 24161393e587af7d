//! Conflict resolution.
//!
//! When a save is rejected the session holds a local document that diverged
//! from the remote one. This module turns that pair into a single document,
//! deterministically.
//!
//! # Strategies
//!
//! - [`ResolutionStrategy::KeepLocal`]: write the local document over the
//!   remote one.
//! - [`ResolutionStrategy::KeepRemote`]: discard local edits, no write.
//! - [`ResolutionStrategy::Merge`]: union every entity collection by id; when
//!   both sides hold an id, the entity with the later `updated_at` wins and
//!   ties go to the local copy. Document-level scalars follow
//!   [`ScalarPolicy`].
//!
//! Every strategy that writes bases the save on the remote's version, so a
//! cycle of conflicts always targets a strictly higher version.

use crate::{CollectionKind, Conflict, Document, Entity, RemoteMark, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Which side a conflict resolution favours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionStrategy {
    KeepLocal,
    KeepRemote,
    /// Per-entity last writer wins (default)
    #[default]
    Merge,
}

/// How `title`, `description`, `genre` and `settings` are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScalarPolicy {
    /// The active session's value wins whenever it differs (default)
    #[default]
    PreferLocal,
    PreferRemote,
}

/// What the session should do with a resolved conflict.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Save `document` conditioned on `base`.
    Save { document: Document, base: RemoteMark },
    /// Take `document` as the clean state; nothing is written.
    Adopt { document: Document },
}

impl Resolution {
    pub fn document(&self) -> &Document {
        match self {
            Resolution::Save { document, .. } | Resolution::Adopt { document } => document,
        }
    }
}

/// Counters describing a structural merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    /// Shared ids where the local entity was kept
    pub local_wins: usize,
    /// Shared ids where the remote entity was kept
    pub remote_wins: usize,
    /// Ids present only locally
    pub local_only: usize,
    /// Ids present only remotely
    pub remote_only: usize,
}

impl MergeReport {
    fn absorb(&mut self, other: MergeReport) {
        self.local_wins += other.local_wins;
        self.remote_wins += other.remote_wins;
        self.local_only += other.local_only;
        self.remote_only += other.remote_only;
    }
}

/// Produces resolved documents from conflicts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver {
    scalar_policy: ScalarPolicy,
}

impl ConflictResolver {
    pub fn new(scalar_policy: ScalarPolicy) -> Self {
        Self { scalar_policy }
    }

    pub fn scalar_policy(&self) -> ScalarPolicy {
        self.scalar_policy
    }

    /// Resolve `conflict` with `strategy`.
    ///
    /// `now` stamps documents that will be written; the remote replaces that
    /// stamp with its own on acceptance.
    pub fn resolve(
        &self,
        conflict: &Conflict,
        strategy: ResolutionStrategy,
        now: Timestamp,
    ) -> Resolution {
        let base = conflict.remote_mark();
        let next_version = conflict.remote_document.version + 1;

        match strategy {
            ResolutionStrategy::KeepLocal => Resolution::Save {
                document: conflict.local_document.stamped(now, next_version),
                base,
            },
            ResolutionStrategy::KeepRemote => Resolution::Adopt {
                document: conflict.remote_document.clone(),
            },
            ResolutionStrategy::Merge => {
                let (merged, _) =
                    self.merge(&conflict.local_document, &conflict.remote_document);
                Resolution::Save {
                    document: merged.stamped(now, next_version),
                    base,
                }
            }
        }
    }

    /// Structural merge of two versions of the same document.
    ///
    /// The result keeps the remote's `updated_at` and `version`; callers stamp
    /// it before saving.
    pub fn merge(&self, local: &Document, remote: &Document) -> (Document, MergeReport) {
        let mut merged = remote.clone();
        let mut report = MergeReport::default();

        if self.scalar_policy == ScalarPolicy::PreferLocal {
            merged.title = local.title.clone();
            merged.description = local.description.clone();
            merged.genre = local.genre.clone();
            merged.settings = local.settings.clone();
        }

        for kind in CollectionKind::ALL {
            let (entities, collection_report) =
                merge_collection(local.collection(kind), remote.collection(kind));
            *merged.collection_mut(kind) = entities;
            report.absorb(collection_report);
        }

        (merged, report)
    }
}

/// Union two entity lists by id.
///
/// Local order is kept, with remote-only entities appended in remote order.
/// If an id repeats within one side, its first occurrence is used.
pub fn merge_collection(local: &[Entity], remote: &[Entity]) -> (Vec<Entity>, MergeReport) {
    let mut report = MergeReport::default();

    let mut remote_by_id: HashMap<&str, &Entity> = HashMap::with_capacity(remote.len());
    for entity in remote {
        remote_by_id.entry(entity.id.as_str()).or_insert(entity);
    }

    let mut seen: HashSet<&str> = HashSet::with_capacity(local.len() + remote.len());
    let mut merged = Vec::with_capacity(local.len().max(remote.len()));

    for entity in local {
        if !seen.insert(entity.id.as_str()) {
            continue;
        }
        match remote_by_id.get(entity.id.as_str()) {
            Some(theirs) if theirs.updated_at > entity.updated_at => {
                report.remote_wins += 1;
                merged.push((*theirs).clone());
            }
            Some(_) => {
                report.local_wins += 1;
                merged.push(entity.clone());
            }
            None => {
                report.local_only += 1;
                merged.push(entity.clone());
            }
        }
    }

    for entity in remote {
        if seen.insert(entity.id.as_str()) {
            report.remote_only += 1;
            merged.push(entity.clone());
        }
    }

    (merged, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConflictReport;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn ts(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn entity(id: &str, at: i64, name: &str) -> Entity {
        Entity::new(id, ts(at)).with_field("name", json!(name))
    }

    fn base() -> Document {
        Document::new_empty("p-1", "Draft", ts(0))
    }

    fn conflict(local: Document, remote: Document) -> Conflict {
        let remote_timestamp = remote.updated_at;
        Conflict::new(
            local,
            ConflictReport {
                remote_document: remote,
                remote_timestamp,
                remote_writer: None,
            },
        )
    }

    #[test]
    fn newer_entity_wins_and_one_sided_ids_survive() {
        let local = base()
            .upsert_entity(CollectionKind::Characters, entity("x", 10, "local x"))
            .upsert_entity(CollectionKind::Characters, entity("y", 10, "only local"));
        let remote = base()
            .upsert_entity(CollectionKind::Characters, entity("x", 20, "remote x"))
            .upsert_entity(CollectionKind::Characters, entity("z", 5, "only remote"));

        let (merged, report) = ConflictResolver::default().merge(&local, &remote);

        let x = merged.entity(CollectionKind::Characters, "x").unwrap();
        assert_eq!(x.field("name"), Some(&json!("remote x")));
        assert!(merged.entity(CollectionKind::Characters, "y").is_some());
        assert!(merged.entity(CollectionKind::Characters, "z").is_some());
        assert_eq!(
            report,
            MergeReport {
                local_wins: 0,
                remote_wins: 1,
                local_only: 1,
                remote_only: 1
            }
        );
    }

    #[test]
    fn tie_prefers_local() {
        let local = base().upsert_entity(CollectionKind::Scenes, entity("s", 10, "mine"));
        let remote = base().upsert_entity(CollectionKind::Scenes, entity("s", 10, "theirs"));

        let (merged, _) = ConflictResolver::default().merge(&local, &remote);
        assert_eq!(
            merged.entity(CollectionKind::Scenes, "s").unwrap().field("name"),
            Some(&json!("mine"))
        );
    }

    #[test]
    fn order_is_local_then_remote_only() {
        let (merged, _) = merge_collection(
            &[entity("b", 1, ""), entity("a", 1, "")],
            &[entity("c", 1, ""), entity("a", 2, ""), entity("d", 1, "")],
        );
        let ids: Vec<_> = merged.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["b", "a", "c", "d"]);
    }

    #[test]
    fn duplicate_ids_use_first_occurrence() {
        let (merged, _) = merge_collection(
            &[entity("a", 1, "first"), entity("a", 9, "second")],
            &[],
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].field("name"), Some(&json!("first")));
    }

    #[test]
    fn scalars_prefer_local_by_default() {
        let mut local = base();
        local.title = "Local title".into();
        local.settings = json!({"wordGoal": 1000});
        let mut remote = base();
        remote.title = "Remote title".into();
        remote.genre = "Noir".into();

        let (merged, _) = ConflictResolver::default().merge(&local, &remote);
        assert_eq!(merged.title, "Local title");
        assert_eq!(merged.genre, "");
        assert_eq!(merged.settings, json!({"wordGoal": 1000}));

        let (merged, _) = ConflictResolver::new(ScalarPolicy::PreferRemote).merge(&local, &remote);
        assert_eq!(merged.title, "Remote title");
        assert_eq!(merged.genre, "Noir");
    }

    #[test]
    fn merge_resolution_targets_next_remote_version() {
        let local = base().upsert_entity(CollectionKind::Notes, entity("n", 3, "local"));
        let remote = base().stamped(ts(50), 2);

        let resolution = ConflictResolver::default().resolve(
            &conflict(local, remote),
            ResolutionStrategy::Merge,
            ts(60),
        );
        match resolution {
            Resolution::Save { document, base } => {
                assert_eq!(document.version, 3);
                assert_eq!(document.updated_at, ts(60));
                assert_eq!(document.notes.len(), 1);
                assert_eq!(base, RemoteMark::new(ts(50), 2));
            }
            other => panic!("expected save, got {other:?}"),
        }
    }

    #[test]
    fn keep_local_overwrites_on_remote_base() {
        let local = base().upsert_entity(CollectionKind::Notes, entity("n", 3, "local"));
        let remote = base()
            .upsert_entity(CollectionKind::Notes, entity("r", 40, "remote"))
            .stamped(ts(50), 7);

        let resolution = ConflictResolver::default().resolve(
            &conflict(local, remote),
            ResolutionStrategy::KeepLocal,
            ts(60),
        );
        let Resolution::Save { document, base } = resolution else {
            panic!("expected save");
        };
        assert_eq!(document.version, 8);
        assert_eq!(base.version, 7);
        let ids: Vec<_> = document.notes.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["n"]);
    }

    #[test]
    fn keep_remote_adopts_verbatim() {
        let local = base().upsert_entity(CollectionKind::Notes, entity("n", 3, "local"));
        let remote = base().stamped(ts(50), 7);

        let resolution = ConflictResolver::default().resolve(
            &conflict(local, remote.clone()),
            ResolutionStrategy::KeepRemote,
            ts(60),
        );
        assert_eq!(resolution, Resolution::Adopt { document: remote });
    }

    #[test]
    fn merge_is_deterministic() {
        let local = base()
            .upsert_entity(CollectionKind::Timeline, entity("t1", 4, "a"))
            .upsert_entity(CollectionKind::Locations, entity("l1", 9, "b"));
        let remote = base()
            .upsert_entity(CollectionKind::Timeline, entity("t1", 4, "c"))
            .upsert_entity(CollectionKind::Plotlines, entity("p1", 2, "d"));

        let resolver = ConflictResolver::default();
        assert_eq!(resolver.merge(&local, &remote), resolver.merge(&local, &remote));
    }
}
