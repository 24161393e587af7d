//! Multi-session scenarios for storysync-engine
//!
//! Two stores share one remote copy and race their saves through the
//! optimistic precondition.

use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use storysync_engine::{
    CollectionKind, Conflict, ConflictResolver, Document, DocumentStore, Entity, RemoteCopy,
    Resolution, ResolutionStrategy, SaveOutcome, SaveRequest, SaveResponse, Timestamp,
};

fn t(secs: i64) -> Timestamp {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
}

/// Run one save attempt from `store` against `remote`.
fn save(store: &mut DocumentStore, remote: &mut RemoteCopy, writer: &str, now: Timestamp) -> SaveOutcome {
    let ticket = store.begin_save().unwrap().expect("store should be dirty");
    let request = SaveRequest::new((**ticket.document()).clone(), ticket.base()).with_writer(writer);
    match remote.commit(request, now).unwrap() {
        SaveResponse::Accepted(accepted) => {
            store
                .mark_clean(ticket, accepted.timestamp, accepted.version)
                .unwrap();
            SaveOutcome::Accepted(accepted)
        }
        SaveResponse::Conflict(report) => {
            store.abandon_save(ticket);
            SaveOutcome::Conflict(report)
        }
    }
}

fn add(kind: CollectionKind, id: &str, at: Timestamp, name: &str) -> impl FnOnce(&Document) -> Document {
    let entity = Entity::new(id, at).with_field("name", json!(name));
    move |doc: &Document| doc.upsert_entity(kind, entity)
}

// ============================================================================
// End-to-end
// ============================================================================

#[test]
fn racing_sessions_merge_to_version_three() {
    let mut remote = RemoteCopy::new(Document::new_empty("p-1", "Draft", t(0)), None);

    let mut a = DocumentStore::with_document(remote.document.clone());
    let mut b = DocumentStore::with_document(remote.document.clone());

    // A edits and saves: v2
    a.apply_mutation(add(CollectionKind::Characters, "hero", t(1), "Ada"))
        .unwrap();
    let outcome = save(&mut a, &mut remote, "session-a", t(2));
    let SaveOutcome::Accepted(v2) = outcome else {
        panic!("A should be accepted");
    };
    assert_eq!(v2.version, 2);

    // B, still on v1, edits and saves: conflict carrying v2
    b.apply_mutation(add(CollectionKind::Scenes, "opening", t(3), "Dawn"))
        .unwrap();
    let outcome = save(&mut b, &mut remote, "session-b", t(4));
    let SaveOutcome::Conflict(report) = outcome else {
        panic!("B should conflict");
    };
    assert_eq!(report.remote_document.version, 2);
    assert_eq!(report.remote_timestamp, v2.timestamp);
    assert_eq!(report.remote_writer.as_deref(), Some("session-a"));
    assert!(b.is_dirty());

    // B merges and saves on top of v2: v3
    let conflict = Conflict::new((*b.snapshot().unwrap()).clone(), report);
    let resolution = ConflictResolver::default().resolve(&conflict, ResolutionStrategy::Merge, t(5));
    let Resolution::Save { document, base } = resolution else {
        panic!("merge should save");
    };
    assert_eq!(base.version, 2);
    b.replace_resolved(document, base).unwrap();

    let ticket = b.begin_save().unwrap().unwrap();
    let request = SaveRequest::new((**ticket.document()).clone(), ticket.base());
    assert_eq!(request.base_version, 2);
    assert_eq!(request.last_known_timestamp, v2.timestamp);
    assert!(!request.force_overwrite);
    let SaveResponse::Accepted(v3) = remote.commit(request, t(6)).unwrap() else {
        panic!("merged save should be accepted");
    };
    b.mark_clean(ticket, v3.timestamp, v3.version).unwrap();

    assert_eq!(v3.version, 3);
    assert!(!b.is_dirty());
    assert!(remote.document.entity(CollectionKind::Characters, "hero").is_some());
    assert!(remote.document.entity(CollectionKind::Scenes, "opening").is_some());
}

#[test]
fn keep_remote_needs_no_write() {
    let mut remote = RemoteCopy::new(Document::new_empty("p-1", "Draft", t(0)), None);
    let mut a = DocumentStore::with_document(remote.document.clone());
    let mut b = DocumentStore::with_document(remote.document.clone());

    a.apply_mutation(add(CollectionKind::Notes, "n1", t(1), "theirs"))
        .unwrap();
    save(&mut a, &mut remote, "a", t(2));

    b.apply_mutation(add(CollectionKind::Notes, "n2", t(3), "mine"))
        .unwrap();
    let SaveOutcome::Conflict(report) = save(&mut b, &mut remote, "b", t(4)) else {
        panic!("expected conflict");
    };

    let conflict = Conflict::new((*b.snapshot().unwrap()).clone(), report);
    let resolution =
        ConflictResolver::default().resolve(&conflict, ResolutionStrategy::KeepRemote, t(5));
    let Resolution::Adopt { document } = resolution else {
        panic!("keep remote should adopt");
    };
    b.adopt_remote(document).unwrap();

    assert!(!b.is_dirty());
    assert_eq!(b.snapshot().unwrap(), a.snapshot().unwrap());
    assert_eq!(remote.document.version, 2);
}

#[test]
fn keep_local_overwrites_remote_edits() {
    let mut remote = RemoteCopy::new(Document::new_empty("p-1", "Draft", t(0)), None);
    let mut a = DocumentStore::with_document(remote.document.clone());
    let mut b = DocumentStore::with_document(remote.document.clone());

    a.apply_mutation(|doc| {
        let mut next = doc.clone();
        next.title = "A's title".into();
        next
    })
    .unwrap();
    save(&mut a, &mut remote, "a", t(2));

    b.apply_mutation(|doc| {
        let mut next = doc.clone();
        next.title = "B's title".into();
        next
    })
    .unwrap();
    let SaveOutcome::Conflict(report) = save(&mut b, &mut remote, "b", t(3)) else {
        panic!("expected conflict");
    };
    let conflict = Conflict::new((*b.snapshot().unwrap()).clone(), report);
    let Resolution::Save { document, base } =
        ConflictResolver::default().resolve(&conflict, ResolutionStrategy::KeepLocal, t(4))
    else {
        panic!("keep local should save");
    };
    b.replace_resolved(document, base).unwrap();
    let outcome = save(&mut b, &mut remote, "b", t(5));

    assert!(matches!(outcome, SaveOutcome::Accepted(accepted) if accepted.version == 3));
    assert_eq!(remote.document.title, "B's title");
}

#[test]
fn repeated_conflicts_strictly_raise_target_version() {
    let mut remote = RemoteCopy::new(Document::new_empty("p-1", "Draft", t(0)), None);
    let mut slow = DocumentStore::with_document(remote.document.clone());
    slow.apply_mutation(add(CollectionKind::Locations, "harbor", t(1), "Harbor"))
        .unwrap();

    let mut targets = Vec::new();
    for round in 0..3 {
        // another writer gets in first every time
        let mut fast = DocumentStore::with_document(remote.document.clone());
        fast.apply_mutation(add(CollectionKind::Notes, &format!("n{round}"), t(10 + round), "x"))
            .unwrap();
        save(&mut fast, &mut remote, "fast", t(20 + round));

        let SaveOutcome::Conflict(report) = save(&mut slow, &mut remote, "slow", t(30 + round)) else {
            panic!("slow writer should conflict in round {round}");
        };
        let conflict = Conflict::new((*slow.snapshot().unwrap()).clone(), report);
        let Resolution::Save { document, base } =
            ConflictResolver::default().resolve(&conflict, ResolutionStrategy::Merge, t(40 + round))
        else {
            panic!("merge should save");
        };
        targets.push(document.version);
        slow.replace_resolved(document, base).unwrap();
    }

    assert!(targets.windows(2).all(|w| w[0] < w[1]));
    let outcome = save(&mut slow, &mut remote, "slow", t(50));
    assert!(matches!(outcome, SaveOutcome::Accepted(_)));
    assert_eq!(remote.document.notes.len(), 3);
    assert_eq!(remote.document.locations.len(), 1);
}

// ============================================================================
// Version monotonicity
// ============================================================================

#[test]
fn each_accepted_save_adds_exactly_one() {
    let mut remote = RemoteCopy::new(Document::new_empty("p-1", "Draft", t(0)), None);
    let mut store = DocumentStore::with_document(remote.document.clone());

    for i in 0..5 {
        let before = store.snapshot().unwrap().version;
        store
            .apply_mutation(add(CollectionKind::Timeline, &format!("e{i}"), t(i), "event"))
            .unwrap();
        let SaveOutcome::Accepted(accepted) = save(&mut store, &mut remote, "solo", t(100 + i)) else {
            panic!("solo writer never conflicts");
        };
        assert_eq!(accepted.version, before + 1);
        assert_eq!(store.snapshot().unwrap().version, before + 1);
    }
}

#[test]
fn clean_store_issues_no_request() {
    let remote = RemoteCopy::new(Document::new_empty("p-1", "Draft", t(0)), None);
    let mut store = DocumentStore::with_document(remote.document.clone());
    assert!(store.begin_save().unwrap().is_none());
}

#[test]
fn stale_timestamp_is_a_conflict_not_an_overwrite() {
    let mut remote = RemoteCopy::new(Document::new_empty("p-1", "Draft", t(0)), None);
    let mut stale = DocumentStore::with_document(remote.document.clone());

    let mut other = DocumentStore::with_document(remote.document.clone());
    other.mark_dirty().unwrap();
    save(&mut other, &mut remote, "other", t(9));
    assert_ne!(remote.document.updated_at, stale.last_known().unwrap().timestamp);

    stale
        .apply_mutation(add(CollectionKind::Characters, "villain", t(10), "Moriarty"))
        .unwrap();
    let outcome = save(&mut stale, &mut remote, "stale", t(11));
    assert!(matches!(outcome, SaveOutcome::Conflict(_)));
    assert!(remote.document.characters.is_empty());
}
