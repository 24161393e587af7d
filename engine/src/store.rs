//! Store - the in-memory document container.
//!
//! The Store holds the current document, the dirty flag and the last remote
//! mark (timestamp and version) known to be accepted. It is owned by one
//! editing session and never shared.

use crate::{error::Result, Document, Error, Timestamp, Version};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A `(timestamp, version)` pair assigned by the remote to an accepted write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMark {
    pub timestamp: Timestamp,
    pub version: Version,
}

impl RemoteMark {
    pub fn new(timestamp: Timestamp, version: Version) -> Self {
        Self { timestamp, version }
    }

    /// The mark a document currently carries.
    pub fn of(document: &Document) -> Self {
        Self {
            timestamp: document.updated_at,
            version: document.version,
        }
    }
}

/// Issued by [`DocumentStore::begin_save`] and handed back when the attempt
/// finishes.
///
/// Remembers the mutation revision the attempt was based on so that edits
/// made while the request was in flight are not marked clean by its result.
#[derive(Debug, Clone)]
pub struct SaveTicket {
    revision: u64,
    base: RemoteMark,
    document: Arc<Document>,
}

impl SaveTicket {
    /// The document value being saved.
    pub fn document(&self) -> &Arc<Document> {
        &self.document
    }

    /// The remote mark the save is conditioned on.
    pub fn base(&self) -> RemoteMark {
        self.base
    }

    /// Store revision at the time the ticket was issued.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// The in-memory document and its sync bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    document: Option<Arc<Document>>,
    dirty: bool,
    last_known: Option<RemoteMark>,
    saving: bool,
    /// Bumped on every mutation
    revision: u64,
}

impl DocumentStore {
    /// Create a store with no document loaded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding a document fetched from the remote.
    pub fn with_document(document: Document) -> Self {
        let mut store = Self::new();
        store.load(document);
        store
    }

    /// Replace the store contents with a freshly fetched remote document.
    ///
    /// The store is clean afterwards, based on the document's own mark.
    pub fn load(&mut self, document: Document) {
        self.last_known = Some(RemoteMark::of(&document));
        self.document = Some(Arc::new(document));
        self.dirty = false;
        self.saving = false;
        self.revision += 1;
    }

    /// The current document, if one is loaded.
    pub fn document(&self) -> Option<&Arc<Document>> {
        self.document.as_ref()
    }

    /// A cheap handle to the current document.
    pub fn snapshot(&self) -> Result<Arc<Document>> {
        self.document.clone().ok_or(Error::NoDocumentLoaded)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    /// The last mark the remote is known to have accepted.
    pub fn last_known(&self) -> Option<RemoteMark> {
        self.last_known
    }

    /// Mutation generation counter.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Replace the document with `mutate(current)` and mark the store dirty.
    ///
    /// Returns the new document value.
    pub fn apply_mutation<F>(&mut self, mutate: F) -> Result<Arc<Document>>
    where
        F: FnOnce(&Document) -> Document,
    {
        let current = self.document.as_ref().ok_or(Error::NoDocumentLoaded)?;
        let next = mutate(current);
        if next.id != current.id {
            return Err(Error::DocumentMismatch {
                expected: current.id.clone(),
                actual: next.id,
            });
        }

        let next = Arc::new(next);
        self.document = Some(next.clone());
        self.dirty = true;
        self.revision += 1;
        Ok(next)
    }

    /// Flag the document as needing a save without changing it.
    pub fn mark_dirty(&mut self) -> Result<()> {
        if self.document.is_none() {
            return Err(Error::NoDocumentLoaded);
        }
        self.dirty = true;
        self.revision += 1;
        Ok(())
    }

    /// Start a save attempt.
    ///
    /// Returns `Ok(None)` when the store is clean: there is nothing to send.
    pub fn begin_save(&mut self) -> Result<Option<SaveTicket>> {
        let document = self.document.clone().ok_or(Error::NoDocumentLoaded)?;
        if self.saving {
            return Err(Error::SaveInFlight);
        }
        if !self.dirty {
            return Ok(None);
        }
        let base = self.last_known.ok_or(Error::NoDocumentLoaded)?;

        self.saving = true;
        Ok(Some(SaveTicket {
            revision: self.revision,
            base,
            document,
        }))
    }

    /// Record a save the remote accepted, using the remote's own mark.
    ///
    /// The dirty flag is cleared only if nothing was mutated since the ticket
    /// was issued. Otherwise the new mark becomes the base for the next save
    /// and the store stays dirty.
    pub fn mark_clean(
        &mut self,
        ticket: SaveTicket,
        timestamp: Timestamp,
        version: Version,
    ) -> Result<()> {
        if !self.saving {
            return Err(Error::NoSaveInFlight);
        }
        let current = self.document.as_ref().ok_or(Error::NoDocumentLoaded)?;
        if version <= ticket.base.version {
            self.saving = false;
            return Err(Error::VersionRegression {
                known: ticket.base.version,
                actual: version,
            });
        }

        let stamped = if self.revision == ticket.revision {
            self.dirty = false;
            ticket.document.stamped(timestamp, version)
        } else {
            current.stamped(timestamp, version)
        };
        self.document = Some(Arc::new(stamped));
        self.last_known = Some(RemoteMark::new(timestamp, version));
        self.saving = false;
        Ok(())
    }

    /// Give up on an attempt that failed or conflicted. Local edits and the
    /// dirty flag are kept.
    pub fn abandon_save(&mut self, _ticket: SaveTicket) {
        self.saving = false;
    }

    /// Discard local edits and take the remote document wholesale.
    ///
    /// No write follows: the store is clean at the remote's own mark.
    pub fn adopt_remote(&mut self, document: Document) -> Result<()> {
        self.check_resolution(&document)?;
        self.load(document);
        Ok(())
    }

    /// Install a resolved document that still has to be saved against `base`.
    pub fn replace_resolved(&mut self, document: Document, base: RemoteMark) -> Result<()> {
        self.check_resolution(&document)?;
        self.document = Some(Arc::new(document));
        self.last_known = Some(base);
        self.dirty = true;
        self.revision += 1;
        Ok(())
    }

    fn check_resolution(&self, document: &Document) -> Result<()> {
        if self.saving {
            return Err(Error::SaveInFlight);
        }
        let current = self.document.as_ref().ok_or(Error::NoDocumentLoaded)?;
        if current.id != document.id {
            return Err(Error::DocumentMismatch {
                expected: current.id.clone(),
                actual: document.id.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CollectionKind, Entity};
    use chrono::{TimeZone, Utc};

    fn ts(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn loaded() -> DocumentStore {
        DocumentStore::with_document(Document::new_empty("p-1", "Draft", ts(100)))
    }

    fn add_scene(doc: &Document) -> Document {
        doc.upsert_entity(CollectionKind::Scenes, Entity::new("s1", ts(101)))
    }

    #[test]
    fn loaded_store_is_clean_at_document_mark() {
        let store = loaded();
        assert!(!store.is_dirty());
        assert_eq!(store.last_known(), Some(RemoteMark::new(ts(100), 1)));
    }

    #[test]
    fn mutation_produces_new_value_and_marks_dirty() {
        let mut store = loaded();
        let before = store.snapshot().unwrap();
        let after = store.apply_mutation(add_scene).unwrap();

        assert!(store.is_dirty());
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(before.scenes.is_empty());
        assert_eq!(after.scenes.len(), 1);
    }

    #[test]
    fn mutation_without_document_fails() {
        let mut store = DocumentStore::new();
        assert_eq!(
            store.apply_mutation(add_scene).unwrap_err(),
            Error::NoDocumentLoaded
        );
        assert_eq!(store.begin_save().unwrap_err(), Error::NoDocumentLoaded);
    }

    #[test]
    fn mutation_cannot_change_document_id() {
        let mut store = loaded();
        let err = store
            .apply_mutation(|doc| Document::new_empty("other", "x", doc.updated_at))
            .unwrap_err();
        assert!(matches!(err, Error::DocumentMismatch { .. }));
        assert!(!store.is_dirty());
    }

    #[test]
    fn mark_dirty_is_idempotent() {
        let mut store = loaded();
        store.mark_dirty().unwrap();
        store.mark_dirty().unwrap();
        assert!(store.is_dirty());
        let ticket = store.begin_save().unwrap().unwrap();
        assert_eq!(ticket.base().version, 1);
    }

    #[test]
    fn clean_store_has_nothing_to_save() {
        let mut store = loaded();
        assert!(store.begin_save().unwrap().is_none());
        assert!(!store.is_saving());
    }

    #[test]
    fn only_one_save_in_flight() {
        let mut store = loaded();
        store.apply_mutation(add_scene).unwrap();
        let _ticket = store.begin_save().unwrap().unwrap();
        assert_eq!(store.begin_save().unwrap_err(), Error::SaveInFlight);
    }

    #[test]
    fn mark_clean_stamps_server_values() {
        let mut store = loaded();
        store.apply_mutation(add_scene).unwrap();
        let ticket = store.begin_save().unwrap().unwrap();
        store.mark_clean(ticket, ts(200), 2).unwrap();

        assert!(!store.is_dirty());
        assert!(!store.is_saving());
        let doc = store.snapshot().unwrap();
        assert_eq!(doc.version, 2);
        assert_eq!(doc.updated_at, ts(200));
        assert_eq!(store.last_known(), Some(RemoteMark::new(ts(200), 2)));
    }

    #[test]
    fn mutation_during_flight_keeps_store_dirty() {
        let mut store = loaded();
        store.apply_mutation(add_scene).unwrap();
        let ticket = store.begin_save().unwrap().unwrap();

        store
            .apply_mutation(|doc| doc.upsert_entity(CollectionKind::Notes, Entity::new("n1", ts(102))))
            .unwrap();
        store.mark_clean(ticket, ts(200), 2).unwrap();

        assert!(store.is_dirty());
        let doc = store.snapshot().unwrap();
        assert_eq!(doc.notes.len(), 1);
        assert_eq!(doc.version, 2);

        let next = store.begin_save().unwrap().unwrap();
        assert_eq!(next.base(), RemoteMark::new(ts(200), 2));
    }

    #[test]
    fn abandoned_save_keeps_edits() {
        let mut store = loaded();
        store.apply_mutation(add_scene).unwrap();
        let ticket = store.begin_save().unwrap().unwrap();
        store.abandon_save(ticket);

        assert!(store.is_dirty());
        assert!(!store.is_saving());
        assert_eq!(store.snapshot().unwrap().scenes.len(), 1);
        assert_eq!(store.last_known().unwrap().version, 1);
    }

    #[test]
    fn mark_clean_rejects_version_regression() {
        let mut store = loaded();
        store.apply_mutation(add_scene).unwrap();
        let ticket = store.begin_save().unwrap().unwrap();
        let err = store.mark_clean(ticket, ts(200), 1).unwrap_err();
        assert_eq!(err, Error::VersionRegression { known: 1, actual: 1 });
        assert!(!store.is_saving());
        assert!(store.is_dirty());
    }

    #[test]
    fn adopt_remote_discards_local_edits() {
        let mut store = loaded();
        store.apply_mutation(add_scene).unwrap();

        let remote = Document::new_empty("p-1", "Remote title", ts(300)).stamped(ts(300), 5);
        store.adopt_remote(remote).unwrap();

        assert!(!store.is_dirty());
        let doc = store.snapshot().unwrap();
        assert_eq!(doc.title, "Remote title");
        assert!(doc.scenes.is_empty());
        assert_eq!(store.last_known(), Some(RemoteMark::new(ts(300), 5)));
    }

    #[test]
    fn replace_resolved_rebases_and_stays_dirty() {
        let mut store = loaded();
        let resolved = Document::new_empty("p-1", "Merged", ts(400)).stamped(ts(400), 6);
        store
            .replace_resolved(resolved, RemoteMark::new(ts(300), 5))
            .unwrap();

        assert!(store.is_dirty());
        let ticket = store.begin_save().unwrap().unwrap();
        assert_eq!(ticket.base().version, 5);
        assert_eq!(ticket.document().title, "Merged");
    }

    #[test]
    fn resolution_for_other_document_is_rejected() {
        let mut store = loaded();
        let foreign = Document::new_empty("p-2", "Other", ts(0));
        assert!(matches!(
            store.adopt_remote(foreign),
            Err(Error::DocumentMismatch { .. })
        ));
    }
}
