//! The story document and its entity collections.
//!
//! A [`Document`] is synchronized as a single unit. Mutations never happen in
//! place: every reducer takes `&self` and returns a new value, so callers can
//! tell "something changed" apart by identity.

use crate::{DocumentId, EntityId, Timestamp, Version};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Version assigned to a freshly created document.
pub const INITIAL_VERSION: Version = 1;

/// The nested entity collections of a story project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CollectionKind {
    Characters,
    Scenes,
    Plotlines,
    Locations,
    Notes,
    Timeline,
}

impl CollectionKind {
    /// Every collection, in document order.
    pub const ALL: [CollectionKind; 6] = [
        CollectionKind::Characters,
        CollectionKind::Scenes,
        CollectionKind::Plotlines,
        CollectionKind::Locations,
        CollectionKind::Notes,
        CollectionKind::Timeline,
    ];

    /// Wire name of the collection.
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKind::Characters => "characters",
            CollectionKind::Scenes => "scenes",
            CollectionKind::Plotlines => "plotlines",
            CollectionKind::Locations => "locations",
            CollectionKind::Notes => "notes",
            CollectionKind::Timeline => "timeline",
        }
    }
}

/// A single entity inside a collection (a character, a scene, ...).
///
/// Only `id` and `updated_at` carry meaning for synchronization; everything
/// else is opaque to the engine and kept as a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Identifier, unique within its collection
    pub id: EntityId,
    /// Last modification time of this entity
    pub updated_at: Timestamp,
    /// Free-form fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Entity {
    /// Create an entity with no fields.
    pub fn new(id: impl Into<EntityId>, updated_at: Timestamp) -> Self {
        Self {
            id: id.into(),
            updated_at,
            fields: Map::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Read a field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// The full project state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub genre: String,
    /// Project settings, opaque to the engine
    #[serde(default)]
    pub settings: Value,
    #[serde(default)]
    pub characters: Vec<Entity>,
    #[serde(default)]
    pub scenes: Vec<Entity>,
    #[serde(default)]
    pub plotlines: Vec<Entity>,
    #[serde(default)]
    pub locations: Vec<Entity>,
    #[serde(default)]
    pub notes: Vec<Entity>,
    #[serde(default)]
    pub timeline: Vec<Entity>,
    /// Time of the last accepted write, assigned by the remote
    pub updated_at: Timestamp,
    /// Incremented by exactly one on every accepted write
    pub version: Version,
}

impl Document {
    /// Create an empty project at [`INITIAL_VERSION`].
    pub fn new_empty(id: impl Into<DocumentId>, title: impl Into<String>, now: Timestamp) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            genre: String::new(),
            settings: Value::Object(Map::new()),
            characters: Vec::new(),
            scenes: Vec::new(),
            plotlines: Vec::new(),
            locations: Vec::new(),
            notes: Vec::new(),
            timeline: Vec::new(),
            updated_at: now,
            version: INITIAL_VERSION,
        }
    }

    pub fn collection(&self, kind: CollectionKind) -> &[Entity] {
        match kind {
            CollectionKind::Characters => &self.characters,
            CollectionKind::Scenes => &self.scenes,
            CollectionKind::Plotlines => &self.plotlines,
            CollectionKind::Locations => &self.locations,
            CollectionKind::Notes => &self.notes,
            CollectionKind::Timeline => &self.timeline,
        }
    }

    pub fn collection_mut(&mut self, kind: CollectionKind) -> &mut Vec<Entity> {
        match kind {
            CollectionKind::Characters => &mut self.characters,
            CollectionKind::Scenes => &mut self.scenes,
            CollectionKind::Plotlines => &mut self.plotlines,
            CollectionKind::Locations => &mut self.locations,
            CollectionKind::Notes => &mut self.notes,
            CollectionKind::Timeline => &mut self.timeline,
        }
    }

    /// Look up an entity by id.
    pub fn entity(&self, kind: CollectionKind, id: &str) -> Option<&Entity> {
        self.collection(kind).iter().find(|e| e.id == id)
    }

    /// Total number of entities across all collections.
    pub fn entity_count(&self) -> usize {
        CollectionKind::ALL
            .iter()
            .map(|kind| self.collection(*kind).len())
            .sum()
    }

    /// Return a copy with `entity` inserted, or replacing the entity with the
    /// same id in place.
    pub fn upsert_entity(&self, kind: CollectionKind, entity: Entity) -> Document {
        let mut next = self.clone();
        let collection = next.collection_mut(kind);
        match collection.iter_mut().find(|e| e.id == entity.id) {
            Some(slot) => *slot = entity,
            None => collection.push(entity),
        }
        next
    }

    /// Return a copy without the entity `id`.
    pub fn remove_entity(&self, kind: CollectionKind, id: &str) -> Document {
        let mut next = self.clone();
        next.collection_mut(kind).retain(|e| e.id != id);
        next
    }

    /// Return a copy stamped with a remote-assigned mark.
    pub fn stamped(&self, updated_at: Timestamp, version: Version) -> Document {
        let mut next = self.clone();
        next.updated_at = updated_at;
        next.version = version;
        next
    }
}
