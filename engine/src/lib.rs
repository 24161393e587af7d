//! # Storysync Engine
//!
//! The deterministic core of story-project autosave.
//!
//! A single writer edits a structured document while a background session
//! keeps persisting it to a remote store. This crate holds the logic that
//! keeps the in-memory document consistent with the remote copy: when to
//! save, how the remote decides whether a save is stale, and how a stale save
//! is resolved.
//!
//! ## Design Principles
//!
//! - **No IO**: Engine has no knowledge of files, network, timers or clocks
//! - **Deterministic**: Same inputs always produce same outputs; `now` is
//!   always an argument
//! - **Immutable snapshots**: Mutations produce new document values
//!
//! ## Core Concepts
//!
//! ### Document Store
//!
//! [`DocumentStore`] holds the current [`Document`], a dirty flag and the last
//! [`RemoteMark`] (timestamp + version) the remote accepted. Marks always come
//! from the remote, never from the client clock.
//!
//! ### Save Scheduler
//!
//! [`SaveScheduler`] debounces saves after each mutation and bounds staleness
//! with a ceiling deadline that is armed once per dirty period. Host events
//! (tab hidden, blur, unload) flush immediately.
//!
//! ### Optimistic concurrency
//!
//! A [`SaveRequest`] carries the version it was based on. [`RemoteCopy`]
//! accepts it only if that is still the current version, assigning
//! `version + 1` and its own timestamp.
//!
//! ### Conflict resolution
//!
//! [`ConflictResolver`] turns a rejected save into a single document using
//! [`ResolutionStrategy::KeepLocal`], [`ResolutionStrategy::KeepRemote`] or
//! [`ResolutionStrategy::Merge`].
//!
//! ## Quick Start
//!
//! ```rust
//! use storysync_engine::{
//!     CollectionKind, Document, DocumentStore, Entity, RemoteCopy, SaveRequest,
//!     SaveResponse, SaveScheduler, SaveTrigger, Deadline,
//! };
//! use chrono::{TimeZone, Utc};
//!
//! let created = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
//! let mut remote = RemoteCopy::new(Document::new_empty("p-1", "Draft", created), None);
//!
//! // 1. Load the remote document into a session-owned store
//! let mut store = DocumentStore::with_document(remote.document.clone());
//! let mut scheduler = SaveScheduler::default();
//!
//! // 2. Mutate; the scheduler arms its deadlines
//! store
//!     .apply_mutation(|doc| doc.upsert_entity(CollectionKind::Characters, Entity::new("c1", created)))
//!     .unwrap();
//! scheduler.on_mutation(0);
//!
//! // 3. The debounce deadline fires and a save is attempted
//! assert_eq!(scheduler.poll(2_000), Some(SaveTrigger::Deadline(Deadline::Debounce)));
//! let ticket = store.begin_save().unwrap().unwrap();
//! let request = SaveRequest::new((**ticket.document()).clone(), ticket.base());
//!
//! // 4. The remote accepts and the store is marked clean with its values
//! let now = Utc.timestamp_opt(1_700_000_010, 0).unwrap();
//! match remote.commit(request, now).unwrap() {
//!     SaveResponse::Accepted(accepted) => {
//!         store.mark_clean(ticket, accepted.timestamp, accepted.version).unwrap();
//!     }
//!     SaveResponse::Conflict(_) => unreachable!(),
//! }
//! assert!(!store.is_dirty());
//! assert_eq!(store.snapshot().unwrap().version, 2);
//! ```

pub mod commit;
pub mod document;
pub mod error;
pub mod protocol;
pub mod resolve;
pub mod scheduler;
pub mod snapshot;
pub mod store;

// Re-export main types at crate root
pub use commit::{RemoteCopy, RemoteSlot};
pub use document::{CollectionKind, Document, Entity, INITIAL_VERSION};
pub use error::Error;
pub use protocol::{
    Conflict, ConflictReport, SaveAccepted, SaveOutcome, SaveRequest, SaveResponse,
};
pub use resolve::{
    merge_collection, ConflictResolver, MergeReport, Resolution, ResolutionStrategy,
    ScalarPolicy,
};
pub use scheduler::{
    Deadline, FlushReason, SaveFinish, SaveScheduler, SaveTrigger, SchedulerConfig,
    SchedulerPhase, DEFAULT_DEBOUNCE_MS, DEFAULT_MAX_INTERVAL_MS,
};
pub use snapshot::{SnapshotInfo, SnapshotLog, VersionSnapshot, DEFAULT_RETENTION};
pub use store::{DocumentStore, RemoteMark, SaveTicket};

/// Type aliases for clarity
pub type DocumentId = String;
pub type EntityId = String;
pub type WriterId = String;
pub type Version = u64;
/// Wall-clock time assigned by the remote
pub type Timestamp = chrono::DateTime<chrono::Utc>;
/// Milliseconds on the session's monotonic timeline
pub type Millis = u64;
