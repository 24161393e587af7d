//! # Storysync Client
//!
//! Runtime side of story-project autosave. Wraps the pure
//! [`storysync_engine`] state machines with timers, a remote store and a task
//! that owns the document for one editing view.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use storysync_client::{HttpRemote, Session, SessionConfig};
//! use storysync_engine::{CollectionKind, Entity};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let remote = Arc::new(HttpRemote::new("http://localhost:3000"));
//! let config = SessionConfig::from_env()?;
//! let (session, handle) = Session::open(remote, "project-1", &config).await?;
//! let running = tokio::spawn(session.run());
//!
//! handle
//!     .mutate(|doc| doc.upsert_entity(CollectionKind::Notes, Entity::new("n1", doc.updated_at)))
//!     .await?;
//! handle.tab_hidden()?;
//!
//! handle.page_unloading()?;
//! let exit = running.await?;
//! if let Some(last_save) = exit.detached {
//!     last_save.await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod remote;
pub mod session;
pub mod sync;

pub use config::{ConfigError, ConflictPolicy, SessionConfig};
pub use error::{RemoteError, RemoteResult, SessionError};
pub use remote::{HttpRemote, MemoryRemote, RemoteStore};
pub use session::{Mutation, SaveStatus, Session, SessionEvent, SessionExit, SessionHandle};
pub use sync::SyncClient;
