//! Database module for PostgreSQL persistence.

mod documents;
mod pool;
mod snapshots;

pub use documents::*;
pub use pool::*;
pub use snapshots::*;
