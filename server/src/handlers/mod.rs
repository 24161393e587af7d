//! Request handlers for documents and their history.

mod documents;
mod snapshots;

pub use documents::*;
pub use snapshots::*;
