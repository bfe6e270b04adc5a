//! SQLite persistence for Herald.
//!
//! Holds the posting identity, the append-only post ledger, and the
//! long-term memory table searched by embedding similarity.

mod db;
mod error;
mod memory;

pub use db::{Store, StoreSession};
pub use error::StoreError;
pub use memory::{DEFAULT_RETRIEVE_LIMIT, SqliteMemory, cosine_similarity};
