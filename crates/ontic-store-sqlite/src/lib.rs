//! SQLite backend for the ontology definition store.
//!
//! Persists the store's append-only record log in a single SQLite file. The
//! engine never depends on this crate; it only sees a
//! [`PersistenceAdapter`](ontic_core::store::PersistenceAdapter).

mod encode;
mod log;
mod schema;

pub mod error;

pub use encode::LogEntry;
pub use error::{Error, Result};
pub use log::SqliteRecordLog;

#[cfg(test)]
mod tests;
