//! Core types and trait definitions for the Ontic ontology engine.
//!
//! This crate holds the data model (versions, definitions, snapshots,
//! scenarios, decisions) and the seams other crates plug into: the
//! [`store::PersistenceAdapter`] record log and the [`truth::EntityTruthStore`]
//! live-entity backend. It carries no storage or validation logic of its own.

pub mod decision;
pub mod definition;
pub mod error;
pub mod ids;
pub mod scenario;
pub mod snapshot;
pub mod store;
pub mod truth;

pub use error::{Error, Result};
