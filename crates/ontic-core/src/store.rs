//! The append-only record log behind the definition store.
//!
//! Every successful write to the definition store is first expressed as a
//! [`StoreRecord`] and handed to the configured [`PersistenceAdapter`]. Loading
//! replays the records in order, which rebuilds identical in-memory state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  definition::{
    AttributeDefinition, Deprecation, EntityConstraintDefinition,
    MetricDefinition, ObjectTypeDefinition, OntologyVersion,
    RelationshipTypeDefinition,
  },
  error::BoxError,
  ids::{OntologyVersionId, TenantId},
};

// ─── Records ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum StoreRecord {
  VersionCreated(OntologyVersion),
  ObjectTypeCreated(ObjectTypeDefinition),
  AttributeCreated(AttributeDefinition),
  RelationshipTypeCreated(RelationshipTypeDefinition),
  MetricCreated(MetricDefinition),
  ConstraintCreated(EntityConstraintDefinition),
  Deprecated(Deprecation),
  VersionActivated {
    tenant:     TenantId,
    version_id: OntologyVersionId,
    at:         DateTime<Utc>,
  },
  VersionArchived {
    tenant:     TenantId,
    version_id: OntologyVersionId,
    at:         DateTime<Utc>,
  },
}

impl StoreRecord {
  /// Stable discriminant string, stored alongside the payload.
  pub fn kind(&self) -> &'static str {
    match self {
      StoreRecord::VersionCreated(_) => "version_created",
      StoreRecord::ObjectTypeCreated(_) => "object_type_created",
      StoreRecord::AttributeCreated(_) => "attribute_created",
      StoreRecord::RelationshipTypeCreated(_) => "relationship_type_created",
      StoreRecord::MetricCreated(_) => "metric_created",
      StoreRecord::ConstraintCreated(_) => "constraint_created",
      StoreRecord::Deprecated(_) => "deprecated",
      StoreRecord::VersionActivated { .. } => "version_activated",
      StoreRecord::VersionArchived { .. } => "version_archived",
    }
  }

  /// The version this record belongs to.
  pub fn version_id(&self) -> OntologyVersionId {
    match self {
      StoreRecord::VersionCreated(v) => v.id,
      StoreRecord::ObjectTypeCreated(d) => d.version_id,
      StoreRecord::AttributeCreated(d) => d.version_id,
      StoreRecord::RelationshipTypeCreated(d) => d.version_id,
      StoreRecord::MetricCreated(d) => d.version_id,
      StoreRecord::ConstraintCreated(d) => d.version_id,
      StoreRecord::Deprecated(d) => d.version_id,
      StoreRecord::VersionActivated { version_id, .. }
      | StoreRecord::VersionArchived { version_id, .. } => *version_id,
    }
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Durable backing for the definition store.
///
/// Implementations must preserve append order: `load` returns every record
/// previously passed to `append`, oldest first.
pub trait PersistenceAdapter: Send + Sync {
  fn append(&self, record: &StoreRecord) -> Result<(), BoxError>;

  fn load(&self) -> Result<Vec<StoreRecord>, BoxError>;
}

// ─── Domain events ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainEventKind {
  OntologyActivated {
    tenant:              TenantId,
    version_id:          OntologyVersionId,
    previous_version_id: Option<OntologyVersionId>,
  },
}

/// Emitted by the definition store for downstream consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEvent {
  pub event_id:    Uuid,
  pub occurred_at: DateTime<Utc>,
  #[serde(flatten)]
  pub kind:        DomainEventKind,
}
