//! Error types for `ontic-core`.

use thiserror::Error;

use crate::{
  definition::VersionStatus,
  ids::{
    AttributeId, ConstraintId, DecisionId, EntityId, MetricId, ObjectTypeId,
    OntologyVersionId, RelationshipTypeId, ScenarioId, TenantId,
  },
  scenario::ScenarioStatus,
};

/// Boxed error returned by pluggable backends (persistence, entity truth).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
  // ── Versions ──────────────────────────────────────────────────────────
  #[error("ontology version {0} not found")]
  VersionNotFound(OntologyVersionId),

  #[error("no active ontology version for tenant {0}")]
  NoActiveVersion(TenantId),

  #[error("ontology version {0} is {1} and cannot be edited")]
  VersionNotEditable(OntologyVersionId, VersionStatus),

  #[error("ontology version {id} cannot move from {from} to {to}")]
  InvalidTransition {
    id:   OntologyVersionId,
    from: VersionStatus,
    to:   VersionStatus,
  },

  // ── Definitions ───────────────────────────────────────────────────────
  #[error("object type {0} not found in version {1}")]
  ObjectTypeNotFound(ObjectTypeId, OntologyVersionId),

  #[error("attribute {0} not found in version {1}")]
  AttributeNotFound(AttributeId, OntologyVersionId),

  #[error("relationship type {0} not found in version {1}")]
  RelationshipTypeNotFound(RelationshipTypeId, OntologyVersionId),

  #[error("metric {0} not found in version {1}")]
  MetricNotFound(MetricId, OntologyVersionId),

  #[error("constraint {0} not found in version {1}")]
  ConstraintNotFound(ConstraintId, OntologyVersionId),

  #[error("{kind} named {name:?} already exists in this scope")]
  DuplicateName { kind: &'static str, name: String },

  #[error("{0} references an element outside version {1}")]
  CrossVersionReference(String, OntologyVersionId),

  #[error("invalid pattern {pattern:?}: {reason}")]
  InvalidPattern { pattern: String, reason: String },

  #[error("definition is already deprecated")]
  AlreadyDeprecated,

  // ── Scenarios ─────────────────────────────────────────────────────────
  #[error("scenario {0} not found")]
  ScenarioNotFound(ScenarioId),

  #[error("scenario {0} is {1} and accepts no further changes")]
  ScenarioNotActive(ScenarioId, ScenarioStatus),

  #[error("scenario {0} has already been promoted")]
  AlreadyPromoted(ScenarioId),

  #[error("scenario {scenario_id} has {conflicts} unresolved conflict(s)")]
  PromotionBlocked {
    scenario_id: ScenarioId,
    conflicts:   usize,
  },

  #[error("invalid mutation payload: {0}")]
  InvalidMutationPayload(String),

  #[error("entity {0} does not exist in truth")]
  EntityNotFound(EntityId),

  // ── Decisions ─────────────────────────────────────────────────────────
  #[error("decision {0} not found")]
  DecisionNotFound(DecisionId),

  #[error("invalid decision: {0}")]
  InvalidDecision(String),

  // ── Backends ──────────────────────────────────────────────────────────
  #[error("persistence error: {0}")]
  Persistence(#[source] BoxError),

  #[error("entity truth store error: {0}")]
  Truth(#[source] BoxError),

  #[error("internal lock poisoned")]
  Poisoned,

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
