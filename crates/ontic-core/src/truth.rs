//! The live-entity backend consulted by impact analysis and scenarios.
//!
//! Entities and their temporal history live outside this engine. The engine
//! only needs to count entities, read an entity as of a point in time, and
//! apply promoted changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
  error::BoxError,
  ids::{EntityId, LinkId, ObjectTypeId, RelationshipTypeId, ScenarioId, TenantId},
};

/// One observed version of a live entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
  pub entity_id:      EntityId,
  pub object_type_id: ObjectTypeId,
  /// Incremented by the truth store on every change.
  pub version:        u64,
  pub attributes:     Map<String, Value>,
  pub updated_at:     DateTime<Utc>,
}

impl EntityState {
  pub fn attribute(&self, name: &str) -> Value {
    self.attributes.get(name).cloned().unwrap_or(Value::Null)
  }
}

/// A change to live truth, derived from a promoted scenario mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TruthMutation {
  SetAttribute {
    entity_id: EntityId,
    attribute: String,
    value:     Value,
  },
  AddRelationship {
    relationship_type_id: RelationshipTypeId,
    source_entity_id:     EntityId,
    target_entity_id:     EntityId,
    properties:           Value,
  },
  RemoveRelationship {
    link_id: LinkId,
  },
}

pub trait EntityTruthStore: Send + Sync {
  /// Number of live entities of the given object type.
  fn count_entities(
    &self,
    tenant: &TenantId,
    object_type_id: ObjectTypeId,
  ) -> Result<usize, BoxError>;

  /// The entity as it was at `as_of`, or `None` if it did not exist yet.
  fn entity_as_of(
    &self,
    tenant: &TenantId,
    entity_id: EntityId,
    as_of: DateTime<Utc>,
  ) -> Result<Option<EntityState>, BoxError>;

  fn current_entity(
    &self,
    tenant: &TenantId,
    entity_id: EntityId,
  ) -> Result<Option<EntityState>, BoxError>;

  /// Apply a promoted batch, tagged with the scenario it came from.
  ///
  /// All or nothing: if any change fails, none of the batch is visible.
  fn apply_all(
    &self,
    tenant: &TenantId,
    mutations: &[TruthMutation],
    origin: ScenarioId,
  ) -> Result<(), BoxError>;

  fn apply(
    &self,
    tenant: &TenantId,
    mutation: &TruthMutation,
    origin: ScenarioId,
  ) -> Result<(), BoxError> {
    self.apply_all(tenant, std::slice::from_ref(mutation), origin)
  }
}
