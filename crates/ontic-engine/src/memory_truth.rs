//! An in-process [`EntityTruthStore`].
//!
//! Every change to an entity appends a new state to its history; nothing is
//! overwritten, so `entity_as_of` can answer for any past instant.

use std::{
  collections::{BTreeMap, HashMap},
  sync::{Arc, RwLock},
};

use chrono::{DateTime, Utc};
use ontic_core::{
  error::BoxError,
  ids::{EntityId, LinkId, ObjectTypeId, RelationshipTypeId, ScenarioId, TenantId},
  truth::{EntityState, EntityTruthStore, TruthMutation},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::clock::Clock;

#[derive(Debug, thiserror::Error)]
pub enum TruthError {
  #[error("entity not found: {0}")]
  EntityNotFound(EntityId),
  #[error("relationship instance not found: {0}")]
  LinkNotFound(LinkId),
  #[error("truth store lock poisoned")]
  Poisoned,
}

/// A live relationship instance between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
  pub id:                   LinkId,
  pub relationship_type_id: RelationshipTypeId,
  pub source_entity_id:     EntityId,
  pub target_entity_id:     EntityId,
  pub properties:           Value,
  pub created_at:           DateTime<Utc>,
  /// Set when the link arrived through a scenario promotion.
  pub origin:               Option<ScenarioId>,
}

#[derive(Debug, Clone, Default)]
struct TenantTruth {
  /// Ascending by `updated_at`.
  history: HashMap<EntityId, Vec<EntityState>>,
  links:   BTreeMap<LinkId, Link>,
}

impl TenantTruth {
  fn latest(&self, entity_id: EntityId) -> Option<&EntityState> {
    self.history.get(&entity_id).and_then(|states| states.last())
  }

  fn apply(
    &mut self,
    mutation: &TruthMutation,
    origin: ScenarioId,
    now: DateTime<Utc>,
  ) -> Result<(), TruthError> {
    match mutation {
      TruthMutation::SetAttribute { entity_id, attribute, value } => {
        let mut next = self
          .latest(*entity_id)
          .cloned()
          .ok_or(TruthError::EntityNotFound(*entity_id))?;
        next.version += 1;
        next.attributes.insert(attribute.clone(), value.clone());
        next.updated_at = now;
        self.history.entry(*entity_id).or_default().push(next);
      }
      TruthMutation::AddRelationship {
        relationship_type_id,
        source_entity_id,
        target_entity_id,
        properties,
      } => {
        for endpoint in [source_entity_id, target_entity_id] {
          if self.latest(*endpoint).is_none() {
            return Err(TruthError::EntityNotFound(*endpoint));
          }
        }
        let link = Link {
          id:                   LinkId::new(),
          relationship_type_id: *relationship_type_id,
          source_entity_id:     *source_entity_id,
          target_entity_id:     *target_entity_id,
          properties:           properties.clone(),
          created_at:           now,
          origin:               Some(origin),
        };
        self.links.insert(link.id, link);
      }
      TruthMutation::RemoveRelationship { link_id } => {
        self
          .links
          .remove(link_id)
          .ok_or(TruthError::LinkNotFound(*link_id))?;
      }
    }
    Ok(())
  }
}

pub struct MemoryTruthStore {
  clock:   Arc<dyn Clock>,
  tenants: RwLock<HashMap<TenantId, TenantTruth>>,
}

impl MemoryTruthStore {
  pub fn new(clock: Arc<dyn Clock>) -> Self {
    Self { clock, tenants: RwLock::new(HashMap::new()) }
  }

  /// Create an entity at version 1.
  pub fn insert_entity(
    &self,
    tenant: &TenantId,
    object_type_id: ObjectTypeId,
    attributes: Map<String, Value>,
  ) -> Result<EntityId, TruthError> {
    let mut tenants = self.tenants.write().map_err(|_| TruthError::Poisoned)?;
    let entity_id = EntityId::new();
    let state = EntityState {
      entity_id,
      object_type_id,
      version: 1,
      attributes,
      updated_at: self.clock.now(),
    };
    tenants
      .entry(tenant.clone())
      .or_default()
      .history
      .insert(entity_id, vec![state]);
    Ok(entity_id)
  }

  /// Record a backfilled correction: the observed value changes but the
  /// entity version does not.
  pub fn correct_attribute(
    &self,
    tenant: &TenantId,
    entity_id: EntityId,
    attribute: &str,
    value: Value,
  ) -> Result<(), TruthError> {
    let now = self.clock.now();
    let mut tenants = self.tenants.write().map_err(|_| TruthError::Poisoned)?;
    let states = tenants
      .get_mut(tenant)
      .and_then(|t| t.history.get_mut(&entity_id))
      .ok_or(TruthError::EntityNotFound(entity_id))?;
    let mut next = states
      .last()
      .cloned()
      .ok_or(TruthError::EntityNotFound(entity_id))?;
    next.attributes.insert(attribute.to_string(), value);
    next.updated_at = now;
    states.push(next);
    Ok(())
  }

  /// Every recorded state of an entity, oldest first.
  pub fn history(
    &self,
    tenant: &TenantId,
    entity_id: EntityId,
  ) -> Result<Vec<EntityState>, TruthError> {
    let tenants = self.tenants.read().map_err(|_| TruthError::Poisoned)?;
    Ok(
      tenants
        .get(tenant)
        .and_then(|t| t.history.get(&entity_id))
        .cloned()
        .unwrap_or_default(),
    )
  }

  pub fn links(&self, tenant: &TenantId) -> Result<Vec<Link>, TruthError> {
    let tenants = self.tenants.read().map_err(|_| TruthError::Poisoned)?;
    Ok(
      tenants
        .get(tenant)
        .map(|t| t.links.values().cloned().collect())
        .unwrap_or_default(),
    )
  }
}

impl EntityTruthStore for MemoryTruthStore {
  fn count_entities(
    &self,
    tenant: &TenantId,
    object_type_id: ObjectTypeId,
  ) -> Result<usize, BoxError> {
    let tenants = self.tenants.read().map_err(|_| TruthError::Poisoned)?;
    Ok(tenants.get(tenant).map_or(0, |t| {
      t.history
        .values()
        .filter_map(|states| states.last())
        .filter(|s| s.object_type_id == object_type_id)
        .count()
    }))
  }

  fn entity_as_of(
    &self,
    tenant: &TenantId,
    entity_id: EntityId,
    as_of: DateTime<Utc>,
  ) -> Result<Option<EntityState>, BoxError> {
    let tenants = self.tenants.read().map_err(|_| TruthError::Poisoned)?;
    Ok(
      tenants
        .get(tenant)
        .and_then(|t| t.history.get(&entity_id))
        .and_then(|states| states.iter().rev().find(|s| s.updated_at <= as_of))
        .cloned(),
    )
  }

  fn current_entity(
    &self,
    tenant: &TenantId,
    entity_id: EntityId,
  ) -> Result<Option<EntityState>, BoxError> {
    let tenants = self.tenants.read().map_err(|_| TruthError::Poisoned)?;
    Ok(tenants.get(tenant).and_then(|t| t.latest(entity_id)).cloned())
  }

  fn apply_all(
    &self,
    tenant: &TenantId,
    mutations: &[TruthMutation],
    origin: ScenarioId,
  ) -> Result<(), BoxError> {
    let now = self.clock.now();
    let mut tenants = self.tenants.write().map_err(|_| TruthError::Poisoned)?;
    let mut staged = tenants.get(tenant).cloned().unwrap_or_default();
    for mutation in mutations {
      staged.apply(mutation, origin, now)?;
    }
    tenants.insert(tenant.clone(), staged);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use chrono::Duration;
  use serde_json::json;

  use super::*;
  use crate::test_support::{clock, tenant};

  fn attrs(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
  }

  #[test]
  fn history_answers_past_instants() {
    let clock = clock();
    let truth = MemoryTruthStore::new(clock.clone());
    let asset = ObjectTypeId::new();
    let id = truth
      .insert_entity(&tenant(), asset, attrs(json!({"status": "OPERATIONAL"})))
      .unwrap();
    let before = clock.advance(Duration::minutes(1));
    clock.advance(Duration::minutes(1));
    truth
      .apply(
        &tenant(),
        &TruthMutation::SetAttribute {
          entity_id: id,
          attribute: "status".into(),
          value:     json!("DEGRADED"),
        },
        ScenarioId::new(),
      )
      .unwrap();

    let past = truth.entity_as_of(&tenant(), id, before).unwrap().unwrap();
    let now = truth.current_entity(&tenant(), id).unwrap().unwrap();
    assert_eq!(past.attribute("status"), json!("OPERATIONAL"));
    assert_eq!(past.version, 1);
    assert_eq!(now.attribute("status"), json!("DEGRADED"));
    assert_eq!(now.version, 2);
    assert_eq!(truth.history(&tenant(), id).unwrap().len(), 2);
  }

  #[test]
  fn entities_do_not_exist_before_insertion() {
    let clock = clock();
    let earlier = clock.now() - Duration::hours(1);
    let truth = MemoryTruthStore::new(clock);
    let id = truth.insert_entity(&tenant(), ObjectTypeId::new(), Map::new()).unwrap();
    assert!(truth.entity_as_of(&tenant(), id, earlier).unwrap().is_none());
  }

  #[test]
  fn counts_are_per_tenant_and_type() {
    let truth = MemoryTruthStore::new(clock());
    let asset = ObjectTypeId::new();
    truth.insert_entity(&tenant(), asset, Map::new()).unwrap();
    truth.insert_entity(&tenant(), asset, Map::new()).unwrap();
    truth.insert_entity(&tenant(), ObjectTypeId::new(), Map::new()).unwrap();
    truth.insert_entity(&TenantId::new("other"), asset, Map::new()).unwrap();
    assert_eq!(truth.count_entities(&tenant(), asset).unwrap(), 2);
  }

  #[test]
  fn links_are_added_and_removed() {
    let truth = MemoryTruthStore::new(clock());
    let a = truth.insert_entity(&tenant(), ObjectTypeId::new(), Map::new()).unwrap();
    let b = truth.insert_entity(&tenant(), ObjectTypeId::new(), Map::new()).unwrap();
    let origin = ScenarioId::new();
    truth
      .apply(
        &tenant(),
        &TruthMutation::AddRelationship {
          relationship_type_id: RelationshipTypeId::new(),
          source_entity_id:     a,
          target_entity_id:     b,
          properties:           Value::Null,
        },
        origin,
      )
      .unwrap();
    let links = truth.links(&tenant()).unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].origin, Some(origin));

    let remove = TruthMutation::RemoveRelationship { link_id: links[0].id };
    truth.apply(&tenant(), &remove, origin).unwrap();
    assert!(truth.links(&tenant()).unwrap().is_empty());
    let err = truth.apply(&tenant(), &remove, origin).unwrap_err();
    assert!(matches!(
      err.downcast_ref::<TruthError>(),
      Some(TruthError::LinkNotFound(_))
    ));
  }

  #[test]
  fn corrections_keep_the_version() {
    let truth = MemoryTruthStore::new(clock());
    let id = truth
      .insert_entity(&tenant(), ObjectTypeId::new(), attrs(json!({"name": "Pump"})))
      .unwrap();
    truth.correct_attribute(&tenant(), id, "name", json!("Pump 1")).unwrap();
    let now = truth.current_entity(&tenant(), id).unwrap().unwrap();
    assert_eq!(now.version, 1);
    assert_eq!(now.attribute("name"), json!("Pump 1"));
  }

  #[test]
  fn setting_an_attribute_on_a_missing_entity_fails() {
    let truth = MemoryTruthStore::new(clock());
    let mutation = TruthMutation::SetAttribute {
      entity_id: EntityId::new(),
      attribute: "status".into(),
      value:     Value::Null,
    };
    assert!(truth.apply(&tenant(), &mutation, ScenarioId::new()).is_err());
  }

  #[test]
  fn a_failing_batch_leaves_truth_untouched() {
    let truth = MemoryTruthStore::new(clock());
    let id = truth
      .insert_entity(&tenant(), ObjectTypeId::new(), attrs(json!({"status": "OPERATIONAL"})))
      .unwrap();
    let batch = [
      TruthMutation::SetAttribute {
        entity_id: id,
        attribute: "status".into(),
        value:     json!("OFFLINE"),
      },
      TruthMutation::AddRelationship {
        relationship_type_id: RelationshipTypeId::new(),
        source_entity_id:     id,
        target_entity_id:     id,
        properties:           Value::Null,
      },
      TruthMutation::RemoveRelationship { link_id: LinkId::new() },
    ];
    let err = truth.apply_all(&tenant(), &batch, ScenarioId::new()).unwrap_err();
    assert!(matches!(
      err.downcast_ref::<TruthError>(),
      Some(TruthError::LinkNotFound(_))
    ));
    assert!(truth.links(&tenant()).unwrap().is_empty());
    assert_eq!(truth.history(&tenant(), id).unwrap().len(), 1);

    truth.apply_all(&tenant(), &batch[..2], ScenarioId::new()).unwrap();
    assert_eq!(truth.links(&tenant()).unwrap().len(), 1);
    assert_eq!(truth.history(&tenant(), id).unwrap().len(), 2);
  }
}
