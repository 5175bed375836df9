//! What-if branches over live truth.
//!
//! Each branch is guarded by its own mutex: appending a mutation and promoting
//! the branch both hold it, so sequence numbers stay contiguous and a branch
//! can only be applied to truth once.

use std::{
  collections::{HashMap, HashSet},
  sync::{Arc, Mutex, MutexGuard, RwLock},
};

use chrono::{DateTime, Utc};
use ontic_core::{
  Error, Result,
  ids::{
    EntityId, LinkId, OntologyVersionId, PromotionId, RelationshipTypeId,
    ScenarioId, ScenarioMutationId, TenantId,
  },
  scenario::{
    Conflict, ConflictReport, ConflictType, MutationType, PromotionPolicy,
    ScenarioBranch, ScenarioMutation, ScenarioPromotion, ScenarioStatus,
  },
  truth::{EntityState, EntityTruthStore, TruthMutation},
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::store::DefinitionStore;

/// A mutation together with the truth changes it turns into on promotion.
#[derive(Debug, Clone)]
struct Staged {
  mutation: ScenarioMutation,
  truth:    Vec<TruthMutation>,
}

#[derive(Debug)]
struct Branch {
  scenario:  ScenarioBranch,
  staged:    Vec<Staged>,
  promotion: Option<ScenarioPromotion>,
}

pub struct ScenarioManager {
  store:    Arc<DefinitionStore>,
  truth:    Arc<dyn EntityTruthStore>,
  policy:   PromotionPolicy,
  branches: RwLock<HashMap<ScenarioId, Arc<Mutex<Branch>>>>,
}

impl ScenarioManager {
  pub fn new(
    store: Arc<DefinitionStore>,
    truth: Arc<dyn EntityTruthStore>,
    policy: PromotionPolicy,
  ) -> Self {
    Self { store, truth, policy, branches: RwLock::new(HashMap::new()) }
  }

  pub fn policy(&self) -> PromotionPolicy { self.policy }

  fn branch(&self, scenario_id: ScenarioId) -> Result<Arc<Mutex<Branch>>> {
    self
      .branches
      .read()
      .map_err(|_| Error::Poisoned)?
      .get(&scenario_id)
      .cloned()
      .ok_or(Error::ScenarioNotFound(scenario_id))
  }

  fn lock(branch: &Mutex<Branch>) -> Result<MutexGuard<'_, Branch>> {
    branch.lock().map_err(|_| Error::Poisoned)
  }

  // ── Branches ──────────────────────────────────────────────────────────

  /// Open an ACTIVE branch diverging from truth at `base_as_of`, pinned to
  /// `base_version_id`.
  pub fn create_scenario(
    &self,
    tenant: &TenantId,
    base_as_of: DateTime<Utc>,
    base_version_id: OntologyVersionId,
    created_by: impl Into<String>,
    description: Option<String>,
  ) -> Result<ScenarioBranch> {
    self
      .store
      .get_version(base_version_id)?
      .filter(|v| &v.tenant == tenant)
      .ok_or(Error::VersionNotFound(base_version_id))?;

    let scenario = ScenarioBranch {
      id: ScenarioId::new(),
      tenant: tenant.clone(),
      base_as_of,
      base_version_id,
      created_by: created_by.into(),
      created_at: self.store.clock().now(),
      description,
      status: ScenarioStatus::Active,
    };
    let branch = Branch { scenario: scenario.clone(), staged: Vec::new(), promotion: None };
    self
      .branches
      .write()
      .map_err(|_| Error::Poisoned)?
      .insert(scenario.id, Arc::new(Mutex::new(branch)));
    info!(tenant = %tenant, scenario = %scenario.id, base = %base_as_of, "scenario created");
    Ok(scenario)
  }

  pub fn get_scenario(&self, scenario_id: ScenarioId) -> Result<ScenarioBranch> {
    let branch = self.branch(scenario_id)?;
    Ok(Self::lock(&branch)?.scenario.clone())
  }

  /// The tenant's branches, oldest first.
  pub fn list_scenarios(&self, tenant: &TenantId) -> Result<Vec<ScenarioBranch>> {
    let branches: Vec<_> = self
      .branches
      .read()
      .map_err(|_| Error::Poisoned)?
      .values()
      .cloned()
      .collect();
    let mut scenarios = Vec::new();
    for branch in branches {
      let branch = Self::lock(&branch)?;
      if &branch.scenario.tenant == tenant {
        scenarios.push(branch.scenario.clone());
      }
    }
    scenarios.sort_by_key(|s| (s.created_at, s.id));
    Ok(scenarios)
  }

  /// Abandon an ACTIVE branch. Its mutations are kept for inspection.
  pub fn archive_scenario(&self, scenario_id: ScenarioId) -> Result<ScenarioBranch> {
    let branch = self.branch(scenario_id)?;
    let mut branch = Self::lock(&branch)?;
    ensure_active(&branch.scenario)?;
    branch.scenario.status = ScenarioStatus::Archived;
    info!(scenario = %scenario_id, "scenario archived");
    Ok(branch.scenario.clone())
  }

  // ── Mutations ─────────────────────────────────────────────────────────

  /// Append a mutation. The payload is checked against `mutation_type` now,
  /// not at promotion, and the target must already exist in truth.
  pub fn add_mutation(
    &self,
    scenario_id: ScenarioId,
    target_entity_id: EntityId,
    mutation_type: MutationType,
    proposed_value: Value,
    effective_valid_time: Option<DateTime<Utc>>,
  ) -> Result<ScenarioMutation> {
    let truth = translate(target_entity_id, mutation_type, &proposed_value)?;
    let branch = self.branch(scenario_id)?;
    let mut branch = Self::lock(&branch)?;
    ensure_active(&branch.scenario)?;
    self
      .truth
      .current_entity(&branch.scenario.tenant, target_entity_id)
      .map_err(Error::Truth)?
      .ok_or(Error::EntityNotFound(target_entity_id))?;

    let sequence = branch.staged.last().map_or(1, |s| s.mutation.sequence + 1);
    let mutation = ScenarioMutation {
      id: ScenarioMutationId::new(),
      scenario_id,
      sequence,
      target_entity_id,
      mutation_type,
      proposed_value,
      effective_valid_time,
      created_at: self.store.clock().now(),
    };
    branch.staged.push(Staged { mutation: mutation.clone(), truth });
    debug!(scenario = %scenario_id, sequence, kind = %mutation_type, "scenario mutation added");
    Ok(mutation)
  }

  /// Mutations in sequence order.
  pub fn get_mutations(&self, scenario_id: ScenarioId) -> Result<Vec<ScenarioMutation>> {
    let branch = self.branch(scenario_id)?;
    let branch = Self::lock(&branch)?;
    Ok(branch.staged.iter().map(|s| s.mutation.clone()).collect())
  }

  // ── Conflicts & promotion ─────────────────────────────────────────────

  /// Compare every mutated entity as it was at the branch baseline with how
  /// it is now.
  pub fn detect_conflicts(&self, scenario_id: ScenarioId) -> Result<ConflictReport> {
    let branch = self.branch(scenario_id)?;
    let branch = Self::lock(&branch)?;
    self.conflicts_for(&branch)
  }

  fn conflicts_for(&self, branch: &Branch) -> Result<ConflictReport> {
    let scenario = &branch.scenario;
    let mut conflicts = Vec::new();
    let mut seen = HashSet::new();

    for staged in &branch.staged {
      let m = &staged.mutation;
      let base = self
        .truth
        .entity_as_of(&scenario.tenant, m.target_entity_id, scenario.base_as_of)
        .map_err(Error::Truth)?;
      let Some(current) = self
        .truth
        .current_entity(&scenario.tenant, m.target_entity_id)
        .map_err(Error::Truth)?
      else {
        // Gone from truth since the mutation was staged.
        if seen.insert((m.target_entity_id, None)) {
          conflicts.push(Conflict {
            entity_id:      m.target_entity_id,
            attribute_id:   None,
            scenario_value: m.proposed_value.clone(),
            truth_value:    Value::Null,
            conflict_type:  ConflictType::VersionMismatch,
          });
        }
        continue;
      };

      match touched_attributes(m) {
        Some(touched) => {
          for (attribute, proposed) in touched {
            if !seen.insert((m.target_entity_id, Some(attribute.clone()))) {
              continue;
            }
            let then = base.as_ref().map_or(Value::Null, |b| b.attribute(&attribute));
            let now = current.attribute(&attribute);
            if then == now && base.is_some() {
              continue;
            }
            conflicts.push(Conflict {
              entity_id:      m.target_entity_id,
              scenario_value: proposed,
              truth_value:    now,
              conflict_type:  drift_kind(base.as_ref(), &current),
              attribute_id:   Some(attribute),
            });
          }
        }
        None => {
          if !seen.insert((m.target_entity_id, None)) {
            continue;
          }
          if base.as_ref().is_some_and(|b| b.version == current.version) {
            continue;
          }
          conflicts.push(Conflict {
            entity_id:      m.target_entity_id,
            attribute_id:   None,
            scenario_value: m.proposed_value.clone(),
            truth_value:    Value::Object(current.attributes.clone()),
            conflict_type:  ConflictType::VersionMismatch,
          });
        }
      }
    }

    Ok(ConflictReport {
      scenario_id: scenario.id,
      generated_at: self.store.clock().now(),
      conflicts,
    })
  }

  /// Apply the branch's mutations to truth in sequence order and mark it
  /// PROMOTED. The changes go to truth as one batch: if any fails, nothing
  /// is applied and the branch stays ACTIVE. The branch stays locked
  /// throughout, so concurrent promotions of one branch apply it at most once.
  pub fn promote_scenario(
    &self,
    scenario_id: ScenarioId,
    promoted_by: impl Into<String>,
  ) -> Result<ScenarioPromotion> {
    let branch = self.branch(scenario_id)?;
    let mut branch = Self::lock(&branch)?;
    match branch.scenario.status {
      ScenarioStatus::Promoted => return Err(Error::AlreadyPromoted(scenario_id)),
      ScenarioStatus::Archived => {
        return Err(Error::ScenarioNotActive(scenario_id, ScenarioStatus::Archived));
      }
      ScenarioStatus::Active => {}
    }

    let report = self.conflicts_for(&branch)?;
    if !report.is_clean() {
      match self.policy {
        PromotionPolicy::BlockOnConflict => {
          return Err(Error::PromotionBlocked {
            scenario_id,
            conflicts: report.conflicts.len(),
          });
        }
        PromotionPolicy::Advisory => warn!(
          scenario = %scenario_id,
          conflicts = report.conflicts.len(),
          "promoting scenario despite conflicts"
        ),
      }
    }

    let tenant = branch.scenario.tenant.clone();
    let batch: Vec<TruthMutation> = branch
      .staged
      .iter()
      .flat_map(|s| s.truth.iter().cloned())
      .collect();
    self
      .truth
      .apply_all(&tenant, &batch, scenario_id)
      .map_err(Error::Truth)?;

    let target_ontology_version = self
      .store
      .get_active_version(&tenant)?
      .map_or(branch.scenario.base_version_id, |v| v.id);
    let promotion = ScenarioPromotion {
      promotion_id: PromotionId::new(),
      scenario_id,
      promoted_by: promoted_by.into(),
      promoted_at: self.store.clock().now(),
      mutation_count: branch.staged.len(),
      target_ontology_version,
      conflicts_overridden: report.conflicts.len(),
    };
    branch.scenario.status = ScenarioStatus::Promoted;
    branch.promotion = Some(promotion.clone());
    info!(
      scenario = %scenario_id,
      mutations = promotion.mutation_count,
      by = %promotion.promoted_by,
      "scenario promoted"
    );
    Ok(promotion)
  }

  pub fn get_promotion(&self, scenario_id: ScenarioId) -> Result<Option<ScenarioPromotion>> {
    let branch = self.branch(scenario_id)?;
    Ok(Self::lock(&branch)?.promotion.clone())
  }
}

fn ensure_active(scenario: &ScenarioBranch) -> Result<()> {
  match scenario.status {
    ScenarioStatus::Active => Ok(()),
    status => Err(Error::ScenarioNotActive(scenario.id, status)),
  }
}

fn drift_kind(base: Option<&EntityState>, current: &EntityState) -> ConflictType {
  match base {
    Some(base) if base.version == current.version => ConflictType::ValueDrift,
    _ => ConflictType::VersionMismatch,
  }
}

/// Attribute keys a mutation writes, with the proposed values. `None` for
/// relationship mutations, which conflict at entity level.
fn touched_attributes(m: &ScenarioMutation) -> Option<Vec<(String, Value)>> {
  match m.mutation_type {
    MutationType::AttributeOverride => Some(
      m.proposed_value
        .as_object()
        .map(|o| o.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default(),
    ),
    MutationType::StatusChange => {
      Some(vec![("status".to_string(), m.proposed_value.clone())])
    }
    MutationType::RelationshipAdd | MutationType::RelationshipRemove => None,
  }
}

// ─── Payloads ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RelationshipAdd {
  relationship_type_id: RelationshipTypeId,
  source_entity_id:     EntityId,
  target_entity_id:     EntityId,
  #[serde(default)]
  properties:           Value,
}

fn translate(
  entity_id: EntityId,
  mutation_type: MutationType,
  payload: &Value,
) -> Result<Vec<TruthMutation>> {
  let invalid = |reason: String| Error::InvalidMutationPayload(reason);
  match mutation_type {
    MutationType::AttributeOverride => {
      let object = payload
        .as_object()
        .filter(|o| !o.is_empty())
        .ok_or_else(|| invalid("attribute override needs a non-empty object".into()))?;
      Ok(
        object
          .iter()
          .map(|(attribute, value)| TruthMutation::SetAttribute {
            entity_id,
            attribute: attribute.clone(),
            value: value.clone(),
          })
          .collect(),
      )
    }
    MutationType::StatusChange => {
      if payload.is_null() {
        return Err(invalid("status change needs a value".into()));
      }
      Ok(vec![TruthMutation::SetAttribute {
        entity_id,
        attribute: "status".into(),
        value: payload.clone(),
      }])
    }
    MutationType::RelationshipAdd => {
      let add: RelationshipAdd = serde_json::from_value(payload.clone())
        .map_err(|e| invalid(format!("relationship add: {e}")))?;
      Ok(vec![TruthMutation::AddRelationship {
        relationship_type_id: add.relationship_type_id,
        source_entity_id:     add.source_entity_id,
        target_entity_id:     add.target_entity_id,
        properties:           add.properties,
      }])
    }
    MutationType::RelationshipRemove => {
      let link_id: LinkId = serde_json::from_value(payload.clone())
        .map_err(|e| invalid(format!("relationship remove: {e}")))?;
      Ok(vec![TruthMutation::RemoveRelationship { link_id }])
    }
  }
}
