//! Scenario branches: isolated what-if mutation logs over a fixed baseline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{
  EntityId, OntologyVersionId, PromotionId, ScenarioId, ScenarioMutationId,
  TenantId,
};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioStatus {
  Active,
  Archived,
  Promoted,
}

/// A branch pinned to the ontology version and truth time it was forked from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioBranch {
  pub id:              ScenarioId,
  pub tenant:          TenantId,
  /// Truth time the branch diverges from.
  pub base_as_of:      DateTime<Utc>,
  pub base_version_id: OntologyVersionId,
  pub created_by:      String,
  pub created_at:      DateTime<Utc>,
  pub description:     Option<String>,
  pub status:          ScenarioStatus,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationType {
  /// `proposed_value` is an object of attribute name to new value.
  AttributeOverride,
  /// `proposed_value` is
  /// `{"relationship_type_id", "source_entity_id", "target_entity_id", "properties"?}`.
  RelationshipAdd,
  /// `proposed_value` is the id of the relationship instance to remove.
  RelationshipRemove,
  /// `proposed_value` is the new status value.
  StatusChange,
}

/// One proposed change inside a branch. Sequences are contiguous from 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMutation {
  pub id:                   ScenarioMutationId,
  pub scenario_id:          ScenarioId,
  pub sequence:             u64,
  pub target_entity_id:     EntityId,
  pub mutation_type:        MutationType,
  pub proposed_value:       Value,
  pub effective_valid_time: Option<DateTime<Utc>>,
  pub created_at:           DateTime<Utc>,
}

// ─── Conflicts ───────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictType {
  /// The entity's truth version moved since the branch baseline.
  VersionMismatch,
  /// Same truth version, but the observed value differs.
  ValueDrift,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
  pub entity_id:      EntityId,
  /// Attribute key the conflict is scoped to; `None` for entity-level drift.
  pub attribute_id:   Option<String>,
  pub scenario_value: Value,
  pub truth_value:    Value,
  pub conflict_type:  ConflictType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictReport {
  pub scenario_id:  ScenarioId,
  pub generated_at: DateTime<Utc>,
  pub conflicts:    Vec<Conflict>,
}

impl ConflictReport {
  pub fn is_clean(&self) -> bool { self.conflicts.is_empty() }
}

// ─── Promotion ───────────────────────────────────────────────────────────────

/// What promotion does when conflicts are detected.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PromotionPolicy {
  /// Report conflicts and promote anyway.
  #[default]
  Advisory,
  /// Refuse to promote a branch with any conflict.
  BlockOnConflict,
}

/// Durable record of a completed promotion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioPromotion {
  pub promotion_id:            PromotionId,
  pub scenario_id:             ScenarioId,
  pub promoted_by:             String,
  pub promoted_at:             DateTime<Utc>,
  pub mutation_count:          usize,
  pub target_ontology_version: OntologyVersionId,
  /// Conflicts present at promotion time (always empty under
  /// [`PromotionPolicy::BlockOnConflict`]).
  pub conflicts_overridden:    usize,
}
