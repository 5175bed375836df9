//! Structural comparison of two ontology versions.
//!
//! Elements are matched by id, which forked versions preserve. An element is
//! "modified" when at least one tracked field differs.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use ontic_core::{
  Result,
  definition::{
    AttributeDefinition, MetricDefinition, ObjectTypeDefinition,
    RelationshipTypeDefinition,
  },
  ids::{
    AttributeId, MetricId, ObjectTypeId, OntologyVersionId, RelationshipTypeId,
    TenantId,
  },
  snapshot::OntologySnapshot,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::resolver::SnapshotResolver;

// ─── Types ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
  pub field_name: String,
  pub old_value:  Value,
  pub new_value:  Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modification<I> {
  pub id:      I,
  pub name:    String,
  pub changes: Vec<FieldChange>,
}

impl<I> Modification<I> {
  pub fn changed(&self, field: &str) -> Option<&FieldChange> {
    self.changes.iter().find(|c| c.field_name == field)
  }
}

/// An attribute modification, with its owning object type for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeModification {
  pub attribute_id:     AttributeId,
  pub name:             String,
  pub object_type_id:   ObjectTypeId,
  pub object_type_name: String,
  pub changes:          Vec<FieldChange>,
}

impl AttributeModification {
  pub fn changed(&self, field: &str) -> Option<&FieldChange> {
    self.changes.iter().find(|c| c.field_name == field)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementDiff<T, M> {
  pub added:    Vec<T>,
  pub removed:  Vec<T>,
  pub modified: Vec<M>,
}

impl<T, M> ElementDiff<T, M> {
  pub fn is_empty(&self) -> bool {
    self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
  }

  pub fn len(&self) -> usize {
    self.added.len() + self.removed.len() + self.modified.len()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OntologyDiff {
  pub from_version_id:    OntologyVersionId,
  pub to_version_id:      OntologyVersionId,
  pub as_of:              DateTime<Utc>,
  pub object_types:
    ElementDiff<ObjectTypeDefinition, Modification<ObjectTypeId>>,
  pub attributes:         ElementDiff<AttributeDefinition, AttributeModification>,
  pub relationship_types:
    ElementDiff<RelationshipTypeDefinition, Modification<RelationshipTypeId>>,
  pub metrics:            ElementDiff<MetricDefinition, Modification<MetricId>>,
}

impl OntologyDiff {
  pub fn is_empty(&self) -> bool { self.total_changes() == 0 }

  pub fn total_changes(&self) -> usize {
    self.object_types.len()
      + self.attributes.len()
      + self.relationship_types.len()
      + self.metrics.len()
  }
}

// ─── Comparison ──────────────────────────────────────────────────────────────

#[derive(Default)]
struct Changes(Vec<FieldChange>);

impl Changes {
  fn field<V: PartialEq + Serialize>(mut self, name: &str, old: &V, new: &V) -> Self {
    if old != new {
      self.0.push(FieldChange {
        field_name: name.to_string(),
        old_value:  serde_json::to_value(old).unwrap_or(Value::Null),
        new_value:  serde_json::to_value(new).unwrap_or(Value::Null),
      });
    }
    self
  }

  fn finish(self) -> Option<Vec<FieldChange>> {
    (!self.0.is_empty()).then_some(self.0)
  }
}

fn diff_maps<K, T, M>(
  from: &BTreeMap<K, T>,
  to: &BTreeMap<K, T>,
  compare: impl Fn(&T, &T) -> Option<M>,
) -> ElementDiff<T, M>
where
  K: Ord,
  T: Clone,
{
  ElementDiff {
    added:    to
      .iter()
      .filter(|(id, _)| !from.contains_key(id))
      .map(|(_, def)| def.clone())
      .collect(),
    removed:  from
      .iter()
      .filter(|(id, _)| !to.contains_key(id))
      .map(|(_, def)| def.clone())
      .collect(),
    modified: from
      .iter()
      .filter_map(|(id, old)| to.get(id).and_then(|new| compare(old, new)))
      .collect(),
  }
}

fn compare_object_types(
  old: &ObjectTypeDefinition,
  new: &ObjectTypeDefinition,
) -> Option<Modification<ObjectTypeId>> {
  Changes::default()
    .field("name", &old.name, &new.name)
    .field("display_name", &old.display_name, &new.display_name)
    .field("description", &old.description, &new.description)
    .field("icon", &old.icon, &new.icon)
    .field("color", &old.color, &new.color)
    .field("is_abstract", &old.is_abstract, &new.is_abstract)
    .finish()
    .map(|changes| Modification { id: new.id, name: new.name.clone(), changes })
}

fn compare_attributes(
  old: &AttributeDefinition,
  new: &AttributeDefinition,
) -> Option<Vec<FieldChange>> {
  Changes::default()
    .field("name", &old.name, &new.name)
    .field("display_name", &old.display_name, &new.display_name)
    .field("data_type", &old.data_type, &new.data_type)
    .field("is_required", &old.is_required, &new.is_required)
    .field("is_unique", &old.is_unique, &new.is_unique)
    .field("is_indexed", &old.is_indexed, &new.is_indexed)
    .field("min_length", &old.min_length, &new.min_length)
    .field("max_length", &old.max_length, &new.max_length)
    .field("min_value", &old.min_value, &new.min_value)
    .field("max_value", &old.max_value, &new.max_value)
    .field("pattern", &old.pattern, &new.pattern)
    .field("enum_values", &old.enum_values, &new.enum_values)
    .finish()
}

fn compare_relationships(
  old: &RelationshipTypeDefinition,
  new: &RelationshipTypeDefinition,
) -> Option<Modification<RelationshipTypeId>> {
  Changes::default()
    .field("display_name", &old.display_name, &new.display_name)
    .field("cardinality", &old.cardinality, &new.cardinality)
    .field("direction", &old.direction, &new.direction)
    .field("from_type_id", &old.from_type_id, &new.from_type_id)
    .field("to_type_id", &old.to_type_id, &new.to_type_id)
    .finish()
    .map(|changes| Modification { id: new.id, name: new.name.clone(), changes })
}

fn compare_metrics(
  old: &MetricDefinition,
  new: &MetricDefinition,
) -> Option<Modification<MetricId>> {
  Changes::default()
    .field("display_name", &old.display_name, &new.display_name)
    .field("aggregation_type", &old.aggregation_type, &new.aggregation_type)
    .field(
      "target_object_type_id",
      &old.target_object_type_id,
      &new.target_object_type_id,
    )
    .field("target_attribute_id", &old.target_attribute_id, &new.target_attribute_id)
    .field("filter_expression", &old.filter_expression, &new.filter_expression)
    .finish()
    .map(|changes| Modification { id: new.id, name: new.name.clone(), changes })
}

/// Compare two resolved snapshots.
pub fn diff_snapshots(from: &OntologySnapshot, to: &OntologySnapshot) -> OntologyDiff {
  let owner_name = |id: ObjectTypeId| {
    to.object_type(id)
      .or_else(|| from.object_type(id))
      .map(|t| t.name.clone())
      .unwrap_or_default()
  };

  OntologyDiff {
    from_version_id:    from.version.id,
    to_version_id:      to.version.id,
    as_of:              to.as_of,
    object_types:       diff_maps(&from.object_types, &to.object_types, compare_object_types),
    attributes:         diff_maps(&from.attributes, &to.attributes, |old, new| {
      compare_attributes(old, new).map(|changes| AttributeModification {
        attribute_id: new.id,
        name: new.name.clone(),
        object_type_id: new.object_type_id,
        object_type_name: owner_name(new.object_type_id),
        changes,
      })
    }),
    relationship_types: diff_maps(
      &from.relationship_types,
      &to.relationship_types,
      compare_relationships,
    ),
    metrics:            diff_maps(&from.metrics, &to.metrics, compare_metrics),
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct DiffEngine {
  resolver: Arc<SnapshotResolver>,
}

impl DiffEngine {
  pub fn new(resolver: Arc<SnapshotResolver>) -> Self { Self { resolver } }

  /// Resolve both versions at `as_of` and compare them.
  pub fn compute_diff(
    &self,
    from_version_id: OntologyVersionId,
    to_version_id: OntologyVersionId,
    as_of: DateTime<Utc>,
    tenant: &TenantId,
  ) -> Result<OntologyDiff> {
    let from = self
      .resolver
      .resolve_snapshot(from_version_id, as_of, tenant)?;
    let to = self
      .resolver
      .resolve_snapshot(to_version_id, as_of, tenant)?;
    let diff = diff_snapshots(&from, &to);
    info!(
      from = %from_version_id,
      to = %to_version_id,
      changes = diff.total_changes(),
      "ontology diff computed"
    );
    Ok(diff)
  }
}
