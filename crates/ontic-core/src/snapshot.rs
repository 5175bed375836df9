//! The immutable, point-in-time view of one ontology version.
//!
//! Snapshots are built by the resolver and shared behind `Arc`. All
//! collections are ordered maps keyed by id so that iteration order, and
//! therefore hashing and compilation output, never depends on insertion order.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  definition::{
    AttributeDefinition, EntityConstraintDefinition, MetricDefinition,
    ObjectTypeDefinition, OntologyVersion, RelationshipTypeDefinition,
  },
  ids::{
    AttributeId, ConstraintId, MetricId, ObjectTypeId, RelationshipTypeId,
    TenantId,
  },
};

// ─── Hash ────────────────────────────────────────────────────────────────────

/// Lowercase hex SHA-256 digest of a snapshot's canonical form.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SnapshotHash(String);

impl SnapshotHash {
  pub fn from_hex(hex: impl Into<String>) -> Self { Self(hex.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for SnapshotHash {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OntologySnapshot {
  pub version:     OntologyVersion,
  pub tenant:      TenantId,
  pub as_of:       DateTime<Utc>,
  pub resolved_at: DateTime<Utc>,

  pub object_types:       BTreeMap<ObjectTypeId, ObjectTypeDefinition>,
  pub attributes:         BTreeMap<AttributeId, AttributeDefinition>,
  pub relationship_types: BTreeMap<RelationshipTypeId, RelationshipTypeDefinition>,
  pub metrics:            BTreeMap<MetricId, MetricDefinition>,
  pub constraints:        BTreeMap<ConstraintId, EntityConstraintDefinition>,

  // ── Indexes ───────────────────────────────────────────────────────────
  pub object_types_by_name:   BTreeMap<String, ObjectTypeId>,
  /// Per object type, sorted by ordinal.
  pub attributes_by_type:     BTreeMap<ObjectTypeId, Vec<AttributeId>>,
  /// Per object type, sorted by ordinal.
  pub constraints_by_type:    BTreeMap<ObjectTypeId, Vec<ConstraintId>>,
  pub relationships_by_from:  BTreeMap<ObjectTypeId, Vec<RelationshipTypeId>>,
  pub relationships_by_to:    BTreeMap<ObjectTypeId, Vec<RelationshipTypeId>>,
}

/// Number of elements of each kind in a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementCounts {
  pub object_types:       usize,
  pub attributes:         usize,
  pub relationship_types: usize,
  pub metrics:            usize,
  pub constraints:        usize,
}

impl OntologySnapshot {
  pub fn object_type(&self, id: ObjectTypeId) -> Option<&ObjectTypeDefinition> {
    self.object_types.get(&id)
  }

  pub fn object_type_by_name(&self, name: &str) -> Option<&ObjectTypeDefinition> {
    self
      .object_types_by_name
      .get(name)
      .and_then(|id| self.object_types.get(id))
  }

  /// Attributes of an object type, in ordinal order.
  pub fn attributes_of(&self, object_type_id: ObjectTypeId) -> Vec<&AttributeDefinition> {
    self
      .attributes_by_type
      .get(&object_type_id)
      .into_iter()
      .flatten()
      .filter_map(|id| self.attributes.get(id))
      .collect()
  }

  /// Entity constraints of an object type, in ordinal order.
  pub fn constraints_of(
    &self,
    object_type_id: ObjectTypeId,
  ) -> Vec<&EntityConstraintDefinition> {
    self
      .constraints_by_type
      .get(&object_type_id)
      .into_iter()
      .flatten()
      .filter_map(|id| self.constraints.get(id))
      .collect()
  }

  pub fn relationships_from(
    &self,
    object_type_id: ObjectTypeId,
  ) -> Vec<&RelationshipTypeDefinition> {
    self.relationships_in(&self.relationships_by_from, object_type_id)
  }

  pub fn relationships_to(
    &self,
    object_type_id: ObjectTypeId,
  ) -> Vec<&RelationshipTypeDefinition> {
    self.relationships_in(&self.relationships_by_to, object_type_id)
  }

  /// Outbound relationships followed by inbound ones. A self-referencing
  /// relationship is listed once.
  pub fn relationships_of(
    &self,
    object_type_id: ObjectTypeId,
  ) -> Vec<&RelationshipTypeDefinition> {
    let mut out = self.relationships_from(object_type_id);
    for rel in self.relationships_to(object_type_id) {
      if rel.from_type_id != object_type_id {
        out.push(rel);
      }
    }
    out
  }

  pub fn counts(&self) -> ElementCounts {
    ElementCounts {
      object_types:       self.object_types.len(),
      attributes:         self.attributes.len(),
      relationship_types: self.relationship_types.len(),
      metrics:            self.metrics.len(),
      constraints:        self.constraints.len(),
    }
  }

  fn relationships_in(
    &self,
    index: &BTreeMap<ObjectTypeId, Vec<RelationshipTypeId>>,
    object_type_id: ObjectTypeId,
  ) -> Vec<&RelationshipTypeDefinition> {
    index
      .get(&object_type_id)
      .into_iter()
      .flatten()
      .filter_map(|id| self.relationship_types.get(id))
      .collect()
  }
}
