//! Ontology versions and the definitions they contain.
//!
//! Definitions are immutable once created. A definition is retired by an
//! append-only [`Deprecation`] record rather than by editing or deleting the
//! row, so every historical snapshot remains reconstructible. The store joins
//! deprecations back onto definitions at read time and exposes the result
//! through each definition's [`Validity`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{
  AttributeId, ConstraintId, MetricId, ObjectTypeId, OntologyVersionId,
  RelationshipTypeId, TenantId,
};

// ─── Enumerations ────────────────────────────────────────────────────────────

/// Lifecycle state of an ontology version.
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
pub enum VersionStatus {
  Draft,
  Active,
  Deprecated,
  Archived,
}

/// The value type of an attribute.
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
pub enum AttributeDataType {
  String,
  Integer,
  Float,
  Boolean,
  Date,
  Datetime,
  Json,
  Array,
  Enum,
  Reference,
  GeoPoint,
  GeoPolygon,
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
pub enum RelationshipDirection {
  Unidirectional,
  Bidirectional,
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
pub enum Cardinality {
  OneToOne,
  OneToMany,
  ManyToOne,
  ManyToMany,
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
pub enum AggregationType {
  Count,
  Sum,
  Avg,
  Min,
  Max,
  Percentage,
}

/// Cross-attribute rule kinds. See [`EntityConstraintDefinition`] for the
/// configuration shape each kind expects.
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
pub enum ConstraintType {
  UniqueTogether,
  ConditionalRequired,
  MutualExclusion,
  CustomExpression,
}

// ─── Validity ────────────────────────────────────────────────────────────────

/// The interval during which a definition is part of the ontology.
///
/// A definition is visible at `as_of` iff `created_at <= as_of` and it was not
/// yet deprecated at `as_of`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validity {
  pub created_at:    DateTime<Utc>,
  pub deprecated_at: Option<DateTime<Utc>>,
}

impl Validity {
  pub fn starting(created_at: DateTime<Utc>) -> Self {
    Self { created_at, deprecated_at: None }
  }

  pub fn visible_at(&self, as_of: DateTime<Utc>) -> bool {
    self.created_at <= as_of
      && self.deprecated_at.is_none_or(|deprecated| deprecated > as_of)
  }
}

// ─── Versions ────────────────────────────────────────────────────────────────

/// A named, numbered revision of a tenant's schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OntologyVersion {
  pub id:                OntologyVersionId,
  pub tenant:            TenantId,
  pub version_name:      String,
  /// Monotonic within the tenant, starting at 1.
  pub version_number:    u32,
  pub status:            VersionStatus,
  pub parent_version_id: Option<OntologyVersionId>,
  pub description:       Option<String>,
  pub created_at:        DateTime<Utc>,
  pub created_by:        String,
  pub activated_at:      Option<DateTime<Utc>>,
  pub deprecated_at:     Option<DateTime<Utc>>,
}

/// Input for creating a new version.
#[derive(Debug, Clone)]
pub struct NewVersion {
  pub version_name:      String,
  pub description:       Option<String>,
  /// When set, the new draft starts with a copy of every definition visible
  /// in the parent at creation time, ids preserved.
  pub parent_version_id: Option<OntologyVersionId>,
  pub created_by:        String,
}

impl NewVersion {
  pub fn new(version_name: impl Into<String>, created_by: impl Into<String>) -> Self {
    Self {
      version_name:      version_name.into(),
      description:       None,
      parent_version_id: None,
      created_by:        created_by.into(),
    }
  }
}

// ─── Object types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectTypeDefinition {
  pub id:              ObjectTypeId,
  pub version_id:      OntologyVersionId,
  /// Machine name, unique among the version's non-deprecated object types.
  pub name:            String,
  pub display_name:    String,
  pub description:     Option<String>,
  pub icon:            Option<String>,
  pub color:           Option<String>,
  pub is_abstract:     bool,
  pub extends_type_id: Option<ObjectTypeId>,
  pub created_by:      Option<String>,
  pub validity:        Validity,
}

#[derive(Debug, Clone)]
pub struct NewObjectType {
  pub name:            String,
  pub display_name:    String,
  pub description:     Option<String>,
  pub icon:            Option<String>,
  pub color:           Option<String>,
  pub is_abstract:     bool,
  pub extends_type_id: Option<ObjectTypeId>,
  pub created_by:      Option<String>,
}

impl NewObjectType {
  pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
    Self {
      name:            name.into(),
      display_name:    display_name.into(),
      description:     None,
      icon:            None,
      color:           None,
      is_abstract:     false,
      extends_type_id: None,
      created_by:      None,
    }
  }
}

// ─── Attributes ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDefinition {
  pub id:                       AttributeId,
  pub version_id:               OntologyVersionId,
  pub object_type_id:           ObjectTypeId,
  /// Key under which the value appears in entity payloads.
  pub name:                     String,
  pub display_name:             String,
  pub description:              Option<String>,
  pub data_type:                AttributeDataType,
  pub is_required:              bool,
  pub is_unique:                bool,
  pub is_indexed:               bool,
  pub is_primary_display:       bool,
  /// Character bound for strings, item bound for arrays.
  pub min_length:               Option<u64>,
  pub max_length:               Option<u64>,
  pub min_value:                Option<f64>,
  pub max_value:                Option<f64>,
  pub pattern:                  Option<String>,
  pub enum_values:              Vec<String>,
  pub reference_target_type_id: Option<ObjectTypeId>,
  pub array_element_type:       Option<AttributeDataType>,
  pub default_value:            Option<Value>,
  pub unit:                     Option<String>,
  /// Position within the owning object type; assigned at creation.
  pub ordinal:                  u32,
  pub created_by:               Option<String>,
  pub validity:                 Validity,
}

#[derive(Debug, Clone)]
pub struct NewAttribute {
  pub name:                     String,
  pub display_name:             String,
  pub description:              Option<String>,
  pub data_type:                AttributeDataType,
  pub is_required:              bool,
  pub is_unique:                bool,
  pub is_indexed:               bool,
  pub is_primary_display:       bool,
  pub min_length:               Option<u64>,
  pub max_length:               Option<u64>,
  pub min_value:                Option<f64>,
  pub max_value:                Option<f64>,
  pub pattern:                  Option<String>,
  pub enum_values:              Vec<String>,
  pub reference_target_type_id: Option<ObjectTypeId>,
  pub array_element_type:       Option<AttributeDataType>,
  pub default_value:            Option<Value>,
  pub unit:                     Option<String>,
  pub created_by:               Option<String>,
}

impl NewAttribute {
  pub fn new(
    name: impl Into<String>,
    display_name: impl Into<String>,
    data_type: AttributeDataType,
  ) -> Self {
    Self {
      name: name.into(),
      display_name: display_name.into(),
      description: None,
      data_type,
      is_required: false,
      is_unique: false,
      is_indexed: false,
      is_primary_display: false,
      min_length: None,
      max_length: None,
      min_value: None,
      max_value: None,
      pattern: None,
      enum_values: Vec::new(),
      reference_target_type_id: None,
      array_element_type: None,
      default_value: None,
      unit: None,
      created_by: None,
    }
  }
}

// ─── Relationship types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipTypeDefinition {
  pub id:           RelationshipTypeId,
  pub version_id:   OntologyVersionId,
  pub name:         String,
  pub display_name: String,
  pub description:  Option<String>,
  pub from_type_id: ObjectTypeId,
  pub to_type_id:   ObjectTypeId,
  pub direction:    RelationshipDirection,
  pub cardinality:  Cardinality,
  pub is_temporal:  bool,
  pub inverse_name: Option<String>,
  pub created_by:   Option<String>,
  pub validity:     Validity,
}

#[derive(Debug, Clone)]
pub struct NewRelationshipType {
  pub name:         String,
  pub display_name: String,
  pub description:  Option<String>,
  pub from_type_id: ObjectTypeId,
  pub to_type_id:   ObjectTypeId,
  pub direction:    RelationshipDirection,
  pub cardinality:  Cardinality,
  pub is_temporal:  bool,
  pub inverse_name: Option<String>,
  pub created_by:   Option<String>,
}

impl NewRelationshipType {
  pub fn new(
    name: impl Into<String>,
    display_name: impl Into<String>,
    from_type_id: ObjectTypeId,
    to_type_id: ObjectTypeId,
    cardinality: Cardinality,
  ) -> Self {
    Self {
      name: name.into(),
      display_name: display_name.into(),
      description: None,
      from_type_id,
      to_type_id,
      direction: RelationshipDirection::Unidirectional,
      cardinality,
      is_temporal: false,
      inverse_name: None,
      created_by: None,
    }
  }
}

// ─── Metrics ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDefinition {
  pub id:                    MetricId,
  pub version_id:            OntologyVersionId,
  pub name:                  String,
  pub display_name:          String,
  pub description:           Option<String>,
  pub aggregation_type:      AggregationType,
  pub target_object_type_id: ObjectTypeId,
  pub target_attribute_id:   Option<AttributeId>,
  pub filter_expression:     Option<String>,
  pub group_by_attribute_id: Option<AttributeId>,
  pub unit:                  Option<String>,
  pub created_by:            Option<String>,
  pub validity:              Validity,
}

#[derive(Debug, Clone)]
pub struct NewMetric {
  pub name:                  String,
  pub display_name:          String,
  pub description:           Option<String>,
  pub aggregation_type:      AggregationType,
  pub target_object_type_id: ObjectTypeId,
  pub target_attribute_id:   Option<AttributeId>,
  pub filter_expression:     Option<String>,
  pub group_by_attribute_id: Option<AttributeId>,
  pub unit:                  Option<String>,
  pub created_by:            Option<String>,
}

impl NewMetric {
  pub fn new(
    name: impl Into<String>,
    display_name: impl Into<String>,
    aggregation_type: AggregationType,
    target_object_type_id: ObjectTypeId,
  ) -> Self {
    Self {
      name: name.into(),
      display_name: display_name.into(),
      description: None,
      aggregation_type,
      target_object_type_id,
      target_attribute_id: None,
      filter_expression: None,
      group_by_attribute_id: None,
      unit: None,
      created_by: None,
    }
  }
}

// ─── Entity constraints ──────────────────────────────────────────────────────

/// A rule spanning several attributes of one object type.
///
/// `configuration` shapes by kind:
///
/// * `UNIQUE_TOGETHER`: `{"attribute_names": [..]}`
/// * `CONDITIONAL_REQUIRED`: `{"if_attribute": .., "if_value": .., "then_required": [..]}`
/// * `MUTUAL_EXCLUSION`: `{"attribute_names": [..]}`
/// * `CUSTOM_EXPRESSION`: free-form, not evaluated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityConstraintDefinition {
  pub id:              ConstraintId,
  pub version_id:      OntologyVersionId,
  pub object_type_id:  ObjectTypeId,
  pub name:            String,
  pub display_name:    String,
  pub constraint_type: ConstraintType,
  pub configuration:   Value,
  pub error_message:   Option<String>,
  pub ordinal:         u32,
  pub validity:        Validity,
}

#[derive(Debug, Clone)]
pub struct NewConstraint {
  pub name:            String,
  pub display_name:    String,
  pub constraint_type: ConstraintType,
  pub configuration:   Value,
  pub error_message:   Option<String>,
}

impl NewConstraint {
  pub fn new(
    name: impl Into<String>,
    display_name: impl Into<String>,
    constraint_type: ConstraintType,
    configuration: Value,
  ) -> Self {
    Self {
      name: name.into(),
      display_name: display_name.into(),
      constraint_type,
      configuration,
      error_message: None,
    }
  }
}

// ─── Deprecation ─────────────────────────────────────────────────────────────

/// Points at one definition inside a version.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize,
)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum DefinitionRef {
  ObjectType(ObjectTypeId),
  Attribute(AttributeId),
  RelationshipType(RelationshipTypeId),
  Metric(MetricId),
  Constraint(ConstraintId),
}

/// Records that a definition stopped being part of a version's ontology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deprecation {
  pub version_id:    OntologyVersionId,
  pub target:        DefinitionRef,
  pub deprecated_at: DateTime<Utc>,
  pub reason:        Option<String>,
}
