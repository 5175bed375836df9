//! Compilation of snapshots into per-object-type runtime artifacts.
//!
//! Every artifact is a pure function of the snapshot. Maps are ordered by
//! object type id and list fields follow attribute ordinal order, so compiling
//! the same snapshot twice yields equal output.

use std::{
  collections::BTreeMap,
  sync::{Arc, Mutex},
};

use chrono::{DateTime, Utc};
use ontic_core::{
  Error, Result,
  definition::{
    AttributeDataType, AttributeDefinition, Cardinality, ObjectTypeDefinition,
    RelationshipTypeDefinition,
  },
  ids::{AttributeId, ObjectTypeId, OntologyVersionId, RelationshipTypeId},
  snapshot::{OntologySnapshot, SnapshotHash},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{
  cache::{BoundedCache, LruCache},
  config::DEFAULT_COMPILED_CACHE_CAPACITY,
  hash::SnapshotHasher,
  validation::CompiledValidator,
};

/// How deep relationship traversal may go when following a query plan.
pub const MAX_TRAVERSAL_DEPTH: u8 = 3;

const SECONDARY_LIMIT: usize = 3;
const LIST_COLUMN_LIMIT: usize = 5;
const DESCRIPTOR_LIST_LIMIT: usize = 10;
const TEXTAREA_THRESHOLD: u64 = 200;

// ─── UI schema ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
  Text,
  Textarea,
  Number,
  Checkbox,
  Date,
  Select,
}

impl FieldKind {
  fn for_attribute(attr: &AttributeDefinition) -> Self {
    match attr.data_type {
      AttributeDataType::Integer | AttributeDataType::Float => FieldKind::Number,
      AttributeDataType::Boolean => FieldKind::Checkbox,
      AttributeDataType::Date | AttributeDataType::Datetime => FieldKind::Date,
      AttributeDataType::Enum => FieldKind::Select,
      AttributeDataType::String
        if attr.max_length.is_some_and(|max| max > TEXTAREA_THRESHOLD) =>
      {
        FieldKind::Textarea
      }
      _ => FieldKind::Text,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRules {
  pub min_length:  Option<u64>,
  pub max_length:  Option<u64>,
  pub min_value:   Option<f64>,
  pub max_value:   Option<f64>,
  pub pattern:     Option<String>,
  pub enum_values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
  pub attribute_id: AttributeId,
  pub field_kind:   FieldKind,
  pub label:        String,
  pub placeholder:  Option<String>,
  pub required:     bool,
  pub rules:        FieldRules,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailSection {
  pub title:         String,
  pub attribute_ids: Vec<AttributeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
  pub primary_attribute_id:    Option<AttributeId>,
  pub secondary_attribute_ids: Vec<AttributeId>,
  pub list_view_columns:       Vec<AttributeId>,
  pub detail_sections:         Vec<DetailSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiSchema {
  pub object_type_id: ObjectTypeId,
  pub form_fields:    Vec<FormField>,
  pub display:        DisplayConfig,
}

fn compile_ui_schema(
  object_type: &ObjectTypeDefinition,
  attributes: &[&AttributeDefinition],
) -> UiSchema {
  let form_fields = attributes
    .iter()
    .map(|attr| FormField {
      attribute_id: attr.id,
      field_kind:   FieldKind::for_attribute(attr),
      label:        attr.display_name.clone(),
      placeholder:  attr.description.clone(),
      required:     attr.is_required,
      rules:        FieldRules {
        min_length:  attr.min_length,
        max_length:  attr.max_length,
        min_value:   attr.min_value,
        max_value:   attr.max_value,
        pattern:     attr.pattern.clone(),
        enum_values: attr.enum_values.clone(),
      },
    })
    .collect();

  let primary = attributes
    .iter()
    .find(|a| a.is_primary_display)
    .or_else(|| attributes.first())
    .map(|a| a.id);
  let indexed_non_primary: Vec<AttributeId> = attributes
    .iter()
    .filter(|a| a.is_indexed && Some(a.id) != primary)
    .map(|a| a.id)
    .collect();
  let secondary: Vec<AttributeId> =
    indexed_non_primary.iter().copied().take(SECONDARY_LIMIT).collect();
  let list_view_columns: Vec<AttributeId> = primary
    .into_iter()
    .chain(indexed_non_primary.iter().copied())
    .take(LIST_COLUMN_LIMIT)
    .collect();

  let overview: Vec<AttributeId> =
    primary.into_iter().chain(secondary.iter().copied()).collect();
  let details: Vec<AttributeId> = attributes
    .iter()
    .filter(|a| !a.is_indexed && !a.is_primary_display && Some(a.id) != primary)
    .map(|a| a.id)
    .collect();
  let detail_sections = [("Overview", overview), ("Details", details)]
    .into_iter()
    .filter(|(_, ids)| !ids.is_empty())
    .map(|(title, attribute_ids)| DetailSection {
      title: title.to_string(),
      attribute_ids,
    })
    .collect();

  UiSchema {
    object_type_id: object_type.id,
    form_fields,
    display: DisplayConfig {
      primary_attribute_id: primary,
      secondary_attribute_ids: secondary,
      list_view_columns,
      detail_sections,
    },
  }
}

// ─── Query plan ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalDirection {
  Outbound,
  Inbound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipPath {
  pub relationship_type_id: RelationshipTypeId,
  pub direction:            TraversalDirection,
  pub target_type_id:       ObjectTypeId,
  pub cardinality:          Cardinality,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPlan {
  pub object_type_id:      ObjectTypeId,
  /// Names of indexed or unique attributes.
  pub indexed_attributes:  Vec<String>,
  pub relationship_paths:  Vec<RelationshipPath>,
  pub prefer_index_scan:   bool,
  pub max_traversal_depth: u8,
}

fn compile_query_plan(
  object_type: &ObjectTypeDefinition,
  attributes: &[&AttributeDefinition],
  relationships: &[&RelationshipTypeDefinition],
) -> QueryPlan {
  let indexed_attributes: Vec<String> = attributes
    .iter()
    .filter(|a| a.is_indexed || a.is_unique)
    .map(|a| a.name.clone())
    .collect();
  let relationship_paths = relationships
    .iter()
    .map(|rel| {
      let outbound = rel.from_type_id == object_type.id;
      RelationshipPath {
        relationship_type_id: rel.id,
        direction:            if outbound {
          TraversalDirection::Outbound
        } else {
          TraversalDirection::Inbound
        },
        target_type_id:       if outbound { rel.to_type_id } else { rel.from_type_id },
        cardinality:          rel.cardinality,
      }
    })
    .collect();

  QueryPlan {
    object_type_id: object_type.id,
    prefer_index_scan: !indexed_attributes.is_empty(),
    indexed_attributes,
    relationship_paths,
    max_traversal_depth: MAX_TRAVERSAL_DEPTH,
  }
}

// ─── Workflow contract ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAttribute {
  pub attribute_id: AttributeId,
  pub name:         String,
  pub data_type:    AttributeDataType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStrategy {
  /// Validate the entity before each workflow step runs.
  PreStep,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowContract {
  pub object_type_id:      ObjectTypeId,
  pub required_attributes: Vec<ContractAttribute>,
  pub optional_attributes: Vec<String>,
  /// Everything except the primary-display attribute.
  pub mutable_attributes:  Vec<String>,
  pub validation_strategy: ValidationStrategy,
}

fn compile_workflow_contract(
  object_type: &ObjectTypeDefinition,
  attributes: &[&AttributeDefinition],
) -> WorkflowContract {
  let (required, optional): (Vec<&&AttributeDefinition>, Vec<_>) =
    attributes.iter().partition(|a| a.is_required);
  WorkflowContract {
    object_type_id:      object_type.id,
    required_attributes: required
      .into_iter()
      .map(|a| ContractAttribute {
        attribute_id: a.id,
        name:         a.name.clone(),
        data_type:    a.data_type,
      })
      .collect(),
    optional_attributes: optional.into_iter().map(|a| a.name.clone()).collect(),
    mutable_attributes:  attributes
      .iter()
      .filter(|a| !a.is_primary_display)
      .map(|a| a.name.clone())
      .collect(),
    validation_strategy: ValidationStrategy::PreStep,
  }
}

// ─── AI descriptor ───────────────────────────────────────────────────────────

/// Natural-language summary of an object type for prompt construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiDescriptor {
  pub object_type_id:            ObjectTypeId,
  pub semantic_description:      String,
  pub attribute_descriptions:    BTreeMap<String, String>,
  pub relationship_descriptions: BTreeMap<String, String>,
}

fn compile_ai_descriptor(
  snapshot: &OntologySnapshot,
  object_type: &ObjectTypeDefinition,
  attributes: &[&AttributeDefinition],
  relationships: &[&RelationshipTypeDefinition],
) -> AiDescriptor {
  let mut lines = vec![format!("{} ({})", object_type.display_name, object_type.name)];
  if let Some(description) = &object_type.description {
    lines.push(format!("Description: {description}"));
  }
  lines.push(format!("Attributes ({}):", attributes.len()));
  for attr in attributes.iter().take(DESCRIPTOR_LIST_LIMIT) {
    let required = if attr.is_required { " [required]" } else { "" };
    lines.push(format!(
      "  - {} ({}): {}{required}",
      attr.display_name, attr.name, attr.data_type
    ));
  }
  if !relationships.is_empty() {
    lines.push(format!("Relationships ({}):", relationships.len()));
    for rel in relationships.iter().take(DESCRIPTOR_LIST_LIMIT) {
      lines.push(format!("  - {} ({}): {}", rel.display_name, rel.name, rel.cardinality));
    }
  }

  let attribute_descriptions = attributes
    .iter()
    .map(|attr| {
      let text = match &attr.description {
        Some(d) => format!("{}: {d} ({})", attr.display_name, attr.data_type),
        None => format!("{} ({})", attr.display_name, attr.data_type),
      };
      (attr.name.clone(), text)
    })
    .collect();

  let display_of = |id| {
    snapshot
      .object_type(id)
      .map_or("Unknown", |t: &ObjectTypeDefinition| t.display_name.as_str())
  };
  let relationship_descriptions = relationships
    .iter()
    .map(|rel| {
      let text = format!(
        "{}: {} -> {} ({})",
        rel.display_name,
        display_of(rel.from_type_id),
        display_of(rel.to_type_id),
        rel.cardinality
      );
      (rel.name.clone(), text)
    })
    .collect();

  AiDescriptor {
    object_type_id: object_type.id,
    semantic_description: lines.join("\n"),
    attribute_descriptions,
    relationship_descriptions,
  }
}

// ─── Compiled snapshot ───────────────────────────────────────────────────────

pub struct CompiledOntologySnapshot {
  pub snapshot:           Arc<OntologySnapshot>,
  pub snapshot_hash:      SnapshotHash,
  pub compiled_at:        DateTime<Utc>,
  pub validators:         BTreeMap<ObjectTypeId, CompiledValidator>,
  pub ui_schemas:         BTreeMap<ObjectTypeId, UiSchema>,
  pub query_plans:        BTreeMap<ObjectTypeId, QueryPlan>,
  pub workflow_contracts: BTreeMap<ObjectTypeId, WorkflowContract>,
  pub ai_descriptors:     BTreeMap<ObjectTypeId, AiDescriptor>,
}

/// The serialisable artifacts for one object type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectTypeArtifacts<'a> {
  pub ui_schema:         &'a UiSchema,
  pub query_plan:        &'a QueryPlan,
  pub workflow_contract: &'a WorkflowContract,
  pub ai_descriptor:     &'a AiDescriptor,
}

impl CompiledOntologySnapshot {
  pub fn artifacts(&self, object_type_id: ObjectTypeId) -> Option<ObjectTypeArtifacts<'_>> {
    Some(ObjectTypeArtifacts {
      ui_schema:         self.ui_schemas.get(&object_type_id)?,
      query_plan:        self.query_plans.get(&object_type_id)?,
      workflow_contract: self.workflow_contracts.get(&object_type_id)?,
      ai_descriptor:     self.ai_descriptors.get(&object_type_id)?,
    })
  }
}

impl std::fmt::Debug for CompiledOntologySnapshot {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CompiledOntologySnapshot")
      .field("version", &self.snapshot.version.id)
      .field("as_of", &self.snapshot.as_of)
      .field("snapshot_hash", &self.snapshot_hash)
      .field("object_types", &self.validators.len())
      .finish_non_exhaustive()
  }
}

// ─── Compiler ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CompileKey {
  version_id:    OntologyVersionId,
  as_of:         DateTime<Utc>,
  snapshot_hash: SnapshotHash,
}

type CompiledCache = Box<dyn BoundedCache<CompileKey, Arc<CompiledOntologySnapshot>>>;

pub struct Compiler {
  hasher: SnapshotHasher,
  cache:  Mutex<CompiledCache>,
}

impl Default for Compiler {
  fn default() -> Self { Self::with_capacity(DEFAULT_COMPILED_CACHE_CAPACITY) }
}

impl Compiler {
  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      hasher: SnapshotHasher,
      cache:  Mutex::new(Box::new(LruCache::new(capacity))),
    }
  }

  /// Compile every object type in `snapshot`, memoised by version, `as_of`
  /// and content hash.
  pub fn compile(
    &self,
    snapshot: Arc<OntologySnapshot>,
  ) -> Result<Arc<CompiledOntologySnapshot>> {
    let snapshot_hash = self.hasher.hash(&snapshot);
    let key = CompileKey {
      version_id: snapshot.version.id,
      as_of: snapshot.as_of,
      snapshot_hash: snapshot_hash.clone(),
    };
    if let Some(hit) = self.cache.lock().map_err(|_| Error::Poisoned)?.get(&key) {
      trace!(version = %key.version_id, "compiled snapshot cache hit");
      return Ok(hit);
    }

    let compiled = Arc::new(compile_snapshot(snapshot, snapshot_hash));
    debug!(
      version = %compiled.snapshot.version.id,
      as_of = %compiled.snapshot.as_of,
      object_types = compiled.validators.len(),
      "snapshot compiled"
    );
    self
      .cache
      .lock()
      .map_err(|_| Error::Poisoned)?
      .insert(key, compiled.clone());
    Ok(compiled)
  }

  pub fn clear_cache(&self) -> Result<()> {
    self.cache.lock().map_err(|_| Error::Poisoned)?.clear();
    Ok(())
  }
}

fn compile_snapshot(
  snapshot: Arc<OntologySnapshot>,
  snapshot_hash: SnapshotHash,
) -> CompiledOntologySnapshot {
  let mut validators = BTreeMap::new();
  let mut ui_schemas = BTreeMap::new();
  let mut query_plans = BTreeMap::new();
  let mut workflow_contracts = BTreeMap::new();
  let mut ai_descriptors = BTreeMap::new();

  for object_type in snapshot.object_types.values() {
    let id = object_type.id;
    let attributes = snapshot.attributes_of(id);
    let relationships = snapshot.relationships_of(id);

    validators.insert(
      id,
      CompiledValidator::new(
        id,
        attributes.iter().map(|a| (*a).clone()),
        snapshot.constraints_of(id).into_iter().cloned(),
      ),
    );
    ui_schemas.insert(id, compile_ui_schema(object_type, &attributes));
    query_plans.insert(id, compile_query_plan(object_type, &attributes, &relationships));
    workflow_contracts.insert(id, compile_workflow_contract(object_type, &attributes));
    ai_descriptors.insert(
      id,
      compile_ai_descriptor(&snapshot, object_type, &attributes, &relationships),
    );
  }

  CompiledOntologySnapshot {
    compiled_at: snapshot.resolved_at,
    snapshot_hash,
    validators,
    ui_schemas,
    query_plans,
    workflow_contracts,
    ai_descriptors,
    snapshot,
  }
}

#[cfg(test)]
mod tests {
  use ontic_core::definition::{NewAttribute, NewObjectType, NewVersion};
  use serde_json::json;

  use super::*;
  use crate::{
    test_support::{Fixture, tenant},
    validation::{ErrorCode, ValidationEngine},
  };

  fn compiled(fx: &Fixture) -> Arc<CompiledOntologySnapshot> {
    let snapshot = fx.resolver.resolve_active_snapshot(fx.now(), &tenant()).unwrap();
    Compiler::default().compile(snapshot).unwrap()
  }

  #[test]
  fn validators_enforce_the_seeded_schema() {
    let fx = Fixture::seeded();
    let compiled = compiled(&fx);
    let asset = fx.seed().asset;

    let good = json!({"name": "Pump 4", "status": "OPERATIONAL", "capacity": 40});
    let result = ValidationEngine
      .validate_against_ontology(good.as_object().unwrap(), asset, &compiled)
      .unwrap();
    assert!(result.valid, "{result:?}");

    let bad = json!({"status": "EXPLODED", "capacity": "lots"});
    let result = ValidationEngine
      .validate_against_ontology(bad.as_object().unwrap(), asset, &compiled)
      .unwrap();
    assert_eq!(result.codes(), [ErrorCode::NotInEnum, ErrorCode::TypeMismatch]);
  }

  #[test]
  fn unknown_object_types_are_errors() {
    let fx = Fixture::seeded();
    let compiled = compiled(&fx);
    let err = ValidationEngine
      .validate_against_ontology(&Default::default(), ObjectTypeId::new(), &compiled)
      .unwrap_err();
    assert!(matches!(err, Error::ObjectTypeNotFound(..)));
  }

  #[test]
  fn ai_descriptor_lists_attributes_and_relationships() {
    let fx = Fixture::seeded();
    let compiled = compiled(&fx);
    let descriptor = &compiled.ai_descriptors[&fx.seed().asset];
    let expected = "\
Asset (asset)
Description: A physical or logical asset in the enterprise.
Attributes (4):
  - Name (name): STRING
  - Status (status): ENUM [required]
  - Description (description): STRING
  - Capacity (capacity): INTEGER
Relationships (2):
  - Located At (asset_at_location): MANY_TO_ONE
  - Assigned To (person_assigned_to_asset): MANY_TO_MANY";
    assert_eq!(descriptor.semantic_description, expected);
    assert_eq!(
      descriptor.relationship_descriptions["asset_at_location"],
      "Located At: Asset -> Location (MANY_TO_ONE)"
    );
    assert_eq!(descriptor.attribute_descriptions["capacity"], "Capacity (INTEGER)");
  }

  #[test]
  fn query_plans_record_traversal_direction() {
    let fx = Fixture::seeded();
    let compiled = compiled(&fx);
    let plan = &compiled.query_plans[&fx.seed().asset];
    let directions: Vec<_> = plan
      .relationship_paths
      .iter()
      .map(|p| (p.direction, p.target_type_id))
      .collect();
    assert_eq!(
      directions,
      [
        (TraversalDirection::Outbound, fx.seed().location),
        (TraversalDirection::Inbound, fx.seed().person),
      ]
    );
    assert!(!plan.prefer_index_scan);
    assert_eq!(plan.max_traversal_depth, MAX_TRAVERSAL_DEPTH);
  }

  #[test]
  fn ui_schema_layout() {
    let fx = Fixture::empty();
    let store = &fx.store;
    let version = store
      .create_version(&tenant(), NewVersion::new("v1", "alice"))
      .unwrap();
    let site = store
      .create_object_type(&tenant(), version.id, NewObjectType::new("site", "Site"))
      .unwrap();
    let add = |input: NewAttribute| {
      store.create_attribute(&tenant(), version.id, site.id, input).unwrap()
    };
    let code = add(NewAttribute::new("code", "Code", AttributeDataType::String));
    let mut title = NewAttribute::new("title", "Title", AttributeDataType::String);
    title.is_primary_display = true;
    let title = add(title);
    let mut region = NewAttribute::new("region", "Region", AttributeDataType::Enum);
    region.is_indexed = true;
    let region = add(region);
    let mut notes = NewAttribute::new("notes", "Notes", AttributeDataType::String);
    notes.max_length = Some(2000);
    let notes = add(notes);
    store.activate_version(&tenant(), version.id).unwrap();

    let compiled = compiled(&fx);
    let schema = &compiled.ui_schemas[&site.id];
    let kinds: Vec<_> = schema.form_fields.iter().map(|f| f.field_kind).collect();
    assert_eq!(
      kinds,
      [FieldKind::Text, FieldKind::Text, FieldKind::Select, FieldKind::Textarea]
    );
    assert_eq!(schema.display.primary_attribute_id, Some(title.id));
    assert_eq!(schema.display.secondary_attribute_ids, [region.id]);
    assert_eq!(schema.display.list_view_columns, [title.id, region.id]);
    assert_eq!(
      schema.display.detail_sections,
      [
        DetailSection {
          title:         "Overview".to_string(),
          attribute_ids: vec![title.id, region.id],
        },
        DetailSection {
          title:         "Details".to_string(),
          attribute_ids: vec![code.id, notes.id],
        },
      ]
    );

    let contract = &compiled.workflow_contracts[&site.id];
    assert_eq!(contract.mutable_attributes, ["code", "region", "notes"]);
    assert!(contract.required_attributes.is_empty());
  }

  #[test]
  fn compilation_is_memoised() {
    let fx = Fixture::seeded();
    let compiler = Compiler::default();
    let snapshot = fx.resolver.resolve_active_snapshot(fx.now(), &tenant()).unwrap();
    let a = compiler.compile(snapshot.clone()).unwrap();
    let b = compiler.compile(snapshot).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
  }
}
