//! Entity payload validation.
//!
//! Attribute rules run in ordinal order, then entity constraints. For each
//! attribute the checks short-circuit: a missing required value skips the type
//! check, and a type mismatch skips the constraint checks.

use chrono::{DateTime, NaiveDate};
use ontic_core::{
  Error, Result,
  definition::{
    AttributeDataType, AttributeDefinition, ConstraintType,
    EntityConstraintDefinition,
  },
  ids::{AttributeId, ConstraintId, ObjectTypeId},
  snapshot::OntologySnapshot,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::compiler::CompiledOntologySnapshot;

/// An entity as submitted for validation: attribute name to value.
pub type EntityPayload = Map<String, Value>;

// ─── Results ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
  Required,
  TypeMismatch,
  MinLength,
  MaxLength,
  PatternMismatch,
  InvalidPattern,
  MinValue,
  MaxValue,
  MinItems,
  MaxItems,
  NotInEnum,
  UniqueTogetherViolated,
  ConditionalRequiredViolated,
  MutualExclusionViolated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueTarget {
  Attribute { id: AttributeId, name: String },
  Constraint { id: ConstraintId, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
  pub target:  IssueTarget,
  pub code:    ErrorCode,
  pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
  pub valid:  bool,
  pub errors: Vec<ValidationIssue>,
}

impl ValidationResult {
  fn from_errors(errors: Vec<ValidationIssue>) -> Self {
    Self { valid: errors.is_empty(), errors }
  }

  pub fn codes(&self) -> Vec<ErrorCode> {
    self.errors.iter().map(|e| e.code).collect()
  }
}

// ─── Attribute rules ─────────────────────────────────────────────────────────

/// An attribute definition with its pattern compiled once.
#[derive(Debug, Clone)]
pub struct AttributeRule {
  pub definition: AttributeDefinition,
  pattern:        Option<std::result::Result<Regex, String>>,
}

impl AttributeRule {
  pub fn new(definition: AttributeDefinition) -> Self {
    let pattern = definition
      .pattern
      .as_deref()
      .map(|p| Regex::new(p).map_err(|e| e.to_string()));
    Self { definition, pattern }
  }

  pub fn check(&self, entity: &EntityPayload, errors: &mut Vec<ValidationIssue>) {
    let def = &self.definition;
    let label = &def.display_name;
    let mut fail = |code, message: String| {
      errors.push(ValidationIssue {
        target: IssueTarget::Attribute { id: def.id, name: def.name.clone() },
        code,
        message,
      });
    };

    let value = entity.get(&def.name);
    if def.is_required && is_blank(value) {
      fail(ErrorCode::Required, format!("{label} is required"));
      return;
    }
    let Some(value) = value.filter(|v| !v.is_null()) else {
      return;
    };
    if !type_matches(def.data_type, value) {
      fail(ErrorCode::TypeMismatch, type_message(label, def.data_type));
      return;
    }

    match def.data_type {
      AttributeDataType::String => {
        let text = value.as_str().unwrap_or_default();
        let len = text.chars().count() as u64;
        if let Some(min) = def.min_length
          && len < min
        {
          fail(
            ErrorCode::MinLength,
            format!("{label} must be at least {min} characters"),
          );
        }
        if let Some(max) = def.max_length
          && len > max
        {
          fail(
            ErrorCode::MaxLength,
            format!("{label} must be at most {max} characters"),
          );
        }
        match &self.pattern {
          Some(Ok(regex)) if !regex.is_match(text) => fail(
            ErrorCode::PatternMismatch,
            format!("{label} does not match required pattern"),
          ),
          Some(Err(reason)) => fail(
            ErrorCode::InvalidPattern,
            format!("{label} has an invalid pattern: {reason}"),
          ),
          _ => {}
        }
      }
      AttributeDataType::Integer | AttributeDataType::Float => {
        let n = value.as_f64().unwrap_or_default();
        if let Some(min) = def.min_value
          && n < min
        {
          fail(ErrorCode::MinValue, format!("{label} must be at least {min}"));
        }
        if let Some(max) = def.max_value
          && n > max
        {
          fail(ErrorCode::MaxValue, format!("{label} must be at most {max}"));
        }
      }
      AttributeDataType::Array => {
        let items = value.as_array().map_or(0, Vec::len) as u64;
        if let Some(min) = def.min_length
          && items < min
        {
          fail(ErrorCode::MinItems, format!("{label} must have at least {min} items"));
        }
        if let Some(max) = def.max_length
          && items > max
        {
          fail(ErrorCode::MaxItems, format!("{label} must have at most {max} items"));
        }
      }
      AttributeDataType::Enum => {
        let text = value.as_str().unwrap_or_default();
        if !def.enum_values.is_empty() && !def.enum_values.iter().any(|v| v == text) {
          fail(
            ErrorCode::NotInEnum,
            format!("{label} must be one of: {}", def.enum_values.join(", ")),
          );
        }
      }
      _ => {}
    }
  }
}

fn is_blank(value: Option<&Value>) -> bool {
  match value {
    None | Some(Value::Null) => true,
    Some(Value::String(s)) => s.is_empty(),
    Some(_) => false,
  }
}

fn is_date(text: &str) -> bool {
  NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok() || is_datetime(text)
}

fn is_datetime(text: &str) -> bool { DateTime::parse_from_rfc3339(text).is_ok() }

fn is_geo_point(value: &Value) -> bool {
  value.as_object().is_some_and(|o| {
    o.get("lat").is_some_and(Value::is_number)
      && o.get("lng").is_some_and(Value::is_number)
  })
}

fn type_matches(data_type: AttributeDataType, value: &Value) -> bool {
  match data_type {
    AttributeDataType::String
    | AttributeDataType::Enum
    | AttributeDataType::Reference => value.is_string(),
    AttributeDataType::Integer => {
      value.is_i64()
        || value.is_u64()
        || value.as_f64().is_some_and(|f| f.is_finite() && f.fract() == 0.0)
    }
    AttributeDataType::Float => value.is_number(),
    AttributeDataType::Boolean => value.is_boolean(),
    AttributeDataType::Date => value.as_str().is_some_and(is_date),
    AttributeDataType::Datetime => value.as_str().is_some_and(is_datetime),
    AttributeDataType::Json => value.is_object() || value.is_array(),
    AttributeDataType::Array => value.is_array(),
    AttributeDataType::GeoPoint => is_geo_point(value),
    AttributeDataType::GeoPolygon => value
      .as_array()
      .is_some_and(|points| points.iter().all(is_geo_point)),
  }
}

fn type_message(label: &str, data_type: AttributeDataType) -> String {
  let expected = match data_type {
    AttributeDataType::String => "a string",
    AttributeDataType::Integer => "an integer",
    AttributeDataType::Float => "a number",
    AttributeDataType::Boolean => "a boolean",
    AttributeDataType::Date => "a date",
    AttributeDataType::Datetime => "an RFC 3339 timestamp",
    AttributeDataType::Json => "a JSON object",
    AttributeDataType::Array => "an array",
    AttributeDataType::Enum => "a string (enum value)",
    AttributeDataType::Reference => "an entity ID (reference)",
    AttributeDataType::GeoPoint => "a GeoPoint {lat, lng}",
    AttributeDataType::GeoPolygon => "an array of GeoPoints",
  };
  format!("{label} must be {expected}")
}

// ─── Entity constraints ──────────────────────────────────────────────────────

fn string_list(config: &Value, key: &str) -> Vec<String> {
  config
    .get(key)
    .and_then(Value::as_array)
    .map(|items| {
      items
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
    })
    .unwrap_or_default()
}

pub fn check_constraint(
  constraint: &EntityConstraintDefinition,
  entity: &EntityPayload,
  errors: &mut Vec<ValidationIssue>,
) {
  let config = &constraint.configuration;
  let violation = match constraint.constraint_type {
    ConstraintType::UniqueTogether => string_list(config, "attribute_names")
      .into_iter()
      .find(|name| !entity.contains_key(name))
      .map(|name| {
        (
          ErrorCode::UniqueTogetherViolated,
          format!("Unique together constraint references unknown attribute: {name}"),
        )
      }),
    ConstraintType::ConditionalRequired => {
      let trigger = config.get("if_attribute").and_then(Value::as_str);
      let required = string_list(config, "then_required");
      match trigger {
        Some(trigger) if !required.is_empty() => {
          let actual = entity.get(trigger).unwrap_or(&Value::Null);
          let condition_met = match config.get("if_value") {
            None | Some(Value::Null) => !actual.is_null(),
            Some(expected) => actual == expected,
          };
          required
            .into_iter()
            .find(|name| condition_met && is_blank(entity.get(name)))
            .map(|name| {
              (
                ErrorCode::ConditionalRequiredViolated,
                constraint.error_message.clone().unwrap_or_else(|| {
                  format!("When {trigger} is set, {name} must also be provided")
                }),
              )
            })
        }
        _ => None,
      }
    }
    ConstraintType::MutualExclusion => {
      let names = string_list(config, "attribute_names");
      let present = names.iter().filter(|n| !is_blank(entity.get(*n))).count();
      (present > 1).then(|| {
        (
          ErrorCode::MutualExclusionViolated,
          constraint.error_message.clone().unwrap_or_else(|| {
            format!("Only one of {} can have a value", names.join(", "))
          }),
        )
      })
    }
    // Evaluated by downstream rule engines, never here.
    ConstraintType::CustomExpression => None,
  };

  if let Some((code, message)) = violation {
    errors.push(ValidationIssue {
      target: IssueTarget::Constraint {
        id:   constraint.id,
        name: constraint.name.clone(),
      },
      code,
      message,
    });
  }
}

// ─── Compiled validator ──────────────────────────────────────────────────────

/// Ready-to-run validator for one object type.
#[derive(Debug, Clone)]
pub struct CompiledValidator {
  pub object_type_id: ObjectTypeId,
  pub rules:          Vec<AttributeRule>,
  pub constraints:    Vec<EntityConstraintDefinition>,
}

impl CompiledValidator {
  pub fn new(
    object_type_id: ObjectTypeId,
    attributes: impl IntoIterator<Item = AttributeDefinition>,
    constraints: impl IntoIterator<Item = EntityConstraintDefinition>,
  ) -> Self {
    Self {
      object_type_id,
      rules: attributes.into_iter().map(AttributeRule::new).collect(),
      constraints: constraints.into_iter().collect(),
    }
  }

  pub fn validate(&self, entity: &EntityPayload) -> ValidationResult {
    let mut errors = Vec::new();
    for rule in &self.rules {
      rule.check(entity, &mut errors);
    }
    for constraint in &self.constraints {
      check_constraint(constraint, entity, &mut errors);
    }
    ValidationResult::from_errors(errors)
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Validates entity payloads, either ad hoc against raw definitions or via a
/// compiled snapshot's cached validators.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValidationEngine;

impl ValidationEngine {
  /// Validate against explicit definitions. Attributes are applied in the
  /// order given.
  pub fn validate_entity(
    &self,
    entity: &EntityPayload,
    attributes: &[AttributeDefinition],
    constraints: &[EntityConstraintDefinition],
  ) -> ValidationResult {
    let mut errors = Vec::new();
    for attribute in attributes {
      AttributeRule::new(attribute.clone()).check(entity, &mut errors);
    }
    for constraint in constraints {
      check_constraint(constraint, entity, &mut errors);
    }
    ValidationResult::from_errors(errors)
  }

  /// Validate as an instance of `object_type_id` in `snapshot`.
  pub fn validate(
    &self,
    entity: &EntityPayload,
    object_type_id: ObjectTypeId,
    snapshot: &OntologySnapshot,
  ) -> Result<ValidationResult> {
    if snapshot.object_type(object_type_id).is_none() {
      return Err(Error::ObjectTypeNotFound(object_type_id, snapshot.version.id));
    }
    let attributes: Vec<_> = snapshot
      .attributes_of(object_type_id)
      .into_iter()
      .cloned()
      .collect();
    let constraints: Vec<_> = snapshot
      .constraints_of(object_type_id)
      .into_iter()
      .cloned()
      .collect();
    Ok(self.validate_entity(entity, &attributes, &constraints))
  }

  /// Validate using the compiled validator for `object_type_id`.
  pub fn validate_against_ontology(
    &self,
    entity: &EntityPayload,
    object_type_id: ObjectTypeId,
    compiled: &CompiledOntologySnapshot,
  ) -> Result<ValidationResult> {
    let validator = compiled.validators.get(&object_type_id).ok_or(
      Error::ObjectTypeNotFound(object_type_id, compiled.snapshot.version.id),
    )?;
    Ok(validator.validate(entity))
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use ontic_core::{
    definition::Validity,
    ids::OntologyVersionId,
  };
  use serde_json::json;

  use super::*;

  fn attr(name: &str, data_type: AttributeDataType) -> AttributeDefinition {
    AttributeDefinition {
      id: AttributeId::new(),
      version_id: OntologyVersionId::new(),
      object_type_id: ObjectTypeId::new(),
      name: name.to_string(),
      display_name: name.to_uppercase(),
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
      ordinal: 0,
      created_by: None,
      validity: Validity::starting(Utc::now()),
    }
  }

  fn constraint(kind: ConstraintType, configuration: Value) -> EntityConstraintDefinition {
    EntityConstraintDefinition {
      id: ConstraintId::new(),
      version_id: OntologyVersionId::new(),
      object_type_id: ObjectTypeId::new(),
      name: "rule".to_string(),
      display_name: "Rule".to_string(),
      constraint_type: kind,
      configuration,
      error_message: None,
      ordinal: 0,
      validity: Validity::starting(Utc::now()),
    }
  }

  fn payload(value: Value) -> EntityPayload {
    value.as_object().cloned().unwrap()
  }

  #[test]
  fn required_blank_values_fail_once() {
    let mut status = attr("status", AttributeDataType::Enum);
    status.is_required = true;
    status.enum_values = vec!["OPERATIONAL".into()];
    let result = ValidationEngine.validate_entity(
      &payload(json!({"status": ""})),
      &[status],
      &[],
    );
    assert!(!result.valid);
    assert_eq!(result.codes(), [ErrorCode::Required]);
    assert_eq!(result.errors[0].message, "STATUS is required");
  }

  #[test]
  fn optional_nulls_are_skipped() {
    let capacity = attr("capacity", AttributeDataType::Integer);
    let result = ValidationEngine.validate_entity(
      &payload(json!({"capacity": null})),
      &[capacity],
      &[],
    );
    assert!(result.valid);
  }

  #[test]
  fn type_mismatch_skips_constraint_checks() {
    let mut capacity = attr("capacity", AttributeDataType::Integer);
    capacity.min_value = Some(10.0);
    let result = ValidationEngine.validate_entity(
      &payload(json!({"capacity": 2.5})),
      &[capacity],
      &[],
    );
    assert_eq!(result.codes(), [ErrorCode::TypeMismatch]);
  }

  #[test]
  fn string_bounds_and_pattern() {
    let mut code = attr("code", AttributeDataType::String);
    code.min_length = Some(3);
    code.max_length = Some(4);
    code.pattern = Some("^[A-Z]+$".to_string());

    let short = ValidationEngine.validate_entity(
      &payload(json!({"code": "ab"})),
      std::slice::from_ref(&code),
      &[],
    );
    assert_eq!(short.codes(), [ErrorCode::MinLength, ErrorCode::PatternMismatch]);

    let ok = ValidationEngine.validate_entity(
      &payload(json!({"code": "ABC"})),
      &[code],
      &[],
    );
    assert!(ok.valid);
  }

  #[test]
  fn numeric_and_array_bounds() {
    let mut load = attr("load", AttributeDataType::Float);
    load.max_value = Some(1.0);
    let mut tags = attr("tags", AttributeDataType::Array);
    tags.min_length = Some(1);
    let result = ValidationEngine.validate_entity(
      &payload(json!({"load": 1.5, "tags": []})),
      &[load, tags],
      &[],
    );
    assert_eq!(result.codes(), [ErrorCode::MaxValue, ErrorCode::MinItems]);
  }

  #[test]
  fn enum_membership_lists_choices() {
    let mut status = attr("status", AttributeDataType::Enum);
    status.enum_values = vec!["UP".into(), "DOWN".into()];
    let result = ValidationEngine.validate_entity(
      &payload(json!({"status": "SIDEWAYS"})),
      &[status],
      &[],
    );
    assert_eq!(result.codes(), [ErrorCode::NotInEnum]);
    assert_eq!(result.errors[0].message, "STATUS must be one of: UP, DOWN");
  }

  #[test]
  fn structured_types() {
    let coordinates = attr("coordinates", AttributeDataType::GeoPoint);
    let opened = attr("opened", AttributeDataType::Date);
    let good = ValidationEngine.validate_entity(
      &payload(json!({"coordinates": {"lat": 1.0, "lng": 2.0}, "opened": "2024-02-29"})),
      &[coordinates.clone(), opened.clone()],
      &[],
    );
    assert!(good.valid);

    let bad = ValidationEngine.validate_entity(
      &payload(json!({"coordinates": {"lat": 1.0}, "opened": "yesterday"})),
      &[coordinates, opened],
      &[],
    );
    assert_eq!(bad.codes(), [ErrorCode::TypeMismatch, ErrorCode::TypeMismatch]);
  }

  #[test]
  fn conditional_required() {
    let rule = constraint(
      ConstraintType::ConditionalRequired,
      json!({"if_attribute": "status", "if_value": "OFFLINE", "then_required": ["reason"]}),
    );
    let engine = ValidationEngine;

    let offline = engine.validate_entity(&payload(json!({"status": "OFFLINE"})), &[], &[rule.clone()]);
    assert_eq!(offline.codes(), [ErrorCode::ConditionalRequiredViolated]);
    assert_eq!(
      offline.errors[0].message,
      "When status is set, reason must also be provided"
    );

    let online = engine.validate_entity(&payload(json!({"status": "UP"})), &[], &[rule.clone()]);
    assert!(online.valid);

    let explained = engine.validate_entity(
      &payload(json!({"status": "OFFLINE", "reason": "flood"})),
      &[],
      &[rule],
    );
    assert!(explained.valid);
  }

  #[test]
  fn conditional_required_with_null_trigger_value_means_any_value() {
    let rule = constraint(
      ConstraintType::ConditionalRequired,
      json!({"if_attribute": "vendor", "if_value": null, "then_required": ["contract"]}),
    );
    let result = ValidationEngine.validate_entity(
      &payload(json!({"vendor": "acme"})),
      &[],
      &[rule],
    );
    assert!(!result.valid);
  }

  #[test]
  fn mutual_exclusion_and_unique_together() {
    let exclusive = constraint(
      ConstraintType::MutualExclusion,
      json!({"attribute_names": ["a", "b"]}),
    );
    let together = constraint(
      ConstraintType::UniqueTogether,
      json!({"attribute_names": ["a", "c"]}),
    );
    let result = ValidationEngine.validate_entity(
      &payload(json!({"a": 1, "b": 2})),
      &[],
      &[exclusive, together],
    );
    assert_eq!(
      result.codes(),
      [ErrorCode::MutualExclusionViolated, ErrorCode::UniqueTogetherViolated]
    );
  }

  #[test]
  fn custom_expressions_always_pass() {
    let rule = constraint(ConstraintType::CustomExpression, json!({"expr": "false"}));
    assert!(ValidationEngine.validate_entity(&EntityPayload::new(), &[], &[rule]).valid);
  }
}
