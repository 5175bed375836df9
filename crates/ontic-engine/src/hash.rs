//! Deterministic snapshot fingerprints.
//!
//! The canonical form lists every element as a `:`-joined record, grouped by
//! kind and sorted by id, with records joined by `|`. Only structural fields
//! take part; timestamps and version ids do not, so two versions with
//! identical content hash identically.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use ontic_core::{
  definition::{
    AttributeDefinition, EntityConstraintDefinition, MetricDefinition,
    ObjectTypeDefinition, RelationshipTypeDefinition,
  },
  ids::OntologyVersionId,
  snapshot::{ElementCounts, OntologySnapshot, SnapshotHash},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHashReport {
  pub version_id:      OntologyVersionId,
  pub as_of:           DateTime<Utc>,
  pub snapshot_hash:   SnapshotHash,
  pub elements_hashed: ElementCounts,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SnapshotHasher;

impl SnapshotHasher {
  pub fn compute(&self, snapshot: &OntologySnapshot) -> SnapshotHashReport {
    SnapshotHashReport {
      version_id:      snapshot.version.id,
      as_of:           snapshot.as_of,
      snapshot_hash:   self.hash(snapshot),
      elements_hashed: snapshot.counts(),
    }
  }

  pub fn hash(&self, snapshot: &OntologySnapshot) -> SnapshotHash {
    let digest = Sha256::digest(canonical_form(snapshot).as_bytes());
    SnapshotHash::from_hex(hex::encode(digest))
  }
}

/// The exact string that gets hashed.
pub fn canonical_form(snapshot: &OntologySnapshot) -> String {
  // BTreeMap iteration is already in id order.
  let records = snapshot
    .object_types
    .values()
    .map(object_type_record)
    .chain(snapshot.attributes.values().map(attribute_record))
    .chain(snapshot.relationship_types.values().map(relationship_record))
    .chain(snapshot.metrics.values().map(metric_record))
    .chain(snapshot.constraints.values().map(constraint_record));

  let mut out = String::new();
  for (i, record) in records.enumerate() {
    if i > 0 {
      out.push('|');
    }
    out.push_str(&record);
  }
  out
}

// ─── Field encoding ──────────────────────────────────────────────────────────

/// Builds one `:`-joined record. Delimiters inside values are escaped and
/// absent values are written as `~`, so distinct inputs never collide.
struct Record(String);

impl Record {
  fn new(prefix: &str) -> Self { Self(prefix.to_string()) }

  fn text(mut self, value: &str) -> Self {
    self.0.push(':');
    for c in value.chars() {
      if matches!(c, '\\' | ':' | '|' | '~') {
        self.0.push('\\');
      }
      self.0.push(c);
    }
    self
  }

  fn opt_text(self, value: Option<&str>) -> Self {
    match value {
      Some(v) => self.text(v),
      None => self.absent(),
    }
  }

  fn display(self, value: impl std::fmt::Display) -> Self {
    self.text(&value.to_string())
  }

  fn opt_display<T: std::fmt::Display>(self, value: Option<T>) -> Self {
    match value {
      Some(v) => self.display(v),
      None => self.absent(),
    }
  }

  /// A list is one field; `\` and `,` inside an item are escaped first.
  fn list(self, items: &[String]) -> Self {
    let escaped: Vec<_> = items
      .iter()
      .map(|item| item.replace('\\', "\\\\").replace(',', "\\,"))
      .collect();
    self.text(&escaped.join(","))
  }

  fn flag(mut self, value: bool) -> Self {
    self.0.push_str(if value { ":1" } else { ":0" });
    self
  }

  fn absent(mut self) -> Self {
    self.0.push_str(":~");
    self
  }

  fn finish(self) -> String { self.0 }
}

fn object_type_record(d: &ObjectTypeDefinition) -> String {
  Record::new("OBJ")
    .display(d.id)
    .text(&d.name)
    .text(&d.display_name)
    .opt_text(d.description.as_deref())
    .opt_text(d.icon.as_deref())
    .opt_text(d.color.as_deref())
    .flag(d.is_abstract)
    .opt_display(d.extends_type_id)
    .finish()
}

fn attribute_record(d: &AttributeDefinition) -> String {
  Record::new("ATTR")
    .display(d.id)
    .display(d.object_type_id)
    .text(&d.name)
    .text(&d.display_name)
    .display(d.data_type)
    .flag(d.is_required)
    .flag(d.is_unique)
    .flag(d.is_indexed)
    .flag(d.is_primary_display)
    .opt_text(d.pattern.as_deref())
    .opt_display(d.min_length)
    .opt_display(d.max_length)
    .opt_display(d.min_value)
    .opt_display(d.max_value)
    .list(&d.enum_values)
    .opt_display(d.reference_target_type_id)
    .opt_display(d.array_element_type)
    .opt_text(d.description.as_deref())
    .display(d.ordinal)
    .finish()
}

fn relationship_record(d: &RelationshipTypeDefinition) -> String {
  Record::new("REL")
    .display(d.id)
    .text(&d.name)
    .text(&d.display_name)
    .display(d.from_type_id)
    .display(d.to_type_id)
    .display(d.direction)
    .display(d.cardinality)
    .flag(d.is_temporal)
    .opt_text(d.inverse_name.as_deref())
    .finish()
}

fn metric_record(d: &MetricDefinition) -> String {
  Record::new("METRIC")
    .display(d.id)
    .text(&d.name)
    .text(&d.display_name)
    .display(d.aggregation_type)
    .display(d.target_object_type_id)
    .opt_display(d.target_attribute_id)
    .opt_text(d.filter_expression.as_deref())
    .opt_display(d.group_by_attribute_id)
    .finish()
}

fn constraint_record(d: &EntityConstraintDefinition) -> String {
  Record::new("CONSTRAINT")
    .display(d.id)
    .display(d.object_type_id)
    .text(&d.name)
    .display(d.constraint_type)
    .text(&canonical_json(&d.configuration))
    .opt_text(d.error_message.as_deref())
    .finish()
}

/// JSON with object keys sorted, independent of map implementation.
fn canonical_json(value: &Value) -> String {
  fn write(out: &mut String, value: &Value) {
    match value {
      Value::Object(map) => {
        let mut keys: Vec<_> = map.keys().collect();
        keys.sort();
        out.push('{');
        for (i, key) in keys.into_iter().enumerate() {
          if i > 0 {
            out.push(',');
          }
          let _ = write!(out, "{}:", Value::String(key.clone()));
          write(out, &map[key]);
        }
        out.push('}');
      }
      Value::Array(items) => {
        out.push('[');
        for (i, item) in items.iter().enumerate() {
          if i > 0 {
            out.push(',');
          }
          write(out, item);
        }
        out.push(']');
      }
      other => {
        let _ = write!(out, "{other}");
      }
    }
  }

  let mut out = String::new();
  write(&mut out, value);
  out
}
