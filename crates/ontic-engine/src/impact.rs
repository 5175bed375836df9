//! Classifies what an ontology diff means for live data, workflows, metrics
//! and the replay of past decisions.

use std::sync::Arc;

use ontic_core::{
  Error, Result,
  ids::{AttributeId, MetricId, ObjectTypeId, OntologyVersionId, TenantId},
  truth::EntityTruthStore,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::diff::{AttributeModification, OntologyDiff};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
  None,
  Low,
  Medium,
  High,
  Breaking,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityImpact {
  pub object_type_id:   ObjectTypeId,
  pub object_type_name: String,
  pub entity_count:     usize,
  pub severity:         Severity,
  pub reasons:          Vec<String>,
}

/// The ontology elements a workflow depends on. Workflow definitions live
/// outside the engine; callers describe them with bindings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowBinding {
  pub workflow_id:     String,
  pub name:            String,
  pub object_type_ids: Vec<ObjectTypeId>,
  pub attribute_ids:   Vec<AttributeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowImpact {
  pub workflow_id:   String,
  pub workflow_name: String,
  pub severity:      Severity,
  pub reasons:       Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricImpact {
  pub metric_id:   MetricId,
  pub metric_name: String,
  pub severity:    Severity,
  pub reasons:     Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayCompatibility {
  pub compatible: bool,
  pub reasons:    Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OntologyImpactAnalysis {
  pub from_version_id:        OntologyVersionId,
  pub to_version_id:          OntologyVersionId,
  pub entity_impacts:         Vec<EntityImpact>,
  pub workflow_impacts:       Vec<WorkflowImpact>,
  pub metric_impacts:         Vec<MetricImpact>,
  pub replay_compatibility:   ReplayCompatibility,
  pub breaking_changes_count: usize,
  pub migration_required:     bool,
}

// ─── Severity table ──────────────────────────────────────────────────────────

/// Accumulates the highest severity seen along with every reason.
#[derive(Debug)]
struct Verdict {
  severity: Severity,
  reasons:  Vec<String>,
}

impl Verdict {
  fn new(floor: Severity) -> Self { Self { severity: floor, reasons: Vec::new() } }

  fn raise(&mut self, severity: Severity, reason: impl Into<String>) {
    self.severity = self.severity.max(severity);
    self.reasons.push(reason.into());
  }

  fn is_none(&self) -> bool { self.severity == Severity::None }
}

fn plain(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

fn attribute_verdict(m: &AttributeModification) -> Verdict {
  let mut verdict = Verdict::new(Severity::None);
  if let Some(change) = m.changed("data_type") {
    verdict.raise(
      Severity::Breaking,
      format!(
        "Attribute data type changed from {} to {}",
        plain(&change.old_value),
        plain(&change.new_value)
      ),
    );
  }
  if m.changed("is_required").is_some_and(|c| c.new_value == Value::Bool(true)) {
    verdict.raise(Severity::High, "Attribute became required");
  }
  if m.changed("is_unique").is_some_and(|c| c.new_value == Value::Bool(true)) {
    verdict.raise(Severity::High, "Attribute became unique");
  }
  verdict
}

// ─── Analyzer ────────────────────────────────────────────────────────────────

pub struct ImpactAnalyzer {
  truth: Arc<dyn EntityTruthStore>,
}

impl ImpactAnalyzer {
  pub fn new(truth: Arc<dyn EntityTruthStore>) -> Self { Self { truth } }

  pub fn analyze_impact(
    &self,
    diff: &OntologyDiff,
    tenant: &TenantId,
    workflows: &[WorkflowBinding],
  ) -> Result<OntologyImpactAnalysis> {
    let entity_impacts = self.entity_impacts(diff, tenant)?;
    let workflow_impacts = workflow_impacts(diff, workflows);
    let metric_impacts = metric_impacts(diff);
    let replay_compatibility = replay_compatibility(diff);

    let breaking_changes_count = entity_impacts
      .iter()
      .map(|i| i.severity)
      .chain(workflow_impacts.iter().map(|i| i.severity))
      .chain(metric_impacts.iter().map(|i| i.severity))
      .filter(|s| *s == Severity::Breaking)
      .count();
    let migration_required = breaking_changes_count > 0
      || !diff.object_types.removed.is_empty()
      || !diff.attributes.removed.is_empty();

    info!(
      tenant = %tenant,
      from = %diff.from_version_id,
      to = %diff.to_version_id,
      breaking = breaking_changes_count,
      replay_compatible = replay_compatibility.compatible,
      "impact analyzed"
    );

    Ok(OntologyImpactAnalysis {
      from_version_id: diff.from_version_id,
      to_version_id: diff.to_version_id,
      entity_impacts,
      workflow_impacts,
      metric_impacts,
      replay_compatibility,
      breaking_changes_count,
      migration_required,
    })
  }

  fn count(&self, tenant: &TenantId, object_type_id: ObjectTypeId) -> Result<usize> {
    self
      .truth
      .count_entities(tenant, object_type_id)
      .map_err(Error::Truth)
  }

  fn entity_impacts(
    &self,
    diff: &OntologyDiff,
    tenant: &TenantId,
  ) -> Result<Vec<EntityImpact>> {
    let mut impacts = Vec::new();

    for removed in &diff.object_types.removed {
      let entity_count = self.count(tenant, removed.id)?;
      if entity_count > 0 {
        impacts.push(EntityImpact {
          object_type_id: removed.id,
          object_type_name: removed.name.clone(),
          entity_count,
          severity: Severity::Breaking,
          reasons: vec![format!(
            "Object type removed with {entity_count} existing entities"
          )],
        });
      }
    }

    for modification in &diff.attributes.modified {
      let verdict = attribute_verdict(modification);
      if verdict.is_none() {
        continue;
      }
      impacts.push(EntityImpact {
        object_type_id:   modification.object_type_id,
        object_type_name: modification.object_type_name.clone(),
        entity_count:     self.count(tenant, modification.object_type_id)?,
        severity:         verdict.severity,
        reasons:          verdict
          .reasons
          .into_iter()
          .map(|r| format!("{}: {r}", modification.name))
          .collect(),
      });
    }

    Ok(impacts)
  }
}

fn workflow_impacts(
  diff: &OntologyDiff,
  workflows: &[WorkflowBinding],
) -> Vec<WorkflowImpact> {
  workflows
    .iter()
    .filter_map(|workflow| {
      let mut verdict = Verdict::new(Severity::None);

      for removed in &diff.object_types.removed {
        if workflow.object_type_ids.contains(&removed.id) {
          verdict.raise(
            Severity::Breaking,
            format!("Referenced object type {} was removed", removed.name),
          );
        }
      }
      for removed in &diff.attributes.removed {
        if workflow.attribute_ids.contains(&removed.id) {
          verdict.raise(
            Severity::Medium,
            format!("Referenced attribute {} was removed", removed.name),
          );
        }
      }
      for modification in &diff.attributes.modified {
        if !workflow.attribute_ids.contains(&modification.attribute_id) {
          continue;
        }
        let attribute = attribute_verdict(modification);
        for reason in attribute.reasons {
          verdict.raise(attribute.severity, format!("{}: {reason}", modification.name));
        }
      }

      (!verdict.is_none()).then(|| WorkflowImpact {
        workflow_id:   workflow.workflow_id.clone(),
        workflow_name: workflow.name.clone(),
        severity:      verdict.severity,
        reasons:       verdict.reasons,
      })
    })
    .collect()
}

fn metric_impacts(diff: &OntologyDiff) -> Vec<MetricImpact> {
  let removed = diff.metrics.removed.iter().map(|metric| MetricImpact {
    metric_id:   metric.id,
    metric_name: metric.name.clone(),
    severity:    Severity::High,
    reasons:     vec!["Metric removed".to_string()],
  });

  let modified = diff.metrics.modified.iter().map(|m| {
    let mut verdict = Verdict::new(Severity::Low);
    if let Some(change) = m.changed("aggregation_type") {
      verdict.raise(
        Severity::High,
        format!(
          "Aggregation type changed from {} to {}",
          plain(&change.old_value),
          plain(&change.new_value)
        ),
      );
    }
    if m.changed("target_object_type_id").is_some() {
      verdict.raise(Severity::Breaking, "Target object type changed");
    }
    MetricImpact {
      metric_id:   m.id,
      metric_name: m.name.clone(),
      severity:    verdict.severity,
      reasons:     verdict.reasons,
    }
  });

  removed.chain(modified).collect()
}

fn replay_compatibility(diff: &OntologyDiff) -> ReplayCompatibility {
  let mut reasons = Vec::new();
  let removed_types = diff.object_types.removed.len();
  if removed_types > 0 {
    reasons.push(format!("{removed_types} object type(s) removed"));
  }
  let removed_attributes = diff.attributes.removed.len();
  if removed_attributes > 0 {
    reasons.push(format!("{removed_attributes} attribute(s) removed"));
  }
  let retyped = diff
    .attributes
    .modified
    .iter()
    .filter(|m| m.changed("data_type").is_some())
    .count();
  if retyped > 0 {
    reasons.push(format!("{retyped} attribute(s) changed data type"));
  }
  ReplayCompatibility { compatible: reasons.is_empty(), reasons }
}
