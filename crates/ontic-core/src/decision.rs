//! Decision journal records.
//!
//! A decision is written once and never edited. Its context captures enough
//! of the moment (truth time, compared branches, ontology binding) to replay
//! the decision later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
  ids::{DecisionId, OntologyVersionId, ScenarioId, TenantId},
  snapshot::SnapshotHash,
};

/// The ontology state a decision was made against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OntologyBinding {
  pub version_id:    OntologyVersionId,
  pub snapshot_hash: SnapshotHash,
}

/// An explanation shown to the decision maker, recorded verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiExplanation {
  pub summary:   String,
  pub rationale: Vec<String>,
  /// Free-form label for whatever produced the explanation.
  pub source:    Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionContext {
  pub as_of:               DateTime<Utc>,
  pub left_scenario_id:    Option<ScenarioId>,
  pub right_scenario_id:   Option<ScenarioId>,
  pub delta_summary:       Value,
  pub comparison_metadata: Option<Value>,
  pub workflow_context:    Option<Value>,
  pub ontology:            Option<OntologyBinding>,
  pub ai_explanation:      Option<AiExplanation>,
}

impl DecisionContext {
  pub fn at(as_of: DateTime<Utc>) -> Self {
    Self {
      as_of,
      left_scenario_id: None,
      right_scenario_id: None,
      delta_summary: Value::Null,
      comparison_metadata: None,
      workflow_context: None,
      ontology: None,
      ai_explanation: None,
    }
  }
}

#[derive(Debug, Clone)]
pub struct DecisionJournalInput {
  pub tenant:             TenantId,
  pub author:             String,
  pub justification:      String,
  /// `None` means the status quo was kept.
  pub chosen_scenario_id: Option<ScenarioId>,
  pub context:            DecisionContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionJournal {
  pub id:                 DecisionId,
  pub tenant:             TenantId,
  pub timestamp:          DateTime<Utc>,
  pub author:             String,
  pub justification:      String,
  pub chosen_scenario_id: Option<ScenarioId>,
  pub context:            DecisionContext,
}
