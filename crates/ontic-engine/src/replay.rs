//! Replay timelines for recorded decisions.
//!
//! A timeline is assembled purely from what the journal recorded. Nothing is
//! recomputed, so the same decision always yields the same timeline.

use chrono::{DateTime, Utc};
use ontic_core::{
  decision::{AiExplanation, DecisionJournal, OntologyBinding},
  ids::{DecisionId, ScenarioId},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

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
pub enum TimelineEventType {
  SystemContext,
  BaseRealitySnapshot,
  ScenarioBranches,
  ComparisonView,
  AiExplanation,
  HumanDecision,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRef {
  pub id:    ScenarioId,
  pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimelinePayload {
  SystemContext {
    as_of:       DateTime<Utc>,
    user:        String,
    environment: String,
  },
  BaseRealitySnapshot {
    as_of:    DateTime<Utc>,
    ontology: Option<OntologyBinding>,
  },
  ScenarioBranches {
    active_scenarios: Vec<ScenarioRef>,
  },
  ComparisonView {
    left_scenario_id:    Option<ScenarioId>,
    right_scenario_id:   Option<ScenarioId>,
    delta_summary:       Value,
    comparison_metadata: Option<Value>,
  },
  AiExplanation(AiExplanation),
  HumanDecision {
    chosen_scenario_id: Option<ScenarioId>,
    justification:      String,
    author:             String,
  },
}

impl TimelinePayload {
  pub fn event_type(&self) -> TimelineEventType {
    match self {
      Self::SystemContext { .. } => TimelineEventType::SystemContext,
      Self::BaseRealitySnapshot { .. } => TimelineEventType::BaseRealitySnapshot,
      Self::ScenarioBranches { .. } => TimelineEventType::ScenarioBranches,
      Self::ComparisonView { .. } => TimelineEventType::ComparisonView,
      Self::AiExplanation(_) => TimelineEventType::AiExplanation,
      Self::HumanDecision { .. } => TimelineEventType::HumanDecision,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
  pub index:     usize,
  pub timestamp: DateTime<Utc>,
  #[serde(flatten)]
  pub payload:   TimelinePayload,
}

impl TimelineEvent {
  pub fn event_type(&self) -> TimelineEventType { self.payload.event_type() }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayTimeline {
  pub decision_id: DecisionId,
  pub decided_at:  DateTime<Utc>,
  pub events:      Vec<TimelineEvent>,
}

#[derive(Debug, Clone)]
pub struct ReplayEngine {
  environment: String,
}

impl Default for ReplayEngine {
  fn default() -> Self { Self::new("production") }
}

impl ReplayEngine {
  /// `environment` is reported in every timeline's system context.
  pub fn new(environment: impl Into<String>) -> Self {
    Self { environment: environment.into() }
  }

  pub fn assemble_timeline(&self, decision: &DecisionJournal) -> ReplayTimeline {
    let context = &decision.context;
    let as_of = context.as_of;

    let active_scenarios = [
      (context.left_scenario_id, "Left Scenario"),
      (context.right_scenario_id, "Right Scenario"),
    ]
    .into_iter()
    .filter_map(|(id, label)| id.map(|id| ScenarioRef { id, label: label.into() }))
    .collect();

    let mut payloads = vec![
      (as_of, TimelinePayload::SystemContext {
        as_of,
        user: decision.author.clone(),
        environment: self.environment.clone(),
      }),
      (as_of, TimelinePayload::BaseRealitySnapshot {
        as_of,
        ontology: context.ontology.clone(),
      }),
      (as_of, TimelinePayload::ScenarioBranches { active_scenarios }),
      (as_of, TimelinePayload::ComparisonView {
        left_scenario_id:    context.left_scenario_id,
        right_scenario_id:   context.right_scenario_id,
        delta_summary:       context.delta_summary.clone(),
        comparison_metadata: context.comparison_metadata.clone(),
      }),
    ];
    if let Some(explanation) = &context.ai_explanation {
      payloads.push((as_of, TimelinePayload::AiExplanation(explanation.clone())));
    }
    payloads.push((decision.timestamp, TimelinePayload::HumanDecision {
      chosen_scenario_id: decision.chosen_scenario_id,
      justification:      decision.justification.clone(),
      author:             decision.author.clone(),
    }));

    ReplayTimeline {
      decision_id: decision.id,
      decided_at:  decision.timestamp,
      events:      payloads
        .into_iter()
        .enumerate()
        .map(|(index, (timestamp, payload))| TimelineEvent { index, timestamp, payload })
        .collect(),
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::Duration;
  use ontic_core::{
    decision::DecisionContext, ids::TenantId, snapshot::SnapshotHash,
  };
  use serde_json::json;

  use super::*;
  use crate::test_support::t0;

  fn decision(context: DecisionContext) -> DecisionJournal {
    DecisionJournal {
      id: DecisionId::new(),
      tenant: TenantId::new("acme"),
      timestamp: t0() + Duration::hours(2),
      author: "alice".into(),
      justification: "lower risk".into(),
      chosen_scenario_id: context.right_scenario_id,
      context,
    }
  }

  fn types(timeline: &ReplayTimeline) -> Vec<TimelineEventType> {
    timeline.events.iter().map(TimelineEvent::event_type).collect()
  }

  #[test]
  fn events_follow_the_fixed_order() {
    let mut context = DecisionContext::at(t0());
    context.left_scenario_id = Some(ScenarioId::new());
    context.right_scenario_id = Some(ScenarioId::new());
    let timeline = ReplayEngine::default().assemble_timeline(&decision(context));

    use TimelineEventType::*;
    assert_eq!(types(&timeline), [
      SystemContext,
      BaseRealitySnapshot,
      ScenarioBranches,
      ComparisonView,
      HumanDecision
    ]);
    let indexes: Vec<_> = timeline.events.iter().map(|e| e.index).collect();
    assert_eq!(indexes, [0, 1, 2, 3, 4]);
  }

  #[test]
  fn ai_explanations_sit_before_the_human_decision() {
    let mut context = DecisionContext::at(t0());
    context.ai_explanation = Some(AiExplanation {
      summary:   "Option B halves downtime".into(),
      rationale: vec!["fewer dependencies".into()],
      source:    None,
    });
    let timeline = ReplayEngine::default().assemble_timeline(&decision(context));
    assert_eq!(timeline.events[4].event_type(), TimelineEventType::AiExplanation);
    assert_eq!(timeline.events[5].event_type(), TimelineEventType::HumanDecision);
  }

  #[test]
  fn only_the_decision_event_carries_the_submission_time() {
    let d = decision(DecisionContext::at(t0()));
    let timeline = ReplayEngine::new("staging").assemble_timeline(&d);
    let (last, rest) = timeline.events.split_last().unwrap();
    assert!(rest.iter().all(|e| e.timestamp == t0()));
    assert_eq!(last.timestamp, d.timestamp);
    assert!(matches!(
      &timeline.events[0].payload,
      TimelinePayload::SystemContext { environment, .. } if environment == "staging"
    ));
  }

  #[test]
  fn assembly_is_deterministic() {
    let mut context = DecisionContext::at(t0());
    context.delta_summary = json!({"cost": 12});
    context.ontology = Some(OntologyBinding {
      version_id:    ontic_core::ids::OntologyVersionId::new(),
      snapshot_hash: SnapshotHash::from_hex("ab".repeat(32)),
    });
    let d = decision(context);
    let engine = ReplayEngine::default();
    assert_eq!(engine.assemble_timeline(&d), engine.assemble_timeline(&d));
  }

  #[test]
  fn only_recorded_branches_are_listed() {
    let mut context = DecisionContext::at(t0());
    let right = ScenarioId::new();
    context.right_scenario_id = Some(right);
    let timeline = ReplayEngine::default().assemble_timeline(&decision(context));
    let TimelinePayload::ScenarioBranches { active_scenarios } = &timeline.events[2].payload
    else {
      panic!("expected scenario branches");
    };
    assert_eq!(active_scenarios, &[ScenarioRef { id: right, label: "Right Scenario".into() }]);
  }

  #[test]
  fn events_serialize_with_their_type() {
    let timeline =
      ReplayEngine::default().assemble_timeline(&decision(DecisionContext::at(t0())));
    let value = serde_json::to_value(&timeline.events[0]).unwrap();
    assert_eq!(value["event_type"], json!("SYSTEM_CONTEXT"));
    assert_eq!(value["payload"]["user"], json!("alice"));
    assert_eq!(value["index"], json!(0));
  }
}
