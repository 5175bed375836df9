//! The ontology engine: versioned definitions, point-in-time snapshots,
//! compilation into runtime artifacts, validation, diff and impact analysis,
//! scenario branches and the decision journal with replay.
//!
//! Everything here is synchronous and in-process. Storage and live entity
//! truth are reached through the traits in `ontic_core`.

pub mod cache;
pub mod clock;
pub mod compiler;
pub mod config;
pub mod decision;
pub mod determinism;
pub mod diff;
pub mod hash;
pub mod impact;
pub mod memory_truth;
pub mod replay;
pub mod resolver;
pub mod scenario;
pub mod seed;
pub mod store;
pub mod validation;
pub mod verify;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use ontic_core::truth::EntityTruthStore;

use crate::{
  clock::Clock,
  compiler::Compiler,
  config::EngineConfig,
  decision::DecisionJournalManager,
  diff::DiffEngine,
  impact::ImpactAnalyzer,
  replay::ReplayEngine,
  resolver::SnapshotResolver,
  scenario::ScenarioManager,
  store::DefinitionStore,
  validation::ValidationEngine,
  verify::ReplayVerificationEngine,
};

/// Every engine component, wired to one store and one truth backend.
pub struct Engine {
  pub config:       EngineConfig,
  pub store:        Arc<DefinitionStore>,
  pub resolver:     Arc<SnapshotResolver>,
  pub compiler:     Compiler,
  pub validation:   ValidationEngine,
  pub diff:         DiffEngine,
  pub impact:       ImpactAnalyzer,
  pub scenarios:    ScenarioManager,
  pub decisions:    DecisionJournalManager,
  pub replay:       ReplayEngine,
  pub verification: ReplayVerificationEngine,
}

impl Engine {
  pub fn new(
    config: EngineConfig,
    store: Arc<DefinitionStore>,
    truth: Arc<dyn EntityTruthStore>,
  ) -> Self {
    let clock: Arc<dyn Clock> = store.clock();
    let resolver = Arc::new(SnapshotResolver::with_capacity(
      store.clone(),
      config.snapshot_cache_capacity,
    ));
    Self {
      compiler: Compiler::with_capacity(config.compiled_cache_capacity),
      validation: ValidationEngine,
      diff: DiffEngine::new(resolver.clone()),
      impact: ImpactAnalyzer::new(truth.clone()),
      scenarios: ScenarioManager::new(store.clone(), truth, config.promotion_policy),
      decisions: DecisionJournalManager::new(clock),
      replay: ReplayEngine::new(config.environment.clone()),
      verification: ReplayVerificationEngine::new(resolver.clone()),
      resolver,
      store,
      config,
    }
  }
}

#[cfg(test)]
mod tests {
  use ontic_core::{
    decision::{DecisionContext, DecisionJournalInput},
    scenario::MutationType,
  };
  use serde_json::json;

  use super::*;
  use crate::{
    decision::capture_binding,
    memory_truth::MemoryTruthStore,
    replay::TimelineEventType,
    seed::seed_ontology,
    test_support::{clock, tenant},
  };

  #[test]
  fn a_decision_round_trip_through_every_component() {
    let clock = clock();
    let store = Arc::new(DefinitionStore::new(clock.clone()));
    let truth = Arc::new(MemoryTruthStore::new(clock.clone()));
    let engine = Engine::new(EngineConfig::default(), store, truth.clone());
    let seed = seed_ontology(&engine.store, &tenant()).unwrap();
    let now = clock.advance(chrono::Duration::minutes(1));

    let snapshot = engine.resolver.resolve_active_snapshot(now, &tenant()).unwrap();
    let compiled = engine.compiler.compile(snapshot).unwrap();
    let payload = json!({"name": "Pump 7", "status": "OPERATIONAL"});
    let payload = payload.as_object().cloned().unwrap_or_default();
    let result = engine
      .validation
      .validate_against_ontology(&payload, seed.asset, &compiled)
      .unwrap();
    assert!(result.valid);

    let pump = truth.insert_entity(&tenant(), seed.asset, payload).unwrap();
    let branch = engine
      .scenarios
      .create_scenario(&tenant(), now, seed.version.id, "alice", None)
      .unwrap();
    engine
      .scenarios
      .add_mutation(branch.id, pump, MutationType::StatusChange, json!("OFFLINE"), None)
      .unwrap();

    let mut context = DecisionContext::at(now);
    context.right_scenario_id = Some(branch.id);
    context.ontology = Some(capture_binding(&engine.resolver, &tenant(), now).unwrap());
    let decision = engine
      .decisions
      .submit_decision(DecisionJournalInput {
        tenant:             tenant(),
        author:             "alice".into(),
        justification:      "take pump 7 offline".into(),
        chosen_scenario_id: Some(branch.id),
        context,
      })
      .unwrap();
    engine.scenarios.promote_scenario(branch.id, "alice").unwrap();

    let timeline = engine.replay.assemble_timeline(&decision);
    assert_eq!(
      timeline.events.last().map(|e| e.event_type()),
      Some(TimelineEventType::HumanDecision)
    );
    let verification = engine.verification.verify_decision(&decision).unwrap().unwrap();
    assert!(verification.is_valid);
    assert_eq!(
      truth.current_entity(&tenant(), pump).unwrap().unwrap().attribute("status"),
      json!("OFFLINE")
    );
  }
}
