//! Checks that a replay sees the ontology its decision was made against.
//!
//! Divergence is reported, logged and returned; it never blocks a replay.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ontic_core::{
  Result,
  decision::DecisionJournal,
  ids::{OntologyVersionId, TenantId},
  snapshot::SnapshotHash,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{hash::SnapshotHasher, resolver::SnapshotResolver};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayVerification {
  /// True when no hash was stored or the stored hash still matches.
  pub is_valid:      bool,
  pub expected_hash: Option<SnapshotHash>,
  pub actual_hash:   SnapshotHash,
  pub version_id:    OntologyVersionId,
  pub warning:       Option<String>,
}

pub struct ReplayVerificationEngine {
  resolver: Arc<SnapshotResolver>,
}

impl ReplayVerificationEngine {
  pub fn new(resolver: Arc<SnapshotResolver>) -> Self { Self { resolver } }

  pub fn verify_replay_context(
    &self,
    version_id: OntologyVersionId,
    as_of: DateTime<Utc>,
    tenant: &TenantId,
    stored_hash: Option<&SnapshotHash>,
  ) -> Result<ReplayVerification> {
    let snapshot = self.resolver.resolve_snapshot(version_id, as_of, tenant)?;
    let actual_hash = SnapshotHasher.hash(&snapshot);
    let is_valid = stored_hash.is_none_or(|stored| stored == &actual_hash);

    let warning = (!is_valid).then(|| {
      format!(
        "Replay context diverged from original ontology state. Expected hash: {}, \
         Actual hash: {actual_hash}. Ontology may have been modified since the \
         decision was recorded.",
        stored_hash.map(SnapshotHash::as_str).unwrap_or_default(),
      )
    });
    match &warning {
      Some(message) => warn!(version = %version_id, %as_of, "{message}"),
      None => debug!(version = %version_id, %as_of, hash = %actual_hash, "replay context verified"),
    }

    Ok(ReplayVerification {
      is_valid,
      expected_hash: stored_hash.cloned(),
      actual_hash,
      version_id,
      warning,
    })
  }

  /// Verify a recorded decision against its ontology binding. Decisions
  /// recorded without a binding have nothing to verify.
  pub fn verify_decision(
    &self,
    decision: &DecisionJournal,
  ) -> Result<Option<ReplayVerification>> {
    let Some(binding) = &decision.context.ontology else {
      return Ok(None);
    };
    self
      .verify_replay_context(
        binding.version_id,
        decision.context.as_of,
        &decision.tenant,
        Some(&binding.snapshot_hash),
      )
      .map(Some)
  }
}

#[cfg(test)]
mod tests {
  use ontic_core::{
    decision::{DecisionContext, OntologyBinding},
    definition::{DefinitionRef, NewObjectType, NewVersion},
    ids::DecisionId,
  };

  use super::*;
  use crate::{
    decision::capture_binding,
    test_support::{Fixture, tenant},
  };

  fn engine(fx: &Fixture) -> ReplayVerificationEngine {
    ReplayVerificationEngine::new(fx.resolver.clone())
  }

  #[test]
  fn matching_hashes_verify() {
    let fx = Fixture::seeded();
    let binding = capture_binding(&fx.resolver, &tenant(), fx.now()).unwrap();
    let result = engine(&fx)
      .verify_replay_context(
        binding.version_id,
        fx.now(),
        &tenant(),
        Some(&binding.snapshot_hash),
      )
      .unwrap();
    assert!(result.is_valid);
    assert!(result.warning.is_none());
  }

  #[test]
  fn missing_hashes_are_not_divergence() {
    let fx = Fixture::seeded();
    let result = engine(&fx)
      .verify_replay_context(fx.seed().version.id, fx.now(), &tenant(), None)
      .unwrap();
    assert!(result.is_valid);
    assert_eq!(result.expected_hash, None);
  }

  #[test]
  fn divergence_warns_without_failing() {
    let fx = Fixture::seeded();
    let stored = SnapshotHash::from_hex("0".repeat(64));
    let result = engine(&fx)
      .verify_replay_context(fx.seed().version.id, fx.now(), &tenant(), Some(&stored))
      .unwrap();
    assert!(!result.is_valid);
    let warning = result.warning.unwrap();
    assert!(warning.starts_with("Replay context diverged from original ontology state."));
    assert!(warning.contains(&format!("Expected hash: {stored}")));
    assert!(warning.contains(result.actual_hash.as_str()));
  }

  #[test]
  fn edits_after_the_decision_are_detected() {
    let fx = Fixture::seeded();
    let draft = fx
      .store
      .create_version(&tenant(), NewVersion::new("draft", "alice"))
      .unwrap();
    let vendor = fx
      .store
      .create_object_type(&tenant(), draft.id, NewObjectType::new("vendor", "Vendor"))
      .unwrap();
    let as_of = fx.clock.advance(chrono::Duration::hours(1));
    let snapshot = fx.resolver.resolve_snapshot(draft.id, as_of, &tenant()).unwrap();

    let mut context = DecisionContext::at(as_of);
    context.ontology = Some(OntologyBinding {
      version_id:    draft.id,
      snapshot_hash: SnapshotHasher.hash(&snapshot),
    });
    let decision = DecisionJournal {
      id: DecisionId::new(),
      tenant: tenant(),
      timestamp: as_of,
      author: "alice".into(),
      justification: "vendor onboarding".into(),
      chosen_scenario_id: None,
      context,
    };
    assert!(engine(&fx).verify_decision(&decision).unwrap().unwrap().is_valid);

    // Deprecating with a timestamp before `as_of` rewrites what that
    // instant resolves to.
    fx.clock.set(as_of - chrono::Duration::minutes(30));
    fx.store
      .deprecate(&tenant(), draft.id, DefinitionRef::ObjectType(vendor.id), None)
      .unwrap();
    let result = engine(&fx).verify_decision(&decision).unwrap().unwrap();
    assert!(!result.is_valid);
  }

  #[test]
  fn decisions_without_a_binding_are_skipped() {
    let fx = Fixture::seeded();
    let decision = DecisionJournal {
      id: DecisionId::new(),
      tenant: tenant(),
      timestamp: fx.now(),
      author: "alice".into(),
      justification: "status quo".into(),
      chosen_scenario_id: None,
      context: DecisionContext::at(fx.now()),
    };
    assert_eq!(engine(&fx).verify_decision(&decision).unwrap(), None);
  }
}
