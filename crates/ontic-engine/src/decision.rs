//! The append-only decision journal.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use ontic_core::{
  Error, Result,
  decision::{DecisionJournal, DecisionJournalInput, OntologyBinding},
  ids::{DecisionId, TenantId},
};
use tracing::info;

use crate::{clock::Clock, hash::SnapshotHasher, resolver::SnapshotResolver};

/// Pin a decision to the tenant's active ontology as it was at `as_of`.
pub fn capture_binding(
  resolver: &SnapshotResolver,
  tenant: &TenantId,
  as_of: DateTime<Utc>,
) -> Result<OntologyBinding> {
  let snapshot = resolver.resolve_active_snapshot(as_of, tenant)?;
  Ok(OntologyBinding {
    version_id:    snapshot.version.id,
    snapshot_hash: SnapshotHasher.hash(&snapshot),
  })
}

pub struct DecisionJournalManager {
  clock:     Arc<dyn Clock>,
  decisions: RwLock<Vec<DecisionJournal>>,
}

impl DecisionJournalManager {
  pub fn new(clock: Arc<dyn Clock>) -> Self {
    Self { clock, decisions: RwLock::new(Vec::new()) }
  }

  /// Record a decision. There is no way to change it afterwards.
  pub fn submit_decision(&self, input: DecisionJournalInput) -> Result<DecisionJournal> {
    if input.author.trim().is_empty() {
      return Err(Error::InvalidDecision("author is required".into()));
    }
    if input.justification.trim().is_empty() {
      return Err(Error::InvalidDecision("justification is required".into()));
    }

    let decision = DecisionJournal {
      id:                 DecisionId::new(),
      tenant:             input.tenant,
      timestamp:          self.clock.now(),
      author:             input.author,
      justification:      input.justification,
      chosen_scenario_id: input.chosen_scenario_id,
      context:            input.context,
    };
    self
      .decisions
      .write()
      .map_err(|_| Error::Poisoned)?
      .push(decision.clone());
    info!(
      tenant = %decision.tenant,
      decision = %decision.id,
      author = %decision.author,
      chosen = ?decision.chosen_scenario_id,
      "decision submitted"
    );
    Ok(decision)
  }

  pub fn get_decision(&self, decision_id: DecisionId) -> Result<DecisionJournal> {
    self
      .decisions
      .read()
      .map_err(|_| Error::Poisoned)?
      .iter()
      .find(|d| d.id == decision_id)
      .cloned()
      .ok_or(Error::DecisionNotFound(decision_id))
  }

  /// Every decision, newest first.
  pub fn get_all_decisions(&self) -> Result<Vec<DecisionJournal>> {
    let decisions = self.decisions.read().map_err(|_| Error::Poisoned)?;
    Ok(newest_first(decisions.iter()))
  }

  pub fn decisions_for_tenant(&self, tenant: &TenantId) -> Result<Vec<DecisionJournal>> {
    let decisions = self.decisions.read().map_err(|_| Error::Poisoned)?;
    Ok(newest_first(decisions.iter().filter(|d| &d.tenant == tenant)))
  }
}

fn newest_first<'a>(
  decisions: impl DoubleEndedIterator<Item = &'a DecisionJournal>,
) -> Vec<DecisionJournal> {
  // Reversed before the stable sort so equal timestamps list the later
  // submission first.
  let mut out: Vec<_> = decisions.rev().cloned().collect();
  out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
  out
}

#[cfg(test)]
mod tests {
  use chrono::Duration;
  use ontic_core::{decision::DecisionContext, ids::ScenarioId};
  use serde_json::json;

  use super::*;
  use crate::test_support::{Fixture, clock, tenant};

  fn input(author: &str, justification: &str) -> DecisionJournalInput {
    DecisionJournalInput {
      tenant:             tenant(),
      author:             author.into(),
      justification:      justification.into(),
      chosen_scenario_id: Some(ScenarioId::new()),
      context:            DecisionContext::at(crate::test_support::t0()),
    }
  }

  #[test]
  fn decisions_are_listed_newest_first() {
    let clock = clock();
    let journal = DecisionJournalManager::new(clock.clone());
    let first = journal.submit_decision(input("alice", "cheaper")).unwrap();
    clock.advance(Duration::minutes(1));
    let second = journal.submit_decision(input("bob", "faster")).unwrap();
    let third = journal.submit_decision(input("bob", "same minute")).unwrap();

    let ids: Vec<_> = journal.get_all_decisions().unwrap().iter().map(|d| d.id).collect();
    assert_eq!(ids, [third.id, second.id, first.id]);
    assert_eq!(journal.get_decision(first.id).unwrap(), first);
  }

  #[test]
  fn the_journal_is_tenant_partitioned() {
    let journal = DecisionJournalManager::new(clock());
    journal.submit_decision(input("alice", "ok")).unwrap();
    let mut other = input("zed", "ok");
    other.tenant = TenantId::new("other");
    journal.submit_decision(other).unwrap();
    assert_eq!(journal.decisions_for_tenant(&tenant()).unwrap().len(), 1);
    assert_eq!(journal.get_all_decisions().unwrap().len(), 2);
  }

  #[test]
  fn blank_authors_and_justifications_are_rejected() {
    let journal = DecisionJournalManager::new(clock());
    assert!(matches!(
      journal.submit_decision(input(" ", "why")).unwrap_err(),
      Error::InvalidDecision(_)
    ));
    assert!(matches!(
      journal.submit_decision(input("alice", "")).unwrap_err(),
      Error::InvalidDecision(_)
    ));
    assert!(journal.get_all_decisions().unwrap().is_empty());
  }

  #[test]
  fn unknown_decisions_are_not_found() {
    let journal = DecisionJournalManager::new(clock());
    let err = journal.get_decision(DecisionId::new()).unwrap_err();
    assert!(matches!(err, Error::DecisionNotFound(_)));
  }

  #[test]
  fn the_context_is_recorded_verbatim() {
    let journal = DecisionJournalManager::new(clock());
    let mut submitted = input("alice", "less downtime");
    submitted.context.delta_summary = json!({"downtime_hours": -4});
    let decision = journal.submit_decision(submitted).unwrap();
    assert_eq!(decision.context.delta_summary["downtime_hours"], json!(-4));
  }

  #[test]
  fn bindings_capture_the_active_version_hash() {
    let fx = Fixture::seeded();
    let binding = capture_binding(&fx.resolver, &tenant(), fx.now()).unwrap();
    assert_eq!(binding.version_id, fx.seed().version.id);
    let snapshot = fx.resolver.resolve_active_snapshot(fx.now(), &tenant()).unwrap();
    assert_eq!(binding.snapshot_hash, SnapshotHasher.hash(&snapshot));
  }
}
