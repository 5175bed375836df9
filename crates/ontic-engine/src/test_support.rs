//! Shared fixtures for unit tests.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use ontic_core::ids::TenantId;

use crate::{
  clock::{Clock, ManualClock},
  resolver::SnapshotResolver,
  seed::{SeededOntology, seed_ontology},
  store::DefinitionStore,
};

pub fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap() }

pub fn tenant() -> TenantId { TenantId::new("acme") }

pub fn clock() -> Arc<ManualClock> { Arc::new(ManualClock::new(t0())) }

pub struct Fixture {
  pub clock:    Arc<ManualClock>,
  pub store:    Arc<DefinitionStore>,
  pub resolver: Arc<SnapshotResolver>,
  seed:         Option<SeededOntology>,
}

impl Fixture {
  pub fn empty() -> Self {
    let clock = clock();
    let store = Arc::new(DefinitionStore::new(clock.clone()));
    let resolver = Arc::new(SnapshotResolver::new(store.clone()));
    Self { clock, store, resolver, seed: None }
  }

  /// The starter ontology, activated at `t0`, with the clock one minute on.
  pub fn seeded() -> Self {
    let mut fx = Self::empty();
    fx.seed = Some(seed_ontology(&fx.store, &tenant()).unwrap());
    fx.clock.advance(Duration::minutes(1));
    fx
  }

  pub fn seed(&self) -> &SeededOntology {
    self.seed.as_ref().expect("fixture was not seeded")
  }

  pub fn now(&self) -> DateTime<Utc> { self.clock.now() }
}
