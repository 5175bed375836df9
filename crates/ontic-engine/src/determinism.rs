//! Repeat-and-compare checks for the engine's determinism guarantees.
//!
//! Each check runs the same computation twice from scratch and fails with
//! [`DeterminismError::Violation`] when the two runs disagree.

use std::{collections::BTreeSet, sync::Arc};

use chrono::{DateTime, Utc};
use ontic_core::{
  ids::{ObjectTypeId, OntologyVersionId, TenantId},
  snapshot::SnapshotHash,
};
use tracing::debug;

use crate::{
  compiler::Compiler,
  hash::SnapshotHasher,
  resolver::SnapshotResolver,
  validation::{EntityPayload, ValidationEngine, ValidationResult},
};

#[derive(Debug, thiserror::Error)]
pub enum DeterminismError {
  #[error("determinism violation in {check}: {detail}")]
  Violation { check: &'static str, detail: String },
  #[error(transparent)]
  Engine(#[from] ontic_core::Error),
}

pub type Result<T, E = DeterminismError> = std::result::Result<T, E>;

fn violation(check: &'static str, detail: impl Into<String>) -> DeterminismError {
  DeterminismError::Violation { check, detail: detail.into() }
}

pub struct DeterminismHarness {
  resolver: Arc<SnapshotResolver>,
  compiler: Compiler,
}

impl DeterminismHarness {
  /// Uses its own compiler so cached results never stand in for a rerun.
  pub fn new(resolver: Arc<SnapshotResolver>) -> Self {
    Self { resolver, compiler: Compiler::with_capacity(0) }
  }

  /// Resolve twice, bypassing the snapshot cache, and hash both.
  pub fn check_snapshot_hash(
    &self,
    version_id: OntologyVersionId,
    as_of: DateTime<Utc>,
    tenant: &TenantId,
  ) -> Result<SnapshotHash> {
    self.resolver.clear_cache()?;
    let first = self.resolver.resolve_snapshot(version_id, as_of, tenant)?;
    self.resolver.clear_cache()?;
    let second = self.resolver.resolve_snapshot(version_id, as_of, tenant)?;

    let hashes = (SnapshotHasher.hash(&first), SnapshotHasher.hash(&second));
    if hashes.0 != hashes.1 {
      return Err(violation(
        "snapshot hash",
        format!("{} != {}", hashes.0, hashes.1),
      ));
    }
    debug!(version = %version_id, hash = %hashes.0, "snapshot hash is deterministic");
    Ok(hashes.0)
  }

  /// Compile the same snapshot twice and compare every artifact.
  pub fn check_compilation(
    &self,
    version_id: OntologyVersionId,
    as_of: DateTime<Utc>,
    tenant: &TenantId,
  ) -> Result<()> {
    let snapshot = self.resolver.resolve_snapshot(version_id, as_of, tenant)?;
    let first = self.compiler.compile(snapshot.clone())?;
    let second = self.compiler.compile(snapshot)?;
    if Arc::ptr_eq(&first, &second) {
      return Err(violation("compilation", "second compile was served from a cache"));
    }
    if first.snapshot_hash != second.snapshot_hash {
      return Err(violation("compilation", "snapshot hashes differ"));
    }

    let ids: BTreeSet<ObjectTypeId> = first
      .validators
      .keys()
      .chain(second.validators.keys())
      .copied()
      .collect();
    for id in ids {
      if first.artifacts(id) != second.artifacts(id) {
        return Err(violation("compilation", format!("artifacts differ for object type {id}")));
      }
    }
    debug!(version = %version_id, "compilation is deterministic");
    Ok(())
  }

  /// Validate the same payload twice against the same snapshot.
  pub fn check_validation(
    &self,
    entity: &EntityPayload,
    object_type_id: ObjectTypeId,
    version_id: OntologyVersionId,
    as_of: DateTime<Utc>,
    tenant: &TenantId,
  ) -> Result<ValidationResult> {
    let snapshot = self.resolver.resolve_snapshot(version_id, as_of, tenant)?;
    let engine = ValidationEngine;
    let first = engine.validate(entity, object_type_id, &snapshot)?;
    let second = engine.validate(entity, object_type_id, &snapshot)?;
    if first != second {
      return Err(violation("validation", format!("{first:?} != {second:?}")));
    }
    Ok(first)
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::{
    test_support::{Fixture, tenant},
    validation::ErrorCode,
  };

  #[test]
  fn the_seed_ontology_is_deterministic() {
    let fx = Fixture::seeded();
    let harness = DeterminismHarness::new(fx.resolver.clone());
    let version = fx.seed().version.id;
    let hash = harness.check_snapshot_hash(version, fx.now(), &tenant()).unwrap();
    assert_eq!(hash.as_str().len(), 64);
    harness.check_compilation(version, fx.now(), &tenant()).unwrap();
  }

  #[test]
  fn validation_is_repeatable() {
    let fx = Fixture::seeded();
    let harness = DeterminismHarness::new(fx.resolver.clone());
    let entity = json!({"status": "UNKNOWN"}).as_object().cloned().unwrap();
    let result = harness
      .check_validation(&entity, fx.seed().asset, fx.seed().version.id, fx.now(), &tenant())
      .unwrap();
    assert!(!result.valid);
    assert!(result.codes().contains(&ErrorCode::NotInEnum));
  }

  #[test]
  fn engine_errors_pass_through() {
    let fx = Fixture::seeded();
    let harness = DeterminismHarness::new(fx.resolver.clone());
    let err = harness
      .check_snapshot_hash(OntologyVersionId::new(), fx.now(), &tenant())
      .unwrap_err();
    assert!(matches!(
      err,
      DeterminismError::Engine(ontic_core::Error::VersionNotFound(_))
    ));
  }
}
