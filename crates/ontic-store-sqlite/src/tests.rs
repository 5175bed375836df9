//! Integration tests for `SqliteRecordLog` against an in-memory database.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use ontic_core::{
  definition::{DefinitionRef, NewObjectType, NewVersion, VersionStatus},
  ids::TenantId,
  store::PersistenceAdapter,
};
use ontic_engine::{
  clock::ManualClock,
  hash::SnapshotHasher,
  resolver::SnapshotResolver,
  seed::seed_ontology,
  store::DefinitionStore,
};

use crate::SqliteRecordLog;

fn log() -> Arc<SqliteRecordLog> {
  Arc::new(SqliteRecordLog::open_in_memory().expect("in-memory log"))
}

fn clock() -> Arc<ManualClock> {
  Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()))
}

fn tenant() -> TenantId { TenantId::new("acme") }

// ─── Log ─────────────────────────────────────────────────────────────────────

#[test]
fn a_new_log_is_empty() {
  let log = log();
  assert!(log.is_empty().unwrap());
  assert!(log.load().unwrap().is_empty());
}

#[test]
fn store_writes_are_appended_in_order() {
  let log = log();
  let store = DefinitionStore::load(log.clone(), clock()).unwrap();
  let version = store
    .create_version(&tenant(), NewVersion::new("v1", "alice"))
    .unwrap();
  store
    .create_object_type(&tenant(), version.id, NewObjectType::new("asset", "Asset"))
    .unwrap();
  store.activate_version(&tenant(), version.id).unwrap();

  let entries = log.entries().unwrap();
  let kinds: Vec<_> = entries.iter().map(|e| e.record.kind()).collect();
  assert_eq!(kinds, ["version_created", "object_type_created", "version_activated"]);
  let seqs: Vec<_> = entries.iter().map(|e| e.seq).collect();
  assert!(seqs.windows(2).all(|w| w[0] < w[1]));
  assert_eq!(log.entries_for_version(version.id).unwrap().len(), 3);
}

// ─── Reload ──────────────────────────────────────────────────────────────────

#[test]
fn reloading_rebuilds_identical_snapshots() {
  let log = log();
  let clock = clock();
  let original = DefinitionStore::load(log.clone(), clock.clone()).unwrap();
  let seed = seed_ontology(&original, &tenant()).unwrap();
  let as_of = clock.advance(Duration::minutes(1));

  let reloaded = Arc::new(DefinitionStore::load(log.clone(), clock.clone()).unwrap());
  let original = Arc::new(original);
  let before = SnapshotResolver::new(original)
    .resolve_active_snapshot(as_of, &tenant())
    .unwrap();
  let after = SnapshotResolver::new(reloaded.clone())
    .resolve_active_snapshot(as_of, &tenant())
    .unwrap();
  assert_eq!(SnapshotHasher.hash(&before), SnapshotHasher.hash(&after));
  assert_eq!(after.version.id, seed.version.id);
  assert_eq!(
    reloaded.get_active_version(&tenant()).unwrap().map(|v| v.status),
    Some(VersionStatus::Active)
  );
}

#[test]
fn deprecations_survive_a_reload() {
  let log = log();
  let clock = clock();
  let store = DefinitionStore::load(log.clone(), clock.clone()).unwrap();
  let version = store
    .create_version(&tenant(), NewVersion::new("v1", "alice"))
    .unwrap();
  let vendor = store
    .create_object_type(&tenant(), version.id, NewObjectType::new("vendor", "Vendor"))
    .unwrap();
  let visible_at = clock.advance(Duration::minutes(1));
  clock.advance(Duration::minutes(1));
  store
    .deprecate(&tenant(), version.id, DefinitionRef::ObjectType(vendor.id), None)
    .unwrap();
  let gone_at = clock.advance(Duration::minutes(1));

  let reloaded = Arc::new(DefinitionStore::load(log, clock).unwrap());
  let resolver = SnapshotResolver::new(reloaded);
  let then = resolver.resolve_snapshot(version.id, visible_at, &tenant()).unwrap();
  let now = resolver.resolve_snapshot(version.id, gone_at, &tenant()).unwrap();
  assert!(then.object_type(vendor.id).is_some());
  assert!(now.object_type(vendor.id).is_none());
}

#[test]
fn reloaded_stores_keep_appending() {
  let log = log();
  let clock = clock();
  {
    let store = DefinitionStore::load(log.clone(), clock.clone()).unwrap();
    store
      .create_version(&tenant(), NewVersion::new("v1", "alice"))
      .unwrap();
  }
  let store = DefinitionStore::load(log.clone(), clock).unwrap();
  let v2 = store
    .create_version(&tenant(), NewVersion::new("v2", "alice"))
    .unwrap();
  assert_eq!(v2.version_number, 2);
  assert_eq!(log.len().unwrap(), 2);
}

#[test]
fn failed_writes_are_not_logged() {
  let log = log();
  let store = DefinitionStore::load(log.clone(), clock()).unwrap();
  let version = store
    .create_version(&tenant(), NewVersion::new("v1", "alice"))
    .unwrap();
  store
    .create_object_type(&tenant(), version.id, NewObjectType::new("asset", "Asset"))
    .unwrap();
  assert!(
    store
      .create_object_type(&tenant(), version.id, NewObjectType::new("asset", "Asset"))
      .is_err()
  );
  assert_eq!(log.len().unwrap(), 2);
}
