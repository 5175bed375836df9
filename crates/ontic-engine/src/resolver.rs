//! Point-in-time snapshot resolution.
//!
//! Given a tenant and an `as_of` instant, the resolver picks the definitions
//! whose validity interval covers `as_of` and indexes them into an immutable
//! [`OntologySnapshot`]. Results are memoised; the cache key includes the
//! store revision so a later write can never be masked by a stale entry.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use ontic_core::{
  Error, Result,
  ids::{OntologyVersionId, TenantId},
  snapshot::OntologySnapshot,
};
use tracing::{debug, trace};

use crate::{
  cache::{BoundedCache, LruCache},
  config::DEFAULT_SNAPSHOT_CACHE_CAPACITY,
  store::{DefinitionStore, VersionView},
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SnapshotKey {
  version_id: OntologyVersionId,
  as_of:      DateTime<Utc>,
  tenant:     TenantId,
  revision:   u64,
}

type SnapshotCache = Box<dyn BoundedCache<SnapshotKey, Arc<OntologySnapshot>>>;

pub struct SnapshotResolver {
  store: Arc<DefinitionStore>,
  cache: Mutex<SnapshotCache>,
}

impl SnapshotResolver {
  pub fn new(store: Arc<DefinitionStore>) -> Self {
    Self::with_capacity(store, DEFAULT_SNAPSHOT_CACHE_CAPACITY)
  }

  pub fn with_capacity(store: Arc<DefinitionStore>, capacity: usize) -> Self {
    Self { store, cache: Mutex::new(Box::new(LruCache::new(capacity))) }
  }

  pub fn store(&self) -> &Arc<DefinitionStore> { &self.store }

  /// Resolve the tenant's currently active version as of `as_of`.
  pub fn resolve_active_snapshot(
    &self,
    as_of: DateTime<Utc>,
    tenant: &TenantId,
  ) -> Result<Arc<OntologySnapshot>> {
    let version = self
      .store
      .get_active_version(tenant)?
      .ok_or_else(|| Error::NoActiveVersion(tenant.clone()))?;
    self.resolve_snapshot(version.id, as_of, tenant)
  }

  /// Resolve a specific version as of `as_of`. Any version status is
  /// accepted, so drafts can be previewed and old versions replayed.
  pub fn resolve_snapshot(
    &self,
    version_id: OntologyVersionId,
    as_of: DateTime<Utc>,
    tenant: &TenantId,
  ) -> Result<Arc<OntologySnapshot>> {
    let key = SnapshotKey {
      version_id,
      as_of,
      tenant: tenant.clone(),
      revision: self.store.revision()?,
    };
    if let Some(hit) = self.cache.lock().map_err(|_| Error::Poisoned)?.get(&key) {
      trace!(version = %version_id, %as_of, "snapshot cache hit");
      return Ok(hit);
    }

    let view = self.store.version_view(tenant, version_id)?;
    let revision = view.revision;
    let resolved_at = self.store.clock().now();
    let snapshot = Arc::new(build_snapshot(view, as_of, resolved_at));
    debug!(
      version = %version_id,
      %as_of,
      object_types = snapshot.object_types.len(),
      attributes = snapshot.attributes.len(),
      "snapshot resolved"
    );

    let key = SnapshotKey { revision, ..key };
    self
      .cache
      .lock()
      .map_err(|_| Error::Poisoned)?
      .insert(key, snapshot.clone());
    Ok(snapshot)
  }

  pub fn clear_cache(&self) -> Result<()> {
    self.cache.lock().map_err(|_| Error::Poisoned)?.clear();
    Ok(())
  }
}

/// Filter a version's contents down to what is visible at `as_of`.
///
/// Attributes and constraints only appear under visible object types;
/// relationships and metrics are dropped when an endpoint or target is not
/// visible.
pub fn build_snapshot(
  view: VersionView,
  as_of: DateTime<Utc>,
  resolved_at: DateTime<Utc>,
) -> OntologySnapshot {
  let VersionView { version, contents, .. } = view;

  let mut snapshot = OntologySnapshot {
    tenant: version.tenant.clone(),
    version,
    as_of,
    resolved_at,
    object_types: Default::default(),
    attributes: Default::default(),
    relationship_types: Default::default(),
    metrics: Default::default(),
    constraints: Default::default(),
    object_types_by_name: Default::default(),
    attributes_by_type: Default::default(),
    constraints_by_type: Default::default(),
    relationships_by_from: Default::default(),
    relationships_by_to: Default::default(),
  };

  for (id, def) in contents.object_types {
    if def.validity.visible_at(as_of) {
      snapshot.object_types_by_name.insert(def.name.clone(), id);
      snapshot.object_types.insert(id, def);
    }
  }

  let mut attributes: Vec<_> = contents
    .attributes
    .into_values()
    .filter(|a| {
      a.validity.visible_at(as_of)
        && snapshot.object_types.contains_key(&a.object_type_id)
    })
    .collect();
  attributes.sort_by_key(|a| (a.object_type_id, a.ordinal, a.id));
  for def in attributes {
    snapshot
      .attributes_by_type
      .entry(def.object_type_id)
      .or_default()
      .push(def.id);
    snapshot.attributes.insert(def.id, def);
  }

  let mut constraints: Vec<_> = contents
    .constraints
    .into_values()
    .filter(|c| {
      c.validity.visible_at(as_of)
        && snapshot.object_types.contains_key(&c.object_type_id)
    })
    .collect();
  constraints.sort_by_key(|c| (c.object_type_id, c.ordinal, c.id));
  for def in constraints {
    snapshot
      .constraints_by_type
      .entry(def.object_type_id)
      .or_default()
      .push(def.id);
    snapshot.constraints.insert(def.id, def);
  }

  for (id, def) in contents.relationship_types {
    if def.validity.visible_at(as_of)
      && snapshot.object_types.contains_key(&def.from_type_id)
      && snapshot.object_types.contains_key(&def.to_type_id)
    {
      snapshot
        .relationships_by_from
        .entry(def.from_type_id)
        .or_default()
        .push(id);
      snapshot
        .relationships_by_to
        .entry(def.to_type_id)
        .or_default()
        .push(id);
      snapshot.relationship_types.insert(id, def);
    }
  }

  for (id, def) in contents.metrics {
    if def.validity.visible_at(as_of)
      && snapshot.object_types.contains_key(&def.target_object_type_id)
    {
      snapshot.metrics.insert(id, def);
    }
  }

  snapshot
}
