//! The versioned definition store.
//!
//! All state lives behind one `RwLock`, so activation (deprecating the old
//! active version and promoting the new one) is observed atomically by every
//! reader. Each successful write is expressed as a [`StoreRecord`], appended to
//! the optional [`PersistenceAdapter`], and only then applied in memory.

use std::{
  collections::{BTreeMap, HashMap},
  sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use chrono::{DateTime, Utc};
use ontic_core::{
  Error, Result,
  definition::{
    AttributeDefinition, DefinitionRef, Deprecation, EntityConstraintDefinition,
    MetricDefinition, NewAttribute, NewConstraint, NewMetric, NewObjectType,
    NewRelationshipType, NewVersion, ObjectTypeDefinition, OntologyVersion,
    RelationshipTypeDefinition, Validity, VersionStatus,
  },
  ids::{
    AttributeId, ConstraintId, MetricId, ObjectTypeId, OntologyVersionId,
    RelationshipTypeId, TenantId,
  },
  store::{DomainEvent, DomainEventKind, PersistenceAdapter, StoreRecord},
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};

// ─── Version contents ────────────────────────────────────────────────────────

/// Every definition ever created in one version, deprecated ones included.
/// Each definition's `validity.deprecated_at` is already resolved.
#[derive(Debug, Clone, Default)]
pub struct VersionContents {
  pub object_types:       BTreeMap<ObjectTypeId, ObjectTypeDefinition>,
  pub attributes:         BTreeMap<AttributeId, AttributeDefinition>,
  pub relationship_types: BTreeMap<RelationshipTypeId, RelationshipTypeDefinition>,
  pub metrics:            BTreeMap<MetricId, MetricDefinition>,
  pub constraints:        BTreeMap<ConstraintId, EntityConstraintDefinition>,
  pub deprecations:       Vec<Deprecation>,
}

impl VersionContents {
  /// Copy of everything visible at `at`, re-homed into `version_id`.
  fn fork(&self, version_id: OntologyVersionId, at: DateTime<Utc>) -> Self {
    fn carry(validity: &Validity) -> Validity {
      Validity::starting(validity.created_at)
    }

    let mut out = VersionContents::default();
    for def in self.object_types.values().filter(|d| d.validity.visible_at(at)) {
      let mut def = def.clone();
      def.version_id = version_id;
      def.validity = carry(&def.validity);
      out.object_types.insert(def.id, def);
    }
    for def in self.attributes.values().filter(|d| d.validity.visible_at(at)) {
      let mut def = def.clone();
      def.version_id = version_id;
      def.validity = carry(&def.validity);
      out.attributes.insert(def.id, def);
    }
    for def in self
      .relationship_types
      .values()
      .filter(|d| d.validity.visible_at(at))
    {
      let mut def = def.clone();
      def.version_id = version_id;
      def.validity = carry(&def.validity);
      out.relationship_types.insert(def.id, def);
    }
    for def in self.metrics.values().filter(|d| d.validity.visible_at(at)) {
      let mut def = def.clone();
      def.version_id = version_id;
      def.validity = carry(&def.validity);
      out.metrics.insert(def.id, def);
    }
    for def in self.constraints.values().filter(|d| d.validity.visible_at(at)) {
      let mut def = def.clone();
      def.version_id = version_id;
      def.validity = carry(&def.validity);
      out.constraints.insert(def.id, def);
    }
    out
  }

  fn validity_mut(&mut self, target: DefinitionRef) -> Option<&mut Validity> {
    match target {
      DefinitionRef::ObjectType(id) => {
        self.object_types.get_mut(&id).map(|d| &mut d.validity)
      }
      DefinitionRef::Attribute(id) => {
        self.attributes.get_mut(&id).map(|d| &mut d.validity)
      }
      DefinitionRef::RelationshipType(id) => {
        self.relationship_types.get_mut(&id).map(|d| &mut d.validity)
      }
      DefinitionRef::Metric(id) => self.metrics.get_mut(&id).map(|d| &mut d.validity),
      DefinitionRef::Constraint(id) => {
        self.constraints.get_mut(&id).map(|d| &mut d.validity)
      }
    }
  }

  fn live_object_type(&self, id: ObjectTypeId) -> Option<&ObjectTypeDefinition> {
    self
      .object_types
      .get(&id)
      .filter(|d| d.validity.deprecated_at.is_none())
  }
}

/// A consistent read of one version, tagged with the store revision it was
/// taken at.
#[derive(Debug, Clone)]
pub struct VersionView {
  pub version:  OntologyVersion,
  pub contents: VersionContents,
  pub revision: u64,
}

// ─── Inner state ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Inner {
  versions: BTreeMap<OntologyVersionId, OntologyVersion>,
  active:   HashMap<TenantId, OntologyVersionId>,
  contents: HashMap<OntologyVersionId, VersionContents>,
  outbox:   Vec<DomainEvent>,
  /// Bumped on every applied record; part of every cache key downstream.
  revision: u64,
}

impl Inner {
  fn version_for(
    &self,
    tenant: &TenantId,
    id: OntologyVersionId,
  ) -> Result<&OntologyVersion> {
    self
      .versions
      .get(&id)
      .filter(|v| &v.tenant == tenant)
      .ok_or(Error::VersionNotFound(id))
  }

  fn editable(
    &self,
    tenant: &TenantId,
    id: OntologyVersionId,
  ) -> Result<&VersionContents> {
    let version = self.version_for(tenant, id)?;
    if version.status != VersionStatus::Draft {
      return Err(Error::VersionNotEditable(id, version.status));
    }
    self.contents.get(&id).ok_or(Error::VersionNotFound(id))
  }

  fn contents_mut(&mut self, id: OntologyVersionId) -> Result<&mut VersionContents> {
    self.contents.get_mut(&id).ok_or(Error::VersionNotFound(id))
  }

  fn apply(&mut self, record: StoreRecord) -> Result<()> {
    match record {
      StoreRecord::VersionCreated(version) => {
        let contents = match version.parent_version_id {
          Some(parent) => self
            .contents
            .get(&parent)
            .ok_or(Error::VersionNotFound(parent))?
            .fork(version.id, version.created_at),
          None => VersionContents::default(),
        };
        self.contents.insert(version.id, contents);
        self.versions.insert(version.id, version);
      }
      StoreRecord::ObjectTypeCreated(def) => {
        self.contents_mut(def.version_id)?.object_types.insert(def.id, def);
      }
      StoreRecord::AttributeCreated(def) => {
        self.contents_mut(def.version_id)?.attributes.insert(def.id, def);
      }
      StoreRecord::RelationshipTypeCreated(def) => {
        self
          .contents_mut(def.version_id)?
          .relationship_types
          .insert(def.id, def);
      }
      StoreRecord::MetricCreated(def) => {
        self.contents_mut(def.version_id)?.metrics.insert(def.id, def);
      }
      StoreRecord::ConstraintCreated(def) => {
        self.contents_mut(def.version_id)?.constraints.insert(def.id, def);
      }
      StoreRecord::Deprecated(deprecation) => {
        let contents = self.contents_mut(deprecation.version_id)?;
        let validity = contents
          .validity_mut(deprecation.target)
          .ok_or_else(|| not_found(deprecation.target, deprecation.version_id))?;
        validity.deprecated_at = Some(deprecation.deprecated_at);
        contents.deprecations.push(deprecation);
      }
      StoreRecord::VersionActivated { tenant, version_id, at } => {
        if !self.versions.contains_key(&version_id) {
          return Err(Error::VersionNotFound(version_id));
        }
        if let Some(previous) = self.active.insert(tenant, version_id)
          && previous != version_id
          && let Some(prev) = self.versions.get_mut(&previous)
        {
          prev.status = VersionStatus::Deprecated;
          prev.deprecated_at = Some(at);
        }
        if let Some(version) = self.versions.get_mut(&version_id) {
          version.status = VersionStatus::Active;
          version.activated_at = Some(at);
          version.deprecated_at = None;
        }
      }
      StoreRecord::VersionArchived { version_id, .. } => {
        let version = self
          .versions
          .get_mut(&version_id)
          .ok_or(Error::VersionNotFound(version_id))?;
        version.status = VersionStatus::Archived;
      }
    }
    self.revision += 1;
    Ok(())
  }
}

fn not_found(target: DefinitionRef, version_id: OntologyVersionId) -> Error {
  match target {
    DefinitionRef::ObjectType(id) => Error::ObjectTypeNotFound(id, version_id),
    DefinitionRef::Attribute(id) => Error::AttributeNotFound(id, version_id),
    DefinitionRef::RelationshipType(id) => {
      Error::RelationshipTypeNotFound(id, version_id)
    }
    DefinitionRef::Metric(id) => Error::MetricNotFound(id, version_id),
    DefinitionRef::Constraint(id) => Error::ConstraintNotFound(id, version_id),
  }
}

/// Fails if `name` is already taken by a non-deprecated sibling.
fn ensure_unique<'a>(
  kind: &'static str,
  name: &str,
  mut siblings: impl Iterator<Item = (&'a str, &'a Validity)>,
) -> Result<()> {
  if siblings.any(|(n, v)| n == name && v.deprecated_at.is_none()) {
    return Err(Error::DuplicateName { kind, name: name.to_string() });
  }
  Ok(())
}

fn check_pattern(pattern: Option<&str>) -> Result<()> {
  if let Some(pattern) = pattern {
    regex::Regex::new(pattern).map_err(|e| Error::InvalidPattern {
      pattern: pattern.to_string(),
      reason:  e.to_string(),
    })?;
  }
  Ok(())
}

// ─── Store ───────────────────────────────────────────────────────────────────

pub struct DefinitionStore {
  inner:   RwLock<Inner>,
  clock:   Arc<dyn Clock>,
  adapter: Option<Arc<dyn PersistenceAdapter>>,
}

impl std::fmt::Debug for DefinitionStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("DefinitionStore")
      .field("persistent", &self.adapter.is_some())
      .finish_non_exhaustive()
  }
}

impl Default for DefinitionStore {
  fn default() -> Self { Self::new(Arc::new(SystemClock)) }
}

impl DefinitionStore {
  /// A purely in-memory store.
  pub fn new(clock: Arc<dyn Clock>) -> Self {
    Self { inner: RwLock::new(Inner::default()), clock, adapter: None }
  }

  /// Rebuild a store by replaying `adapter`'s log; further writes are
  /// appended to the same log.
  pub fn load(
    adapter: Arc<dyn PersistenceAdapter>,
    clock: Arc<dyn Clock>,
  ) -> Result<Self> {
    let records = adapter.load().map_err(Error::Persistence)?;
    let mut inner = Inner::default();
    let count = records.len();
    for record in records {
      inner.apply(record)?;
    }
    info!(records = count, versions = inner.versions.len(), "definition store loaded");
    Ok(Self { inner: RwLock::new(inner), clock, adapter: Some(adapter) })
  }

  pub fn clock(&self) -> Arc<dyn Clock> { self.clock.clone() }

  fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
    self.inner.read().map_err(|_| Error::Poisoned)
  }

  fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
    self.inner.write().map_err(|_| Error::Poisoned)
  }

  fn commit(&self, inner: &mut Inner, record: StoreRecord) -> Result<()> {
    if let Some(adapter) = &self.adapter {
      adapter.append(&record).map_err(Error::Persistence)?;
    }
    debug!(kind = record.kind(), version = %record.version_id(), "store record committed");
    inner.apply(record)
  }

  // ── Versions ──────────────────────────────────────────────────────────

  /// Create a DRAFT version numbered one past the tenant's highest.
  pub fn create_version(
    &self,
    tenant: &TenantId,
    input: NewVersion,
  ) -> Result<OntologyVersion> {
    let mut inner = self.write()?;
    if let Some(parent) = input.parent_version_id {
      inner.version_for(tenant, parent)?;
    }
    let version_number = inner
      .versions
      .values()
      .filter(|v| &v.tenant == tenant)
      .map(|v| v.version_number)
      .max()
      .unwrap_or(0)
      + 1;

    let version = OntologyVersion {
      id: OntologyVersionId::new(),
      tenant: tenant.clone(),
      version_name: input.version_name,
      version_number,
      status: VersionStatus::Draft,
      parent_version_id: input.parent_version_id,
      description: input.description,
      created_at: self.clock.now(),
      created_by: input.created_by,
      activated_at: None,
      deprecated_at: None,
    };
    self.commit(&mut inner, StoreRecord::VersionCreated(version.clone()))?;
    info!(
      tenant = %tenant,
      version = %version.id,
      number = version.version_number,
      parent = ?version.parent_version_id,
      "ontology version created"
    );
    Ok(version)
  }

  /// Make `version_id` the tenant's single ACTIVE version. The previously
  /// active version, if any, becomes DEPRECATED in the same step.
  pub fn activate_version(
    &self,
    tenant: &TenantId,
    version_id: OntologyVersionId,
  ) -> Result<OntologyVersion> {
    let mut inner = self.write()?;
    let version = inner.version_for(tenant, version_id)?.clone();
    match version.status {
      VersionStatus::Active => return Ok(version),
      VersionStatus::Archived => {
        return Err(Error::InvalidTransition {
          id:   version_id,
          from: version.status,
          to:   VersionStatus::Active,
        });
      }
      VersionStatus::Draft | VersionStatus::Deprecated => {}
    }

    let previous = inner.active.get(tenant).copied();
    let at = self.clock.now();
    self.commit(
      &mut inner,
      StoreRecord::VersionActivated { tenant: tenant.clone(), version_id, at },
    )?;
    inner.outbox.push(DomainEvent {
      event_id:    Uuid::new_v4(),
      occurred_at: at,
      kind:        DomainEventKind::OntologyActivated {
        tenant: tenant.clone(),
        version_id,
        previous_version_id: previous,
      },
    });
    info!(tenant = %tenant, version = %version_id, previous = ?previous, "ontology version activated");

    inner
      .versions
      .get(&version_id)
      .cloned()
      .ok_or(Error::VersionNotFound(version_id))
  }

  /// Retire a DRAFT or DEPRECATED version for good.
  pub fn archive_version(
    &self,
    tenant: &TenantId,
    version_id: OntologyVersionId,
  ) -> Result<OntologyVersion> {
    let mut inner = self.write()?;
    let version = inner.version_for(tenant, version_id)?.clone();
    if !matches!(version.status, VersionStatus::Draft | VersionStatus::Deprecated) {
      return Err(Error::InvalidTransition {
        id:   version_id,
        from: version.status,
        to:   VersionStatus::Archived,
      });
    }
    let at = self.clock.now();
    self.commit(
      &mut inner,
      StoreRecord::VersionArchived { tenant: tenant.clone(), version_id, at },
    )?;
    info!(tenant = %tenant, version = %version_id, "ontology version archived");
    inner
      .versions
      .get(&version_id)
      .cloned()
      .ok_or(Error::VersionNotFound(version_id))
  }

  pub fn get_version(
    &self,
    version_id: OntologyVersionId,
  ) -> Result<Option<OntologyVersion>> {
    Ok(self.read()?.versions.get(&version_id).cloned())
  }

  pub fn get_active_version(&self, tenant: &TenantId) -> Result<Option<OntologyVersion>> {
    let inner = self.read()?;
    Ok(
      inner
        .active
        .get(tenant)
        .and_then(|id| inner.versions.get(id))
        .cloned(),
    )
  }

  /// All of a tenant's versions, oldest first.
  pub fn list_versions(&self, tenant: &TenantId) -> Result<Vec<OntologyVersion>> {
    let inner = self.read()?;
    let mut versions: Vec<_> = inner
      .versions
      .values()
      .filter(|v| &v.tenant == tenant)
      .cloned()
      .collect();
    versions.sort_by_key(|v| v.version_number);
    Ok(versions)
  }

  /// Snapshot the full contents of one version for resolution.
  pub fn version_view(
    &self,
    tenant: &TenantId,
    version_id: OntologyVersionId,
  ) -> Result<VersionView> {
    let inner = self.read()?;
    let version = inner.version_for(tenant, version_id)?.clone();
    let contents = inner
      .contents
      .get(&version_id)
      .cloned()
      .ok_or(Error::VersionNotFound(version_id))?;
    Ok(VersionView { version, contents, revision: inner.revision })
  }

  /// Monotonic counter of applied writes.
  pub fn revision(&self) -> Result<u64> { Ok(self.read()?.revision) }

  /// Take every domain event emitted since the last drain.
  pub fn drain_events(&self) -> Result<Vec<DomainEvent>> {
    Ok(std::mem::take(&mut self.write()?.outbox))
  }

  // ── Definitions ───────────────────────────────────────────────────────

  pub fn create_object_type(
    &self,
    tenant: &TenantId,
    version_id: OntologyVersionId,
    input: NewObjectType,
  ) -> Result<ObjectTypeDefinition> {
    let mut inner = self.write()?;
    let contents = inner.editable(tenant, version_id)?;
    ensure_unique(
      "object type",
      &input.name,
      contents
        .object_types
        .values()
        .map(|d| (d.name.as_str(), &d.validity)),
    )?;
    if let Some(parent) = input.extends_type_id
      && contents.live_object_type(parent).is_none()
    {
      return Err(Error::CrossVersionReference(
        format!("object type {:?} extends {parent}", input.name),
        version_id,
      ));
    }

    let def = ObjectTypeDefinition {
      id: ObjectTypeId::new(),
      version_id,
      name: input.name,
      display_name: input.display_name,
      description: input.description,
      icon: input.icon,
      color: input.color,
      is_abstract: input.is_abstract,
      extends_type_id: input.extends_type_id,
      created_by: input.created_by,
      validity: Validity::starting(self.clock.now()),
    };
    self.commit(&mut inner, StoreRecord::ObjectTypeCreated(def.clone()))?;
    debug!(version = %version_id, object_type = %def.name, "object type created");
    Ok(def)
  }

  /// Add an attribute to an object type. The ordinal is the number of
  /// attributes the type already has.
  pub fn create_attribute(
    &self,
    tenant: &TenantId,
    version_id: OntologyVersionId,
    object_type_id: ObjectTypeId,
    input: NewAttribute,
  ) -> Result<AttributeDefinition> {
    let mut inner = self.write()?;
    let contents = inner.editable(tenant, version_id)?;
    if contents.live_object_type(object_type_id).is_none() {
      return Err(Error::ObjectTypeNotFound(object_type_id, version_id));
    }
    let siblings: Vec<_> = contents
      .attributes
      .values()
      .filter(|a| a.object_type_id == object_type_id)
      .collect();
    ensure_unique(
      "attribute",
      &input.name,
      siblings.iter().map(|a| (a.name.as_str(), &a.validity)),
    )?;
    if let Some(target) = input.reference_target_type_id
      && contents.live_object_type(target).is_none()
    {
      return Err(Error::CrossVersionReference(
        format!("attribute {:?} references {target}", input.name),
        version_id,
      ));
    }
    check_pattern(input.pattern.as_deref())?;
    let ordinal = siblings.len() as u32;

    let def = AttributeDefinition {
      id: AttributeId::new(),
      version_id,
      object_type_id,
      name: input.name,
      display_name: input.display_name,
      description: input.description,
      data_type: input.data_type,
      is_required: input.is_required,
      is_unique: input.is_unique,
      is_indexed: input.is_indexed,
      is_primary_display: input.is_primary_display,
      min_length: input.min_length,
      max_length: input.max_length,
      min_value: input.min_value,
      max_value: input.max_value,
      pattern: input.pattern,
      enum_values: input.enum_values,
      reference_target_type_id: input.reference_target_type_id,
      array_element_type: input.array_element_type,
      default_value: input.default_value,
      unit: input.unit,
      ordinal,
      created_by: input.created_by,
      validity: Validity::starting(self.clock.now()),
    };
    self.commit(&mut inner, StoreRecord::AttributeCreated(def.clone()))?;
    debug!(version = %version_id, attribute = %def.name, ordinal, "attribute created");
    Ok(def)
  }

  /// Both endpoints must be live object types of the same version.
  pub fn create_relationship_type(
    &self,
    tenant: &TenantId,
    version_id: OntologyVersionId,
    input: NewRelationshipType,
  ) -> Result<RelationshipTypeDefinition> {
    let mut inner = self.write()?;
    let contents = inner.editable(tenant, version_id)?;
    for endpoint in [input.from_type_id, input.to_type_id] {
      if contents.live_object_type(endpoint).is_none() {
        return Err(Error::CrossVersionReference(
          format!("relationship type {:?} endpoint {endpoint}", input.name),
          version_id,
        ));
      }
    }
    ensure_unique(
      "relationship type",
      &input.name,
      contents
        .relationship_types
        .values()
        .map(|d| (d.name.as_str(), &d.validity)),
    )?;

    let def = RelationshipTypeDefinition {
      id: RelationshipTypeId::new(),
      version_id,
      name: input.name,
      display_name: input.display_name,
      description: input.description,
      from_type_id: input.from_type_id,
      to_type_id: input.to_type_id,
      direction: input.direction,
      cardinality: input.cardinality,
      is_temporal: input.is_temporal,
      inverse_name: input.inverse_name,
      created_by: input.created_by,
      validity: Validity::starting(self.clock.now()),
    };
    self.commit(&mut inner, StoreRecord::RelationshipTypeCreated(def.clone()))?;
    debug!(version = %version_id, relationship_type = %def.name, "relationship type created");
    Ok(def)
  }

  pub fn create_metric(
    &self,
    tenant: &TenantId,
    version_id: OntologyVersionId,
    input: NewMetric,
  ) -> Result<MetricDefinition> {
    let mut inner = self.write()?;
    let contents = inner.editable(tenant, version_id)?;
    if contents.live_object_type(input.target_object_type_id).is_none() {
      return Err(Error::ObjectTypeNotFound(input.target_object_type_id, version_id));
    }
    for attribute_id in [input.target_attribute_id, input.group_by_attribute_id]
      .into_iter()
      .flatten()
    {
      let belongs = contents.attributes.get(&attribute_id).is_some_and(|a| {
        a.object_type_id == input.target_object_type_id
          && a.validity.deprecated_at.is_none()
      });
      if !belongs {
        return Err(Error::AttributeNotFound(attribute_id, version_id));
      }
    }
    ensure_unique(
      "metric",
      &input.name,
      contents.metrics.values().map(|d| (d.name.as_str(), &d.validity)),
    )?;

    let def = MetricDefinition {
      id: MetricId::new(),
      version_id,
      name: input.name,
      display_name: input.display_name,
      description: input.description,
      aggregation_type: input.aggregation_type,
      target_object_type_id: input.target_object_type_id,
      target_attribute_id: input.target_attribute_id,
      filter_expression: input.filter_expression,
      group_by_attribute_id: input.group_by_attribute_id,
      unit: input.unit,
      created_by: input.created_by,
      validity: Validity::starting(self.clock.now()),
    };
    self.commit(&mut inner, StoreRecord::MetricCreated(def.clone()))?;
    debug!(version = %version_id, metric = %def.name, "metric created");
    Ok(def)
  }

  pub fn create_constraint(
    &self,
    tenant: &TenantId,
    version_id: OntologyVersionId,
    object_type_id: ObjectTypeId,
    input: NewConstraint,
  ) -> Result<EntityConstraintDefinition> {
    let mut inner = self.write()?;
    let contents = inner.editable(tenant, version_id)?;
    if contents.live_object_type(object_type_id).is_none() {
      return Err(Error::ObjectTypeNotFound(object_type_id, version_id));
    }
    let siblings: Vec<_> = contents
      .constraints
      .values()
      .filter(|c| c.object_type_id == object_type_id)
      .collect();
    ensure_unique(
      "constraint",
      &input.name,
      siblings.iter().map(|c| (c.name.as_str(), &c.validity)),
    )?;
    let ordinal = siblings.len() as u32;

    let def = EntityConstraintDefinition {
      id: ConstraintId::new(),
      version_id,
      object_type_id,
      name: input.name,
      display_name: input.display_name,
      constraint_type: input.constraint_type,
      configuration: input.configuration,
      error_message: input.error_message,
      ordinal,
      validity: Validity::starting(self.clock.now()),
    };
    self.commit(&mut inner, StoreRecord::ConstraintCreated(def.clone()))?;
    debug!(version = %version_id, constraint = %def.name, "constraint created");
    Ok(def)
  }

  /// Retire a definition from a DRAFT version. The definition stays in
  /// storage and remains visible to snapshots taken before now.
  pub fn deprecate(
    &self,
    tenant: &TenantId,
    version_id: OntologyVersionId,
    target: DefinitionRef,
    reason: Option<String>,
  ) -> Result<Deprecation> {
    let mut inner = self.write()?;
    inner.editable(tenant, version_id)?;
    let validity = inner
      .contents_mut(version_id)?
      .validity_mut(target)
      .ok_or_else(|| not_found(target, version_id))?;
    if validity.deprecated_at.is_some() {
      return Err(Error::AlreadyDeprecated);
    }

    let deprecation = Deprecation {
      version_id,
      target,
      deprecated_at: self.clock.now(),
      reason,
    };
    self.commit(&mut inner, StoreRecord::Deprecated(deprecation.clone()))?;
    info!(version = %version_id, target = ?target, "definition deprecated");
    Ok(deprecation)
  }
}

#[cfg(test)]
mod tests {
  use chrono::Duration;
  use ontic_core::definition::{AttributeDataType, Cardinality};

  use super::*;
  use crate::test_support::{clock, t0, tenant};

  fn store() -> (DefinitionStore, Arc<crate::clock::ManualClock>) {
    let clock = clock();
    (DefinitionStore::new(clock.clone()), clock)
  }

  fn draft(store: &DefinitionStore) -> OntologyVersion {
    store.create_version(&tenant(), NewVersion::new("v1", "alice")).unwrap()
  }

  #[test]
  fn version_numbers_are_per_tenant() {
    let (store, _) = store();
    let a = store.create_version(&tenant(), NewVersion::new("a", "x")).unwrap();
    let b = store.create_version(&tenant(), NewVersion::new("b", "x")).unwrap();
    let other = store
      .create_version(&TenantId::new("other"), NewVersion::new("c", "x"))
      .unwrap();
    assert_eq!(a.version_number, 1);
    assert_eq!(b.version_number, 2);
    assert_eq!(other.version_number, 1);
    assert_eq!(a.status, VersionStatus::Draft);
  }

  #[test]
  fn activation_deprecates_previous_and_emits_event() {
    let (store, clock) = store();
    let first = draft(&store);
    store.activate_version(&tenant(), first.id).unwrap();
    clock.advance(Duration::minutes(5));
    let second = draft(&store);
    let activated = store.activate_version(&tenant(), second.id).unwrap();

    assert_eq!(activated.status, VersionStatus::Active);
    let first = store.get_version(first.id).unwrap().unwrap();
    assert_eq!(first.status, VersionStatus::Deprecated);
    assert_eq!(first.deprecated_at, activated.activated_at);

    let events = store.drain_events().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(
      events[1].kind,
      DomainEventKind::OntologyActivated {
        tenant:              tenant(),
        version_id:          second.id,
        previous_version_id: Some(first.id),
      }
    );
    assert!(store.drain_events().unwrap().is_empty());
  }

  #[test]
  fn activation_is_tenant_scoped() {
    let (store, _) = store();
    let version = draft(&store);
    let err = store
      .activate_version(&TenantId::new("intruder"), version.id)
      .unwrap_err();
    assert!(matches!(err, Error::VersionNotFound(_)));
  }

  #[test]
  fn only_drafts_accept_definitions() {
    let (store, _) = store();
    let version = draft(&store);
    store.activate_version(&tenant(), version.id).unwrap();
    let err = store
      .create_object_type(&tenant(), version.id, NewObjectType::new("asset", "Asset"))
      .unwrap_err();
    assert!(matches!(err, Error::VersionNotEditable(_, VersionStatus::Active)));
  }

  #[test]
  fn names_are_unique_among_live_siblings() {
    let (store, _) = store();
    let version = draft(&store);
    let asset = store
      .create_object_type(&tenant(), version.id, NewObjectType::new("asset", "Asset"))
      .unwrap();
    let err = store
      .create_object_type(&tenant(), version.id, NewObjectType::new("asset", "Again"))
      .unwrap_err();
    assert!(matches!(err, Error::DuplicateName { .. }));

    store
      .deprecate(&tenant(), version.id, DefinitionRef::ObjectType(asset.id), None)
      .unwrap();
    store
      .create_object_type(&tenant(), version.id, NewObjectType::new("asset", "Asset v2"))
      .unwrap();
  }

  #[test]
  fn attribute_ordinals_follow_creation_order() {
    let (store, _) = store();
    let version = draft(&store);
    let asset = store
      .create_object_type(&tenant(), version.id, NewObjectType::new("asset", "Asset"))
      .unwrap();
    let name = store
      .create_attribute(
        &tenant(),
        version.id,
        asset.id,
        NewAttribute::new("name", "Name", AttributeDataType::String),
      )
      .unwrap();
    let capacity = store
      .create_attribute(
        &tenant(),
        version.id,
        asset.id,
        NewAttribute::new("capacity", "Capacity", AttributeDataType::Integer),
      )
      .unwrap();
    assert_eq!(name.ordinal, 0);
    assert_eq!(capacity.ordinal, 1);
  }

  #[test]
  fn invalid_patterns_are_rejected_at_creation() {
    let (store, _) = store();
    let version = draft(&store);
    let asset = store
      .create_object_type(&tenant(), version.id, NewObjectType::new("asset", "Asset"))
      .unwrap();
    let mut input = NewAttribute::new("code", "Code", AttributeDataType::String);
    input.pattern = Some("([a-z".to_string());
    let err = store
      .create_attribute(&tenant(), version.id, asset.id, input)
      .unwrap_err();
    assert!(matches!(err, Error::InvalidPattern { .. }));
  }

  #[test]
  fn relationship_endpoints_must_share_the_version() {
    let (store, _) = store();
    let v1 = draft(&store);
    let v2 = draft(&store);
    let asset = store
      .create_object_type(&tenant(), v1.id, NewObjectType::new("asset", "Asset"))
      .unwrap();
    let site = store
      .create_object_type(&tenant(), v2.id, NewObjectType::new("site", "Site"))
      .unwrap();
    let err = store
      .create_relationship_type(
        &tenant(),
        v1.id,
        NewRelationshipType::new("at", "At", asset.id, site.id, Cardinality::ManyToOne),
      )
      .unwrap_err();
    assert!(matches!(err, Error::CrossVersionReference(..)));
  }

  #[test]
  fn forked_versions_keep_definition_ids() {
    let (store, clock) = store();
    let v1 = draft(&store);
    let asset = store
      .create_object_type(&tenant(), v1.id, NewObjectType::new("asset", "Asset"))
      .unwrap();
    let retired = store
      .create_object_type(&tenant(), v1.id, NewObjectType::new("legacy", "Legacy"))
      .unwrap();
    clock.advance(Duration::minutes(1));
    store
      .deprecate(&tenant(), v1.id, DefinitionRef::ObjectType(retired.id), None)
      .unwrap();
    clock.advance(Duration::minutes(1));

    let mut input = NewVersion::new("v2", "alice");
    input.parent_version_id = Some(v1.id);
    let v2 = store.create_version(&tenant(), input).unwrap();
    let view = store.version_view(&tenant(), v2.id).unwrap();

    let forked = &view.contents.object_types[&asset.id];
    assert_eq!(forked.version_id, v2.id);
    assert_eq!(forked.validity.created_at, t0());
    assert!(!view.contents.object_types.contains_key(&retired.id));
  }

  #[test]
  fn archived_versions_cannot_be_activated() {
    let (store, _) = store();
    let version = draft(&store);
    store.archive_version(&tenant(), version.id).unwrap();
    let err = store.activate_version(&tenant(), version.id).unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));
  }

  #[test]
  fn concurrent_activations_leave_exactly_one_active() {
    let (store, _) = store();
    let versions: Vec<_> = (0..8).map(|_| draft(&store)).collect();
    std::thread::scope(|s| {
      for version in &versions {
        let store = &store;
        s.spawn(move || store.activate_version(&tenant(), version.id).unwrap());
      }
    });
    let active = store
      .list_versions(&tenant())
      .unwrap()
      .into_iter()
      .filter(|v| v.status == VersionStatus::Active)
      .count();
    assert_eq!(active, 1);
  }
}
