//! Strongly-typed identifiers.
//!
//! Every element kind gets its own UUID newtype so an attribute id can never be
//! passed where an object type id is expected. All ids are `Ord` so they can
//! key the ordered maps that keep snapshots deterministic.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    #[derive(
      Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
      Deserialize,
    )]
    #[serde(transparent)]
    pub struct $name(pub Uuid);

    impl $name {
      /// Generate a fresh random id.
      pub fn new() -> Self { Self(Uuid::new_v4()) }

      pub fn as_uuid(&self) -> Uuid { self.0 }
    }

    impl Default for $name {
      fn default() -> Self { Self::new() }
    }

    impl From<Uuid> for $name {
      fn from(value: Uuid) -> Self { Self(value) }
    }

    impl FromStr for $name {
      type Err = uuid::Error;

      fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
      }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
      }
    }
  };
}

uuid_id!(
  /// Identifies one [`crate::definition::OntologyVersion`].
  OntologyVersionId
);
uuid_id!(ObjectTypeId);
uuid_id!(AttributeId);
uuid_id!(RelationshipTypeId);
uuid_id!(MetricId);
uuid_id!(ConstraintId);
uuid_id!(
  /// Identifies a scenario branch.
  ScenarioId
);
uuid_id!(ScenarioMutationId);
uuid_id!(PromotionId);
uuid_id!(DecisionId);
uuid_id!(
  /// Identifies a live entity in the external truth store.
  EntityId
);
uuid_id!(
  /// Identifies a live relationship instance in the external truth store.
  LinkId
);

// ─── Tenant ──────────────────────────────────────────────────────────────────

/// Opaque tenant key. Every version, scenario and decision is scoped to one.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
  pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for TenantId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for TenantId {
  fn from(value: &str) -> Self { Self::new(value) }
}

impl From<String> for TenantId {
  fn from(value: String) -> Self { Self(value) }
}
