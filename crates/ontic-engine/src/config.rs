//! Engine configuration.
//!
//! Deserialised by the CLI from `ontic.toml` plus `ONTIC_*` environment
//! variables; every field has a default so an empty source is valid.

use std::path::PathBuf;

use ontic_core::{ids::TenantId, scenario::PromotionPolicy};
use serde::Deserialize;

pub const DEFAULT_SNAPSHOT_CACHE_CAPACITY: usize = 1000;
pub const DEFAULT_COMPILED_CACHE_CAPACITY: usize = 100;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Tenant used when a command does not name one.
  pub tenant:                  TenantId,
  /// SQLite record log. `None` keeps everything in memory.
  pub store_path:              Option<PathBuf>,
  pub snapshot_cache_capacity: usize,
  pub compiled_cache_capacity: usize,
  pub promotion_policy:        PromotionPolicy,
  /// Reported in replay timelines.
  pub environment:             String,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      tenant:                  TenantId::new("default"),
      store_path:              None,
      snapshot_cache_capacity: DEFAULT_SNAPSHOT_CACHE_CAPACITY,
      compiled_cache_capacity: DEFAULT_COMPILED_CACHE_CAPACITY,
      promotion_policy:        PromotionPolicy::Advisory,
      environment:             "production".to_string(),
    }
  }
}
