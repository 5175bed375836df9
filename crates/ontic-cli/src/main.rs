//! `ontic`, an inspection tool for the ontology engine.
//!
//! Reads `ontic.toml` (or the path given with `--config`) layered with
//! `ONTIC_*` environment variables, rebuilds the definition store from its
//! SQLite record log, and runs one command against it.
//!
//! # Usage
//!
//! ```text
//! ontic seed
//! ontic versions
//! ontic snapshot --as-of 2024-03-01T12:00:00Z
//! ontic validate --object-type asset --payload '{"status":"OPERATIONAL"}'
//! ontic diff --from <VERSION> --to <VERSION> --impact
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::{Context as _, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use ontic_core::{
  definition::OntologyVersion,
  ids::{OntologyVersionId, TenantId},
  snapshot::OntologySnapshot,
};
use ontic_engine::{
  Engine,
  clock::SystemClock,
  config::EngineConfig,
  hash::SnapshotHasher,
  memory_truth::MemoryTruthStore,
  seed::seed_ontology,
  store::DefinitionStore,
};
use ontic_store_sqlite::SqliteRecordLog;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(author, version, about = "Inspect and evolve a versioned ontology")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "ontic.toml")]
  config: PathBuf,

  /// Tenant to act for; overrides the configured tenant.
  #[arg(short, long)]
  tenant: Option<String>,

  #[command(subcommand)]
  command: Command,
}

/// Where in time a command looks.
#[derive(clap::Args)]
struct At {
  /// Ontology version; defaults to the tenant's active version.
  #[arg(long)]
  version: Option<OntologyVersionId>,

  /// RFC 3339 instant; defaults to now.
  #[arg(long)]
  as_of: Option<DateTime<Utc>>,
}

#[derive(Subcommand)]
enum Command {
  /// Create and activate the starter ontology.
  Seed,

  /// List the tenant's ontology versions.
  Versions,

  /// Make a version the tenant's active one.
  Activate { version: OntologyVersionId },

  /// Print the structural hash of a snapshot.
  Snapshot {
    #[command(flatten)]
    at:   At,
    /// Print the full snapshot instead of the hash report.
    #[arg(long)]
    full: bool,
  },

  /// Compile a snapshot and print the artifacts of one object type.
  Compile {
    #[command(flatten)]
    at:          At,
    #[arg(long)]
    object_type: String,
  },

  /// Validate a JSON entity payload against an object type.
  Validate {
    #[command(flatten)]
    at:          At,
    #[arg(long)]
    object_type: String,
    #[arg(long)]
    payload:     String,
  },

  /// Compare two versions, optionally with impact analysis.
  Diff {
    #[arg(long)]
    from:   OntologyVersionId,
    #[arg(long)]
    to:     OntologyVersionId,
    #[arg(long)]
    as_of:  Option<DateTime<Utc>>,
    #[arg(long)]
    impact: bool,
  },

  /// Print the raw record log.
  Log,
}

// ─── Entry point ─────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config.clone()).required(false))
    .add_source(config::Environment::with_prefix("ONTIC"))
    .build()
    .context("failed to read config file")?;
  let mut engine_cfg: EngineConfig = settings
    .try_deserialize()
    .context("failed to deserialise EngineConfig")?;
  if let Some(tenant) = cli.tenant {
    engine_cfg.tenant = TenantId::new(tenant);
  }

  let log = match &engine_cfg.store_path {
    Some(path) => {
      let path = expand_tilde(path);
      let log = SqliteRecordLog::open(&path)
        .with_context(|| format!("failed to open record log at {path:?}"))?;
      Some(Arc::new(log))
    }
    None => None,
  };
  let store = match &log {
    Some(log) => DefinitionStore::load(log.clone(), Arc::new(SystemClock))
      .context("failed to rebuild definition store")?,
    None => {
      tracing::warn!("no store_path configured; changes will not be saved");
      DefinitionStore::new(Arc::new(SystemClock))
    }
  };
  let store = Arc::new(store);
  let truth = Arc::new(MemoryTruthStore::new(store.clock()));
  let engine = Engine::new(engine_cfg, store, truth);

  run(&engine, cli.command, log.as_deref())
}

fn run(
  engine: &Engine,
  command: Command,
  log: Option<&SqliteRecordLog>,
) -> anyhow::Result<()> {
  let tenant = &engine.config.tenant;

  match command {
    Command::Seed => {
      let seeded = seed_ontology(&engine.store, tenant).context("seeding failed")?;
      println!("{}", seeded.version.id);
    }

    Command::Versions => {
      for version in engine.store.list_versions(tenant)? {
        print_version(&version);
      }
    }

    Command::Activate { version } => {
      let version = engine.store.activate_version(tenant, version)?;
      print_version(&version);
    }

    Command::Snapshot { at, full } => {
      let snapshot = resolve(engine, &at)?;
      if full {
        print_json(&*snapshot)?;
      } else {
        print_json(&SnapshotHasher.compute(&snapshot))?;
      }
    }

    Command::Compile { at, object_type } => {
      let snapshot = resolve(engine, &at)?;
      let id = object_type_id(&snapshot, &object_type)?;
      let compiled = engine.compiler.compile(snapshot)?;
      let artifacts = compiled
        .artifacts(id)
        .with_context(|| format!("no artifacts for {object_type}"))?;
      print_json(&artifacts)?;
    }

    Command::Validate { at, object_type, payload } => {
      let entity: Map<String, Value> =
        serde_json::from_str(&payload).context("payload must be a JSON object")?;
      let snapshot = resolve(engine, &at)?;
      let id = object_type_id(&snapshot, &object_type)?;
      let result = engine.validation.validate(&entity, id, &snapshot)?;
      print_json(&result)?;
      if !result.valid {
        std::process::exit(1);
      }
    }

    Command::Diff { from, to, as_of, impact } => {
      let diff = engine
        .diff
        .compute_diff(from, to, as_of.unwrap_or_else(Utc::now), tenant)?;
      if impact {
        let analysis = engine.impact.analyze_impact(&diff, tenant, &[])?;
        print_json(&serde_json::json!({ "diff": diff, "impact": analysis }))?;
      } else {
        print_json(&diff)?;
      }
    }

    Command::Log => {
      let Some(log) = log else {
        bail!("no store_path configured");
      };
      for entry in log.entries()? {
        println!(
          "{:>6}  {}  {:<26} {}",
          entry.seq,
          entry.recorded_at.to_rfc3339(),
          entry.record.kind(),
          entry.record.version_id()
        );
      }
    }
  }

  Ok(())
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn resolve(engine: &Engine, at: &At) -> anyhow::Result<Arc<OntologySnapshot>> {
  let tenant = &engine.config.tenant;
  let as_of = at.as_of.unwrap_or_else(Utc::now);
  let snapshot = match at.version {
    Some(version) => engine.resolver.resolve_snapshot(version, as_of, tenant)?,
    None => engine.resolver.resolve_active_snapshot(as_of, tenant)?,
  };
  Ok(snapshot)
}

fn object_type_id(
  snapshot: &OntologySnapshot,
  name: &str,
) -> anyhow::Result<ontic_core::ids::ObjectTypeId> {
  match snapshot.object_type_by_name(name) {
    Some(object_type) => Ok(object_type.id),
    None => bail!("object type {name:?} is not visible in this snapshot"),
  }
}

fn print_version(version: &OntologyVersion) {
  println!(
    "{}  #{:<3} {:<10} {:<12} {}",
    version.id,
    version.version_number,
    version.status,
    version.version_name,
    version.created_at.to_rfc3339()
  );
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
