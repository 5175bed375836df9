//! [`SqliteRecordLog`], the SQLite implementation of [`PersistenceAdapter`].

use std::{
  path::Path,
  sync::{Mutex, MutexGuard},
};

use chrono::Utc;
use ontic_core::{
  error::BoxError,
  ids::OntologyVersionId,
  store::{PersistenceAdapter, StoreRecord},
};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::{
  Error, Result,
  encode::{LogEntry, RawRecord, encode_dt, encode_record},
  schema::SCHEMA,
};

// ─── Log ─────────────────────────────────────────────────────────────────────

/// The definition store's record log, kept in a single SQLite file.
pub struct SqliteRecordLog {
  conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteRecordLog {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SqliteRecordLog").finish_non_exhaustive()
  }
}

impl SqliteRecordLog {
  /// Open (or create) a log at `path` and run schema initialisation.
  pub fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let log = Self::init(Connection::open(path)?)?;
    info!(path = %path.display(), "record log opened");
    Ok(log)
  }

  /// Open an in-memory log, useful for testing.
  pub fn open_in_memory() -> Result<Self> {
    Self::init(Connection::open_in_memory()?)
  }

  fn init(conn: Connection) -> Result<Self> {
    conn.execute_batch(SCHEMA)?;
    Ok(Self { conn: Mutex::new(conn) })
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|_| Error::Poisoned)
  }

  /// Append one record; returns its sequence number.
  pub fn insert(&self, record: &StoreRecord) -> Result<i64> {
    let encoded = encode_record(record)?;
    let conn = self.conn()?;
    conn.execute(
      "INSERT INTO ontology_records (kind, version_id, payload_json, recorded_at)
       VALUES (?1, ?2, ?3, ?4)",
      rusqlite::params![
        encoded.kind,
        encoded.version_id,
        encoded.payload_json,
        encode_dt(Utc::now()),
      ],
    )?;
    let seq = conn.last_insert_rowid();
    debug!(seq, kind = encoded.kind, version = %encoded.version_id, "record appended");
    Ok(seq)
  }

  /// Every entry, oldest first.
  pub fn entries(&self) -> Result<Vec<LogEntry>> {
    self.select(
      "SELECT seq, kind, payload_json, recorded_at FROM ontology_records ORDER BY seq",
      None,
    )
  }

  /// Entries belonging to one ontology version, oldest first.
  pub fn entries_for_version(&self, version_id: OntologyVersionId) -> Result<Vec<LogEntry>> {
    self.select(
      "SELECT seq, kind, payload_json, recorded_at FROM ontology_records
       WHERE version_id = ?1 ORDER BY seq",
      Some(version_id.to_string()),
    )
  }

  pub fn len(&self) -> Result<usize> {
    let count: i64 = self
      .conn()?
      .query_row("SELECT COUNT(*) FROM ontology_records", [], |row| row.get(0))?;
    Ok(usize::try_from(count).unwrap_or_default())
  }

  pub fn is_empty(&self) -> Result<bool> { Ok(self.len()? == 0) }

  fn select(&self, sql: &str, version_id: Option<String>) -> Result<Vec<LogEntry>> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare(sql)?;
    let rows = match version_id {
      Some(id) => stmt
        .query_map(rusqlite::params![id], raw_record)?
        .collect::<rusqlite::Result<Vec<_>>>()?,
      None => stmt.query_map([], raw_record)?.collect::<rusqlite::Result<Vec<_>>>()?,
    };
    rows.into_iter().map(RawRecord::decode).collect()
  }
}

fn raw_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRecord> {
  Ok(RawRecord {
    seq:          row.get(0)?,
    kind:         row.get(1)?,
    payload_json: row.get(2)?,
    recorded_at:  row.get(3)?,
  })
}

impl PersistenceAdapter for SqliteRecordLog {
  fn append(&self, record: &StoreRecord) -> Result<(), BoxError> {
    self.insert(record)?;
    Ok(())
  }

  fn load(&self) -> Result<Vec<StoreRecord>, BoxError> {
    Ok(self.entries()?.into_iter().map(|e| e.record).collect())
  }
}
