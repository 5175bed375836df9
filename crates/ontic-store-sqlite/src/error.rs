//! Error type for `ontic-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// The `kind` column disagrees with the decoded payload.
  #[error("record {seq} is stored as {column:?} but decodes as {payload:?}")]
  KindMismatch {
    seq:     i64,
    column:  String,
    payload: &'static str,
  },

  #[error("connection lock poisoned")]
  Poisoned,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
