//! Conversions between [`StoreRecord`]s and their column representation.
//!
//! Timestamps are stored as RFC 3339 strings. The payload column holds the
//! tagged JSON form of the whole record; `kind` and `version_id` are copied
//! out of it for indexing.

use chrono::{DateTime, Utc};
use ontic_core::store::StoreRecord;

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// Column values for one `ontology_records` row, minus `seq`.
pub struct EncodedRecord {
  pub kind:         &'static str,
  pub version_id:   String,
  pub payload_json: String,
}

pub fn encode_record(record: &StoreRecord) -> Result<EncodedRecord> {
  Ok(EncodedRecord {
    kind:         record.kind(),
    version_id:   record.version_id().to_string(),
    payload_json: serde_json::to_string(record)?,
  })
}

/// A row as read back from SQLite.
pub struct RawRecord {
  pub seq:          i64,
  pub kind:         String,
  pub payload_json: String,
  pub recorded_at:  String,
}

/// One decoded row of the log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
  pub seq:         i64,
  pub recorded_at: DateTime<Utc>,
  pub record:      StoreRecord,
}

impl RawRecord {
  pub fn decode(self) -> Result<LogEntry> {
    let record: StoreRecord = serde_json::from_str(&self.payload_json)?;
    if record.kind() != self.kind {
      return Err(Error::KindMismatch {
        seq:     self.seq,
        column:  self.kind,
        payload: record.kind(),
      });
    }
    Ok(LogEntry {
      seq: self.seq,
      recorded_at: decode_dt(&self.recorded_at)?,
      record,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use ontic_core::ids::{OntologyVersionId, TenantId};

  use super::*;

  #[test]
  fn timestamps_round_trip() {
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
    assert_eq!(decode_dt(&encode_dt(at)).unwrap(), at);
    assert!(matches!(decode_dt("yesterday"), Err(Error::DateParse(_))));
  }

  #[test]
  fn mismatched_kinds_are_rejected() {
    let record = StoreRecord::VersionArchived {
      tenant:     TenantId::new("acme"),
      version_id: OntologyVersionId::new(),
      at:         Utc::now(),
    };
    let encoded = encode_record(&record).unwrap();
    assert_eq!(encoded.kind, "version_archived");
    let raw = RawRecord {
      seq:          7,
      kind:         "version_activated".into(),
      payload_json: encoded.payload_json,
      recorded_at:  encode_dt(Utc::now()),
    };
    assert!(matches!(raw.decode(), Err(Error::KindMismatch { seq: 7, .. })));
  }
}
