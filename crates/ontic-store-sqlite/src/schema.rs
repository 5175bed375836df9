//! SQL schema for the ontology record log.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- Records are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS ontology_records (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT,
    kind         TEXT NOT NULL,   -- StoreRecord discriminant
    version_id   TEXT NOT NULL,   -- ontology version the record belongs to
    payload_json TEXT NOT NULL,   -- the full tagged StoreRecord
    recorded_at  TEXT NOT NULL    -- ISO 8601 UTC; adapter-assigned
);

CREATE INDEX IF NOT EXISTS records_version_idx ON ontology_records(version_id);
CREATE INDEX IF NOT EXISTS records_kind_idx    ON ontology_records(kind);

PRAGMA user_version = 1;
";
