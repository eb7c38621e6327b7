//! SQLite DDL for the content store.

use rusqlite::Connection;

/// Complete DDL for the content database.
///
/// Uses `IF NOT EXISTS` throughout so `apply_schema` is idempotent.
pub(crate) const SCHEMA_SQL: &str = r#"
-- Enable WAL mode for concurrent reads during writes.
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS contents (
    id           TEXT PRIMARY KEY,
    external_id  TEXT NOT NULL,
    provider     TEXT NOT NULL,
    title        TEXT NOT NULL,
    kind         TEXT NOT NULL,                -- 'video' | 'text'
    published_at TEXT NOT NULL,                -- RFC 3339
    views        INTEGER NOT NULL DEFAULT 0,
    likes        INTEGER NOT NULL DEFAULT 0,
    reactions    INTEGER NOT NULL DEFAULT 0,
    reading_time INTEGER NOT NULL DEFAULT 0,
    tags         TEXT NOT NULL DEFAULT '[]',   -- JSON array of strings
    score        REAL NOT NULL DEFAULT 0,
    raw_data     BLOB,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_contents_provider_external
    ON contents(provider, external_id);
CREATE INDEX IF NOT EXISTS idx_contents_score ON contents(score);
CREATE INDEX IF NOT EXISTS idx_contents_kind  ON contents(kind);
"#;

/// Apply the full schema to an open connection.
pub(crate) fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}
