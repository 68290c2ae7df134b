//! SQL migration definitions for the ContentBridge host database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: records, record_meta, asset_index, options, scheduled_jobs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Content records and media files share one id space
CREATE TABLE IF NOT EXISTS records (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    kind         TEXT NOT NULL,
    title        TEXT NOT NULL DEFAULT '',
    body         TEXT NOT NULL DEFAULT '',
    file_name    TEXT,
    content_type TEXT,
    content_hash TEXT,
    url          TEXT,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_kind ON records(kind);

-- Per-record key/value metadata
CREATE TABLE IF NOT EXISTS record_meta (
    record_id  INTEGER NOT NULL REFERENCES records(id) ON DELETE CASCADE,
    meta_key   TEXT NOT NULL,
    meta_value TEXT NOT NULL,
    PRIMARY KEY (record_id, meta_key)
);

-- Remote image URL -> ingested media record
CREATE TABLE IF NOT EXISTS asset_index (
    origin_url TEXT PRIMARY KEY,
    asset_id   INTEGER NOT NULL REFERENCES records(id) ON DELETE CASCADE,
    local_url  TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Named JSON values (download queues)
CREATE TABLE IF NOT EXISTS options (
    name  TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Pending one-shot jobs
CREATE TABLE IF NOT EXISTS scheduled_jobs (
    job       TEXT PRIMARY KEY,
    run_after TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
