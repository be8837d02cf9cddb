//! SQL schema for the entbridge SQLite store.
//!
//! The DDL is idempotent; on every open it is followed by an additive column
//! pass (see `SqliteStore::ensure_columns`) so databases created by older
//! builds gain new columns without a destructive migration.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS dentists (
    user_id   INTEGER PRIMARY KEY,
    full_name TEXT,
    phone     TEXT,
    workplace TEXT,
    handle    TEXT
);

-- At most one draft row per identity; replaced wholesale on every
-- answered step.
CREATE TABLE IF NOT EXISTS drafts (
    user_id     INTEGER PRIMARY KEY,
    complaints  TEXT,
    history     TEXT,
    plan        TEXT,
    attachments TEXT NOT NULL DEFAULT '[]'   -- JSON array of references
);

-- Append-only. No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS submissions (
    submission_id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id       INTEGER NOT NULL,
    status        TEXT NOT NULL,
    created_at    TEXT NOT NULL              -- ISO 8601 UTC; store-assigned
);

CREATE INDEX IF NOT EXISTS submissions_user_idx ON submissions(user_id);
";

/// Columns each table is expected to carry. Missing ones are added with
/// `ALTER TABLE ... ADD COLUMN`; unknown extra columns are left alone.
pub const EXPECTED_COLUMNS: &[(&str, &[(&str, &str)])] = &[
  ("dentists", &[
    ("full_name", "TEXT"),
    ("phone", "TEXT"),
    ("workplace", "TEXT"),
    ("handle", "TEXT"),
  ]),
  ("drafts", &[
    ("complaints", "TEXT"),
    ("history", "TEXT"),
    ("plan", "TEXT"),
    ("attachments", "TEXT"),
  ]),
  ("submissions", &[
    ("status", "TEXT"),
    ("created_at", "TEXT"),
  ]),
];
