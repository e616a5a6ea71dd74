//! Layout of the key/value database, tracked through `PRAGMA user_version`.

/// Value of `user_version` once [`V1`] has been applied.
pub const SCHEMA_VERSION: i64 = 1;

/// Per-connection settings.
pub const CONNECTION_PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA busy_timeout = 5000;
";

/// Initial layout: one row per key, value stored as JSON text.
pub const V1: &str = "
    CREATE TABLE IF NOT EXISTS entries (
        key        TEXT PRIMARY KEY NOT NULL,
        json       TEXT NOT NULL,
        written_at TEXT NOT NULL
    ) WITHOUT ROWID;
    PRAGMA user_version = 1;
";
