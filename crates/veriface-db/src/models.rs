//! Static schema definition.
//!
//! No table stores image data. Only the normalized label and whether it came
//! from an authoritative analyzer are kept.

/// A table and everything that hangs off it (indexes).
pub struct Table {
    pub name: &'static str,
    pub ddl: &'static str,
}

/// Stamped into `PRAGMA user_version` by `init_db`.
pub const SCHEMA_VERSION: i64 = 1;

pub const SCHEMA: &[Table] = &[
    Table {
        name: "users",
        ddl: "CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            email           TEXT NOT NULL UNIQUE,
            display_name    TEXT,
            verified_gender TEXT CHECK (verified_gender IN ('Man', 'Woman')),
            verified_at     TEXT,
            created_at      TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );",
    },
    Table {
        name: "verification_attempts",
        ddl: "CREATE TABLE IF NOT EXISTS verification_attempts (
            id            TEXT PRIMARY KEY,
            user_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            label         TEXT CHECK (label IN ('Man', 'Woman')),
            error         TEXT,
            authoritative INTEGER NOT NULL DEFAULT 1,
            created_at    TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK ((label IS NULL) <> (error IS NULL))
        );
        CREATE INDEX IF NOT EXISTS idx_verification_attempts_user
            ON verification_attempts(user_id, created_at);",
    },
];
