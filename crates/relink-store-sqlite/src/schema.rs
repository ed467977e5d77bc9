//! SQL schema for the Relink SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! the `user_version` pragma.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per contact fragment. `linked_id` points at the fragment's
-- primary and is set iff link_precedence = 'secondary'. Rows with
-- deleted_at set are invisible to resolution.
CREATE TABLE IF NOT EXISTS contacts (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    email           TEXT,
    phone_number    TEXT,
    link_precedence TEXT NOT NULL,   -- 'primary' | 'secondary'
    linked_id       INTEGER REFERENCES contacts(id),
    created_at      TEXT NOT NULL,   -- ISO 8601 UTC; server-assigned
    updated_at      TEXT NOT NULL,
    deleted_at      TEXT
);

CREATE INDEX IF NOT EXISTS contacts_email_idx  ON contacts(email);
CREATE INDEX IF NOT EXISTS contacts_phone_idx  ON contacts(phone_number);
CREATE INDEX IF NOT EXISTS contacts_linked_idx ON contacts(linked_id);

PRAGMA user_version = 1;
";
