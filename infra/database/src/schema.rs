//! Table layout of the ledger store. Applied on every open; all statements are idempotent.

use crate::error::{DatabaseError, DatabaseErrorExt};
use sqlx::SqlitePool;

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS user (
    id           TEXT PRIMARY KEY NOT NULL,
    email        TEXT NOT NULL,
    now_volume   INTEGER NOT NULL DEFAULT 0 CHECK (now_volume >= 0),
    total_volume INTEGER NOT NULL CHECK (total_volume >= 0)
);
CREATE UNIQUE INDEX IF NOT EXISTS user_email ON user (email);

CREATE TABLE IF NOT EXISTS blob (
    uuid         TEXT PRIMARY KEY NOT NULL,
    content_hash TEXT NOT NULL,
    size         INTEGER NOT NULL CHECK (size >= 0),
    storage_key  TEXT NOT NULL,
    link_count   INTEGER NOT NULL DEFAULT 0 CHECK (link_count >= 0)
);
CREATE UNIQUE INDEX IF NOT EXISTS blob_content_hash ON blob (content_hash);
CREATE INDEX IF NOT EXISTS blob_storage_key ON blob (storage_key);

CREATE TABLE IF NOT EXISTS namespace_entry (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid       TEXT NOT NULL,
    parent_id  INTEGER NOT NULL,
    name       TEXT NOT NULL,
    extension  TEXT NOT NULL DEFAULT '',
    owner_uuid TEXT NOT NULL REFERENCES user (id),
    blob_uuid  TEXT REFERENCES blob (uuid)
);
CREATE UNIQUE INDEX IF NOT EXISTS namespace_entry_uuid ON namespace_entry (uuid);
CREATE INDEX IF NOT EXISTS namespace_entry_children ON namespace_entry (owner_uuid, parent_id, name, extension);
CREATE INDEX IF NOT EXISTS namespace_entry_blob ON namespace_entry (blob_uuid);
";

pub(crate) async fn migrate(pool: &SqlitePool) -> Result<(), DatabaseError> {
    sqlx::query(SCHEMA_SQL).execute(pool).await.context("Applying ledger schema")?;
    Ok(())
}
