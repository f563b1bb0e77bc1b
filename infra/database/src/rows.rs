//! Row mapping and the read statements shared by the pool and open transactions.

use crate::error::DatabaseError;
use crate::query::EntryQuery;
use ndisk_domain::{Blob, EntryId, NamespaceEntry, User};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite};

pub(crate) const ENTRY_COLUMNS: &str =
    "e.id, e.uuid, e.parent_id, e.name, e.extension, e.owner_uuid, e.blob_uuid";

/// Volumes and sizes are `u64` in the domain and `INTEGER` (i64) in SQLite.
pub(crate) fn to_sql(value: u64, column: &'static str) -> Result<i64, DatabaseError> {
    i64::try_from(value).map_err(|_| DatabaseError::Validation {
        message: format!("{column} {value} does not fit a SQLite integer").into(),
        context: None,
    })
}

fn unsigned(row: &SqliteRow, column: &'static str) -> Result<u64, DatabaseError> {
    let value: i64 = row.try_get(column)?;
    u64::try_from(value).map_err(|_| DatabaseError::Internal {
        message: format!("negative {column} {value} in the store").into(),
        context: None,
    })
}

pub(crate) fn user(row: &SqliteRow) -> Result<User, DatabaseError> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        now_volume: unsigned(row, "now_volume")?,
        total_volume: unsigned(row, "total_volume")?,
    })
}

pub(crate) fn blob(row: &SqliteRow) -> Result<Blob, DatabaseError> {
    Ok(Blob {
        uuid: row.try_get("uuid")?,
        content_hash: row.try_get("content_hash")?,
        size: unsigned(row, "size")?,
        storage_key: row.try_get("storage_key")?,
        link_count: unsigned(row, "link_count")?,
    })
}

pub(crate) fn entry(row: &SqliteRow) -> Result<NamespaceEntry, DatabaseError> {
    Ok(NamespaceEntry {
        id: row.try_get("id")?,
        uuid: row.try_get("uuid")?,
        parent_id: row.try_get("parent_id")?,
        name: row.try_get("name")?,
        extension: row.try_get("extension")?,
        owner_uuid: row.try_get("owner_uuid")?,
        blob_uuid: row.try_get("blob_uuid")?,
    })
}

pub(crate) async fn fetch_user<'e, E>(exec: E, id: &str) -> Result<Option<User>, DatabaseError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("SELECT * FROM user WHERE id = ?")
        .bind(id)
        .fetch_optional(exec)
        .await?
        .as_ref()
        .map(user)
        .transpose()
}

pub(crate) async fn fetch_user_by_email<'e, E>(exec: E, email: &str) -> Result<Option<User>, DatabaseError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("SELECT * FROM user WHERE email = ?")
        .bind(email)
        .fetch_optional(exec)
        .await?
        .as_ref()
        .map(user)
        .transpose()
}

pub(crate) async fn fetch_blob<'e, E>(exec: E, uuid: &str) -> Result<Option<Blob>, DatabaseError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("SELECT * FROM blob WHERE uuid = ?")
        .bind(uuid)
        .fetch_optional(exec)
        .await?
        .as_ref()
        .map(blob)
        .transpose()
}

pub(crate) async fn fetch_blob_by_hash<'e, E>(exec: E, hash: &str) -> Result<Option<Blob>, DatabaseError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("SELECT * FROM blob WHERE content_hash = ?")
        .bind(hash)
        .fetch_optional(exec)
        .await?
        .as_ref()
        .map(blob)
        .transpose()
}

pub(crate) async fn fetch_blobs<'e, E>(exec: E) -> Result<Vec<Blob>, DatabaseError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("SELECT * FROM blob ORDER BY uuid").fetch_all(exec).await?.iter().map(blob).collect()
}

pub(crate) async fn fetch_entry<'e, E>(exec: E, id: EntryId) -> Result<Option<NamespaceEntry>, DatabaseError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("SELECT * FROM namespace_entry WHERE id = ?")
        .bind(id)
        .fetch_optional(exec)
        .await?
        .as_ref()
        .map(entry)
        .transpose()
}

pub(crate) async fn fetch_entry_by_uuid<'e, E>(exec: E, uuid: &str) -> Result<Option<NamespaceEntry>, DatabaseError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("SELECT * FROM namespace_entry WHERE uuid = ?")
        .bind(uuid)
        .fetch_optional(exec)
        .await?
        .as_ref()
        .map(entry)
        .transpose()
}

pub(crate) async fn select_entries<'e, E>(exec: E, query: &EntryQuery) -> Result<Vec<NamespaceEntry>, DatabaseError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let mut builder = query.to_sql()?;
    builder.build().fetch_all(exec).await?.iter().map(entry).collect()
}

/// Entries referencing each blob, counted from the entry table.
pub(crate) async fn live_links<'e, E>(exec: E) -> Result<Vec<(String, u64)>, DatabaseError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "SELECT blob_uuid, COUNT(*) AS links FROM namespace_entry \
         WHERE blob_uuid IS NOT NULL GROUP BY blob_uuid ORDER BY blob_uuid",
    )
    .fetch_all(exec)
    .await?
    .iter()
    .map(link)
    .collect()
}

fn link(row: &SqliteRow) -> Result<(String, u64), DatabaseError> {
    Ok((row.try_get("blob_uuid")?, unsigned(row, "links")?))
}
