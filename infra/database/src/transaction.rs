use crate::Database;
use crate::error::DatabaseError;
use crate::locks::RowKey;
use crate::query::EntryQuery;
use crate::reader::Reader;
use crate::rows::{self, to_sql};
use async_trait::async_trait;
use fxhash::FxHashSet;
use ndisk_domain::constants::{BLOB, NAMESPACE_ENTRY, USER};
use ndisk_domain::{Blob, EntryId, NamespaceEntry, NewEntry, User};
use sqlx::Sqlite;
use std::fmt;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, trace};

type SqlTransaction = sqlx::Transaction<'static, Sqlite>;

/// Number of rows a commit wrote, per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub users: usize,
    pub blobs: usize,
    pub entries: usize,
}

/// A unit of work against the [`Database`].
///
/// Reads see committed rows plus this transaction's own writes; others see the writes
/// only after [`Transaction::commit`], all at once. The transaction owns the single writer
/// slot until it ends. Every write requires the lock of the row it touches. Dropping a
/// transaction without committing rolls it back.
pub struct Transaction {
    db: Database,
    id: u64,
    // Declared before the writer guard: the rollback of a dropped transaction is queued
    // before the next writer may begin.
    conn: Mutex<SqlTransaction>,
    held: FxHashSet<RowKey>,
    summary: CommitSummary,
    _writer: OwnedMutexGuard<()>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("held", &self.held.len())
            .field("summary", &self.summary)
            .finish_non_exhaustive()
    }
}

impl Transaction {
    pub(crate) fn new(db: Database, id: u64, conn: SqlTransaction, writer: OwnedMutexGuard<()>) -> Self {
        trace!(tx = id, "Transaction started");
        Self {
            db,
            id,
            conn: Mutex::new(conn),
            held: FxHashSet::default(),
            summary: CommitSummary::default(),
            _writer: writer,
        }
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// The store this transaction runs against.
    #[must_use]
    pub const fn database(&self) -> &Database {
        &self.db
    }

    /// Whether this transaction holds the lock on `key`.
    #[must_use]
    pub fn holds(&self, key: &RowKey) -> bool {
        self.held.contains(key)
    }

    /// Records a row lock. Locks already held are kept.
    pub fn lock(&mut self, key: RowKey) {
        if self.held.insert(key) {
            trace!(tx = self.id, locks = self.held.len(), "Row lock taken");
        }
    }

    /// Locks a user row and reads it.
    pub async fn lock_user(&mut self, id: &str) -> Result<Option<User>, DatabaseError> {
        self.lock(RowKey::User(id.to_owned()));
        self.user(id).await
    }

    /// Serializes structural changes of one owner's tree.
    pub fn lock_namespace(&mut self, owner: &str) {
        self.lock(RowKey::Namespace(owner.to_owned()));
    }

    /// Locks the children set of `parent`, required to insert entries below it.
    pub fn lock_directory(&mut self, owner: &str, parent: EntryId) {
        self.lock(RowKey::Directory { owner: owner.to_owned(), parent });
    }

    /// Locks an entry row and reads it.
    pub async fn lock_entry(&mut self, uuid: &str) -> Result<Option<NamespaceEntry>, DatabaseError> {
        self.lock(RowKey::Entry(uuid.to_owned()));
        self.entry_by_uuid(uuid).await
    }

    /// Locks the content hash index slot and reads the blob holding that hash, if any.
    pub async fn lock_content_hash(&mut self, hash: &str) -> Result<Option<Blob>, DatabaseError> {
        self.lock(RowKey::ContentHash(hash.to_owned()));
        self.blob_by_hash(hash).await
    }

    /// Locks a blob row and reads it.
    pub async fn lock_blob(&mut self, uuid: &str) -> Result<Option<Blob>, DatabaseError> {
        self.lock(RowKey::Blob(uuid.to_owned()));
        self.blob(uuid).await
    }

    /// # Errors
    /// [`DatabaseError::UniqueViolation`] if the id or the email is taken.
    pub async fn insert_user(&mut self, user: User) -> Result<(), DatabaseError> {
        self.require(RowKey::User(user.id.clone()))?;
        if self.user(&user.id).await?.is_some() {
            return Err(DatabaseError::unique("user.id", user.id));
        }
        if self.user_by_email(&user.email).await?.is_some() {
            return Err(DatabaseError::unique("user.email", user.email));
        }

        sqlx::query("INSERT INTO user (id, email, now_volume, total_volume) VALUES (?, ?, ?, ?)")
            .bind(&user.id)
            .bind(&user.email)
            .bind(to_sql(user.now_volume, "now_volume")?)
            .bind(to_sql(user.total_volume, "total_volume")?)
            .execute(&mut **self.conn.get_mut())
            .await
            .map_err(|e| DatabaseError::write(e, &user.id))?;
        self.summary.users += 1;
        Ok(())
    }

    pub async fn update_user(&mut self, user: User) -> Result<(), DatabaseError> {
        self.require(RowKey::User(user.id.clone()))?;
        let updated = sqlx::query("UPDATE user SET email = ?, now_volume = ?, total_volume = ? WHERE id = ?")
            .bind(&user.email)
            .bind(to_sql(user.now_volume, "now_volume")?)
            .bind(to_sql(user.total_volume, "total_volume")?)
            .bind(&user.id)
            .execute(&mut **self.conn.get_mut())
            .await
            .map_err(|e| DatabaseError::write(e, &user.id))?;
        if updated.rows_affected() == 0 {
            return Err(DatabaseError::missing(USER, user.id));
        }
        self.summary.users += 1;
        Ok(())
    }

    /// Inserts a blob under the lock of its content hash.
    ///
    /// # Errors
    /// [`DatabaseError::UniqueViolation`] if the uuid or the content hash exists.
    pub async fn insert_blob(&mut self, blob: Blob) -> Result<(), DatabaseError> {
        self.require(RowKey::ContentHash(blob.content_hash.clone()))?;
        if self.blob_by_hash(&blob.content_hash).await?.is_some() {
            return Err(DatabaseError::unique("blob.content_hash", blob.content_hash));
        }
        if self.blob(&blob.uuid).await?.is_some() {
            return Err(DatabaseError::unique("blob.uuid", blob.uuid));
        }

        sqlx::query(
            "INSERT INTO blob (uuid, content_hash, size, storage_key, link_count) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&blob.uuid)
        .bind(&blob.content_hash)
        .bind(to_sql(blob.size, "size")?)
        .bind(&blob.storage_key)
        .bind(to_sql(blob.link_count, "link_count")?)
        .execute(&mut **self.conn.get_mut())
        .await
        .map_err(|e| DatabaseError::write(e, &blob.uuid))?;
        self.summary.blobs += 1;
        Ok(())
    }

    /// Updates a blob row. The content hash is immutable.
    pub async fn update_blob(&mut self, blob: Blob) -> Result<(), DatabaseError> {
        self.require(RowKey::Blob(blob.uuid.clone()))?;
        let current = self.blob(&blob.uuid).await?.ok_or_else(|| DatabaseError::missing(BLOB, &blob.uuid))?;
        if current.content_hash != blob.content_hash {
            return Err(DatabaseError::Validation {
                message: "content hash of a blob cannot change".into(),
                context: Some(blob.uuid.into()),
            });
        }

        sqlx::query("UPDATE blob SET size = ?, storage_key = ?, link_count = ? WHERE uuid = ?")
            .bind(to_sql(blob.size, "size")?)
            .bind(&blob.storage_key)
            .bind(to_sql(blob.link_count, "link_count")?)
            .bind(&blob.uuid)
            .execute(&mut **self.conn.get_mut())
            .await
            .map_err(|e| DatabaseError::write(e, &blob.uuid))?;
        self.summary.blobs += 1;
        Ok(())
    }

    /// Inserts an entry below a locked directory and returns it with its assigned id.
    ///
    /// # Errors
    /// [`DatabaseError::UniqueViolation`] if the uuid exists.
    pub async fn insert_entry(&mut self, entry: NewEntry) -> Result<NamespaceEntry, DatabaseError> {
        self.require(RowKey::Directory { owner: entry.owner_uuid.clone(), parent: entry.parent_id })?;
        if self.entry_by_uuid(&entry.uuid).await?.is_some() {
            return Err(DatabaseError::unique("namespace_entry.uuid", entry.uuid));
        }

        let inserted = sqlx::query(
            "INSERT INTO namespace_entry (uuid, parent_id, name, extension, owner_uuid, blob_uuid) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.uuid)
        .bind(entry.parent_id)
        .bind(&entry.name)
        .bind(&entry.extension)
        .bind(&entry.owner_uuid)
        .bind(entry.blob_uuid.as_deref())
        .execute(&mut **self.conn.get_mut())
        .await
        .map_err(|e| DatabaseError::write(e, &entry.uuid))?;
        self.summary.entries += 1;
        Ok(entry.into_entry(inserted.last_insert_rowid()))
    }

    /// Updates an entry row. Id, uuid and owner are immutable; renaming or moving also
    /// requires the lock of the target directory.
    pub async fn update_entry(&mut self, entry: NamespaceEntry) -> Result<(), DatabaseError> {
        self.require(RowKey::Entry(entry.uuid.clone()))?;
        let current = self
            .entry_by_uuid(&entry.uuid)
            .await?
            .ok_or_else(|| DatabaseError::missing(NAMESPACE_ENTRY, &entry.uuid))?;
        if current.id != entry.id || current.owner_uuid != entry.owner_uuid {
            return Err(DatabaseError::Validation {
                message: "entry id and owner cannot change".into(),
                context: Some(entry.uuid.into()),
            });
        }
        if !current.collides_with(&entry.owner_uuid, entry.parent_id, &entry.name, &entry.extension) {
            self.require(RowKey::Directory { owner: entry.owner_uuid.clone(), parent: entry.parent_id })?;
        }

        sqlx::query("UPDATE namespace_entry SET parent_id = ?, name = ?, extension = ?, blob_uuid = ? WHERE id = ?")
            .bind(entry.parent_id)
            .bind(&entry.name)
            .bind(&entry.extension)
            .bind(entry.blob_uuid.as_deref())
            .bind(entry.id)
            .execute(&mut **self.conn.get_mut())
            .await
            .map_err(|e| DatabaseError::write(e, &entry.uuid))?;
        self.summary.entries += 1;
        Ok(())
    }

    /// Deletes an entry row and returns it.
    pub async fn delete_entry(&mut self, uuid: &str) -> Result<NamespaceEntry, DatabaseError> {
        self.require(RowKey::Entry(uuid.to_owned()))?;
        let current =
            self.entry_by_uuid(uuid).await?.ok_or_else(|| DatabaseError::missing(NAMESPACE_ENTRY, uuid))?;

        sqlx::query("DELETE FROM namespace_entry WHERE id = ?")
            .bind(current.id)
            .execute(&mut **self.conn.get_mut())
            .await?;
        self.summary.entries += 1;
        Ok(current)
    }

    /// Makes all writes durable and visible at once, then frees the writer slot.
    pub async fn commit(self) -> Result<CommitSummary, DatabaseError> {
        let Self { id, conn, summary, .. } = self;
        conn.into_inner().commit().await?;
        debug!(tx = id, users = summary.users, blobs = summary.blobs, entries = summary.entries, "Transaction committed");
        Ok(summary)
    }

    /// Discards all writes and frees the writer slot.
    pub async fn rollback(self) -> Result<(), DatabaseError> {
        let Self { id, conn, .. } = self;
        conn.into_inner().rollback().await?;
        debug!(tx = id, "Transaction rolled back");
        Ok(())
    }

    fn require(&self, key: RowKey) -> Result<(), DatabaseError> {
        if self.held.contains(&key) {
            Ok(())
        } else {
            Err(DatabaseError::LockNotHeld { key: key.to_string().into(), context: None })
        }
    }
}

#[async_trait]
impl Reader for Transaction {
    async fn user(&self, id: &str) -> Result<Option<User>, DatabaseError> {
        let mut conn = self.conn.lock().await;
        rows::fetch_user(&mut **conn, id).await
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let mut conn = self.conn.lock().await;
        rows::fetch_user_by_email(&mut **conn, email).await
    }

    async fn blob(&self, uuid: &str) -> Result<Option<Blob>, DatabaseError> {
        let mut conn = self.conn.lock().await;
        rows::fetch_blob(&mut **conn, uuid).await
    }

    async fn blob_by_hash(&self, hash: &str) -> Result<Option<Blob>, DatabaseError> {
        let mut conn = self.conn.lock().await;
        rows::fetch_blob_by_hash(&mut **conn, hash).await
    }

    async fn blobs(&self) -> Result<Vec<Blob>, DatabaseError> {
        let mut conn = self.conn.lock().await;
        rows::fetch_blobs(&mut **conn).await
    }

    async fn entry(&self, id: EntryId) -> Result<Option<NamespaceEntry>, DatabaseError> {
        let mut conn = self.conn.lock().await;
        rows::fetch_entry(&mut **conn, id).await
    }

    async fn entry_by_uuid(&self, uuid: &str) -> Result<Option<NamespaceEntry>, DatabaseError> {
        let mut conn = self.conn.lock().await;
        rows::fetch_entry_by_uuid(&mut **conn, uuid).await
    }

    async fn select_entries(&self, query: &EntryQuery) -> Result<Vec<NamespaceEntry>, DatabaseError> {
        let mut conn = self.conn.lock().await;
        rows::select_entries(&mut **conn, query).await
    }

    async fn live_links(&self) -> Result<Vec<(String, u64)>, DatabaseError> {
        let mut conn = self.conn.lock().await;
        rows::live_links(&mut **conn).await
    }
}
