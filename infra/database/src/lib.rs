//! # Database Infrastructure
//!
//! The persistent store behind the storage ledger: users, blobs and namespace entries in
//! one SQLite file, with unique indexes on user emails, blob content hashes and entry
//! uuids.
//!
//! ## Key Features
//! - **Interactive Transactions**: a [`Transaction`] runs on its own connection and
//!   publishes its writes atomically on commit; dropping it rolls back.
//! - **Single Writer**: one transaction holds the writer slot at a time. Waiting for it
//!   fails with [`DatabaseError::LockTimeout`] instead of hanging.
//! - **Row Locks**: `lock_*` methods record a row lock and return the fresh row, the
//!   equivalent of `SELECT ... FOR UPDATE`. Writes are rejected unless the row is locked.
//! - **Typed Queries**: entries are selected with an [`EntryQuery`], never with strings.
//!
//! ## Example
//!
//! ```rust
//! use ndisk_database::{Database, DatabaseError, Reader};
//! use ndisk_domain::User;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), DatabaseError> {
//!     # let tmp = tempfile::tempdir().unwrap();
//!     let db = Database::builder().path(tmp.path().join("ledger.db")).init().await?;
//!
//!     let mut tx = db.begin().await?;
//!     tx.lock_user("u-1").await?;
//!     tx.insert_user(User { id: "u-1".into(), email: "a@b.c".into(), now_volume: 0, total_volume: 10 }).await?;
//!     tx.commit().await?;
//!
//!     assert_eq!(db.user("u-1").await?.map(|u| u.total_volume), Some(10));
//!     Ok(())
//! }
//! ```

mod error;
mod locks;
mod query;
mod reader;
mod rows;
mod schema;
mod transaction;

pub use error::{DatabaseError, DatabaseErrorExt};
pub use locks::RowKey;
pub use query::{EntryFilter, EntryQuery};
pub use reader::Reader;
pub use transaction::{CommitSummary, Transaction};

use crate::locks::WriterSlot;
use async_trait::async_trait;
use ndisk_domain::{Blob, EntryId, NamespaceEntry, User};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{info, instrument};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MAX_CONNECTIONS: u32 = 8;

/// Row counts of the committed tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    pub users: u64,
    pub blobs: u64,
    pub entries: u64,
}

/// Inner state of the [`Database`] handle.
#[derive(Debug)]
pub struct DatabaseInner {
    pool: SqlitePool,
    writer: WriterSlot,
    lock_timeout: Duration,
    path: PathBuf,
    next_tx_id: AtomicU64,
}

/// Shared handle to the store. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Creates a new [`DatabaseBuilder`].
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    /// Starts a transaction once the writer slot is free.
    ///
    /// # Errors
    /// [`DatabaseError::LockTimeout`] when another transaction keeps the slot past the
    /// lock timeout.
    pub async fn begin(&self) -> Result<Transaction, DatabaseError> {
        let writer = self.inner.writer.acquire(self.inner.lock_timeout).await?;
        let conn = self.inner.pool.begin().await.context("Opening transaction")?;
        let id = self.inner.next_tx_id.fetch_add(1, Ordering::Relaxed);
        Ok(Transaction::new(self.clone(), id, conn, writer))
    }

    /// Whether no transaction is open.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.inner.writer.is_free()
    }

    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.inner.path
    }

    /// Row counts of the committed tables.
    pub async fn stats(&self) -> Result<TableStats, DatabaseError> {
        let (users, blobs, entries): (i64, i64, i64) = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM user), (SELECT COUNT(*) FROM blob), (SELECT COUNT(*) FROM namespace_entry)",
        )
        .fetch_one(&self.inner.pool)
        .await?;
        let count = |n: i64| u64::try_from(n).unwrap_or_default();
        Ok(TableStats { users: count(users), blobs: count(blobs), entries: count(entries) })
    }

    /// Closes every pooled connection. Open transactions keep theirs until they end.
    pub async fn close(&self) {
        self.inner.pool.close().await;
        info!(path = %self.inner.path.display(), "Ledger store closed");
    }
}

#[async_trait]
impl Reader for Database {
    async fn user(&self, id: &str) -> Result<Option<User>, DatabaseError> {
        rows::fetch_user(&self.inner.pool, id).await
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        rows::fetch_user_by_email(&self.inner.pool, email).await
    }

    async fn blob(&self, uuid: &str) -> Result<Option<Blob>, DatabaseError> {
        rows::fetch_blob(&self.inner.pool, uuid).await
    }

    async fn blob_by_hash(&self, hash: &str) -> Result<Option<Blob>, DatabaseError> {
        rows::fetch_blob_by_hash(&self.inner.pool, hash).await
    }

    async fn blobs(&self) -> Result<Vec<Blob>, DatabaseError> {
        rows::fetch_blobs(&self.inner.pool).await
    }

    async fn entry(&self, id: EntryId) -> Result<Option<NamespaceEntry>, DatabaseError> {
        rows::fetch_entry(&self.inner.pool, id).await
    }

    async fn entry_by_uuid(&self, uuid: &str) -> Result<Option<NamespaceEntry>, DatabaseError> {
        rows::fetch_entry_by_uuid(&self.inner.pool, uuid).await
    }

    async fn select_entries(&self, query: &EntryQuery) -> Result<Vec<NamespaceEntry>, DatabaseError> {
        rows::select_entries(&self.inner.pool, query).await
    }

    async fn live_links(&self) -> Result<Vec<(String, u64)>, DatabaseError> {
        rows::live_links(&self.inner.pool).await
    }
}

/// A fluent builder for the ledger store.
#[must_use = "builders do nothing unless you call .init()"]
#[derive(Debug, Default)]
pub struct DatabaseBuilder {
    path: Option<PathBuf>,
    lock_timeout: Option<Duration>,
    max_connections: Option<u32>,
}

impl DatabaseBuilder {
    /// Creates a new [`DatabaseBuilder`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Location of the SQLite file. Created with its parent directories when missing.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// How long a transaction waits for the writer slot, and SQLite for a busy file.
    /// Defaults to 5 seconds.
    pub const fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    /// Size of the connection pool. Defaults to 8.
    pub const fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Consumes the builder, opens (or creates) the store and applies the schema.
    ///
    /// # Errors
    /// * [`DatabaseError::Validation`] without a path, with a zero lock timeout, or with
    ///   fewer than two connections (one for the writer, one for readers).
    /// * [`DatabaseError::Io`] if the parent directory cannot be created.
    /// * [`DatabaseError::Engine`] if SQLite cannot open the file.
    #[instrument(skip(self), fields(path = ?self.path, lock_timeout = ?self.lock_timeout))]
    pub async fn init(self) -> Result<Database, DatabaseError> {
        let path = self.path.ok_or_else(|| invalid("database path is required"))?;
        let lock_timeout = self.lock_timeout.unwrap_or(DEFAULT_LOCK_TIMEOUT);
        if lock_timeout.is_zero() {
            return Err(invalid("lock timeout must be greater than zero"));
        }
        let max_connections = self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS);
        if max_connections < 2 {
            return Err(invalid("the pool needs at least two connections"));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.context("Creating database directory")?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(lock_timeout);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(lock_timeout)
            .connect_with(options)
            .await
            .context("Opening SQLite file")?;
        schema::migrate(&pool).await?;

        info!(path = %path.display(), ?lock_timeout, max_connections, "Ledger store opened");
        Ok(Database {
            inner: Arc::new(DatabaseInner {
                pool,
                writer: WriterSlot::default(),
                lock_timeout,
                path,
                next_tx_id: AtomicU64::new(1),
            }),
        })
    }
}

fn invalid(message: &'static str) -> DatabaseError {
    DatabaseError::Validation { message: message.into(), context: None }
}
