use crate::error::DatabaseError;
use crate::query::EntryQuery;
use async_trait::async_trait;
use ndisk_domain::{Blob, EntryId, NamespaceEntry, User};

/// Read access shared by the [`Database`](crate::Database) (committed rows only) and a
/// [`Transaction`](crate::Transaction) (committed rows plus its own writes).
///
/// Reads never take row locks. Absent rows are `Ok(None)`.
#[async_trait]
pub trait Reader: Send + Sync {
    async fn user(&self, id: &str) -> Result<Option<User>, DatabaseError>;

    /// The account registered under `email`, through the unique email index.
    async fn user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError>;

    async fn blob(&self, uuid: &str) -> Result<Option<Blob>, DatabaseError>;

    /// The blob holding `hash`, through the unique content hash index.
    async fn blob_by_hash(&self, hash: &str) -> Result<Option<Blob>, DatabaseError>;

    /// Every blob, ordered by uuid.
    async fn blobs(&self) -> Result<Vec<Blob>, DatabaseError>;

    async fn entry(&self, id: EntryId) -> Result<Option<NamespaceEntry>, DatabaseError>;

    async fn entry_by_uuid(&self, uuid: &str) -> Result<Option<NamespaceEntry>, DatabaseError>;

    /// Entries matching `query`, in id order.
    async fn select_entries(&self, query: &EntryQuery) -> Result<Vec<NamespaceEntry>, DatabaseError>;

    /// Number of entries referencing each referenced blob, ordered by blob uuid.
    async fn live_links(&self) -> Result<Vec<(String, u64)>, DatabaseError>;
}
