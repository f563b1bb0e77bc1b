//! Write serialization and row lock bookkeeping.
//!
//! SQLite admits one writer at a time. The writer slot hands that right to one
//! [`Transaction`](crate::Transaction) for its whole lifetime, so reads taken inside a
//! transaction stay valid until it ends. Row locks are recorded per transaction and every
//! write checks that the row it touches was locked first.

use crate::error::DatabaseError;
use ndisk_domain::EntryId;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A lockable row or index slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RowKey {
    User(String),
    /// Structural changes (folder moves) of one owner's tree.
    Namespace(String),
    /// The set of children under one parent of one owner.
    Directory { owner: String, parent: EntryId },
    Entry(String),
    /// The unique content hash index slot, held while checking for and inserting a blob.
    ContentHash(String),
    Blob(String),
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Namespace(owner) => write!(f, "namespace:{owner}"),
            Self::Directory { owner, parent } => write!(f, "directory:{owner}/{parent}"),
            Self::Entry(uuid) => write!(f, "entry:{uuid}"),
            Self::ContentHash(hash) => write!(f, "content_hash:{hash}"),
            Self::Blob(uuid) => write!(f, "blob:{uuid}"),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct WriterSlot {
    slot: Arc<Mutex<()>>,
}

impl WriterSlot {
    /// Waits for the writer slot up to `timeout`.
    pub(crate) async fn acquire(&self, timeout: Duration) -> Result<OwnedMutexGuard<()>, DatabaseError> {
        tokio::time::timeout(timeout, Arc::clone(&self.slot).lock_owned())
            .await
            .map_err(|_| DatabaseError::LockTimeout { key: "writer".into(), context: None })
    }

    pub(crate) fn is_free(&self) -> bool {
        self.slot.try_lock().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(50);

    #[test]
    fn keys_render_as_table_and_row() {
        let keys = [
            RowKey::User("u".into()),
            RowKey::Namespace("o".into()),
            RowKey::Directory { owner: "o".into(), parent: 0 },
            RowKey::Entry("e".into()),
            RowKey::ContentHash("h".into()),
            RowKey::Blob("b".into()),
        ];
        let names: Vec<String> = keys.iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            ["user:u", "namespace:o", "directory:o/0", "entry:e", "content_hash:h", "blob:b"]
        );
    }

    #[tokio::test]
    async fn second_writer_times_out_then_succeeds_after_release() {
        let slot = WriterSlot::default();
        let first = slot.acquire(WAIT).await.unwrap();
        assert!(!slot.is_free());

        let err = slot.acquire(WAIT).await.unwrap_err();
        assert!(matches!(err, DatabaseError::LockTimeout { .. }));

        drop(first);
        assert!(slot.is_free());
        drop(slot.acquire(WAIT).await.unwrap());
    }
}
