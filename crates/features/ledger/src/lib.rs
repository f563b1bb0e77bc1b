//! # Storage Ledger
//!
//! The transactional core of a deduplicating personal storage service. It records who
//! owns which files and ties them to shared, content-addressed blobs.
//!
//! ## Components
//! - [`ContentPoolManager`]: one blob per distinct content hash, with link counts.
//! - [`NamespaceTreeManager`]: per-user folders and file entries.
//! - [`QuotaLedger`]: per-user volume accounting.
//! - [`Ledger`]: the upload coordinator. It hashes payloads, skips the transfer for known
//!   content, sends new content to the injected [`BlobStore`](ndisk_storage::BlobStore)
//!   (multipart above a threshold), and records blob, link, entry and quota in one
//!   transaction. Payloads are spooled to a temporary file while hashed, so memory stays
//!   bounded by the part size and concurrency.
//!
//! The managers never open transactions themselves: they take the caller's
//! [`Transaction`](ndisk_database::Transaction), so the coordinator composes several of
//! them atomically.
//!
//! ## Example
//!
//! ```rust
//! use ndisk_database::Database;
//! use ndisk_ledger::{Ledger, LedgerError, UploadRequest};
//! use ndisk_storage::FsBlobStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), LedgerError> {
//!     # let tmp = tempfile::tempdir().unwrap();
//!     let store = FsBlobStore::builder().root(tmp.path().join("blobs")).connect().await?;
//!     let db = Database::builder().path(tmp.path().join("ledger.db")).init().await?;
//!     let ledger = Ledger::builder(db, Arc::new(store)).build()?;
//!
//!     ledger.open_account("u-1", "u1@example.com", 1024).await?;
//!     let first = ledger.upload(UploadRequest::new("u-1", "a.txt"), &mut &b"hello"[..]).await?;
//!     let second = ledger.upload(UploadRequest::new("u-1", "b.txt"), &mut &b"hello"[..]).await?;
//!
//!     assert!(second.deduplicated);
//!     assert_eq!(ledger.blob(&first.blob_uuid).await?.link_count, 2);
//!     assert_eq!(ledger.usage("u-1").await?.now, 10);
//!     Ok(())
//! }
//! ```

mod audit;
mod error;
mod ledger;
mod pool;
mod quota;
mod tree;
mod upload;

pub use audit::{LinkAudit, LinkMismatch};
pub use error::{LedgerError, LedgerErrorExt};
pub use ledger::{Ledger, LedgerBuilder, LedgerInner};
pub use pool::ContentPoolManager;
pub use quota::{QuotaLedger, Usage};
pub use tree::NamespaceTreeManager;
pub use upload::{UploadPhase, UploadReceipt, UploadRequest};
