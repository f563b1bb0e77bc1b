//! Blob storage for the ledger.
//!
//! The crate defines the [`BlobStore`] contract the ledger talks to, and [`FsBlobStore`],
//! a sandboxed filesystem implementation used for local deployments and tests.
//!
//! # Core Features
//!
//! - **Injected Contract**: [`BlobStore`] is object safe; consumers hold an
//!   `Arc<dyn BlobStore>` passed in at construction, never a global client.
//! - **Multipart Uploads**: parts may be uploaded concurrently and out of order;
//!   completion assembles them by position and verifies each part's SHA-256 tag.
//! - **Sandbox Security**: keys and upload ids are validated and resolved below the
//!   canonical root, symlinked escapes included.
//! - **Atomic Writes**: unique temp file, `fsync`, rename.
//! - **Transparent Compression**: optional LZ4 block compression.
//! - **Self-Healing**: stale temp files and abandoned staging directories are purged
//!   on connect.
//!
//! # Examples
//!
//! ```rust
//! use ndisk_storage::{BlobStore, Compression, FsBlobStore, MultipartOptions, StorageError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), StorageError> {
//!     # let tmp = tempfile::tempdir().unwrap();
//!     let store = FsBlobStore::builder()
//!         .root(tmp.path().join("blobs"))
//!         .compression(Compression::Lz4)
//!         .connect()
//!         .await?;
//!
//!     let key = "3f7a1c0e9b2d4a6f8e0c1b2a3d4e5f60";
//!     let upload = store.init_multipart(key, &MultipartOptions::default()).await?;
//!     let second = store.upload_part(2, b"world".to_vec(), key, &upload).await?;
//!     let first = store.upload_part(1, b"hello ".to_vec(), key, &upload).await?;
//!     store.complete_multipart(key, &upload, vec![second, first]).await?;
//!
//!     assert_eq!(store.read(key).await?, b"hello world");
//!     Ok(())
//! }
//! ```

mod builder;
mod contract;
mod engine;
mod error;
mod maintenance;
mod multipart;
mod security;

pub use builder::FsBlobStoreBuilder;
pub use contract::{
    BlobStore, MAX_PART_POSITION, MultipartOptions, PartDescriptor, UploadId, order_parts,
};
pub use engine::{Compression, FsBlobStore};
pub use error::{StorageError, StorageErrorExt};
pub use maintenance::PurgeReport;
