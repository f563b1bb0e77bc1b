//! Filesystem implementation of the [`BlobStore`] contract.
//!
//! Objects live below a canonical root; every path is produced by the sandbox, so keys
//! and upload ids can never address anything outside it. All writes use an atomic swap
//! (unique temp file, `fsync`, rename) and therefore never leave a torn object behind.

use crate::builder::FsBlobStoreBuilder;
use crate::contract::{BlobStore, MultipartOptions, PartDescriptor, UploadId};
use crate::error::{StorageError, StorageErrorExt};
use crate::maintenance::{self, PurgeReport, TMP_MARKER};
use crate::multipart;
use crate::security::Sandbox;
use async_trait::async_trait;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum Compression {
    #[default]
    None,
    Lz4,
}

impl Compression {
    pub(crate) fn compress(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::None => data.to_vec(),
            Self::Lz4 => lz4_flex::compress_prepend_size(data),
        }
    }

    pub(crate) fn decompress(self, data: Vec<u8>) -> Result<Vec<u8>, StorageError> {
        match self {
            Self::None => Ok(data),
            Self::Lz4 => lz4_flex::decompress_size_prepended(&data).context("Lz4 decompression failed"),
        }
    }
}

#[derive(Debug)]
pub struct FsBlobStoreInner {
    pub(crate) sandbox: Sandbox,
    pub(crate) compression: Compression,
    pub(crate) tmp_counter: AtomicU64,
}

/// A sandboxed, filesystem-backed blob store.
///
/// The handle is reference-counted and cheap to clone; share it as `Arc<dyn BlobStore>`.
///
/// # Example
///
/// ```rust
/// use ndisk_storage::{BlobStore, FsBlobStore, StorageError};
///
/// #[tokio::main]
/// async fn main() -> Result<(), StorageError> {
///     # let tmp = tempfile::tempdir().unwrap();
///     let store = FsBlobStore::builder().root(tmp.path().join("blobs")).connect().await?;
///
///     store.put("6f1ed002ab5595859014ebf0951522d9", b"hello").await?;
///     assert_eq!(store.read("6f1ed002ab5595859014ebf0951522d9").await?, b"hello");
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    pub(crate) inner: Arc<FsBlobStoreInner>,
}

impl Deref for FsBlobStore {
    type Target = FsBlobStoreInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl FsBlobStore {
    #[must_use = "The blob store is not opened until you call .connect()"]
    pub fn builder() -> FsBlobStoreBuilder {
        FsBlobStoreBuilder::new()
    }

    /// Physical location of an object, after key validation and sharding.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidKey`] or [`StorageError::PathTraversalAttempt`] for
    /// keys that cannot be stored.
    pub fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        self.sandbox.object_path(key)
    }

    /// Removes stale temp files and abandoned multipart staging directories.
    pub async fn purge(&self) -> PurgeReport {
        maintenance::purge(self.sandbox.root()).await
    }

    /// Reads a file, `None` when it does not exist.
    pub(crate) async fn read_file(&self, path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(path).await {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::Io {
                source: err,
                context: Some(format!("Read failed: {}", path.display()).into()),
            }),
        }
    }

    /// Atomic swap write. With `create_parents` unset a missing parent is reported as
    /// `NotFound` I/O error instead of being recreated.
    pub(crate) async fn write_file(
        &self,
        path: &Path,
        data: &[u8],
        create_parents: bool,
    ) -> Result<(), StorageError> {
        if create_parents && let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .context(format!("Failed to create shards for {}", path.display()))?;
        }

        let temp = unique_tmp_path(path, &self.tmp_counter);
        let written = async {
            let mut file =
                fs::OpenOptions::new().create_new(true).write(true).open(&temp).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            fs::rename(&temp, path).await
        }
        .await;

        if let Err(err) = written {
            let _ = fs::remove_file(&temp).await;
            return Err(StorageError::Io {
                source: err,
                context: Some(format!("Atomic write failed: {}", path.display()).into()),
            });
        }

        if let Some(parent) = path.parent() {
            sync_dir(parent).await;
        }
        Ok(())
    }

    /// Removes a file, `false` when it did not exist.
    pub(crate) async fn remove_file(&self, path: &Path) -> Result<bool, StorageError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StorageError::Io {
                source: err,
                context: Some(format!("Failed to delete: {}", path.display()).into()),
            }),
        }
    }

    pub(crate) async fn write_object(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.sandbox.object_path(key)?;
        let encoded = self.compression.compress(data);
        self.write_file(&path, &encoded, true).await?;
        debug!(key, size = data.len(), "Object stored");
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.write_object(key, data).await
    }

    #[instrument(skip(self, reader))]
    async fn put_stream(
        &self,
        key: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, StorageError> {
        // Validate before draining the reader.
        self.sandbox.object_path(key)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await.context("Reading upload stream")?;
        self.write_object(key, &data).await?;
        Ok(data.len() as u64)
    }

    #[instrument(skip(self))]
    async fn copy(&self, src: &str, dst: &str) -> Result<(), StorageError> {
        let src_path = self.sandbox.object_path(src)?;
        let dst_path = self.sandbox.object_path(dst)?;
        // Stored bytes are copied as-is, both sides share one compression mode.
        let data =
            self.read_file(&src_path).await?.ok_or_else(|| StorageError::object_not_found(src))?;
        self.write_file(&dst_path, &data, true).await
    }

    #[instrument(skip(self, options))]
    async fn init_multipart(
        &self,
        key: &str,
        options: &MultipartOptions,
    ) -> Result<UploadId, StorageError> {
        multipart::init(self, key, options).await
    }

    #[instrument(skip(self, data), fields(size = data.len(), upload_id = %upload_id))]
    async fn upload_part(
        &self,
        position: u32,
        data: Vec<u8>,
        key: &str,
        upload_id: &UploadId,
    ) -> Result<PartDescriptor, StorageError> {
        multipart::upload_part(self, position, &data, key, upload_id).await
    }

    #[instrument(skip(self, parts), fields(parts = parts.len(), upload_id = %upload_id))]
    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &UploadId,
        parts: Vec<PartDescriptor>,
    ) -> Result<(), StorageError> {
        multipart::complete(self, key, upload_id, parts).await
    }

    #[instrument(skip(self), fields(upload_id = %upload_id))]
    async fn abort_multipart(&self, key: &str, upload_id: &UploadId) -> Result<(), StorageError> {
        multipart::abort(self, key, upload_id).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.sandbox.object_path(key)?;
        if self.remove_file(&path).await? {
            debug!(key, "Object deleted");
            Ok(())
        } else {
            Err(StorageError::object_not_found(key))
        }
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.sandbox.object_path(key)?;
        let data = self.read_file(&path).await?.ok_or_else(|| StorageError::object_not_found(key))?;
        self.compression.decompress(data)
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.sandbox.object_path(key)?;
        fs::try_exists(&path).await.context(format!("Failed to check {key}"))
    }
}

fn unique_tmp_path(target: &Path, counter: &AtomicU64) -> PathBuf {
    let counter = counter.fetch_add(1, Ordering::Relaxed);
    let file_name = target.file_name().and_then(|s| s.to_str()).unwrap_or("object");
    target.with_file_name(format!("{file_name}{TMP_MARKER}{counter}"))
}

async fn sync_dir(path: &Path) {
    match fs::File::open(path).await {
        Ok(dir) => {
            if let Err(err) = dir.sync_all().await {
                warn!(path = %path.display(), error = %err, "Directory sync failed");
            }
        },
        Err(err) => warn!(path = %path.display(), error = %err, "Directory open failed"),
    }
}
