//! The blob store contract consumed by the ledger.
//!
//! A blob store holds opaque objects addressed by a storage key. Large objects are sent
//! with the multipart sub-protocol: `init_multipart`, any number of concurrent
//! `upload_part` calls (which may finish in any order), then a single
//! `complete_multipart` that assembles parts by ascending position, or
//! `abort_multipart` to discard everything staged so far.

use crate::error::StorageError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::io::AsyncRead;

/// Largest part position accepted by a multipart upload.
pub const MAX_PART_POSITION: u32 = 10_000;

/// Server-issued handle of an in-flight multipart upload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(String);

impl UploadId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Acknowledgement of one uploaded part. Positions start at 1.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartDescriptor {
    pub position: u32,
    /// Hex SHA-256 of the part bytes.
    pub tag: String,
}

/// Options fixed when a multipart upload starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipartOptions {
    pub content_type: Option<String>,
    /// When set, `complete_multipart` requires exactly this many parts.
    pub expected_parts: Option<u32>,
}

/// Remote object storage as seen by the ledger.
///
/// Implementations are shared behind `Arc<dyn BlobStore>` and must tolerate
/// concurrent calls, including concurrent `upload_part` calls of one upload.
#[async_trait]
pub trait BlobStore: Send + Sync + fmt::Debug {
    /// Stores `data` under `key`, replacing any previous object.
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Stores everything `reader` yields under `key` and returns the byte count.
    async fn put_stream(
        &self,
        key: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, StorageError>;

    /// Server-side copy of an object.
    async fn copy(&self, src: &str, dst: &str) -> Result<(), StorageError>;

    async fn init_multipart(
        &self,
        key: &str,
        options: &MultipartOptions,
    ) -> Result<UploadId, StorageError>;

    /// Uploads one part. Re-sending a position replaces the earlier bytes.
    async fn upload_part(
        &self,
        position: u32,
        data: Vec<u8>,
        key: &str,
        upload_id: &UploadId,
    ) -> Result<PartDescriptor, StorageError>;

    /// Assembles the listed parts in ascending position order. Fails when a position in
    /// `1..=n` is missing or duplicated, or a tag does not match the stored part.
    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &UploadId,
        parts: Vec<PartDescriptor>,
    ) -> Result<(), StorageError>;

    async fn abort_multipart(&self, key: &str, upload_id: &UploadId) -> Result<(), StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    async fn exists(&self, key: &str) -> Result<bool, StorageError>;
}

/// Sorts `parts` by position and checks they form `1..=n` without gaps or duplicates.
///
/// # Errors
/// Returns [`StorageError::InvalidPart`] naming the first missing or duplicated position.
pub fn order_parts(
    mut parts: Vec<PartDescriptor>,
    expected: Option<u32>,
) -> Result<Vec<PartDescriptor>, StorageError> {
    if parts.is_empty() {
        return Err(StorageError::invalid_part("no parts to complete"));
    }
    parts.sort_by_key(|p| p.position);

    for (index, part) in parts.iter().enumerate() {
        let wanted = u32::try_from(index + 1).map_err(|_| StorageError::invalid_part("too many parts"))?;
        if part.position < wanted {
            return Err(StorageError::invalid_part(format!("duplicate position {}", part.position)));
        }
        if part.position > wanted {
            return Err(StorageError::invalid_part(format!("missing position {wanted}")));
        }
    }

    if let Some(expected) = expected {
        let last = parts.last().map_or(0, |p| p.position);
        if last < expected {
            return Err(StorageError::invalid_part(format!("missing position {}", last + 1)));
        }
        if last > expected {
            return Err(StorageError::invalid_part(format!(
                "{last} parts listed, {expected} expected"
            )));
        }
    }

    Ok(parts)
}
