//! Content pool: one blob row per distinct content hash, shared through link counts.

use crate::error::LedgerError;
use ndisk_database::{Reader, Transaction};
use ndisk_domain::Blob;
use ndisk_kernel::ids;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, Default)]
pub struct ContentPoolManager;

impl ContentPoolManager {
    /// Uuid of the blob holding `hash`, if any. Pure read.
    pub async fn lookup(&self, reader: &impl Reader, hash: &str) -> Result<Option<String>, LedgerError> {
        Ok(reader.blob_by_hash(hash).await?.map(|blob| blob.uuid))
    }

    /// Creates the blob of a newly stored content with `link_count = 0`.
    ///
    /// Runs under the content hash lock, so a concurrent first upload of the same content
    /// is seen once it commits.
    ///
    /// # Errors
    /// [`LedgerError::DuplicateConflict`] when the hash is already stored.
    #[instrument(skip(self, tx), fields(tx = tx.id()))]
    pub async fn create_blob(
        &self,
        tx: &mut Transaction,
        hash: &str,
        size: u64,
        storage_key: &str,
    ) -> Result<String, LedgerError> {
        if let Some(existing) = tx.lock_content_hash(hash).await? {
            return Err(LedgerError::DuplicateConflict {
                message: format!("content {hash} is stored as blob {}", existing.uuid).into(),
                context: None,
            });
        }

        let uuid = ids::blob_id(hash);
        tx.insert_blob(Blob {
            uuid: uuid.clone(),
            content_hash: hash.to_owned(),
            size,
            storage_key: storage_key.to_owned(),
            link_count: 0,
        })
        .await?;
        debug!(blob = %uuid, "Blob created");
        Ok(uuid)
    }

    /// Applies `delta` to the link count under the blob row lock and returns the new count.
    ///
    /// # Errors
    /// [`LedgerError::NotFound`] for an unknown blob, [`LedgerError::InvariantViolation`]
    /// when the count would become negative.
    #[instrument(skip(self, tx), fields(tx = tx.id()))]
    pub async fn adjust_link(
        &self,
        tx: &mut Transaction,
        blob_uuid: &str,
        delta: i64,
    ) -> Result<u64, LedgerError> {
        let mut blob = tx
            .lock_blob(blob_uuid)
            .await?
            .ok_or_else(|| LedgerError::not_found("blob", blob_uuid))?;

        let count = blob.link_count.checked_add_signed(delta).ok_or_else(|| {
            LedgerError::invariant(format!(
                "link count of blob {blob_uuid} cannot move from {} by {delta}",
                blob.link_count
            ))
        })?;
        blob.link_count = count;
        tx.update_blob(blob).await?;
        debug!(link_count = count, "Link count adjusted");
        Ok(count)
    }

    pub async fn get_blob(&self, reader: &impl Reader, blob_uuid: &str) -> Result<Blob, LedgerError> {
        reader.blob(blob_uuid).await?.ok_or_else(|| LedgerError::not_found("blob", blob_uuid))
    }

    /// Blobs no entry references any more. Nothing here deletes them.
    pub async fn orphans(&self, reader: &impl Reader) -> Result<Vec<Blob>, LedgerError> {
        Ok(reader.blobs().await?.into_iter().filter(Blob::is_orphan).collect())
    }
}
