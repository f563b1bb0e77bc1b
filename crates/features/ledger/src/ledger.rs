//! The upload transaction coordinator and the ledger-level operations built on the
//! managers. Each operation runs in exactly one database transaction.

use crate::audit::{LinkAudit, LinkMismatch};
use crate::error::LedgerError;
use crate::pool::ContentPoolManager;
use crate::quota::{QuotaLedger, Usage};
use crate::tree::NamespaceTreeManager;
use crate::upload::{
    self, PhaseTracker, StoredObjectGuard, TransferPlan, UploadPhase, UploadReceipt, UploadRequest,
};
use ndisk_database::{Database, Reader, Transaction};
use ndisk_domain::config::UploadConfig;
use ndisk_domain::constants::ROOT_PARENT;
use ndisk_domain::{Blob, EntryId, NamespaceEntry, NewEntry, User};
use ndisk_kernel::{hash, ids};
use ndisk_logger::AUDIT_TARGET;
use ndisk_storage::BlobStore;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{debug, info, instrument, warn};

#[derive(Debug)]
pub struct LedgerInner {
    db: Database,
    store: Arc<dyn BlobStore>,
    plan: TransferPlan,
    spool_dir: Option<PathBuf>,
    pool: ContentPoolManager,
    tree: NamespaceTreeManager,
    quota: QuotaLedger,
}

/// The deduplicating storage ledger.
///
/// Ties the content pool, the namespace tree and the quota ledger to a [`BlobStore`]
/// injected at construction. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Ledger {
    inner: Arc<LedgerInner>,
}

impl Deref for Ledger {
    type Target = LedgerInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Builder of a [`Ledger`].
#[must_use = "builders do nothing unless you call .build()"]
#[derive(Debug)]
pub struct LedgerBuilder {
    db: Database,
    store: Arc<dyn BlobStore>,
    upload: UploadConfig,
}

impl LedgerBuilder {
    pub fn upload(mut self, upload: UploadConfig) -> Self {
        self.upload = upload;
        self
    }

    /// # Errors
    /// [`LedgerError::InvalidArgument`] for a zero part size or part concurrency.
    pub fn build(self) -> Result<Ledger, LedgerError> {
        let UploadConfig { multipart_threshold, part_size, part_concurrency, spool_dir } = self.upload;
        if part_size == 0 || part_concurrency == 0 {
            return Err(LedgerError::invalid("part size and part concurrency must be positive"));
        }

        let pool = ContentPoolManager;
        info!(multipart_threshold, part_size, part_concurrency, spool_dir = ?spool_dir, "Ledger ready");
        Ok(Ledger {
            inner: Arc::new(LedgerInner {
                db: self.db,
                store: self.store,
                plan: TransferPlan { multipart_threshold, part_size, part_concurrency },
                spool_dir,
                pool,
                tree: NamespaceTreeManager::new(pool),
                quota: QuotaLedger,
            }),
        })
    }
}

impl Ledger {
    pub fn builder(db: Database, store: Arc<dyn BlobStore>) -> LedgerBuilder {
        LedgerBuilder { db, store, upload: UploadConfig::default() }
    }

    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Opens a storage account.
    ///
    /// # Errors
    /// [`LedgerError::Conflict`] if the account exists or the email is already registered.
    pub async fn open_account(&self, user_id: &str, email: &str, total_volume: u64) -> Result<User, LedgerError> {
        let mut tx = self.db.begin().await?;
        let outcome = self.quota.open_account(&mut tx, user_id, email, total_volume).await;
        settle(tx, outcome, "open_account").await
    }

    /// The account registered under `email`.
    ///
    /// # Errors
    /// [`LedgerError::NotFound`] when no account uses the email.
    pub async fn user_by_email(&self, email: &str) -> Result<User, LedgerError> {
        self.quota.find_by_email(&self.db, email).await
    }

    /// Stores a payload and records it in the ledger.
    ///
    /// The payload is hashed while read. Known content is bound without any transfer;
    /// new content is transferred first and recorded afterwards, its bytes deleted again
    /// if the ledger transaction fails.
    ///
    /// # Errors
    /// [`LedgerError::InvalidArgument`] for a declared hash that does not match the bytes,
    /// [`LedgerError::QuotaExceeded`], [`LedgerError::NameConflict`], [`LedgerError::NotFound`]
    /// for an unknown account or folder, and transfer or transaction failures.
    #[instrument(skip(self, request, reader), fields(owner = %request.owner, name = %request.name))]
    pub async fn upload<R>(&self, request: UploadRequest, reader: &mut R) -> Result<UploadReceipt, LedgerError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut phase = PhaseTracker::new();
        let outcome = self.run_upload(&request, reader, &mut phase).await;
        if outcome.is_err() {
            phase.abandon();
        }
        debug!(phase = %phase.phase(), "Upload finished");
        outcome
    }

    /// Binds already pooled content without receiving any bytes.
    ///
    /// # Errors
    /// [`LedgerError::NotFound`] when no blob holds `content_hash`,
    /// [`LedgerError::InvalidArgument`] for a malformed hash or a size that does not match.
    #[instrument(skip(self, request), fields(owner = %request.owner, name = %request.name))]
    pub async fn instant_upload(
        &self,
        request: UploadRequest,
        content_hash: &str,
        size: u64,
    ) -> Result<UploadReceipt, LedgerError> {
        if !hash::is_content_hash(content_hash) {
            return Err(LedgerError::invalid(format!("malformed content hash {content_hash:?}")));
        }
        let mut phase = PhaseTracker::new();
        let outcome = async {
            phase.advance(UploadPhase::HashComputed)?;
            let blob = self
                .db
                .blob_by_hash(content_hash)
                .await?
                .ok_or_else(|| LedgerError::not_found("content", content_hash))?;
            if blob.size != size {
                return Err(LedgerError::invalid(format!(
                    "content {content_hash} has {} bytes, not {size}",
                    blob.size
                )));
            }
            phase.advance(UploadPhase::DedupChecked)?;
            phase.advance(UploadPhase::SkipTransfer)?;
            let parent_id = self.parent_id(&self.db, &request.owner, request.parent.as_deref()).await?;
            self.commit_existing(&request, parent_id, &blob.uuid, &mut phase).await
        }
        .await;
        if outcome.is_err() {
            phase.abandon();
        }
        outcome
    }

    async fn run_upload<R>(
        &self,
        request: &UploadRequest,
        reader: &mut R,
        phase: &mut PhaseTracker,
    ) -> Result<UploadReceipt, LedgerError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let parent_id = self.parent_id(&self.db, &request.owner, request.parent.as_deref()).await?;
        let spool = upload::spool_payload(reader, self.spool_dir.as_deref(), self.plan.part_size).await?;
        phase.advance(UploadPhase::HashComputed)?;

        let digest = spool.digest.clone();
        if let Some(declared) = &request.declared_hash
            && !declared.eq_ignore_ascii_case(&digest.hash)
        {
            return Err(LedgerError::invalid(format!(
                "declared hash {declared} does not match received content {}",
                digest.hash
            )));
        }

        let existing = self.pool.lookup(&self.db, &digest.hash).await?;
        phase.advance(UploadPhase::DedupChecked)?;
        if let Some(blob_uuid) = existing {
            phase.advance(UploadPhase::SkipTransfer)?;
            return self.commit_existing(request, parent_id, &blob_uuid, phase).await;
        }

        // Fail before moving any bytes when the quota obviously cannot take them.
        let usage = self.quota.get_usage(&self.db, &request.owner).await?;
        if digest.size > usage.available() {
            return Err(LedgerError::QuotaExceeded {
                message: format!("user {} has {} bytes left, needs {}", request.owner, usage.available(), digest.size)
                    .into(),
                context: None,
            });
        }

        phase.advance(UploadPhase::Transferring)?;
        let storage_key = ids::storage_key(&digest.hash);
        upload::transfer(&self.store, self.plan, &storage_key, &spool).await?;
        drop(spool);
        let stored = StoredObjectGuard::new(Arc::clone(&self.store), &storage_key);

        phase.advance(UploadPhase::LedgerTxOpen)?;
        let outcome = match self.db.begin().await {
            Ok(mut tx) => {
                let outcome =
                    self.record_new(&mut tx, request, parent_id, &digest.hash, digest.size, &storage_key).await;
                settle(tx, outcome, "upload").await
            },
            Err(err) => Err(err.into()),
        };
        match outcome {
            Ok((entry, blob_uuid)) => {
                stored.disarm();
                phase.advance(UploadPhase::Committed)?;
                Ok(UploadReceipt { entry, blob_uuid, content_hash: digest.hash, size: digest.size, deduplicated: false })
            },
            Err(LedgerError::DuplicateConflict { .. }) => {
                phase.advance(UploadPhase::RolledBack)?;
                stored.delete("lost dedup race").await;
                let blob_uuid = self
                    .pool
                    .lookup(&self.db, &digest.hash)
                    .await?
                    .ok_or_else(|| LedgerError::invariant("pooled content vanished after a duplicate conflict"))?;
                self.commit_existing(request, parent_id, &blob_uuid, phase).await
            },
            Err(err) => {
                stored.delete("ledger transaction failed").await;
                Err(err)
            },
        }
    }

    /// Reserve quota, create the blob, bind it, create the entry.
    async fn record_new(
        &self,
        tx: &mut Transaction,
        request: &UploadRequest,
        parent_id: EntryId,
        content_hash: &str,
        size: u64,
        storage_key: &str,
    ) -> Result<(NamespaceEntry, String), LedgerError> {
        self.quota.reserve_delta(tx, &request.owner, signed(size)?).await?;
        tx.lock_directory(&request.owner, parent_id);
        let blob_uuid = self.pool.create_blob(tx, content_hash, size, storage_key).await?;
        self.pool.adjust_link(tx, &blob_uuid, 1).await?;
        let entry = self.tree.create_entry(tx, new_file(request, parent_id, &blob_uuid)).await?;
        Ok((entry, blob_uuid))
    }

    /// The dedup hit path: reserve quota, bind the pooled blob, create the entry.
    async fn commit_existing(
        &self,
        request: &UploadRequest,
        parent_id: EntryId,
        blob_uuid: &str,
        phase: &mut PhaseTracker,
    ) -> Result<UploadReceipt, LedgerError> {
        phase.advance(UploadPhase::LedgerTxOpen)?;
        let mut tx = self.db.begin().await?;
        let outcome = async {
            let blob = self.pool.get_blob(&tx, blob_uuid).await?;
            self.quota.reserve_delta(&mut tx, &request.owner, signed(blob.size)?).await?;
            tx.lock_directory(&request.owner, parent_id);
            self.pool.adjust_link(&mut tx, blob_uuid, 1).await?;
            let entry = self.tree.create_entry(&mut tx, new_file(request, parent_id, blob_uuid)).await?;
            Ok::<_, LedgerError>((entry, blob))
        }
        .await;

        let (entry, blob) = settle(tx, outcome, "upload_dedup").await?;
        phase.advance(UploadPhase::Committed)?;
        Ok(UploadReceipt {
            entry,
            blob_uuid: blob.uuid,
            content_hash: blob.content_hash,
            size: blob.size,
            deduplicated: true,
        })
    }

    /// Creates a folder below the root or one of the owner's folders.
    pub async fn create_folder(
        &self,
        owner: &str,
        parent: Option<&str>,
        name: &str,
    ) -> Result<NamespaceEntry, LedgerError> {
        self.quota.get_usage(&self.db, owner).await?;
        let parent_id = self.parent_id(&self.db, owner, parent).await?;
        let mut tx = self.db.begin().await?;
        let outcome = self.tree.create_folder(&mut tx, owner, parent_id, name).await;
        settle(tx, outcome, "create_folder").await
    }

    pub async fn rename(
        &self,
        owner: &str,
        uuid: &str,
        name: &str,
        extension: &str,
    ) -> Result<NamespaceEntry, LedgerError> {
        self.owned_entry(&self.db, owner, uuid).await?;
        let mut tx = self.db.begin().await?;
        let outcome = self.tree.rename(&mut tx, uuid, name, extension).await;
        settle(tx, outcome, "rename").await
    }

    /// Moves several entries of `owner` into one folder (or the root), all or nothing.
    ///
    /// # Errors
    /// [`LedgerError::NotFound`] naming the uuids that do not resolve to entries of `owner`.
    pub async fn move_entries<S: AsRef<str> + Sync>(
        &self,
        owner: &str,
        uuids: &[S],
        dest_parent: Option<&str>,
    ) -> Result<Vec<NamespaceEntry>, LedgerError> {
        let ids = self.tree.resolve_ids_by_uuid(&self.db, uuids).await?;
        let mut targets = Vec::with_capacity(uuids.len());
        let mut missing = Vec::new();
        for uuid in uuids {
            let uuid = uuid.as_ref();
            let owned = match ids.get(uuid) {
                Some(id) => self.db.entry(*id).await?.filter(|e| e.owner_uuid == owner),
                None => None,
            };
            match owned {
                Some(entry) => targets.push(entry.id),
                None => missing.push(uuid.to_owned()),
            }
        }
        if !missing.is_empty() {
            return Err(LedgerError::not_found("entries", &missing.join(", ")));
        }
        let dest_id = self.parent_id(&self.db, owner, dest_parent).await?;

        let mut tx = self.db.begin().await?;
        let outcome = async {
            tx.lock_namespace(owner);
            let mut moved = Vec::with_capacity(targets.len());
            for id in targets {
                moved.push(self.tree.move_entry(&mut tx, id, dest_id).await?);
            }
            Ok::<_, LedgerError>(moved)
        }
        .await;
        settle(tx, outcome, "move_entries").await
    }

    /// Copies a file entry of `owner`, charging its size to the owner's quota.
    pub async fn copy_entry(
        &self,
        owner: &str,
        uuid: &str,
        dest_parent: Option<&str>,
    ) -> Result<NamespaceEntry, LedgerError> {
        let source = self.owned_entry(&self.db, owner, uuid).await?;
        let Some(blob_uuid) = &source.blob_uuid else {
            return Err(LedgerError::invalid(format!("folder {uuid} cannot be copied")));
        };
        let size = self.pool.get_blob(&self.db, blob_uuid).await?.size;
        let dest_id = self.parent_id(&self.db, owner, dest_parent).await?;

        let mut tx = self.db.begin().await?;
        let outcome = async {
            self.quota.reserve_delta(&mut tx, owner, signed(size)?).await?;
            let id = self.tree.copy(&mut tx, uuid, dest_id).await?;
            tx.entry(id).await?.ok_or_else(|| LedgerError::invariant("copied entry is not readable"))
        }
        .await;
        settle(tx, outcome, "copy_entry").await
    }

    /// Deletes an entry of `owner` and releases the volume of its blob.
    pub async fn remove_entry(&self, owner: &str, uuid: &str) -> Result<NamespaceEntry, LedgerError> {
        self.owned_entry(&self.db, owner, uuid).await?;
        let mut tx = self.db.begin().await?;
        let outcome = async {
            tx.lock_user(owner).await?;
            let removed = self.tree.delete(&mut tx, uuid).await?;
            if let Some(blob_uuid) = &removed.blob_uuid {
                let size = self.pool.get_blob(&tx, blob_uuid).await?.size;
                self.quota.reserve_delta(&mut tx, owner, -signed(size)?).await?;
            }
            Ok::<_, LedgerError>(removed)
        }
        .await;
        settle(tx, outcome, "remove_entry").await
    }

    pub async fn entry(&self, owner: &str, uuid: &str) -> Result<NamespaceEntry, LedgerError> {
        self.owned_entry(&self.db, owner, uuid).await
    }

    /// Children of a folder of `owner`, or of the root.
    pub async fn children(&self, owner: &str, parent: Option<&str>) -> Result<Vec<NamespaceEntry>, LedgerError> {
        let parent_id = self.parent_id(&self.db, owner, parent).await?;
        self.tree.list_children(&self.db, owner, parent_id).await
    }

    pub async fn usage(&self, owner: &str) -> Result<Usage, LedgerError> {
        self.quota.get_usage(&self.db, owner).await
    }

    pub async fn blob(&self, blob_uuid: &str) -> Result<Blob, LedgerError> {
        self.pool.get_blob(&self.db, blob_uuid).await
    }

    /// Entries of `owner` stored under `storage_key`.
    pub async fn entries_by_storage_key(
        &self,
        owner: &str,
        storage_key: &str,
    ) -> Result<Vec<NamespaceEntry>, LedgerError> {
        self.tree.find_by_storage_key(&self.db, owner, storage_key).await
    }

    /// Compares every blob's link count with the entries referencing it.
    pub async fn audit_links(&self) -> Result<LinkAudit, LedgerError> {
        let live = self.tree.live_links(&self.db).await?;
        let blobs = self.db.blobs().await?;
        let mut audit = LinkAudit { checked: blobs.len(), ..LinkAudit::default() };

        for blob in blobs {
            let references = live.get(&blob.uuid).copied().unwrap_or(0);
            if references != blob.link_count {
                warn!(blob = %blob.uuid, recorded = blob.link_count, live = references, "Link count mismatch");
                audit.mismatches.push(LinkMismatch {
                    blob_uuid: blob.uuid.clone(),
                    recorded: blob.link_count,
                    live: references,
                });
            }
            if references == 0 {
                audit.orphans.push(blob.uuid);
            }
        }
        Ok(audit)
    }

    /// Blobs without references, for an external sweep.
    pub async fn orphans(&self) -> Result<Vec<Blob>, LedgerError> {
        self.pool.orphans(&self.db).await
    }

    async fn owned_entry(
        &self,
        reader: &impl Reader,
        owner: &str,
        uuid: &str,
    ) -> Result<NamespaceEntry, LedgerError> {
        let entry = self.tree.get_entry(reader, uuid).await?;
        if entry.owner_uuid != owner {
            return Err(LedgerError::not_found("entry", uuid));
        }
        Ok(entry)
    }

    async fn parent_id(
        &self,
        reader: &impl Reader,
        owner: &str,
        parent: Option<&str>,
    ) -> Result<EntryId, LedgerError> {
        let Some(uuid) = parent else {
            return Ok(ROOT_PARENT);
        };
        let folder = self.owned_entry(reader, owner, uuid).await?;
        if !folder.is_folder() {
            return Err(LedgerError::invalid(format!("entry {uuid} is not a folder")));
        }
        Ok(folder.id)
    }
}

/// Commits on success, rolls back on failure, and records the outcome in the audit trail.
async fn settle<T>(
    tx: Transaction,
    outcome: Result<T, LedgerError>,
    operation: &'static str,
) -> Result<T, LedgerError> {
    let tx_id = tx.id();
    match outcome {
        Ok(value) => {
            let summary = tx.commit().await?;
            info!(
                target: AUDIT_TARGET,
                operation,
                tx = tx_id,
                users = summary.users,
                blobs = summary.blobs,
                entries = summary.entries,
                "Ledger transaction committed"
            );
            Ok(value)
        },
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(tx = tx_id, error = %rollback, "Rollback failed, the connection discards the transaction");
            }
            info!(target: AUDIT_TARGET, operation, tx = tx_id, error = %err, "Ledger transaction rolled back");
            Err(err)
        },
    }
}

fn new_file(request: &UploadRequest, parent_id: EntryId, blob_uuid: &str) -> NewEntry {
    NewEntry {
        uuid: ids::entry_id(&request.owner, &request.name),
        parent_id,
        name: request.name.clone(),
        extension: request.extension.clone(),
        owner_uuid: request.owner.clone(),
        blob_uuid: Some(blob_uuid.to_owned()),
    }
}

fn signed(size: u64) -> Result<i64, LedgerError> {
    i64::try_from(size).map_err(|_| LedgerError::invalid(format!("size {size} is out of range")))
}
