//! Upload requests, the per-upload state machine, payload spooling and the byte transfer
//! to the blob store.

use crate::error::{LedgerError, LedgerErrorExt};
use ndisk_domain::NamespaceEntry;
use ndisk_kernel::hash::{ContentDigest, ContentHasher};
use ndisk_logger::AUDIT_TARGET;
use ndisk_storage::{BlobStore, MultipartOptions, PartDescriptor, UploadId};
use std::fmt;
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

const SPOOL_PREFIX: &str = "ndisk-upload-";

/// Where and under which name an upload lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub owner: String,
    /// Uuid of the destination folder; `None` for the root.
    pub parent: Option<String>,
    pub name: String,
    pub extension: String,
    /// Hash announced by the client, verified against the received bytes.
    pub declared_hash: Option<String>,
}

impl UploadRequest {
    /// Splits `file_name` at its last dot into name and extension.
    ///
    /// ```rust
    /// use ndisk_ledger::UploadRequest;
    ///
    /// let request = UploadRequest::new("u-1", "archive.tar.gz");
    /// assert_eq!((request.name.as_str(), request.extension.as_str()), ("archive.tar", "gz"));
    /// assert_eq!(UploadRequest::new("u-1", ".profile").name, ".profile");
    /// ```
    pub fn new(owner: impl Into<String>, file_name: &str) -> Self {
        let (name, extension) = match file_name.rsplit_once('.') {
            Some((name, extension)) if !name.is_empty() => (name, extension),
            _ => (file_name, ""),
        };
        Self {
            owner: owner.into(),
            parent: None,
            name: name.to_owned(),
            extension: extension.to_owned(),
            declared_hash: None,
        }
    }

    #[must_use]
    pub fn in_folder(mut self, folder_uuid: impl Into<String>) -> Self {
        self.parent = Some(folder_uuid.into());
        self
    }

    #[must_use]
    pub fn declared_hash(mut self, hash: impl Into<String>) -> Self {
        self.declared_hash = Some(hash.into());
        self
    }
}

/// Outcome of a committed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub entry: NamespaceEntry,
    pub blob_uuid: String,
    pub content_hash: String,
    pub size: u64,
    /// The content was already pooled and no bytes were transferred.
    pub deduplicated: bool,
}

/// Steps of one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    Start,
    HashComputed,
    DedupChecked,
    Transferring,
    SkipTransfer,
    LedgerTxOpen,
    Committed,
    RolledBack,
}

impl UploadPhase {
    /// Whether `next` may follow `self`. A rolled back ledger transaction may be opened
    /// once more for the lost-race retry.
    #[must_use]
    pub const fn can_advance(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Start, Self::HashComputed)
                | (Self::HashComputed, Self::DedupChecked)
                | (Self::DedupChecked, Self::Transferring | Self::SkipTransfer)
                | (Self::Transferring | Self::SkipTransfer, Self::LedgerTxOpen)
                | (Self::LedgerTxOpen, Self::Committed)
                | (Self::RolledBack, Self::LedgerTxOpen)
        ) || (matches!(next, Self::RolledBack) && !self.is_terminal())
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::HashComputed => "hash_computed",
            Self::DedupChecked => "dedup_checked",
            Self::Transferring => "transferring",
            Self::SkipTransfer => "skip_transfer",
            Self::LedgerTxOpen => "ledger_tx_open",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        };
        f.write_str(name)
    }
}

/// Current phase of one upload, with every transition traced.
#[derive(Debug)]
pub(crate) struct PhaseTracker {
    phase: UploadPhase,
}

impl PhaseTracker {
    pub(crate) const fn new() -> Self {
        Self { phase: UploadPhase::Start }
    }

    pub(crate) const fn phase(&self) -> UploadPhase {
        self.phase
    }

    pub(crate) fn advance(&mut self, next: UploadPhase) -> Result<(), LedgerError> {
        if !self.phase.can_advance(next) {
            return Err(LedgerError::Internal {
                message: format!("upload cannot go from {} to {next}", self.phase).into(),
                context: None,
            });
        }
        debug!(from = %self.phase, to = %next, "Upload phase");
        self.phase = next;
        Ok(())
    }

    /// Marks the upload as rolled back unless it already ended.
    pub(crate) fn abandon(&mut self) {
        if !self.phase.is_terminal() {
            debug!(from = %self.phase, to = %UploadPhase::RolledBack, "Upload phase");
            self.phase = UploadPhase::RolledBack;
        }
    }
}

/// A payload spooled to a temporary file while hashed. The file is removed on drop.
#[derive(Debug)]
pub(crate) struct Spool {
    file: NamedTempFile,
    pub(crate) digest: ContentDigest,
}

impl Spool {
    pub(crate) fn path(&self) -> &Path {
        self.file.path()
    }

    pub(crate) const fn size(&self) -> u64 {
        self.digest.size
    }

    async fn open(&self) -> Result<File, LedgerError> {
        File::open(self.path()).await.context("Opening upload spool")
    }
}

/// Drains `reader` in `chunk_size` reads into a spool file under `dir` (the system
/// temporary directory when `None`), hashing on the way.
pub(crate) async fn spool_payload<R>(
    reader: &mut R,
    dir: Option<&Path>,
    chunk_size: usize,
) -> Result<Spool, LedgerError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut builder = tempfile::Builder::new();
    builder.prefix(SPOOL_PREFIX);
    let file = match dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir).await.context("Creating spool directory")?;
            builder.tempfile_in(dir)
        },
        None => builder.tempfile(),
    }
    .context("Creating upload spool")?;
    let mut out = File::from_std(file.reopen().context("Opening upload spool")?);

    let mut hasher = ContentHasher::new();
    let mut chunk = vec![0u8; chunk_size.max(1)];
    loop {
        let read = reader.read(&mut chunk).await.context("Reading upload payload")?;
        if read == 0 {
            break;
        }
        hasher.update(&chunk[..read]);
        out.write_all(&chunk[..read]).await.context("Writing upload spool")?;
    }
    out.flush().await.context("Writing upload spool")?;

    let digest = hasher.finalize();
    trace!(path = %file.path().display(), size = digest.size, "Payload spooled");
    Ok(Spool { file, digest })
}

/// Aborts a multipart upload unless disarmed after a successful completion.
#[derive(Debug)]
pub(crate) struct MultipartGuard {
    store: Arc<dyn BlobStore>,
    key: String,
    upload_id: Option<UploadId>,
}

impl MultipartGuard {
    pub(crate) fn new(store: Arc<dyn BlobStore>, key: &str, upload_id: UploadId) -> Self {
        Self { store, key: key.to_owned(), upload_id: Some(upload_id) }
    }

    pub(crate) fn disarm(mut self) {
        self.upload_id = None;
    }
}

impl Drop for MultipartGuard {
    fn drop(&mut self) {
        let Some(upload_id) = self.upload_id.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(key = %self.key, %upload_id, "No runtime to abort multipart upload, left for purge");
            return;
        };
        let store = Arc::clone(&self.store);
        let key = std::mem::take(&mut self.key);
        handle.spawn(async move {
            match store.abort_multipart(&key, &upload_id).await {
                Ok(()) => debug!(key, %upload_id, "Multipart upload aborted"),
                Err(err) => warn!(key, %upload_id, error = %err, "Multipart abort failed"),
            }
        });
    }
}

/// A transferred object no ledger row references yet.
///
/// Deleted in the background when dropped armed, which covers an upload future dropped
/// between the transfer and the ledger commit. [`StoredObjectGuard::disarm`] once the
/// commit referenced the object.
#[derive(Debug)]
pub(crate) struct StoredObjectGuard {
    store: Arc<dyn BlobStore>,
    key: Option<String>,
}

impl StoredObjectGuard {
    pub(crate) fn new(store: Arc<dyn BlobStore>, key: &str) -> Self {
        Self { store, key: Some(key.to_owned()) }
    }

    pub(crate) fn disarm(mut self) {
        self.key = None;
    }

    /// Deletes the object now. A failed delete is logged and leaves the object orphaned.
    pub(crate) async fn delete(mut self, reason: &str) {
        if let Some(key) = self.key.take() {
            delete_orphan(self.store.as_ref(), &key, reason).await;
        }
    }
}

impl Drop for StoredObjectGuard {
    fn drop(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(target: AUDIT_TARGET, storage_key = %key, "No runtime to delete unrecorded bytes, left orphaned");
            return;
        };
        let store = Arc::clone(&self.store);
        handle.spawn(async move { delete_orphan(store.as_ref(), &key, "upload cancelled").await });
    }
}

async fn delete_orphan(store: &dyn BlobStore, storage_key: &str, reason: &str) {
    match store.delete(storage_key).await {
        Ok(()) => info!(target: AUDIT_TARGET, storage_key, reason, "Transferred bytes deleted"),
        Err(err) => warn!(
            target: AUDIT_TARGET,
            storage_key,
            reason,
            error = %err,
            "Compensating delete failed, bytes left orphaned"
        ),
    }
}

/// Tuning of [`transfer`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct TransferPlan {
    pub(crate) multipart_threshold: u64,
    pub(crate) part_size: usize,
    pub(crate) part_concurrency: usize,
}

/// Sends the spooled payload to the store under `key`, as one streamed put or as
/// concurrent parts read back from the spool.
pub(crate) async fn transfer(
    store: &Arc<dyn BlobStore>,
    plan: TransferPlan,
    key: &str,
    spool: &Spool,
) -> Result<(), LedgerError> {
    if spool.size() <= plan.multipart_threshold {
        let mut file = spool.open().await?;
        let written = store.put_stream(key, &mut file).await.context("Single put")?;
        if written != spool.size() {
            return Err(LedgerError::invariant(format!(
                "stored {written} of {} spooled bytes under {key}",
                spool.size()
            )));
        }
        debug!(key, size = written, "Payload stored");
        return Ok(());
    }
    transfer_parts(store, plan, key, spool).await
}

async fn transfer_parts(
    store: &Arc<dyn BlobStore>,
    plan: TransferPlan,
    key: &str,
    spool: &Spool,
) -> Result<(), LedgerError> {
    let size = spool.size();
    let part_size = plan.part_size as u64;
    let expected = u32::try_from(size.div_ceil(part_size))
        .map_err(|_| LedgerError::invalid("payload needs too many parts"))?;
    let options = MultipartOptions { content_type: None, expected_parts: Some(expected) };
    let upload_id = store.init_multipart(key, &options).await.context("Starting multipart upload")?;
    let guard = MultipartGuard::new(Arc::clone(store), key, upload_id.clone());

    let path: Arc<Path> = Arc::from(spool.path());
    let permits = Arc::new(Semaphore::new(plan.part_concurrency));
    let mut tasks = JoinSet::new();
    for position in 1..=expected {
        let store = Arc::clone(store);
        let path = Arc::clone(&path);
        let permits = Arc::clone(&permits);
        let key = key.to_owned();
        let upload_id = upload_id.clone();
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await.map_err(|_| {
                LedgerError::from("part upload semaphore closed")
            })?;
            let offset = u64::from(position - 1) * part_size;
            let part = read_part(&path, offset, part_size.min(size - offset)).await?;
            store
                .upload_part(position, part, &key, &upload_id)
                .await
                .context(format!("Uploading part {position}"))
        });
    }

    let mut parts: Vec<PartDescriptor> = Vec::with_capacity(expected as usize);
    while let Some(joined) = tasks.join_next().await {
        let part = joined
            .map_err(|e| LedgerError::Internal {
                message: e.to_string().into(),
                context: Some("Part upload task failed".into()),
            })
            .and_then(|part| part);
        match part {
            Ok(part) => parts.push(part),
            Err(err) => {
                // Parts still in flight end before the guard aborts the upload.
                tasks.shutdown().await;
                return Err(err);
            },
        }
    }

    store.complete_multipart(key, &upload_id, parts).await.context("Completing multipart upload")?;
    guard.disarm();
    debug!(key, parts = expected, "Multipart payload stored");
    Ok(())
}

/// Reads `len` bytes at `offset` of the spool file.
async fn read_part(path: &Path, offset: u64, len: u64) -> Result<Vec<u8>, LedgerError> {
    let len = usize::try_from(len).map_err(|_| LedgerError::invalid("part does not fit in memory"))?;
    let mut file = File::open(path).await.context("Opening upload spool")?;
    file.seek(SeekFrom::Start(offset)).await.context("Seeking upload spool")?;
    let mut part = vec![0u8; len];
    file.read_exact(&mut part).await.context("Reading upload spool")?;
    Ok(part)
}
