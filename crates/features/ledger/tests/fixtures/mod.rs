#![allow(dead_code, unreachable_pub)]

use async_trait::async_trait;
use ndisk_database::Database;
use ndisk_domain::config::UploadConfig;
use ndisk_ledger::Ledger;
use ndisk_storage::{
    BlobStore, Compression, FsBlobStore, MultipartOptions, PartDescriptor, StorageError, UploadId,
};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncRead;

pub const OWNER: &str = "u-owner";

/// Small transfer settings so tests exercise the multipart path with tiny payloads.
pub fn small_parts() -> UploadConfig {
    UploadConfig { multipart_threshold: 64, part_size: 16, part_concurrency: 3, spool_dir: None }
}

pub async fn fs_store(temp: &TempDir) -> FsBlobStore {
    FsBlobStore::builder()
        .root(temp.path().join("blobs"))
        .compression(Compression::Lz4)
        .connect()
        .await
        .expect("open blob store")
}

pub async fn database(temp: &TempDir) -> Database {
    Database::builder()
        .path(temp.path().join("ledger.db"))
        .lock_timeout(Duration::from_secs(5))
        .init()
        .await
        .expect("open ledger store")
}

pub async fn ledger_with(temp: &TempDir, store: Arc<dyn BlobStore>, upload: UploadConfig) -> Ledger {
    Ledger::builder(database(temp).await, store).upload(upload).build().expect("build ledger")
}

pub async fn ledger(temp: &TempDir) -> Ledger {
    ledger_with(temp, Arc::new(fs_store(temp).await), UploadConfig::default()).await
}

/// Polls until `done` holds, for effects of background tasks.
pub async fn eventually(mut done: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if done() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// A blob store that counts calls and fails on demand.
#[derive(Debug)]
pub struct FlakyStore {
    inner: FsBlobStore,
    pub fail_delete: AtomicBool,
    /// Part position that fails, 0 for none.
    pub fail_part: AtomicU32,
    pub puts: AtomicUsize,
    pub parts: AtomicUsize,
    pub aborts: AtomicUsize,
    pub deleted: Mutex<Vec<String>>,
    /// Delay of every part upload, in milliseconds.
    pub part_delay_ms: AtomicU64,
    in_flight: AtomicUsize,
    /// Part uploads still running when an abort arrived.
    pub in_flight_at_abort: Mutex<Vec<usize>>,
}

/// Counts a running part upload until dropped, including when its task is aborted.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FlakyStore {
    pub fn new(inner: FsBlobStore) -> Self {
        Self {
            inner,
            fail_delete: AtomicBool::new(false),
            fail_part: AtomicU32::new(0),
            puts: AtomicUsize::new(0),
            parts: AtomicUsize::new(0),
            aborts: AtomicUsize::new(0),
            deleted: Mutex::new(Vec::new()),
            part_delay_ms: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            in_flight_at_abort: Mutex::new(Vec::new()),
        }
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn transfers(&self) -> usize {
        self.puts.load(Ordering::SeqCst) + self.parts.load(Ordering::SeqCst)
    }

    /// Polls until the background abort of a dropped multipart upload ran.
    pub async fn wait_for_abort(&self) -> usize {
        for _ in 0..100 {
            let aborts = self.aborts.load(Ordering::SeqCst);
            if aborts > 0 {
                return aborts;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        0
    }
}

#[async_trait]
impl BlobStore for FlakyStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, data).await
    }

    async fn put_stream(
        &self,
        key: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, StorageError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put_stream(key, reader).await
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<(), StorageError> {
        self.inner.copy(src, dst).await
    }

    async fn init_multipart(
        &self,
        key: &str,
        options: &MultipartOptions,
    ) -> Result<UploadId, StorageError> {
        self.inner.init_multipart(key, options).await
    }

    async fn upload_part(
        &self,
        position: u32,
        data: Vec<u8>,
        key: &str,
        upload_id: &UploadId,
    ) -> Result<PartDescriptor, StorageError> {
        self.parts.fetch_add(1, Ordering::SeqCst);
        let _running = InFlight::enter(&self.in_flight);
        if self.fail_part.load(Ordering::SeqCst) == position {
            return Err(StorageError::Internal { message: "injected part failure".into(), context: None });
        }
        let delay = self.part_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.inner.upload_part(position, data, key, upload_id).await
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &UploadId,
        parts: Vec<PartDescriptor>,
    ) -> Result<(), StorageError> {
        self.inner.complete_multipart(key, upload_id, parts).await
    }

    async fn abort_multipart(&self, key: &str, upload_id: &UploadId) -> Result<(), StorageError> {
        self.in_flight_at_abort.lock().unwrap().push(self.in_flight.load(Ordering::SeqCst));
        self.aborts.fetch_add(1, Ordering::SeqCst);
        self.inner.abort_multipart(key, upload_id).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(StorageError::Internal { message: "injected delete failure".into(), context: None });
        }
        self.deleted.lock().unwrap().push(key.to_owned());
        self.inner.delete(key).await
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.inner.read(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        self.inner.exists(key).await
    }
}
