use serde::Deserialize;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Top-level ledger configuration.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfigInner {
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub upload: UploadConfig,
    pub logging: LoggingConfig,
}

/// Thin Arc-wrapped config for inexpensive cloning into subsystems.
#[derive(Default, Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(flatten, default)]
    inner: Arc<LedgerConfigInner>,
}

impl Deref for LedgerConfig {
    type Target = LedgerConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for LedgerConfig {
    fn deref_mut(&mut self) -> &mut LedgerConfigInner {
        Arc::make_mut(&mut self.inner)
    }
}

/// Blob store root and on-disk format.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub compression: bool,
    pub purge_tmp_on_start: bool,
}

/// Ledger store location and tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// The SQLite file holding users, blobs and namespace entries.
    pub path: PathBuf,
    /// Longest wait for the writer slot before the transaction fails.
    pub lock_timeout_ms: u64,
    pub max_connections: u32,
}

impl DatabaseConfig {
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Transfer strategy of the upload coordinator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Payloads up to this size (bytes) go through a single put.
    pub multipart_threshold: u64,
    pub part_size: usize,
    pub part_concurrency: usize,
    /// Directory for payloads spooled before transfer; the system temp dir when unset.
    pub spool_dir: Option<PathBuf>,
}

/// Subscriber settings handed to the logger at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub name: String,
    pub level: String,
    pub console: bool,
    pub json: bool,
    pub directory: Option<PathBuf>,
    pub max_files: usize,
    /// Mirror ledger commits and compensations into a dedicated audit file.
    pub audit: bool,
}

// --- Default ---

impl Default for StorageConfig {
    fn default() -> Self {
        Self { root: PathBuf::from("data"), compression: false, purge_tmp_on_start: true }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("data/ledger.db"), lock_timeout_ms: 5_000, max_connections: 8 }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            multipart_threshold: 8 * 1024 * 1024,
            part_size: 5 * 1024 * 1024,
            part_concurrency: 4,
            spool_dir: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            name: "ndisk".to_owned(),
            level: "info".to_owned(),
            console: true,
            json: false,
            directory: None,
            max_files: 7,
            audit: true,
        }
    }
}
