//! Facade of the storage ledger.
//! Re-exports the workspace crates and wires a [`Ledger`] from a [`LedgerConfig`].
//! Keep this crate thin: it composes the other crates, it does not implement ledger logic.
//!
//! ## Usage
//! ```rust
//! use ndisk::{NdiskError, connect, domain::config::LedgerConfig, ledger::UploadRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), NdiskError> {
//!     # let tmp = tempfile::tempdir().unwrap();
//!     let mut config = LedgerConfig::default();
//!     config.storage.root = tmp.path().join("blobs");
//!     config.database.path = tmp.path().join("ledger.db");
//!
//!     let ledger = connect(&config).await?;
//!     ledger.open_account("u-1", "u1@example.com", 1 << 20).await?;
//!     ledger.upload(UploadRequest::new("u-1", "hello.txt"), &mut &b"hello"[..]).await?;
//!     assert_eq!(ledger.usage("u-1").await?.now, 5);
//!     Ok(())
//! }
//! ```

mod error;

pub use error::{NdiskError, NdiskErrorExt};
pub use ndisk_database as database;
pub use ndisk_domain as domain;
pub use ndisk_kernel as kernel;
pub use ndisk_ledger as ledger;
pub use ndisk_ledger::Ledger;
pub use ndisk_logger as logger;
pub use ndisk_storage as storage;

use ndisk_database::Database;
use ndisk_domain::config::{LedgerConfig, LoggingConfig};
use ndisk_logger::{LevelFilter, Logger};
use ndisk_storage::{Compression, FsBlobStore};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Loads a [`LedgerConfig`] from `path` (or `ndisk.*` in the working directory), with
/// `NDISK__` environment overrides.
///
/// # Errors
/// [`NdiskError::Config`] when the file is missing or malformed.
pub fn load_config(path: Option<&Path>) -> Result<LedgerConfig, NdiskError> {
    ndisk_kernel::config::load_config::<LedgerConfig>(path).context("Loading ledger config")
}

/// Installs the global tracing subscriber described by `config`.
///
/// # Errors
/// [`NdiskError::InvalidSetting`] for an unknown level, [`NdiskError::Logging`] when the
/// subscriber cannot be installed.
pub fn init_logging(config: &LoggingConfig) -> Result<Logger, NdiskError> {
    let level = LevelFilter::from_str(&config.level).map_err(|_| NdiskError::InvalidSetting {
        message: format!("unknown log level {:?}", config.level).into(),
        context: None,
    })?;
    let builder = Logger::builder().name(&config.name).level(level).console(config.console);

    let logger = match &config.directory {
        Some(directory) => {
            let builder = builder.path(directory).max_files(config.max_files).audit(config.audit);
            if config.json { builder.json().init() } else { builder.init() }
        },
        None => builder.init(),
    };
    logger.context("Installing subscriber")
}

/// Opens the blob store and the ledger store described by `config` and builds a [`Ledger`].
///
/// Both stores live on disk: reconnecting with the same config finds every committed
/// account, entry and blob again.
///
/// # Errors
/// Fails when the blob store root or the database file cannot be opened, or a setting is
/// out of range.
pub async fn connect(config: &LedgerConfig) -> Result<Ledger, NdiskError> {
    let compression = if config.storage.compression { Compression::Lz4 } else { Compression::None };
    let store = FsBlobStore::builder()
        .root(&config.storage.root)
        .compression(compression)
        .purge_on_connect(config.storage.purge_tmp_on_start)
        .connect()
        .await
        .context("Opening blob store")?;

    let db = Database::builder()
        .path(&config.database.path)
        .lock_timeout(config.database.lock_timeout())
        .max_connections(config.database.max_connections)
        .init()
        .await
        .context("Opening ledger store")?;

    let ledger = Ledger::builder(db, Arc::new(store))
        .upload(config.upload.clone())
        .build()
        .context("Building ledger")?;
    info!(
        root = %config.storage.root.display(),
        database = %config.database.path.display(),
        "Ledger connected"
    );
    Ok(ledger)
}
