use crate::engine::{Compression, FsBlobStore, FsBlobStoreInner};
use crate::error::{StorageError, StorageErrorExt};
use crate::security::Sandbox;
use private::Sealed;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use tokio::fs;
use tracing::info;

#[derive(Debug, Clone)]
struct BuilderConfig {
    compression: Compression,
    create: bool,
    purge: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self { compression: Compression::None, create: true, purge: true }
    }
}

#[derive(Debug, Default)]
pub struct NoRoot;
#[derive(Debug)]
pub struct WithRoot(PathBuf);

mod private {
    pub(super) trait Sealed {}
}
impl Sealed for NoRoot {}
impl Sealed for WithRoot {}

#[allow(private_bounds)]
#[derive(Debug, Default)]
pub struct FsBlobStoreBuilder<S: Sealed = NoRoot> {
    state: S,
    config: BuilderConfig,
}

#[allow(private_bounds)]
impl<S: Sealed> FsBlobStoreBuilder<S> {
    #[must_use = "Sets compression of stored objects and staged parts"]
    pub const fn compression(mut self, compression: Compression) -> Self {
        self.config.compression = compression;
        self
    }

    #[must_use = "Sets whether the root directory is created when missing"]
    pub const fn create(mut self, enable: bool) -> Self {
        self.config.create = enable;
        self
    }

    #[must_use = "Sets whether leftovers of earlier runs are removed on connect"]
    pub const fn purge_on_connect(mut self, enable: bool) -> Self {
        self.config.purge = enable;
        self
    }

    fn transition<N: Sealed>(self, state: N) -> FsBlobStoreBuilder<N> {
        FsBlobStoreBuilder { state, config: self.config }
    }
}

impl FsBlobStoreBuilder<NoRoot> {
    #[must_use = "Creates a new blob store builder with default configuration"]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use = "Sets the root directory of the blob store"]
    pub fn root(self, path: impl Into<PathBuf>) -> FsBlobStoreBuilder<WithRoot> {
        self.transition(WithRoot(path.into()))
    }
}

impl FsBlobStoreBuilder<WithRoot> {
    /// Opens the store.
    ///
    /// 1. Creates the root directory if `create(true)` was set.
    /// 2. Resolves the root to its canonical physical path, the sandbox boundary.
    /// 3. With `purge_on_connect(true)`, removes stale temp files and staging
    ///    directories of uploads abandoned by a previous run. Cleanup problems are
    ///    logged, never fatal.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the root is missing (and `create` is false) or
    /// cannot be created or resolved.
    pub async fn connect(self) -> Result<FsBlobStore, StorageError> {
        let root = &self.state.0;

        if self.config.create {
            fs::create_dir_all(root)
                .await
                .context(format!("Failed to bootstrap blob store root: {}", root.display()))?;
        }

        let canonical = fs::canonicalize(root)
            .await
            .context(format!("Failed to resolve blob store root: {}", root.display()))?;
        info!(path = %canonical.display(), compression = ?self.config.compression, "Blob store opened");

        let store = FsBlobStore {
            inner: Arc::new(FsBlobStoreInner {
                sandbox: Sandbox::new(canonical),
                compression: self.config.compression,
                tmp_counter: AtomicU64::new(1),
            }),
        };

        if self.config.purge {
            store.purge().await;
        }

        Ok(store)
    }
}
