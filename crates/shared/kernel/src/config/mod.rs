use config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::info;

/// Prefix of environment overrides (`NDISK__UPLOAD__PART_SIZE` maps to `upload.part_size`).
pub const ENV_PREFIX: &str = "NDISK";

#[ndisk_derive::ndisk_error]
pub enum ConfigError {
    #[error("Config error{}: {source}", format_context(.context))]
    Config { source: config::ConfigError, context: Option<Cow<'static, str>> },
}

/// Loads a configuration structure from a file layered with environment overrides.
///
/// 1. **Base File**: settings from `path`, or from `ndisk` (any supported extension)
///    in the current working directory when no path is given.
/// 2. **Environment Overrides**: variables prefixed with `NDISK__`; nested keys are
///    separated by double underscores (`NDISK__DATABASE__LOCK_TIMEOUT_MS`).
///
/// # Errors
/// Fails when the file is missing or its content (after overrides) does not match `T`.
///
/// # Example
/// ```rust
/// use ndisk_kernel::config::load_config;
/// use ndisk_kernel::domain::config::LedgerConfig;
///
/// let cfg: LedgerConfig = load_config(Some("config/local")).unwrap_or_default();
/// ```
pub fn load_config<T>(path: Option<impl AsRef<Path>>) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    let effective_path = path.map_or_else(|| PathBuf::from("ndisk"), |p| p.as_ref().to_path_buf());

    let builder = Config::builder()
        .add_source(File::from(effective_path.as_path()).required(true))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .convert_case(config::Case::Snake),
        );

    info!(path = %effective_path.display(), "Loading config");

    let config = builder
        .build()
        .context("Failed to build config")?
        .try_deserialize::<T>()
        .context("Failed to deserialize config")?;

    Ok(config)
}
