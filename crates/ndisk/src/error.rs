use ndisk_database::DatabaseError;
use ndisk_kernel::config::ConfigError;
use ndisk_ledger::LedgerError;
use ndisk_logger::LoggerError;
use ndisk_storage::StorageError;
use std::borrow::Cow;

/// Startup failures of a ledger deployment.
#[ndisk_derive::ndisk_error]
pub enum NdiskError {
    #[error("Configuration error{}: {source}", format_context(.context))]
    Config { source: ConfigError, context: Option<Cow<'static, str>> },

    #[error("Invalid setting{}: {message}", format_context(.context))]
    InvalidSetting { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Logging setup failed{}: {source}", format_context(.context))]
    Logging { source: LoggerError, context: Option<Cow<'static, str>> },

    #[opaque]
    #[error("Blob store unavailable{}: {source}", format_context(.context))]
    Storage { source: StorageError, context: Option<Cow<'static, str>> },

    #[opaque]
    #[error("Ledger store unavailable{}: {source}", format_context(.context))]
    Database { source: DatabaseError, context: Option<Cow<'static, str>> },

    #[error("Ledger setup failed{}: {source}", format_context(.context))]
    Ledger { source: LedgerError, context: Option<Cow<'static, str>> },

    #[opaque]
    #[error("Internal error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}
