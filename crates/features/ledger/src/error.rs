use ndisk_database::DatabaseError;
use ndisk_storage::StorageError;
use std::borrow::Cow;

/// Errors of ledger operations.
///
/// Every failure inside a ledger transaction rolls the whole transaction back. Variants
/// marked opaque describe infrastructure problems and are reduced to a generic message
/// by [`LedgerError::public_message`].
#[ndisk_derive::ndisk_error]
pub enum LedgerError {
    #[error("Not found{}: {message}", format_context(.context))]
    NotFound { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Storage quota exceeded{}: {message}", format_context(.context))]
    QuotaExceeded { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Another transaction stored the same content first.
    #[error("Duplicate content{}: {message}", format_context(.context))]
    DuplicateConflict { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[opaque]
    #[error("Ledger invariant violated{}: {message}", format_context(.context))]
    InvariantViolation { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[opaque]
    #[error("Ledger transaction failed{}: {source}", format_context(.context))]
    TransactionFailure { source: DatabaseError, context: Option<Cow<'static, str>> },

    #[opaque]
    #[error("Blob store error{}: {source}", format_context(.context))]
    Storage { source: StorageError, context: Option<Cow<'static, str>> },

    /// Reading the client payload failed.
    #[opaque]
    #[error("Payload read error{}: {source}", format_context(.context))]
    Io { source: std::io::Error, context: Option<Cow<'static, str>> },

    #[error("Name already taken{}: {message}", format_context(.context))]
    NameConflict { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Directory not empty{}: {message}", format_context(.context))]
    DirectoryNotEmpty { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Invalid argument{}: {message}", format_context(.context))]
    InvalidArgument { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Conflict{}: {message}", format_context(.context))]
    Conflict { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[opaque]
    #[error("Internal ledger error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl LedgerError {
    pub(crate) fn not_found(kind: &str, key: &str) -> Self {
        Self::NotFound { message: format!("{kind} {key}").into(), context: None }
    }

    pub(crate) fn invalid(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidArgument { message: message.into(), context: None }
    }

    pub(crate) fn invariant(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvariantViolation { message: message.into(), context: None }
    }
}
