use std::borrow::Cow;

/// A specialized [`DatabaseError`] enum of this crate.
///
/// Absent rows are not errors: readers return `Option`. These variants are reserved for
/// constraint, locking and engine failures.
#[ndisk_derive::ndisk_error]
pub enum DatabaseError {
    /// Builder or row validation errors.
    #[error("Validation error{}: {message}", format_context(.context))]
    Validation { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The writer slot could not be acquired within the configured timeout.
    #[error("Lock wait timed out{}: {key}", format_context(.context))]
    LockTimeout { key: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// A write was attempted on a row the transaction has not locked.
    #[error("Row lock not held{}: {key}", format_context(.context))]
    LockNotHeld { key: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Unique index {index} violated{}: {key}", format_context(.context))]
    UniqueViolation {
        index: Cow<'static, str>,
        key: Cow<'static, str>,
        context: Option<Cow<'static, str>>,
    },

    /// An update or delete targeted a row that does not exist.
    #[error("Row missing from {table}{}: {key}", format_context(.context))]
    RowMissing {
        table: Cow<'static, str>,
        key: Cow<'static, str>,
        context: Option<Cow<'static, str>>,
    },

    #[opaque]
    #[error("SQLite error{}: {source}", format_context(.context))]
    Engine { source: sqlx::Error, context: Option<Cow<'static, str>> },

    #[opaque]
    #[error("Database file error{}: {source}", format_context(.context))]
    Io { source: std::io::Error, context: Option<Cow<'static, str>> },

    #[opaque]
    #[error("Internal database error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

const UNIQUE_FAILED: &str = "UNIQUE constraint failed: ";

impl DatabaseError {
    pub(crate) fn unique(index: &'static str, key: impl Into<String>) -> Self {
        Self::UniqueViolation { index: index.into(), key: key.into().into(), context: None }
    }

    pub(crate) fn missing(table: &'static str, key: impl Into<String>) -> Self {
        Self::RowMissing { table: table.into(), key: key.into().into(), context: None }
    }

    /// Maps SQLite unique constraint failures to [`DatabaseError::UniqueViolation`],
    /// anything else to [`DatabaseError::Engine`].
    ///
    /// SQLite names the violated columns: `UNIQUE constraint failed: blob.content_hash`.
    pub(crate) fn write(err: sqlx::Error, key: &str) -> Self {
        if let sqlx::Error::Database(db_err) = &err
            && let Some(index) = db_err.message().strip_prefix(UNIQUE_FAILED)
        {
            return Self::UniqueViolation {
                index: index.to_owned().into(),
                key: key.to_owned().into(),
                context: None,
            };
        }
        Self::Engine { source: err, context: None }
    }
}
