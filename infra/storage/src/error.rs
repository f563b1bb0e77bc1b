use std::borrow::Cow;

/// Errors of the blob store contract and its filesystem implementation.
#[ndisk_derive::ndisk_error(opaque_message = "blob store unavailable")]
pub enum StorageError {
    #[error("Object not found{}: {key}", format_context(.context))]
    ObjectNotFound { key: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Multipart upload not found{}: {upload_id}", format_context(.context))]
    UploadNotFound { upload_id: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Invalid multipart part{}: {message}", format_context(.context))]
    InvalidPart { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Invalid object key{}: {message}", format_context(.context))]
    InvalidKey { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Path traversal security violation{}: {message}", format_context(.context))]
    PathTraversalAttempt { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[opaque]
    #[error("Hardware I/O failure{}: {source}", format_context(.context))]
    Io { source: std::io::Error, context: Option<Cow<'static, str>> },

    #[opaque]
    #[error("Decompression failure{}: {source}", format_context(.context))]
    Decompress { source: lz4_flex::block::DecompressError, context: Option<Cow<'static, str>> },

    #[opaque]
    #[error("Manifest encoding failure{}: {source}", format_context(.context))]
    Manifest { source: serde_json::Error, context: Option<Cow<'static, str>> },

    #[opaque]
    #[error("Internal blob store fault{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl StorageError {
    pub(crate) fn object_not_found(key: &str) -> Self {
        Self::ObjectNotFound { key: key.to_owned().into(), context: None }
    }

    pub(crate) fn upload_not_found(upload_id: &str) -> Self {
        Self::UploadNotFound { upload_id: upload_id.to_owned().into(), context: None }
    }

    pub(crate) fn invalid_part(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidPart { message: message.into(), context: None }
    }
}
