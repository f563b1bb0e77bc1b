//! Content hashing. Blob identity is the hex SHA-256 of the full content.

use sha2::{Digest, Sha256};
use std::fmt;

/// Hash and length of a fully consumed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDigest {
    pub hash: String,
    pub size: u64,
}

/// Incremental hasher fed chunk by chunk while a payload is read.
#[derive(Clone, Default)]
pub struct ContentHasher {
    inner: Sha256,
    size: u64,
}

impl ContentHasher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
        self.size += chunk.len() as u64;
    }

    /// Bytes seen so far.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn finalize(self) -> ContentDigest {
        ContentDigest { hash: hex::encode(self.inner.finalize()), size: self.size }
    }
}

impl fmt::Debug for ContentHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentHasher").field("size", &self.size).finish_non_exhaustive()
    }
}

/// One-shot hash of an in-memory payload.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Whether `candidate` looks like a hash produced by [`content_hash`].
#[must_use]
pub fn is_content_hash(candidate: &str) -> bool {
    candidate.len() == 64 && candidate.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
