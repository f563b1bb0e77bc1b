//! Identifier generation for ledger rows and blob store objects.
//!
//! Every id is the hex SHA-256 of a fresh random seed followed by the identifying fields,
//! truncated to [`ID_LEN`]. The fields only spread ids apart; uniqueness comes from the seed.

use crate::safe_nanoid;
use ndisk_domain::constants::ID_LEN;
use sha2::{Digest, Sha256};

const SEED_LEN: usize = 21;

/// Generates a random id bound to `fields`.
#[must_use]
pub fn generate(fields: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(safe_nanoid!(SEED_LEN).as_bytes());
    for field in fields {
        // Unit separator keeps ("ab", "c") and ("a", "bc") apart.
        hasher.update(b"\x1f");
        hasher.update(field.as_bytes());
    }
    let mut id = hex::encode(hasher.finalize());
    id.truncate(ID_LEN);
    id
}

#[must_use]
pub fn blob_id(content_hash: &str) -> String {
    generate(&["blob", content_hash])
}

#[must_use]
pub fn entry_id(owner: &str, name: &str) -> String {
    generate(&["entry", owner, name])
}

/// Object key for a new upload. Unique per upload, never derived from content alone,
/// so two racing uploads of the same bytes never share an object.
#[must_use]
pub fn storage_key(content_hash: &str) -> String {
    generate(&["object", content_hash])
}
