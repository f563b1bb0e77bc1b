use crate::models::EntryId;

/// Parent id of every top-level entry.
pub const ROOT_PARENT: EntryId = 0;

/// Table names of the ledger store.
pub const USER: &str = "user";
pub const BLOB: &str = "blob";
pub const NAMESPACE_ENTRY: &str = "namespace_entry";

/// Length of generated identifiers (hex characters).
pub const ID_LEN: usize = 32;
