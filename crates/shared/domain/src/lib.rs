//! # Domain Models
//!
//! Pure data types of the storage ledger with a single dependency (`serde`).
//! Keep it lean: no I/O, networking, or heavy logic, just data and simple helpers.

pub mod config;
pub mod constants;
pub mod models;

pub use models::{Blob, EntryId, NamespaceEntry, NewEntry, User};
