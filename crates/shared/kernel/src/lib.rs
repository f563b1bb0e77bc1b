//! Kernel utilities shared by the ledger crates.
//! Keep this crate lightweight: identifiers, content hashing, and config loading.
//!
//! ## ID generation
//! Use `safe_nanoid!` for URL-safe, unambiguous random tokens:
//! ```rust
//! # use ndisk_kernel::safe_nanoid;
//! let id = safe_nanoid!();
//! assert_eq!(id.len(), 12);
//! ```
//!
//! Ledger identifiers (blob, entry, storage key) come from [`ids`]:
//! ```rust
//! let id = ndisk_kernel::ids::entry_id("owner-1", "notes");
//! assert_eq!(id.len(), 32);
//! ```
#[cfg(not(target_arch = "wasm32"))]
pub mod config;
pub mod hash;
pub mod ids;

// Alphabet excludes visually ambiguous characters (I, O, l, 0, 1).
pub const SAFE_ALPHABET: &[char; 55] = &[
    '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'J', 'K', 'L',
    'M', 'N', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'a', 'b', 'c', 'd', 'e', 'f',
    'g', 'h', 'j', 'k', 'm', 'n', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

pub use ndisk_domain as domain;
pub use nanoid::nanoid;

/// Generates an unambiguous `NanoID` (no visually confusing characters).
#[macro_export]
macro_rules! safe_nanoid {
    () => {
        $crate::nanoid!(12, $crate::SAFE_ALPHABET)
    };
    ($size:expr) => {
        $crate::nanoid!($size, $crate::SAFE_ALPHABET)
    };
}
