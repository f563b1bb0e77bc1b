#![allow(unreachable_pub)]
#![allow(clippy::needless_pass_by_value)]

//! # Macros
//!
//! Procedural macros for the ndisk workspace.
//!
//! Currently a single attribute macro, [`ndisk_error`], which every crate uses to declare
//! its error enum.
//!
//! ## Usage
//! ```toml
//! [dependencies]
//! ndisk-derive = { workspace = true }
//! thiserror = { workspace = true }
//! ```

mod macros;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Attribute macro for defining domain-specific error enums.
///
/// # Features
///
/// * **Automatic Derives**: Injects `#[derive(Debug, thiserror::Error)]` unless already present.
/// * **Context Support**: Generates a companion `...Ext` trait that adds `.context()`
///   to any `Result` that can be converted into this error type.
/// * **Standard Conversions**: Implements `From<T>` for variants containing a `source` field,
///   so upstream errors propagate with `?`.
/// * **Internal Fallback**: `From<&'static str>` and `From<String>` when an `Internal`
///   variant is present.
/// * **Public Messages**: Variants marked `#[opaque]` are reported by `public_message()`
///   as a generic message instead of their `Display` output. The marker is stripped
///   from the emitted enum.
///
/// # Arguments
///
/// * `opaque_message = "..."` - Replaces the default generic message (`"internal error"`).
///
/// # Requirements
///
/// 1. The macro must be applied to an **enum**.
/// 2. Variants that support context must include a `context: Option<Cow<'static, str>>` field.
/// 3. Variants wrapping external errors must include a `source: T` field (or a field marked
///    with `#[source]`/`#[from]`) together with a `context` field.
/// 4. Tuple and unit variants are rejected.
///
/// # Example
///
/// ```rust,ignore
/// use ndisk_derive::ndisk_error;
/// use std::borrow::Cow;
///
/// #[ndisk_error]
/// pub enum StoreError {
///     #[opaque]
///     #[error("IO error{}: {source}", format_context(.context))]
///     Io {
///         #[source]
///         source: std::io::Error,
///         context: Option<Cow<'static, str>>,
///     },
///
///     #[error("Object not found{}: {key}", format_context(.context))]
///     NotFound { key: String, context: Option<Cow<'static, str>> },
///
///     #[opaque]
///     #[error("Internal fault{}: {message}", format_context(.context))]
///     Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
/// }
///
/// fn open(path: &str) -> Result<std::fs::File, StoreError> {
///     std::fs::File::open(path).context("Opening object")
/// }
/// ```
#[proc_macro_attribute]
pub fn ndisk_error(args: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    macros::error::expand_derive(args.into(), input).into()
}
