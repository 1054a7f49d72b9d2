//! Stable file identifiers.
//!
//! Every stored file is addressed by a [`FileId`] that is assigned once, on the first store of a
//! path, and survives renames and overwrites.
//!
//! ## Canonical form
//! Freshly generated identifiers use the canonical UUID form: **32 lowercase hexadecimal
//! characters** (no hyphens), the same value as `Uuid::new_v4().simple().to_string()`.
//!
//! ## Parsed identifiers
//! Identifiers arriving from outside (snapshot files, query strings) are treated as opaque
//! tokens. [`FileId::parse`] only requires a non-empty token without whitespace or control
//! characters, so snapshots written with hyphenated UUIDs still load.

mod file_id;

pub use file_id::FileId;

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type UuidResult<T> = Result<T, UuidError>;
