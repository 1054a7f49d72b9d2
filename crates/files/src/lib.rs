//! Depot file storage
//!
//! This crate owns every byte-level interaction with the store root. The metadata engine never
//! touches `std::fs` directly; it goes through the [`FileSystem`] trait so the engine can be
//! exercised against a temporary root in tests.
//!
//! ## Layout
//!
//! Files live at their relative path below a single root directory. Nothing else is written
//! there, so the tree can be served as-is:
//!
//! ```text
//! <root>/
//! ├── testdir/
//! │   └── test.txt
//! └── photos/
//!     └── 2021/
//!         └── beach.jpg
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use depot_files::{FileSystem, LocalFileSystem};
//! use depot_types::RelativePath;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let fs = LocalFileSystem::new(Path::new("/srv/depot"))?;
//! let path = RelativePath::new("testdir/test.txt")?;
//! fs.write_file(&path, b"test data")?;
//! assert!(fs.path_exists(&path)?);
//! # Ok(())
//! # }
//! ```

mod files;

pub use files::{sha256_hex, FileSystem, LocalFileSystem};

/// Errors that can occur during file operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Root directory does not exist or is not a directory
    #[error("Invalid root directory: {0}")]
    InvalidRootDirectory(String),

    /// A path found on disk could not be expressed as a store path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type FilesResult<T> = std::result::Result<T, FilesError>;
