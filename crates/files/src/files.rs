//! Local file-system implementation of the [`FileSystem`] collaborator.
//!
//! # Security Model
//!
//! - The root is canonicalised once at construction
//! - Every operation takes a [`RelativePath`], which cannot contain `.` or `..` components, so
//!   resolved paths always stay below the root
//! - Errors carry the offending path in their message; the underlying `io::ErrorKind` is kept

use crate::{FilesError, FilesResult};
use depot_types::{RelativePath, Sha256Hash};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Byte-level operations the metadata engine needs from the store root.
pub trait FileSystem: Send + Sync {
    /// Returns true if anything (file or directory) exists at `path`.
    fn path_exists(&self, path: &RelativePath) -> FilesResult<bool>;

    /// Writes `content` to `path`, creating parent directories as needed.
    fn write_file(&self, path: &RelativePath, content: &[u8]) -> FilesResult<()>;

    /// Creates `path` and all missing ancestors.
    fn create_directories(&self, path: &RelativePath) -> FilesResult<()>;

    /// Renames a file or directory.
    fn rename_path(&self, old: &RelativePath, new: &RelativePath) -> FilesResult<()>;

    /// Removes a file or a whole directory tree. An absent path is not an error.
    fn remove_recursive(&self, path: &RelativePath) -> FilesResult<()>;

    /// Reads the whole content of the file at `path`.
    fn read_file(&self, path: &RelativePath) -> FilesResult<Vec<u8>>;

    /// Lists every regular file below the root.
    fn list_files(&self) -> FilesResult<Vec<RelativePath>>;
}

/// Computes the SHA-256 digest of `content`.
pub fn sha256_hex(content: &[u8]) -> Sha256Hash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let hash_array: [u8; 32] = hasher.finalize().into();
    Sha256Hash::from_bytes(&hash_array)
}

fn with_context(e: io::Error, action: &str, path: &Path) -> FilesError {
    FilesError::Io(io::Error::new(
        e.kind(),
        format!("Failed to {} {}: {}", action, path.display(), e),
    ))
}

/// [`FileSystem`] rooted at a directory on the local disk.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root_directory: PathBuf,
}

impl LocalFileSystem {
    /// Creates a file system rooted at `root_directory`.
    ///
    /// # Errors
    ///
    /// Returns `FilesError::InvalidRootDirectory` if the root does not exist, is not a
    /// directory, or cannot be canonicalised.
    pub fn new(root_directory: &Path) -> FilesResult<Self> {
        if !root_directory.exists() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Directory does not exist: {}",
                root_directory.display()
            )));
        }

        if !root_directory.is_dir() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Path is not a directory: {}",
                root_directory.display()
            )));
        }

        let root_directory = root_directory.canonicalize().map_err(|e| {
            FilesError::InvalidRootDirectory(format!(
                "Cannot canonicalize path {}: {}",
                root_directory.display(),
                e
            ))
        })?;

        Ok(Self { root_directory })
    }

    /// Returns the canonicalised root directory.
    #[must_use]
    pub fn root_directory(&self) -> &Path {
        &self.root_directory
    }

    fn resolve(&self, path: &RelativePath) -> PathBuf {
        path.under(&self.root_directory)
    }

    fn to_relative(&self, absolute: &Path) -> FilesResult<RelativePath> {
        let stripped = absolute.strip_prefix(&self.root_directory).map_err(|_| {
            FilesError::InvalidPath(format!(
                "{} is outside of {}",
                absolute.display(),
                self.root_directory.display()
            ))
        })?;

        let mut parts = Vec::new();
        for component in stripped.components() {
            let part = component.as_os_str().to_str().ok_or_else(|| {
                FilesError::InvalidPath(format!("{} is not valid UTF-8", absolute.display()))
            })?;
            parts.push(part);
        }

        RelativePath::new(parts.join("/"))
            .map_err(|e| FilesError::InvalidPath(format!("{}: {}", absolute.display(), e)))
    }
}

impl FileSystem for LocalFileSystem {
    fn path_exists(&self, path: &RelativePath) -> FilesResult<bool> {
        let absolute = self.resolve(path);
        absolute
            .try_exists()
            .map_err(|e| with_context(e, "check", &absolute))
    }

    fn write_file(&self, path: &RelativePath, content: &[u8]) -> FilesResult<()> {
        let absolute = self.resolve(path);

        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| with_context(e, "create directory", parent))?;
        }

        fs::write(&absolute, content).map_err(|e| with_context(e, "write file", &absolute))
    }

    fn create_directories(&self, path: &RelativePath) -> FilesResult<()> {
        let absolute = self.resolve(path);
        fs::create_dir_all(&absolute).map_err(|e| with_context(e, "create directory", &absolute))
    }

    fn rename_path(&self, old: &RelativePath, new: &RelativePath) -> FilesResult<()> {
        let from = self.resolve(old);
        let to = self.resolve(new);
        fs::rename(&from, &to).map_err(|e| {
            FilesError::Io(io::Error::new(
                e.kind(),
                format!(
                    "Failed to rename {} to {}: {}",
                    from.display(),
                    to.display(),
                    e
                ),
            ))
        })
    }

    fn remove_recursive(&self, path: &RelativePath) -> FilesResult<()> {
        let absolute = self.resolve(path);

        let metadata = match fs::symlink_metadata(&absolute) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(with_context(e, "inspect", &absolute)),
        };

        let result = if metadata.is_dir() {
            fs::remove_dir_all(&absolute)
        } else {
            fs::remove_file(&absolute)
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(with_context(e, "remove", &absolute)),
        }
    }

    fn read_file(&self, path: &RelativePath) -> FilesResult<Vec<u8>> {
        let absolute = self.resolve(path);
        fs::read(&absolute).map_err(|e| with_context(e, "read file", &absolute))
    }

    fn list_files(&self) -> FilesResult<Vec<RelativePath>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(&self.root_directory).follow_links(false) {
            let entry = entry.map_err(|e| {
                let message = e.to_string();
                FilesError::Io(
                    e.into_io_error()
                        .unwrap_or_else(|| io::Error::new(ErrorKind::Other, message)),
                )
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            match self.to_relative(entry.path()) {
                Ok(relative) => files.push(relative),
                Err(e) => tracing::warn!("skipping unindexable file: {}", e),
            }
        }

        Ok(files)
    }
}
