//! Normalised relative paths below the store root.
//!
//! Every path that reaches the indices goes through [`RelativePath::new`], so index keys and
//! values always share one spelling: `/`-separated, no leading or trailing separator, no empty,
//! `.` or `..` components.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Errors raised while validating a relative path.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PathError {
    /// Nothing left after normalisation
    #[error("path cannot be empty")]
    Empty,

    /// A `.` or `..` component was present
    #[error("path must not contain '.' or '..' components: {0}")]
    Traversal(String),

    /// NUL bytes are never valid on disk
    #[error("path must not contain NUL bytes")]
    Nul,
}

/// A validated path relative to the store root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelativePath(String);

impl RelativePath {
    /// Normalises and validates `input`.
    ///
    /// Leading `/` and repeated separators are dropped, so `/a//b/` becomes `a/b`.
    pub fn new(input: impl AsRef<str>) -> Result<Self, PathError> {
        let input = input.as_ref();
        if input.contains('\0') {
            return Err(PathError::Nul);
        }

        let mut components = Vec::new();
        for component in input.split('/') {
            match component {
                "" => continue,
                "." | ".." => return Err(PathError::Traversal(input.to_owned())),
                other => components.push(other),
            }
        }

        if components.is_empty() {
            return Err(PathError::Empty);
        }
        Ok(Self(components.join("/")))
    }

    /// Returns the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Appends `child` (itself validated) to this path.
    pub fn join(&self, child: impl AsRef<str>) -> Result<Self, PathError> {
        Self::new(format!("{}/{}", self.0, child.as_ref()))
    }

    /// Returns the parent path, or `None` for a top-level entry.
    pub fn parent(&self) -> Option<Self> {
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| Self(parent.to_owned()))
    }

    /// Returns the final component.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Resolves this path below `root`.
    pub fn under(&self, root: &Path) -> PathBuf {
        self.0.split('/').fold(root.to_path_buf(), |acc, c| acc.join(c))
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RelativePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for RelativePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl serde::Serialize for RelativePath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for RelativePath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        RelativePath::new(&s).map_err(serde::de::Error::custom)
    }
}
