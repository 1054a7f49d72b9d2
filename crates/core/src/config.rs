//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into core services. Request
//! handling never reads process-wide environment variables.
//!
//! The binaries merge, in order of precedence: command-line flags, environment variables, the
//! optional TOML file parsed here, and built-in defaults.

use crate::constants::{
    CHECKSUM_INDEX_DIR, DEFAULT_ADDR, DEFAULT_BASE_DIR_NAME, DEFAULT_CACHE_DIR,
    DEFAULT_CONFIG_FILE, IDENTITY_INDEX_DIR,
};
use crate::{DepotError, DepotResult};
use depot_kv::StorageBackend;
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    base_dir: PathBuf,
    cache_dir: PathBuf,
    backend: StorageBackend,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// The cache directory must not live inside the base directory, otherwise the index files
    /// would show up as stored files.
    pub fn new(base_dir: PathBuf, cache_dir: PathBuf, backend: StorageBackend) -> DepotResult<Self> {
        if base_dir.as_os_str().is_empty() {
            return Err(DepotError::Config("base_dir cannot be empty".into()));
        }
        if cache_dir.as_os_str().is_empty() {
            return Err(DepotError::Config("cache_dir cannot be empty".into()));
        }
        if backend == StorageBackend::Sled && cache_dir.starts_with(&base_dir) {
            return Err(DepotError::Config(format!(
                "cache_dir {} must not be inside base_dir {}",
                cache_dir.display(),
                base_dir.display()
            )));
        }

        Ok(Self {
            base_dir,
            cache_dir,
            backend,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn backend(&self) -> StorageBackend {
        self.backend
    }

    pub fn identity_index_dir(&self) -> PathBuf {
        self.cache_dir.join(IDENTITY_INDEX_DIR)
    }

    pub fn checksum_index_dir(&self) -> PathBuf {
        self.cache_dir.join(CHECKSUM_INDEX_DIR)
    }
}

/// Settings read from the optional TOML configuration file.
///
/// ```toml
/// port = "8080"
/// base_dir = "/srv/depot"
/// cache_dir = "/var/cache/depot"
/// backend = "sled"
/// max_upload_bytes = 104857600
/// ```
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub port: Option<String>,
    pub base_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub backend: Option<StorageBackend>,
    pub max_upload_bytes: Option<usize>,
}

impl ConfigFile {
    /// Loads `path`; a missing file yields `Ok(None)`.
    pub fn load(path: &Path) -> DepotResult<Option<Self>> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DepotError::ConfigRead(e)),
        };
        Self::parse(&text).map(Some)
    }

    pub fn parse(text: &str) -> DepotResult<Self> {
        toml::from_str(text).map_err(DepotError::ConfigParse)
    }
}

/// Built-in locations below the user's home directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DefaultPaths {
    pub base_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub config_file: PathBuf,
}

impl DefaultPaths {
    pub fn under(home: &Path) -> Self {
        Self {
            base_dir: home.join(DEFAULT_BASE_DIR_NAME),
            cache_dir: home.join(DEFAULT_CACHE_DIR),
            config_file: home.join(DEFAULT_CONFIG_FILE),
        }
    }

    /// Resolves the defaults for the current user.
    pub fn for_current_user() -> DepotResult<Self> {
        let dirs = directories::BaseDirs::new()
            .ok_or_else(|| DepotError::Config("could not determine the home directory".into()))?;
        Ok(Self::under(dirs.home_dir()))
    }
}

/// Turns a configured port into a listen address.
///
/// Accepts a bare port (`8080`), a port with a leading colon (`:8080`) or a full address.
/// An empty value yields the default address.
pub fn normalize_listen_addr(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        DEFAULT_ADDR.to_string()
    } else if value.bytes().all(|b| b.is_ascii_digit()) {
        format!("0.0.0.0:{}", value)
    } else if let Some(port) = value.strip_prefix(':') {
        format!("0.0.0.0:{}", port)
    } else {
        value.to_string()
    }
}
