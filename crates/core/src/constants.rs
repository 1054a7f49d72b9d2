//! Constants used throughout the Depot core crate.
//!
//! Location names are fixed so that an existing cache directory keeps working across releases.

/// Directory (below the cache directory) holding the identity index.
pub const IDENTITY_INDEX_DIR: &str = "ids";

/// Directory (below the cache directory) holding the checksum index.
pub const CHECKSUM_INDEX_DIR: &str = "sha256sum";

/// Default directory name for stored files, below the user's home directory.
pub const DEFAULT_BASE_DIR_NAME: &str = ".depot";

/// Default cache directory, below the user's home directory.
pub const DEFAULT_CACHE_DIR: &str = ".cache/depot";

/// Default configuration file, below the user's home directory.
pub const DEFAULT_CONFIG_FILE: &str = ".config/depot.toml";

/// Default listen address.
pub const DEFAULT_ADDR: &str = "0.0.0.0:8080";
