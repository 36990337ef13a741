//! Database configuration via `svdb.toml`
//!
//! The config file lives in the store directory. On first open a commented
//! default is written; to change settings, edit the file and reopen.

use serde::{Deserialize, Serialize};
use std::path::Path;
use svdb_core::{SvdbError, SvdbResult};
use svdb_storage::Durability;

/// Config file name placed in the store directory.
pub const CONFIG_FILE_NAME: &str = "svdb.toml";

/// Default number of vectors at which search switches to a parallel scan.
pub const DEFAULT_PARALLEL_SCAN_THRESHOLD: usize = 4096;

/// Default number of superseded log entries before open-time compaction.
pub const DEFAULT_COMPACTION_MIN_DEAD: u64 = 1024;

/// Store configuration loaded from `svdb.toml`.
///
/// # Example
///
/// ```toml
/// dimension = 384
/// durability = "standard"
/// parallel_scan_threshold = 4096
/// compact_on_open = true
/// compaction_min_dead = 1024
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SvdbConfig {
    /// Vector dimension. Required to create a store; checked against the
    /// persisted dimension when reopening.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,
    /// Durability mode: `"standard"` or `"always"`.
    #[serde(default = "default_durability_str")]
    pub durability: String,
    /// Snapshot size at which search scores vectors on the rayon pool.
    #[serde(default = "default_parallel_scan_threshold")]
    pub parallel_scan_threshold: usize,
    /// Compact both logs during open when enough entries are dead.
    #[serde(default = "default_true")]
    pub compact_on_open: bool,
    /// Dead entries a log must hold before open-time compaction runs.
    #[serde(default = "default_compaction_min_dead")]
    pub compaction_min_dead: u64,
}

fn default_durability_str() -> String {
    "standard".to_string()
}

fn default_parallel_scan_threshold() -> usize {
    DEFAULT_PARALLEL_SCAN_THRESHOLD
}

fn default_true() -> bool {
    true
}

fn default_compaction_min_dead() -> u64 {
    DEFAULT_COMPACTION_MIN_DEAD
}

impl Default for SvdbConfig {
    fn default() -> Self {
        Self {
            dimension: None,
            durability: default_durability_str(),
            parallel_scan_threshold: DEFAULT_PARALLEL_SCAN_THRESHOLD,
            compact_on_open: true,
            compaction_min_dead: DEFAULT_COMPACTION_MIN_DEAD,
        }
    }
}

impl SvdbConfig {
    /// Default config with the given dimension.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: Some(dimension),
            ..Self::default()
        }
    }

    /// Parse the durability string into a [`Durability`].
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not `"standard"` or `"always"`.
    pub fn durability_mode(&self) -> SvdbResult<Durability> {
        match self.durability.as_str() {
            "standard" => Ok(Durability::Standard),
            "always" => Ok(Durability::Always),
            other => Err(SvdbError::invalid_argument(format!(
                "Invalid durability mode '{}' in svdb.toml. Expected \"standard\" or \"always\".",
                other
            ))),
        }
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# SVDB store configuration
#
# Vector dimension. Required the first time a store is opened; afterwards
# it must match the dimension recorded in embeddings.log.
# dimension = 384

# Durability mode: "standard" (default) or "always"
#   "standard" = each record handed to the OS, may lose the tail on power loss
#   "always"   = fsync every record
durability = "standard"

# Stores with at least this many vectors are searched in parallel.
parallel_scan_threshold = 4096

# Rewrite the logs on open once this many entries are superseded.
compact_on_open = true
compaction_min_dead = 1024
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> SvdbResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SvdbError::io(format!("Failed to read config file '{}'", path.display()), e)
        })?;
        let config: SvdbConfig = toml::from_str(&content).map_err(|e| {
            SvdbError::invalid_argument(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        // Validate the durability value eagerly
        config.durability_mode()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> SvdbResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                SvdbError::io(
                    format!("Failed to write default config file '{}'", path.display()),
                    e,
                )
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> SvdbResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SvdbError::storage(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            SvdbError::io(format!("Failed to write config file '{}'", path.display()), e)
        })
    }
}
