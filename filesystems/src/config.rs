// Engine configuration
// Loaded from JSON; every field has a default so partial files work

use openntfs_core::NtfsError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default cap on symbolic links followed during one path resolution.
pub const DEFAULT_SYMLINK_DEPTH_LIMIT: u32 = 8;

/// Tunables for a mounted volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NtfsConfig {
    /// Resolution fails once this many symbolic links have been followed.
    pub symlink_depth_limit: u32,
    /// Keep the last directory record emitted so a repeated read with the
    /// same key skips the index walk.
    pub lookup_cache: bool,
    /// Drop the `\??\X:` prefix from link targets so they resolve from the
    /// volume root.
    pub strip_dos_device_prefix: bool,
}

impl Default for NtfsConfig {
    fn default() -> Self {
        Self {
            symlink_depth_limit: DEFAULT_SYMLINK_DEPTH_LIMIT,
            lookup_cache: true,
            strip_dos_device_prefix: true,
        }
    }
}

impl NtfsConfig {
    pub fn from_json_str(json: &str) -> Result<Self, NtfsError> {
        let config: NtfsConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, NtfsError> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), NtfsError> {
        if self.symlink_depth_limit == 0 {
            return Err(NtfsError::Configuration(
                "symlink_depth_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
