//! Configuration file loading and default locations
//!
//! Settings resolve in this priority order (highest first):
//! 1. Command-line argument
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default
//!
//! Tiers 1 and 2 are handled by the binary's argument parser. This module
//! owns tier 3 (locating and parsing the TOML file) and the platform
//! dependent parts of tier 4.

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Application directory name used under the platform config dir
pub const APP_DIR_NAME: &str = "vocalstrip";

/// Scratch directory name created under the system temp root
pub const SCRATCH_DIR_NAME: &str = "vocalstrip_tmp";

/// Bootstrap configuration loaded from TOML
///
/// Every field is optional. Missing fields fall through to compiled
/// defaults in the server crate.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TomlConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Transcoder executable (name on PATH or absolute path)
    pub ffmpeg_bin: Option<String>,
    /// Separation tool executable (name on PATH or absolute path)
    pub demucs_bin: Option<String>,
    /// Base URL used for download links instead of the request's host
    pub public_url: Option<String>,
    pub scratch_dir: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
    pub ffmpeg_timeout_secs: Option<u64>,
    pub demucs_timeout_secs: Option<u64>,
    pub max_concurrent_separations: Option<usize>,
    pub log_tail_bytes: Option<usize>,
    pub response_log_limit: Option<usize>,
    pub max_upload_mb: Option<usize>,
    /// Extra environment for the separation tool child process only
    pub demucs_env: Option<BTreeMap<String, String>>,
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (e.g. "info", "vocalstrip_server=debug")
    pub level: Option<String>,
}

impl TomlConfig {
    /// Parse TOML text
    pub fn from_toml_str(content: &str, origin: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|source| Error::ConfigParse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Read and parse a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content, path)
    }

    /// Load the config file if one can be found, otherwise defaults.
    ///
    /// An explicitly requested file must exist and parse. A file found in a
    /// default location must parse; absence of any file is not an error.
    /// Returns the path that was loaded so the caller can log it once
    /// logging is up.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let source = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => default_config_file(),
        };

        match source {
            Some(path) => Ok((Self::load(&path)?, Some(path))),
            None => Ok((Self::default(), None)),
        }
    }
}

/// First existing config file among the platform default locations
pub fn default_config_file() -> Option<PathBuf> {
    candidate_config_files().into_iter().find(|p| p.is_file())
}

/// Platform config file locations, in lookup order
pub fn candidate_config_files() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join(APP_DIR_NAME).join("config.toml"));
    }
    if cfg!(target_os = "linux") {
        candidates.push(PathBuf::from("/etc").join(APP_DIR_NAME).join("config.toml"));
    }
    candidates
}

/// Default scratch root: `{system temp}/vocalstrip_tmp`
pub fn default_scratch_root() -> PathBuf {
    std::env::temp_dir().join(SCRATCH_DIR_NAME)
}

/// Default public output directory: `./out`
pub fn default_out_dir() -> PathBuf {
    PathBuf::from("out")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_root_under_temp_dir() {
        let root = default_scratch_root();
        assert!(root.starts_with(std::env::temp_dir()));
        assert!(root.ends_with(SCRATCH_DIR_NAME));
    }

    #[test]
    fn test_candidates_are_toml_files() {
        for candidate in candidate_config_files() {
            assert_eq!(candidate.file_name().unwrap(), "config.toml");
        }
    }
}
