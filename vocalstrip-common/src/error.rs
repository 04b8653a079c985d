//! Common error types for vocalstrip

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for vocalstrip operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by vocalstrip crates
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file could not be read
    #[error("Cannot read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for our schema
    #[error("Cannot parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Configuration value failed validation
    #[error("Configuration error: {0}")]
    Config(String),
}
