//! # vocalstrip common library
//!
//! Shared code for the vocalstrip service:
//! - Error and result types
//! - TOML configuration loading and platform default locations
//! - Token/UUID helpers used for collision-free file names

pub mod config;
pub mod error;
pub mod uuid_utils;

pub use error::{Error, Result};
