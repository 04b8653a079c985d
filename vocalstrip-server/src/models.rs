//! Request models
//!
//! Form fields arrive as loose strings; they are validated once here into a
//! closed [`Strategy`] before any external tool runs.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::filter_graph::{DEFAULT_CUTOFF_HZ, MAX_CUTOFF_HZ, MIN_CUTOFF_HZ};

pub const DEFAULT_ENGINE: &str = "ffmpeg";
pub const DEFAULT_MODEL: &str = "htdemucs";
pub const DEFAULT_KEEP_BASS: bool = true;

/// Model names are passed to the separator as an argument, never a path
static MODEL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,63}$").expect("model pattern is a valid regex")
});

/// How an upload is turned into an instrumental
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    /// Karaoke filter through the transcoder
    Fast { keep_bass: bool, cutoff_hz: f64 },
    /// demucs two-stem separation with the named model
    ModelBased { model: String },
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Fast { .. } => "ffmpeg",
            Strategy::ModelBased { .. } => "demucs",
        }
    }
}

/// Rejected form input; the Display string is the response `error`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("No file")]
    MissingFile,

    #[error("Unknown engine: {0}")]
    UnknownEngine(String),

    #[error("Invalid aggression: {0}")]
    InvalidAggression(String),

    #[error("Invalid model: {0}")]
    InvalidModel(String),
}

/// Text fields of a `/process` upload, as received
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessForm {
    pub engine: Option<String>,
    pub model: Option<String>,
    pub keep_bass: Option<String>,
    pub aggression: Option<String>,
}

impl ProcessForm {
    /// Record a text field; unknown names are ignored
    pub fn set(&mut self, name: &str, value: String) {
        match name {
            "engine" => self.engine = Some(value),
            "model" => self.model = Some(value),
            "keepBass" => self.keep_bass = Some(value),
            "aggression" => self.aggression = Some(value),
            _ => {}
        }
    }

    /// Validate into a strategy
    ///
    /// Blank engine, model and aggression fall back to their defaults.
    /// `keepBass` is true only for the exact string `"true"`.
    pub fn strategy(&self) -> Result<Strategy, FormError> {
        let engine = blank_to_none(&self.engine).unwrap_or(DEFAULT_ENGINE);

        match engine {
            "ffmpeg" => Ok(Strategy::Fast {
                keep_bass: self
                    .keep_bass
                    .as_deref()
                    .map(|v| v == "true")
                    .unwrap_or(DEFAULT_KEEP_BASS),
                cutoff_hz: parse_cutoff(blank_to_none(&self.aggression))?,
            }),
            "demucs" => {
                let model = blank_to_none(&self.model).unwrap_or(DEFAULT_MODEL);
                if !MODEL_PATTERN.is_match(model) {
                    return Err(FormError::InvalidModel(model.to_string()));
                }
                Ok(Strategy::ModelBased {
                    model: model.to_string(),
                })
            }
            other => Err(FormError::UnknownEngine(other.to_string())),
        }
    }
}

fn blank_to_none(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_cutoff(raw: Option<&str>) -> Result<f64, FormError> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_CUTOFF_HZ);
    };
    match raw.parse::<f64>() {
        Ok(hz) if hz.is_finite() && (MIN_CUTOFF_HZ..=MAX_CUTOFF_HZ).contains(&hz) => Ok(hz),
        _ => Err(FormError::InvalidAggression(raw.to_string())),
    }
}

/// A validated upload, stored inside its workspace
#[derive(Debug, Clone)]
pub struct ProcessingRequest {
    pub upload_path: PathBuf,
    pub original_name: String,
    pub strategy: Strategy,
}
