//! Error types for vocalstrip-server
//!
//! `PipelineError` covers everything that can go wrong once an upload has
//! been accepted. `ApiError` is what handlers return; it renders the
//! uniform `{ok:false, error, exitCode?, log?}` body.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::DEFAULT_RESPONSE_LOG_LIMIT;
use crate::models::FormError;
use crate::services::process_runner::tail_str;

/// Failure of a processing pipeline
///
/// Display strings double as the machine-readable `error` tag in
/// responses, so keep them stable.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Executable missing or not runnable
    #[error("{label} spawn error")]
    Spawn {
        label: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Non-zero exit, or zero exit without the declared output file
    #[error("{label} failed")]
    StageFailure {
        label: &'static str,
        exit_code: Option<i32>,
        log: String,
    },

    /// Process killed after running past its time budget
    #[error("{label} timed out")]
    Timeout {
        label: &'static str,
        after: Duration,
        log: String,
    },

    /// Separation succeeded but left no accompaniment stem
    #[error("no accompaniment file from demucs")]
    StemNotFound { log: String },

    /// Moving the result into the public directory failed
    #[error("publish failed: {0}")]
    Publish(#[source] std::io::Error),

    /// Scratch workspace could not be created or written
    #[error("workspace error: {0}")]
    Workspace(#[source] std::io::Error),
}

impl PipelineError {
    /// Short kind name for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Spawn { .. } => "spawn",
            PipelineError::StageFailure { .. } => "stage_failure",
            PipelineError::Timeout { .. } => "timeout",
            PipelineError::StemNotFound { .. } => "stem_not_found",
            PipelineError::Publish(_) => "publish",
            PipelineError::Workspace(_) => "workspace",
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            PipelineError::StageFailure { exit_code, .. } => *exit_code,
            _ => None,
        }
    }

    /// Diagnostic output worth showing the caller
    pub fn log(&self) -> Option<String> {
        match self {
            PipelineError::Spawn { source, .. } => Some(source.to_string()),
            PipelineError::StageFailure { log, .. }
            | PipelineError::Timeout { log, .. }
            | PipelineError::StemNotFound { log } => Some(log.clone()),
            PipelineError::Publish(_) | PipelineError::Workspace(_) => None,
        }
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid or missing client input (400)
    #[error("{0}")]
    BadRequest(String),

    /// Upload stream could not be read (status from the multipart parser)
    #[error("Upload failed: {0}")]
    Upload(#[from] MultipartError),

    /// Pipeline failure (500), log capped at `log_limit` bytes
    #[error("{source}")]
    Pipeline {
        source: PipelineError,
        log_limit: usize,
    },
}

impl ApiError {
    pub fn pipeline(source: PipelineError, log_limit: usize) -> Self {
        ApiError::Pipeline { source, log_limit }
    }
}

impl From<FormError> for ApiError {
    fn from(err: FormError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<PipelineError> for ApiError {
    fn from(source: PipelineError) -> Self {
        ApiError::pipeline(source, DEFAULT_RESPONSE_LOG_LIMIT)
    }
}

/// Error body shared by every failing endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    ok: false,
                    error: message,
                    exit_code: None,
                    log: None,
                },
            ),
            ApiError::Upload(ref err) => (
                err.status(),
                ErrorResponse {
                    ok: false,
                    error: format!("Upload failed: {}", err.body_text()),
                    exit_code: None,
                    log: None,
                },
            ),
            ApiError::Pipeline { source, log_limit } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    ok: false,
                    error: source.to_string(),
                    exit_code: source.exit_code(),
                    log: source
                        .log()
                        .map(|log| tail_str(&log, log_limit).to_string()),
                },
            ),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
