//! POST /process
//!
//! Streams the multipart upload into a fresh workspace, validates the form,
//! hands the request to the orchestrator and always releases the workspace
//! before answering.

use axum::{
    extract::{
        multipart::{Field, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{ApiError, ApiResult, PipelineError};
use crate::models::{FormError, ProcessForm, ProcessingRequest};
use crate::services::normalizer::upload_extension;
use crate::services::publisher::resolve_base_url;
use crate::services::Workspace;
use crate::AppState;

/// Multipart field carrying the audio
pub const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    pub ok: bool,
    pub download_url: String,
}

/// Upload as stored in the workspace
#[derive(Debug)]
struct StoredUpload {
    original_name: String,
    path: PathBuf,
    bytes: u64,
}

pub async fn process_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<ProcessResponse>> {
    let Ok(mut multipart) = multipart else {
        return Err(FormError::MissingFile.into());
    };
    let log_limit = state.orchestrator.config().response_log_limit;

    let workspace = state
        .orchestrator
        .open_workspace()
        .await
        .map_err(|e| ApiError::pipeline(e, log_limit))?;

    let result = handle_upload(&state, &headers, &mut multipart, &workspace).await;
    workspace.release().await;
    result
}

async fn handle_upload(
    state: &AppState,
    headers: &HeaderMap,
    multipart: &mut Multipart,
    workspace: &Workspace,
) -> ApiResult<Json<ProcessResponse>> {
    let log_limit = state.orchestrator.config().response_log_limit;
    let (upload, form) = receive_form(multipart, workspace).await?;

    let upload = upload.ok_or(FormError::MissingFile)?;
    let strategy = form.strategy()?;

    info!(
        request_id = %workspace.request_id(),
        original_name = %upload.original_name,
        bytes = upload.bytes,
        strategy = strategy.name(),
        "Upload received"
    );

    let request = ProcessingRequest {
        upload_path: upload.path,
        original_name: upload.original_name,
        strategy,
    };
    let base_url = base_url_for(state, headers);

    let artifact = state
        .orchestrator
        .process(&request, workspace, &base_url)
        .await
        .map_err(|e| ApiError::pipeline(e, log_limit))?;

    Ok(Json(ProcessResponse {
        ok: true,
        download_url: artifact.url,
    }))
}

/// Read every part: the first `file` part with a file name goes to disk,
/// plain parts into the form
///
/// A `file` part without `filename=` is a text field, not an upload.
async fn receive_form(
    multipart: &mut Multipart,
    workspace: &Workspace,
) -> ApiResult<(Option<StoredUpload>, ProcessForm)> {
    let mut upload = None;
    let mut form = ProcessForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field
            .file_name()
            .filter(|file_name| !file_name.is_empty())
            .map(str::to_string);

        if let Some(original_name) = file_name {
            if name != FILE_FIELD || upload.is_some() {
                debug!(field = %name, "Ignoring file part");
                continue;
            }
            upload = Some(store_upload(field, original_name, workspace).await?);
        } else {
            let value = field.text().await?;
            form.set(&name, value);
        }
    }

    Ok((upload, form))
}

async fn store_upload(
    mut field: Field<'_>,
    original_name: String,
    workspace: &Workspace,
) -> ApiResult<StoredUpload> {
    let path = workspace.path(&format!("upload.{}", upload_extension(&original_name)));

    let mut file = tokio::fs::File::create(&path)
        .await
        .map_err(PipelineError::Workspace)?;
    let mut bytes = 0u64;
    while let Some(chunk) = field.chunk().await? {
        file.write_all(&chunk)
            .await
            .map_err(PipelineError::Workspace)?;
        bytes += chunk.len() as u64;
    }
    file.flush().await.map_err(PipelineError::Workspace)?;

    Ok(StoredUpload {
        original_name,
        path,
        bytes,
    })
}

fn base_url_for(state: &AppState, headers: &HeaderMap) -> String {
    let config = state.orchestrator.config();
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    resolve_base_url(
        config.public_url.as_deref(),
        header("x-forwarded-proto"),
        header("host"),
        &format!("localhost:{}", config.port),
    )
}

pub fn process_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/process", post(process_upload))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}
