//! Request orchestration
//!
//! Owns the long-lived pieces (workspace manager, runner, pipelines,
//! publisher) and drives one validated request through the pipeline its
//! strategy selects.

use std::io;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};
use vocalstrip_common::uuid_utils;

use crate::config::ServiceConfig;
use crate::error::PipelineError;
use crate::models::{ProcessingRequest, Strategy};
use crate::pipeline::separation::{SeparationState, SeparationTracker, STAGE_PUBLISH};
use crate::pipeline::{FastPathPipeline, FilterGraph, SeparationPipeline, DELIVERY_EXTENSION};
use crate::services::{ProcessRunner, PublishedArtifact, ResultPublisher, Workspace, WorkspaceManager};

/// Base name used when nothing usable is left after sanitizing
pub const FALLBACK_BASE_NAME: &str = "input";
pub const MAX_BASE_NAME_CHARS: usize = 80;
pub const RESULT_INFIX: &str = "_instrumental_";

/// Original upload name reduced to a safe file-name stem
///
/// Drops any client-side directory and the last extension, replaces
/// everything outside ASCII alphanumerics, `-` and `_` with `_`.
pub fn sanitize_base_name(original_name: &str) -> String {
    let name = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name);
    let stem = match name.rfind('.') {
        Some(dot) => &name[..dot],
        None => name,
    };

    let sanitized: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_BASE_NAME_CHARS)
        .collect();

    if sanitized.trim_matches('_').is_empty() {
        FALLBACK_BASE_NAME.to_string()
    } else {
        sanitized
    }
}

/// `{base}_instrumental_{token}.m4a`, unique per call
pub fn output_file_name(original_name: &str) -> String {
    format!(
        "{}{}{}.{}",
        sanitize_base_name(original_name),
        RESULT_INFIX,
        uuid_utils::short_token(),
        DELIVERY_EXTENSION
    )
}

pub struct Orchestrator {
    config: Arc<ServiceConfig>,
    workspaces: WorkspaceManager,
    runner: ProcessRunner,
    fast_path: FastPathPipeline,
    separation: SeparationPipeline,
    publisher: ResultPublisher,
}

impl Orchestrator {
    /// Build the pipelines and create the scratch and output roots
    pub fn new(config: Arc<ServiceConfig>) -> io::Result<Self> {
        let workspaces = WorkspaceManager::new(&config.scratch_dir)?;
        let publisher = ResultPublisher::new(&config.out_dir)?;

        Ok(Self {
            runner: ProcessRunner::new(config.log_tail_bytes),
            fast_path: FastPathPipeline::new(config.ffmpeg_bin.clone(), config.ffmpeg_timeout),
            separation: SeparationPipeline::new(
                config.ffmpeg_bin.clone(),
                config.ffmpeg_timeout,
                config.demucs_bin.clone(),
                config.demucs_timeout,
                config.demucs_env.clone(),
                config.max_concurrent_separations,
            ),
            workspaces,
            publisher,
            config,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn publisher(&self) -> &ResultPublisher {
        &self.publisher
    }

    /// Fresh workspace for a new request
    pub async fn open_workspace(&self) -> Result<Workspace, PipelineError> {
        self.workspaces.allocate(uuid_utils::generate()).await
    }

    /// Run the request's pipeline and publish the result
    ///
    /// The caller owns `workspace` and releases it whatever this returns.
    pub async fn process(
        &self,
        request: &ProcessingRequest,
        workspace: &Workspace,
        base_url: &str,
    ) -> Result<PublishedArtifact, PipelineError> {
        let request_id = workspace.request_id();
        let file_name = output_file_name(&request.original_name);
        let started = Instant::now();

        info!(
            request_id = %request_id,
            strategy = request.strategy.name(),
            original_name = %request.original_name,
            output = %file_name,
            "Processing upload"
        );

        let result = self
            .run_strategy(request, workspace, &file_name, base_url)
            .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(artifact) => info!(
                request_id = %request_id,
                elapsed_ms,
                url = %artifact.url,
                "Request completed"
            ),
            Err(e) => warn!(
                request_id = %request_id,
                elapsed_ms,
                kind = e.kind(),
                error = %e,
                "Request failed"
            ),
        }

        result
    }

    async fn run_strategy(
        &self,
        request: &ProcessingRequest,
        workspace: &Workspace,
        file_name: &str,
        base_url: &str,
    ) -> Result<PublishedArtifact, PipelineError> {
        let output = workspace.path(file_name);

        match &request.strategy {
            Strategy::Fast {
                keep_bass,
                cutoff_hz,
            } => {
                let graph = FilterGraph::karaoke(*keep_bass, *cutoff_hz);
                let rendered = self
                    .fast_path
                    .run(&self.runner, &request.upload_path, &graph, &output)
                    .await?;
                self.publisher.publish(&rendered, file_name, base_url).await
            }
            Strategy::ModelBased { model } => {
                let mut tracker = SeparationTracker::new(workspace.request_id());
                let rendered = self
                    .separation
                    .run(
                        &self.runner,
                        &request.upload_path,
                        model,
                        workspace,
                        &output,
                        &mut tracker,
                    )
                    .await?;
                let artifact = self
                    .publisher
                    .publish(&rendered, file_name, base_url)
                    .await
                    .map_err(|e| tracker.fail(STAGE_PUBLISH, e))?;
                tracker.advance(SeparationState::Published);
                Ok(artifact)
            }
        }
    }
}
