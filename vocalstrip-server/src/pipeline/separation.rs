//! Model-based separation pipeline
//!
//! Upload → normalized wav → demucs two-stem split → accompaniment stem →
//! encoded result. Every step is one awaited call; the first failure ends
//! the run and is recorded on the [`SeparationTracker`].

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::DELIVERY_CODEC_ARGS;
use crate::error::PipelineError;
use crate::services::normalizer::Normalizer;
use crate::services::process_runner::{PipelineStage, ProcessRunner};
use crate::services::stem_locator::find_accompaniment;
use crate::services::workspace::Workspace;

pub const SEPARATION_LABEL: &str = "demucs";
pub const TRANSCODE_LABEL: &str = "ffmpeg transcode";

/// Workspace subdirectory the separator writes into
pub const SEPARATION_OUT_DIR: &str = "demucs_out";

/// Stage names recorded in [`SeparationState::Failed`]
pub const STAGE_NORMALIZE: &str = "normalize";
pub const STAGE_SEPARATE: &str = "separate";
pub const STAGE_LOCATE_STEM: &str = "locate-stem";
pub const STAGE_TRANSCODE: &str = "transcode";
pub const STAGE_PUBLISH: &str = "publish";

/// Progress of one separation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeparationState {
    Uploaded,
    Normalized,
    Separated,
    StemLocated,
    Transcoded,
    Published,
    Failed { stage: &'static str, reason: String },
}

impl SeparationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SeparationState::Published | SeparationState::Failed { .. }
        )
    }
}

/// Records and logs state transitions for one request
#[derive(Debug)]
pub struct SeparationTracker {
    request_id: Uuid,
    state: SeparationState,
}

impl SeparationTracker {
    pub fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            state: SeparationState::Uploaded,
        }
    }

    pub fn state(&self) -> &SeparationState {
        &self.state
    }

    pub fn advance(&mut self, next: SeparationState) {
        info!(
            request_id = %self.request_id,
            from = ?self.state,
            to = ?next,
            "Separation state changed"
        );
        self.state = next;
    }

    /// Move to `Failed` and hand the error back for propagation
    pub fn fail(&mut self, stage: &'static str, error: PipelineError) -> PipelineError {
        warn!(
            request_id = %self.request_id,
            stage,
            kind = error.kind(),
            error = %error,
            "Separation failed"
        );
        self.state = SeparationState::Failed {
            stage,
            reason: error.to_string(),
        };
        error
    }
}

#[derive(Debug, Clone)]
pub struct SeparationPipeline {
    normalizer: Normalizer,
    demucs_bin: String,
    demucs_env: BTreeMap<String, String>,
    demucs_timeout: Duration,
    ffmpeg_bin: String,
    ffmpeg_timeout: Duration,
    /// Bounds how many separator processes run at once
    gate: Arc<Semaphore>,
}

impl SeparationPipeline {
    pub fn new(
        ffmpeg_bin: impl Into<String>,
        ffmpeg_timeout: Duration,
        demucs_bin: impl Into<String>,
        demucs_timeout: Duration,
        demucs_env: BTreeMap<String, String>,
        max_concurrent: usize,
    ) -> Self {
        let ffmpeg_bin = ffmpeg_bin.into();
        Self {
            normalizer: Normalizer::new(ffmpeg_bin.clone(), ffmpeg_timeout),
            demucs_bin: demucs_bin.into(),
            demucs_env,
            demucs_timeout,
            ffmpeg_bin,
            ffmpeg_timeout,
            gate: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Separator slots not currently taken
    pub fn available_slots(&self) -> usize {
        self.gate.available_permits()
    }

    /// Two-stem separation of `wav` into `out_dir`
    pub fn separation_stage(&self, wav: &Path, model: &str, out_dir: &Path) -> PipelineStage {
        PipelineStage::new(SEPARATION_LABEL, &self.demucs_bin, self.demucs_timeout)
            .args(["--two-stems=vocals", "-n", model, "-o"])
            .arg(out_dir)
            .arg(wav)
            .envs(&self.demucs_env)
    }

    /// Encode the accompaniment stem into the delivery format
    pub fn transcode_stage(&self, stem: &Path, output: &Path) -> PipelineStage {
        PipelineStage::new(TRANSCODE_LABEL, &self.ffmpeg_bin, self.ffmpeg_timeout)
            .args(["-hide_banner", "-y", "-i"])
            .arg(stem)
            .args(DELIVERY_CODEC_ARGS)
            .arg(output)
            .expect_output(output)
    }

    /// Run every step up to `Transcoded`, leaving the result at `output`
    pub async fn run(
        &self,
        runner: &ProcessRunner,
        upload: &Path,
        model: &str,
        workspace: &Workspace,
        output: &Path,
        tracker: &mut SeparationTracker,
    ) -> Result<PathBuf, PipelineError> {
        let wav = self
            .normalizer
            .normalize(runner, upload, workspace)
            .await
            .map_err(|e| tracker.fail(STAGE_NORMALIZE, e))?;
        tracker.advance(SeparationState::Normalized);

        // Only the normalized wav is read from here on
        if let Err(e) = tokio::fs::remove_file(upload).await {
            warn!(upload = %upload.display(), error = %e, "Failed to remove upload");
        }

        let out_dir = workspace.path(SEPARATION_OUT_DIR);
        let separation_log = self
            .separate(runner, &wav, model, &out_dir)
            .await
            .map_err(|e| tracker.fail(STAGE_SEPARATE, e))?;
        tracker.advance(SeparationState::Separated);

        let stem = locate_stem(out_dir, separation_log)
            .await
            .map_err(|e| tracker.fail(STAGE_LOCATE_STEM, e))?;
        debug!(stem = %stem.display(), "Accompaniment stem located");
        tracker.advance(SeparationState::StemLocated);

        runner
            .run(&self.transcode_stage(&stem, output))
            .await
            .and_then(|result| result.require_success(TRANSCODE_LABEL))
            .map_err(|e| tracker.fail(STAGE_TRANSCODE, e))?;
        tracker.advance(SeparationState::Transcoded);

        Ok(output.to_path_buf())
    }

    /// Run the separator under the concurrency gate; returns its log
    async fn separate(
        &self,
        runner: &ProcessRunner,
        wav: &Path,
        model: &str,
        out_dir: &Path,
    ) -> Result<String, PipelineError> {
        if self.gate.available_permits() == 0 {
            info!("All separator slots busy, waiting");
        }
        let _permit = self.gate.acquire().await.map_err(|_| PipelineError::Spawn {
            label: SEPARATION_LABEL,
            source: io::Error::new(io::ErrorKind::Other, "separation gate closed"),
        })?;

        info!(model, "Running separation");
        let result = runner
            .run(&self.separation_stage(wav, model, out_dir))
            .await?
            .require_success(SEPARATION_LABEL)?;

        Ok(result.log)
    }
}

async fn locate_stem(out_dir: PathBuf, separation_log: String) -> Result<PathBuf, PipelineError> {
    let found = tokio::task::spawn_blocking(move || find_accompaniment(&out_dir))
        .await
        .map_err(|e| PipelineError::Workspace(io::Error::new(io::ErrorKind::Other, e)))?;

    found.ok_or(PipelineError::StemNotFound { log: separation_log })
}
