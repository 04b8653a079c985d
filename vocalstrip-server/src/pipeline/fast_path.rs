//! Fast path: one transcoder pass with the karaoke filter

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use super::filter_graph::FilterGraph;
use super::DELIVERY_CODEC_ARGS;
use crate::error::PipelineError;
use crate::services::process_runner::{PipelineStage, ProcessRunner};

pub const FAST_PATH_LABEL: &str = "ffmpeg";

#[derive(Debug, Clone)]
pub struct FastPathPipeline {
    ffmpeg_bin: String,
    timeout: Duration,
}

impl FastPathPipeline {
    pub fn new(ffmpeg_bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            timeout,
        }
    }

    pub fn stage(&self, input: &Path, graph: &FilterGraph, output: &Path) -> PipelineStage {
        PipelineStage::new(FAST_PATH_LABEL, &self.ffmpeg_bin, self.timeout)
            .args(["-hide_banner", "-y", "-i"])
            .arg(input)
            .args(["-map", "a:0", "-af"])
            .arg(graph.to_string())
            .args(DELIVERY_CODEC_ARGS)
            .arg(output)
            .expect_output(output)
    }

    /// Render `input` through the karaoke graph into `output`
    pub async fn run(
        &self,
        runner: &ProcessRunner,
        input: &Path,
        graph: &FilterGraph,
        output: &Path,
    ) -> Result<PathBuf, PipelineError> {
        info!(
            keep_bass = graph.keep_bass(),
            cutoff_hz = graph.cutoff_hz(),
            "Running karaoke filter"
        );

        runner
            .run(&self.stage(input, graph, output))
            .await?
            .require_success(FAST_PATH_LABEL)?;

        Ok(output.to_path_buf())
    }
}
