//! Input normalization for the separation tool
//!
//! demucs decodes its input itself and some decoder backends dispatch on
//! file extension, so uploads are stored under a known audio extension and
//! pre-converted to 16-bit 44.1 kHz stereo wav.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::PipelineError;
use crate::services::process_runner::{PipelineStage, ProcessRunner};
use crate::services::workspace::Workspace;

pub const NORMALIZED_FILE_NAME: &str = "input_demucs.wav";
pub const NORMALIZE_LABEL: &str = "ffmpeg preconvert";

/// Used when the upload name carries no recognizable audio extension
pub const DEFAULT_UPLOAD_EXTENSION: &str = "mp3";

pub const SAMPLE_RATE_HZ: u32 = 44_100;
pub const CHANNELS: u32 = 2;
pub const SAMPLE_FORMAT: &str = "s16";

const KNOWN_AUDIO_EXTENSIONS: &[&str] = &[
    "aac", "aif", "aiff", "alac", "flac", "m4a", "mka", "mp3", "mp4", "oga", "ogg", "opus",
    "wav", "webm", "wma",
];

/// Extension to store an upload under, lowercased
pub fn upload_extension(original_name: &str) -> String {
    Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|ext| KNOWN_AUDIO_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or_else(|| DEFAULT_UPLOAD_EXTENSION.to_string())
}

/// Converts uploads to the fixed wav format the separator expects
#[derive(Debug, Clone)]
pub struct Normalizer {
    ffmpeg_bin: String,
    timeout: Duration,
}

impl Normalizer {
    pub fn new(ffmpeg_bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            timeout,
        }
    }

    /// Transcoder invocation writing `output`
    pub fn stage(&self, input: &Path, output: &Path) -> PipelineStage {
        PipelineStage::new(NORMALIZE_LABEL, &self.ffmpeg_bin, self.timeout)
            .args(["-hide_banner", "-y", "-i"])
            .arg(input)
            .args(["-vn", "-ac"])
            .arg(CHANNELS.to_string())
            .arg("-ar")
            .arg(SAMPLE_RATE_HZ.to_string())
            .args(["-sample_fmt", SAMPLE_FORMAT])
            .arg(output)
            .expect_output(output)
    }

    /// Write `input_demucs.wav` into the workspace and return its path
    pub async fn normalize(
        &self,
        runner: &ProcessRunner,
        input: &Path,
        workspace: &Workspace,
    ) -> Result<PathBuf, PipelineError> {
        let output = workspace.path(NORMALIZED_FILE_NAME);
        runner
            .run(&self.stage(input, &output))
            .await?
            .require_success(NORMALIZE_LABEL)?;
        Ok(output)
    }
}
