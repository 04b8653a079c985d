//! Karaoke filter graph
//!
//! Center-channel cancellation: each output channel is one input channel
//! minus the other, which removes anything mixed dead center (usually the
//! lead vocal). A high-pass then trims the low end the subtraction smears.
//! With `keep_bass`, a low-passed copy of the original is mixed back in,
//! since bass and kick are usually centered too.

use std::fmt;

/// Low-pass cutoff for the preserved bass branch
pub const BASS_CUTOFF_HZ: u32 = 120;

/// Gain applied to the preserved bass branch
pub const BASS_GAIN: &str = "1.2";

pub const DEFAULT_CUTOFF_HZ: f64 = 140.0;
pub const MIN_CUTOFF_HZ: f64 = 1.0;
pub const MAX_CUTOFF_HZ: f64 = 20_000.0;

const STEREO: &str = "aformat=channel_layouts=stereo";
const CENTER_CANCEL: &str = "pan=stereo|c0=FL-FR|c1=FR-FL";

/// Filter expression for the transcoder's `-af` option
#[derive(Debug, Clone, PartialEq)]
pub struct FilterGraph {
    keep_bass: bool,
    cutoff_hz: f64,
}

impl FilterGraph {
    pub fn karaoke(keep_bass: bool, cutoff_hz: f64) -> Self {
        Self {
            keep_bass,
            cutoff_hz,
        }
    }

    pub fn keep_bass(&self) -> bool {
        self.keep_bass
    }

    pub fn cutoff_hz(&self) -> f64 {
        self.cutoff_hz
    }
}

impl fmt::Display for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let highpass = format!("highpass=f={}", self.cutoff_hz);

        if self.keep_bass {
            write!(
                f,
                "{STEREO},asplit=2[low][all];\
                 [low]lowpass=f={BASS_CUTOFF_HZ},volume={BASS_GAIN}[lb];\
                 [all]{CENTER_CANCEL},{highpass}[inst];\
                 [inst][lb]amix=inputs=2:duration=longest"
            )
        } else {
            write!(f, "{STEREO},{CENTER_CANCEL},{highpass}")
        }
    }
}
