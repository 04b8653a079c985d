//! Processing pipelines
//!
//! Both pipelines take an upload already stored in the request workspace and
//! leave an encoded result file in that workspace. Publishing is done by the
//! orchestrator.

pub mod fast_path;
pub mod filter_graph;
pub mod separation;

pub use fast_path::FastPathPipeline;
pub use filter_graph::FilterGraph;
pub use separation::{SeparationPipeline, SeparationState};

/// Container of every delivered result
pub const DELIVERY_EXTENSION: &str = "m4a";

/// Encoder settings for delivered results
pub const DELIVERY_CODEC_ARGS: [&str; 4] = ["-c:a", "aac", "-b:a", "192k"];
