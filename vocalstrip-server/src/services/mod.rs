//! Building blocks shared by the processing pipelines

pub mod normalizer;
pub mod process_runner;
pub mod publisher;
pub mod stem_locator;
pub mod workspace;

pub use normalizer::Normalizer;
pub use process_runner::{PipelineStage, ProcessRunner, StageResult};
pub use publisher::{PublishedArtifact, ResultPublisher};
pub use workspace::{Workspace, WorkspaceManager};
