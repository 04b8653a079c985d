//! Per-request scratch workspaces
//!
//! Each request gets `{scratch_root}/{request_id}/`. Everything the request
//! writes (upload, normalized wav, separation output, rendered result)
//! lives there until the workspace is released or dropped.

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::PipelineError;

/// Allocates request workspaces under one scratch root
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    /// Create the manager, creating the scratch root if missing
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh directory for `request_id`
    ///
    /// Fails if the directory already exists rather than sharing it.
    pub async fn allocate(&self, request_id: Uuid) -> Result<Workspace, PipelineError> {
        let dir = self.root.join(request_id.to_string());
        tokio::fs::create_dir(&dir)
            .await
            .map_err(PipelineError::Workspace)?;

        debug!(request_id = %request_id, dir = %dir.display(), "Workspace allocated");

        Ok(Workspace {
            request_id,
            dir,
            released: false,
        })
    }
}

/// Scratch directory owned by one request
#[derive(Debug)]
pub struct Workspace {
    request_id: Uuid,
    dir: PathBuf,
    released: bool,
}

impl Workspace {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of `name` inside the workspace
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Delete the workspace and everything in it
    ///
    /// Best effort: failures are logged, never returned.
    pub async fn release(mut self) {
        self.released = true;
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => debug!(request_id = %self.request_id, "Workspace released"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                request_id = %self.request_id,
                dir = %self.dir.display(),
                error = %e,
                "Failed to remove workspace"
            ),
        }
    }
}

impl Drop for Workspace {
    // Covers requests whose future was dropped mid-flight (client hung up)
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!(request_id = %self.request_id, "Workspace removed on drop"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                request_id = %self.request_id,
                dir = %self.dir.display(),
                error = %e,
                "Failed to remove workspace on drop"
            ),
        }
    }
}
