//! Result publishing
//!
//! Moves a finished file into the public output directory (served under
//! `/out`) and builds its download URL.

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::PipelineError;

/// URL prefix the output directory is served under
pub const PUBLIC_PREFIX: &str = "out";

/// A file now reachable at `url`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedArtifact {
    pub file_name: String,
    pub path: PathBuf,
    pub url: String,
}

/// `{base}/out/{name}`
pub fn download_url(base_url: &str, file_name: &str) -> String {
    format!(
        "{}/{}/{}",
        base_url.trim_end_matches('/'),
        PUBLIC_PREFIX,
        file_name
    )
}

/// Base URL for download links
///
/// A configured public URL wins. Otherwise the inbound request's scheme
/// (from a proxy's `X-Forwarded-Proto`, else http) and `Host` are used.
pub fn resolve_base_url(
    configured: Option<&str>,
    forwarded_proto: Option<&str>,
    host: Option<&str>,
    fallback_host: &str,
) -> String {
    if let Some(url) = configured {
        return url.trim_end_matches('/').to_string();
    }

    let scheme = forwarded_proto
        .and_then(|p| p.split(',').next())
        .map(str::trim)
        .filter(|p| *p == "http" || *p == "https")
        .unwrap_or("http");
    let host = host
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .unwrap_or(fallback_host);

    format!("{}://{}", scheme, host)
}

/// Owns the public output directory
#[derive(Debug, Clone)]
pub struct ResultPublisher {
    out_dir: PathBuf,
}

impl ResultPublisher {
    /// Create the publisher, creating the output directory if missing
    pub fn new(out_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let out_dir = out_dir.into();
        std::fs::create_dir_all(&out_dir)?;
        Ok(Self { out_dir })
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Move `temp_output` to `{out_dir}/{file_name}`
    ///
    /// Uses rename when possible. Across filesystems (scratch on tmpfs) the
    /// file is copied to a hidden partial name first and renamed into place,
    /// so a half-written file is never visible under its public name.
    pub async fn publish(
        &self,
        temp_output: &Path,
        file_name: &str,
        base_url: &str,
    ) -> Result<PublishedArtifact, PipelineError> {
        let target = self.out_dir.join(file_name);

        if let Err(rename_err) = tokio::fs::rename(temp_output, &target).await {
            debug!(
                error = %rename_err,
                "Rename into output dir failed, falling back to copy"
            );
            self.copy_into_place(temp_output, &target, file_name)
                .await
                .map_err(PipelineError::Publish)?;
        }

        let url = download_url(base_url, file_name);
        info!(file = %file_name, url = %url, "Result published");

        Ok(PublishedArtifact {
            file_name: file_name.to_string(),
            path: target,
            url,
        })
    }

    async fn copy_into_place(&self, source: &Path, target: &Path, file_name: &str) -> io::Result<()> {
        let partial = self.out_dir.join(format!(".{}.partial", file_name));

        if let Err(e) = tokio::fs::copy(source, &partial).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
        if let Err(e) = tokio::fs::rename(&partial, target).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
        if let Err(e) = tokio::fs::remove_file(source).await {
            // Source sits in the workspace, which is removed anyway
            warn!(source = %source.display(), error = %e, "Failed to remove copied source");
        }
        Ok(())
    }
}
