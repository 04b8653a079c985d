//! Service configuration
//!
//! Built once at startup from command line, environment, TOML file and
//! compiled defaults (in that priority order), then shared read-only.
//! External tool settings live here instead of in the process
//! environment, so child processes get exactly what the config says.

use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use vocalstrip_common::config::{default_out_dir, default_scratch_root, TomlConfig};
use vocalstrip_common::{Error, Result};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_FFMPEG_BIN: &str = "ffmpeg";
pub const DEFAULT_DEMUCS_BIN: &str = "demucs";
pub const DEFAULT_FFMPEG_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_DEMUCS_TIMEOUT_SECS: u64 = 3600;
pub const DEFAULT_MAX_CONCURRENT_SEPARATIONS: usize = 1;
pub const DEFAULT_LOG_TAIL_BYTES: usize = 8 * 1024;
pub const DEFAULT_RESPONSE_LOG_LIMIT: usize = 4 * 1024;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 200;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Forces torchaudio onto the soundfile decoder so demucs never probes an
/// audio device on a headless host.
pub const DEMUCS_BACKEND_ENV: (&str, &str) = ("TORCHAUDIO_USE_SOUNDFILE", "1");

/// Command-line arguments for vocalstrip-server
#[derive(Parser, Debug, Default)]
#[command(name = "vocalstrip-server")]
#[command(about = "Upload a song, get an instrumental back")]
#[command(version)]
pub struct Args {
    /// TOML config file (default: platform config dir)
    #[arg(short, long, env = "VOCALSTRIP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "VOCALSTRIP_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Transcoder executable
    #[arg(long, env = "FFMPEG_BIN")]
    pub ffmpeg_bin: Option<String>,

    /// Separation tool executable
    #[arg(long, env = "DEMUCS_BIN")]
    pub demucs_bin: Option<String>,

    /// Public base URL for download links (default: request scheme + host)
    #[arg(long, env = "SERVER_PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Scratch directory for per-request workspaces
    #[arg(long, env = "VOCALSTRIP_SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Directory served under /out
    #[arg(long, env = "VOCALSTRIP_OUT_DIR")]
    pub out_dir: Option<PathBuf>,

    /// Separation jobs allowed to run at once
    #[arg(long)]
    pub max_concurrent_separations: Option<usize>,

    /// Kill a transcoder run after this many seconds
    #[arg(long)]
    pub ffmpeg_timeout_secs: Option<u64>,

    /// Kill a separation run after this many seconds
    #[arg(long)]
    pub demucs_timeout_secs: Option<u64>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Resolved, validated service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub ffmpeg_bin: String,
    pub demucs_bin: String,
    pub public_url: Option<String>,
    pub scratch_dir: PathBuf,
    pub out_dir: PathBuf,
    pub ffmpeg_timeout: Duration,
    pub demucs_timeout: Duration,
    pub max_concurrent_separations: usize,
    /// Bytes of merged stdout/stderr kept per external process
    pub log_tail_bytes: usize,
    /// Bytes of log returned in an error response
    pub response_log_limit: usize,
    pub max_upload_bytes: usize,
    /// Environment added to the separation tool's child process
    pub demucs_env: BTreeMap<String, String>,
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            ffmpeg_bin: DEFAULT_FFMPEG_BIN.to_string(),
            demucs_bin: DEFAULT_DEMUCS_BIN.to_string(),
            public_url: None,
            scratch_dir: default_scratch_root(),
            out_dir: default_out_dir(),
            ffmpeg_timeout: Duration::from_secs(DEFAULT_FFMPEG_TIMEOUT_SECS),
            demucs_timeout: Duration::from_secs(DEFAULT_DEMUCS_TIMEOUT_SECS),
            max_concurrent_separations: DEFAULT_MAX_CONCURRENT_SEPARATIONS,
            log_tail_bytes: DEFAULT_LOG_TAIL_BYTES,
            response_log_limit: DEFAULT_RESPONSE_LOG_LIMIT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
            demucs_env: default_demucs_env(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

fn default_demucs_env() -> BTreeMap<String, String> {
    let (key, value) = DEMUCS_BACKEND_ENV;
    BTreeMap::from([(key.to_string(), value.to_string())])
}

/// Empty strings (e.g. `DEMUCS_BIN=`) count as unset
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl ServiceConfig {
    /// Merge CLI/env arguments over the TOML file over compiled defaults
    pub fn resolve(args: &Args, file: TomlConfig) -> Result<Self> {
        let defaults = Self::default();

        let demucs_env = match file.demucs_env {
            // The backend switch is always present unless the file overrides it
            Some(extra) => {
                let mut env = defaults.demucs_env;
                env.extend(extra);
                env
            }
            None => defaults.demucs_env,
        };

        let max_upload_bytes = match file.max_upload_mb {
            Some(mb) => mb.checked_mul(1024 * 1024).ok_or_else(|| {
                Error::Config(format!("max_upload_mb is too large: {}", mb))
            })?,
            None => defaults.max_upload_bytes,
        };

        let config = Self {
            host: non_empty(args.host.clone())
                .or(non_empty(file.host))
                .unwrap_or(defaults.host),
            port: args.port.or(file.port).unwrap_or(defaults.port),
            ffmpeg_bin: non_empty(args.ffmpeg_bin.clone())
                .or(non_empty(file.ffmpeg_bin))
                .unwrap_or(defaults.ffmpeg_bin),
            demucs_bin: non_empty(args.demucs_bin.clone())
                .or(non_empty(file.demucs_bin))
                .unwrap_or(defaults.demucs_bin),
            public_url: non_empty(args.public_url.clone())
                .or(non_empty(file.public_url))
                .map(|url| url.trim_end_matches('/').to_string()),
            scratch_dir: args
                .scratch_dir
                .clone()
                .or(file.scratch_dir)
                .unwrap_or(defaults.scratch_dir),
            out_dir: args.out_dir.clone().or(file.out_dir).unwrap_or(defaults.out_dir),
            ffmpeg_timeout: args
                .ffmpeg_timeout_secs
                .or(file.ffmpeg_timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(defaults.ffmpeg_timeout),
            demucs_timeout: args
                .demucs_timeout_secs
                .or(file.demucs_timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(defaults.demucs_timeout),
            max_concurrent_separations: args
                .max_concurrent_separations
                .or(file.max_concurrent_separations)
                .unwrap_or(defaults.max_concurrent_separations),
            log_tail_bytes: file.log_tail_bytes.unwrap_or(defaults.log_tail_bytes),
            response_log_limit: file.response_log_limit.unwrap_or(defaults.response_log_limit),
            max_upload_bytes,
            demucs_env,
            log_level: non_empty(args.log_level.clone())
                .or(non_empty(file.logging.level))
                .unwrap_or(defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_separations == 0 {
            return Err(Error::Config(
                "max_concurrent_separations must be at least 1".to_string(),
            ));
        }
        if self.ffmpeg_timeout.is_zero() || self.demucs_timeout.is_zero() {
            return Err(Error::Config("process timeouts must be non-zero".to_string()));
        }
        if self.log_tail_bytes == 0 {
            return Err(Error::Config("log_tail_bytes must be non-zero".to_string()));
        }
        if self.max_upload_bytes == 0 {
            return Err(Error::Config("max_upload_mb must be non-zero".to_string()));
        }
        if let Some(url) = &self.public_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::Config(format!(
                    "public_url must start with http:// or https://, got {}",
                    url
                )));
            }
        }
        Ok(())
    }

    /// `host:port` for the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
