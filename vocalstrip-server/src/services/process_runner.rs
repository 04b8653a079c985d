//! External process runner
//!
//! Runs one external tool per [`PipelineStage`]: no shell, arguments passed
//! as a list, stdout and stderr merged into a bounded tail buffer, child
//! killed on timeout or when the request future is dropped.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::PipelineError;

const READ_CHUNK_BYTES: usize = 4096;
const TRUNCATION_MARKER: &str = "[... earlier output truncated ...]\n";

/// One external process invocation
#[derive(Debug, Clone)]
pub struct PipelineStage {
    /// Diagnostic label, also the prefix of the error tag ("ffmpeg transcode")
    pub label: &'static str,
    pub program: String,
    pub args: Vec<OsString>,
    /// Added to the inherited environment of this child only
    pub env: Vec<(String, String)>,
    /// File that must exist after a zero exit for the stage to succeed
    pub expected_output: Option<PathBuf>,
    pub timeout: Duration,
}

impl PipelineStage {
    pub fn new(label: &'static str, program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            label,
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            expected_output: None,
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn envs<'a, I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn expect_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.expected_output = Some(path.into());
        self
    }
}

/// Outcome of a process that was spawned and ran to exit
#[derive(Debug, Clone)]
pub struct StageResult {
    pub success: bool,
    /// Merged stdout/stderr, last `log_tail_bytes` only
    pub log: String,
    /// None when the process was ended by a signal
    pub exit_code: Option<i32>,
    /// Declared output, set on success
    pub output: Option<PathBuf>,
}

impl StageResult {
    /// Turn an unsuccessful result into `PipelineError::StageFailure`
    pub fn require_success(self, label: &'static str) -> Result<StageResult, PipelineError> {
        if self.success {
            Ok(self)
        } else {
            Err(PipelineError::StageFailure {
                label,
                exit_code: self.exit_code,
                log: self.log,
            })
        }
    }
}

/// Bounded buffer keeping only the most recent bytes written to it
#[derive(Debug)]
pub struct LogTail {
    buf: Vec<u8>,
    capacity: usize,
    truncated: bool,
}

impl LogTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity.min(64 * 1024)),
            capacity,
            truncated: false,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
        if self.buf.len() > self.capacity {
            let excess = self.buf.len() - self.capacity;
            self.buf.drain(..excess);
            self.truncated = true;
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn into_string(self) -> String {
        let text = String::from_utf8_lossy(&self.buf);
        if self.truncated {
            format!("{}{}", TRUNCATION_MARKER, text)
        } else {
            text.into_owned()
        }
    }
}

/// Last `max_bytes` of `s`, cut on a char boundary
pub fn tail_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut start = s.len() - max_bytes;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

/// Spawns pipeline stages and collects their output
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    log_tail_bytes: usize,
}

impl ProcessRunner {
    pub fn new(log_tail_bytes: usize) -> Self {
        Self { log_tail_bytes }
    }

    /// Run a stage to completion
    ///
    /// `Ok` means the process ran and exited; check `success`. Spawn
    /// failures and timeouts are `Err`.
    pub async fn run(&self, stage: &PipelineStage) -> Result<StageResult, PipelineError> {
        debug!(
            stage = stage.label,
            program = %stage.program,
            args = ?stage.args,
            "Running external process"
        );

        let mut command = Command::new(&stage.program);
        command
            .args(&stage.args)
            .envs(stage.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| PipelineError::Spawn {
            label: stage.label,
            source,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut tail = LogTail::new(self.log_tail_bytes);

        let outcome = tokio::time::timeout(stage.timeout, async {
            collect_output(stdout, stderr, &mut tail, stage.label).await;
            child.wait().await
        })
        .await;

        let status = match outcome {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                warn!(stage = stage.label, error = %e, "Failed waiting for process");
                tail.push(format!("\nwait failed: {}\n", e).as_bytes());
                return Ok(StageResult {
                    success: false,
                    log: tail.into_string(),
                    exit_code: None,
                    output: None,
                });
            }
            Err(_) => {
                warn!(
                    stage = stage.label,
                    timeout_secs = stage.timeout.as_secs_f64(),
                    "Process timed out, killing"
                );
                if let Err(e) = child.kill().await {
                    warn!(stage = stage.label, error = %e, "Failed to kill timed-out process");
                }
                return Err(PipelineError::Timeout {
                    label: stage.label,
                    after: stage.timeout,
                    log: tail.into_string(),
                });
            }
        };

        let output_present = match &stage.expected_output {
            Some(path) => path_exists(path).await,
            None => true,
        };
        let success = status.success() && output_present;

        debug!(
            stage = stage.label,
            exit_code = ?status.code(),
            output_present,
            log_truncated = tail.is_truncated(),
            "External process finished"
        );

        Ok(StageResult {
            success,
            log: tail.into_string(),
            exit_code: status.code(),
            output: if success {
                stage.expected_output.clone()
            } else {
                None
            },
        })
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Read both pipes until EOF, interleaving chunks in arrival order
async fn collect_output<O, E>(
    mut stdout: Option<O>,
    mut stderr: Option<E>,
    tail: &mut LogTail,
    label: &'static str,
) where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut out_buf = [0u8; READ_CHUNK_BYTES];
    let mut err_buf = [0u8; READ_CHUNK_BYTES];

    while stdout.is_some() || stderr.is_some() {
        tokio::select! {
            read = read_some(&mut stdout, &mut out_buf), if stdout.is_some() => match read {
                Ok(0) | Err(_) => stdout = None,
                Ok(n) => {
                    debug!(stage = label, "{}", String::from_utf8_lossy(&out_buf[..n]).trim_end());
                    tail.push(&out_buf[..n]);
                }
            },
            read = read_some(&mut stderr, &mut err_buf), if stderr.is_some() => match read {
                Ok(0) | Err(_) => stderr = None,
                Ok(n) => {
                    debug!(stage = label, "{}", String::from_utf8_lossy(&err_buf[..n]).trim_end());
                    tail.push(&err_buf[..n]);
                }
            },
        }
    }
}

async fn read_some<R: AsyncRead + Unpin>(
    reader: &mut Option<R>,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    match reader {
        Some(r) => r.read(buf).await,
        None => std::future::pending().await,
    }
}
