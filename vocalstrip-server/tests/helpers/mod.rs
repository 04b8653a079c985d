//! Shared fixtures for API integration tests
//!
//! External tools are replaced by small shell scripts written into a temp
//! directory. The fake transcoder writes its own argument list (one per
//! line) into its output file, so a downloaded result shows exactly how the
//! transcoder was invoked.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request},
    response::Response,
    Router,
};
use serde_json::Value;
use tempfile::TempDir;
use vocalstrip_server::{build_router, AppState, Orchestrator, ServiceConfig};

pub const BOUNDARY: &str = "vocalstrip-test-boundary";
pub const TEST_HOST: &str = "strip.test";

/// Writes its argument list into the last argument
pub const FAKE_FFMPEG: &str = r#"#!/bin/sh
for last in "$@"; do :; done
printf '%s\n' "$@" > "$last"
echo "fake ffmpeg wrote $last" >&2
"#;

pub const FAILING_FFMPEG: &str = r#"#!/bin/sh
echo "Invalid data found when processing input" >&2
exit 1
"#;

/// Floods stderr before failing
pub const NOISY_FAILING_FFMPEG: &str = r#"#!/bin/sh
i=0
while [ $i -lt 2000 ]; do
  echo "frame error line $i" >&2
  i=$((i+1))
done
exit 1
"#;

/// Writes a two-stem layout under the `-o` directory
pub const FAKE_DEMUCS: &str = r#"#!/bin/sh
out=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "-o" ]; then out="$arg"; fi
  prev="$arg"
done
mkdir -p "$out/htdemucs/input_demucs"
printf 'voice' > "$out/htdemucs/input_demucs/vocals.wav"
printf 'stem' > "$out/htdemucs/input_demucs/no_vocals.wav"
echo "backend=$TORCHAUDIO_USE_SOUNDFILE"
echo "Separated tracks will be stored in $out/htdemucs"
"#;

/// Like `FAKE_DEMUCS`, but fails while the raw upload is still on disk
pub const UPLOAD_CHECKING_DEMUCS: &str = r#"#!/bin/sh
out=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "-o" ]; then out="$arg"; fi
  prev="$arg"
done
for leftover in "$(dirname "$out")"/upload.*; do
  if [ -e "$leftover" ]; then
    echo "upload still present: $leftover"
    exit 4
  fi
done
mkdir -p "$out/htdemucs/input_demucs"
printf 'stem' > "$out/htdemucs/input_demucs/no_vocals.wav"
"#;

/// Succeeds without writing any stem
pub const STEMLESS_DEMUCS: &str = r#"#!/bin/sh
echo "backend=$TORCHAUDIO_USE_SOUNDFILE"
echo "model loaded, nothing written"
exit 0
"#;

pub const SLOW_TOOL: &str = r#"#!/bin/sh
echo "working"
exec sleep 5
"#;

/// Router plus the directories it works in
pub struct TestApp {
    pub router: Router,
    pub scratch_dir: PathBuf,
    pub out_dir: PathBuf,
    _root: TempDir,
}

impl TestApp {
    /// Number of entries left in the scratch root
    pub fn scratch_entries(&self) -> usize {
        fs::read_dir(&self.scratch_dir).unwrap().count()
    }

    pub fn published_files(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.out_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

/// Fake tool scripts to install
pub struct Tools {
    pub ffmpeg: Option<&'static str>,
    pub demucs: Option<&'static str>,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            ffmpeg: Some(FAKE_FFMPEG),
            demucs: Some(FAKE_DEMUCS),
        }
    }
}

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Build an app around the given tools; `None` points at a missing binary
pub fn test_app(tools: Tools, customize: impl FnOnce(&mut ServiceConfig)) -> TestApp {
    let root = TempDir::new().unwrap();
    let bin_dir = root.path().join("bin");
    fs::create_dir_all(&bin_dir).unwrap();

    let tool_path = |name: &str, script: Option<&str>| match script {
        Some(body) => write_script(&bin_dir, name, body).to_string_lossy().into_owned(),
        None => bin_dir.join(format!("missing-{}", name)).to_string_lossy().into_owned(),
    };

    let mut config = ServiceConfig {
        ffmpeg_bin: tool_path("ffmpeg", tools.ffmpeg),
        demucs_bin: tool_path("demucs", tools.demucs),
        scratch_dir: root.path().join("scratch"),
        out_dir: root.path().join("out"),
        ffmpeg_timeout: Duration::from_secs(20),
        demucs_timeout: Duration::from_secs(20),
        ..Default::default()
    };
    customize(&mut config);

    let scratch_dir = config.scratch_dir.clone();
    let out_dir = config.out_dir.clone();
    let orchestrator = Orchestrator::new(Arc::new(config)).unwrap();

    TestApp {
        router: build_router(AppState::new(Arc::new(orchestrator))),
        scratch_dir,
        out_dir,
        _root: root,
    }
}

/// One multipart part
pub enum Part<'a> {
    File {
        name: &'a str,
        file_name: &'a str,
        content: &'a [u8],
    },
    Text {
        name: &'a str,
        value: &'a str,
    },
}

pub fn upload(file_name: &str) -> Part<'_> {
    Part::File {
        name: "file",
        file_name,
        content: b"ID3\x03\x00fake-audio-payload",
    }
}

pub fn text<'a>(name: &'a str, value: &'a str) -> Part<'a> {
    Part::Text { name, value }
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File {
                name,
                file_name,
                content,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name, file_name
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(content);
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}",
                        name, value
                    )
                    .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// POST /process with the given parts
pub fn process_request(parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/process")
        .header(header::HOST, TEST_HOST)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::HOST, TEST_HOST)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body")
        .to_vec()
}

pub async fn json_body(response: Response) -> Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

/// Path part of a download URL (`/out/<name>`)
pub fn download_path(url: &str) -> &str {
    let prefix = format!("http://{}", TEST_HOST);
    assert!(url.starts_with(&prefix), "unexpected download URL {}", url);
    &url[prefix.len()..]
}
