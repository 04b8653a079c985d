//! Tests for TOML config loading
//!
//! Covers:
//! - Full and partial config files
//! - Explicit path that does not exist
//! - Rejection of unknown keys and malformed values

use std::path::Path;
use tempfile::TempDir;
use vocalstrip_common::config::TomlConfig;
use vocalstrip_common::Error;

#[test]
fn test_full_config_parses() {
    let content = r#"
        host = "127.0.0.1"
        port = 8080
        ffmpeg_bin = "/opt/ffmpeg/bin/ffmpeg"
        demucs_bin = "/opt/venv/bin/demucs"
        public_url = "https://strip.example.com"
        scratch_dir = "/var/tmp/vs"
        out_dir = "/srv/vs/out"
        ffmpeg_timeout_secs = 120
        demucs_timeout_secs = 900
        max_concurrent_separations = 2
        log_tail_bytes = 4096
        response_log_limit = 2048
        max_upload_mb = 50

        [demucs_env]
        TORCHAUDIO_USE_SOUNDFILE = "1"
        OMP_NUM_THREADS = "4"

        [logging]
        level = "debug"
    "#;

    let config = TomlConfig::from_toml_str(content, Path::new("test.toml")).unwrap();

    assert_eq!(config.host.as_deref(), Some("127.0.0.1"));
    assert_eq!(config.port, Some(8080));
    assert_eq!(config.demucs_bin.as_deref(), Some("/opt/venv/bin/demucs"));
    assert_eq!(config.public_url.as_deref(), Some("https://strip.example.com"));
    assert_eq!(config.max_concurrent_separations, Some(2));
    assert_eq!(config.logging.level.as_deref(), Some("debug"));

    let env = config.demucs_env.unwrap();
    assert_eq!(env.get("OMP_NUM_THREADS").map(String::as_str), Some("4"));
    assert_eq!(env.len(), 2);
}

#[test]
fn test_partial_config_leaves_rest_unset() {
    let config = TomlConfig::from_toml_str("port = 4000\n", Path::new("test.toml")).unwrap();

    assert_eq!(config.port, Some(4000));
    assert!(config.host.is_none());
    assert!(config.demucs_env.is_none());
    assert!(config.logging.level.is_none());
}

#[test]
fn test_empty_config_equals_default() {
    let config = TomlConfig::from_toml_str("", Path::new("test.toml")).unwrap();
    assert_eq!(config, TomlConfig::default());
}

#[test]
fn test_unknown_key_is_rejected() {
    let result = TomlConfig::from_toml_str("prot = 4000\n", Path::new("typo.toml"));
    match result {
        Err(Error::ConfigParse { path, .. }) => assert_eq!(path, Path::new("typo.toml")),
        other => panic!("Expected ConfigParse error, got {:?}", other),
    }
}

#[test]
fn test_wrong_type_is_rejected() {
    let result = TomlConfig::from_toml_str("port = \"eighty\"\n", Path::new("bad.toml"));
    assert!(matches!(result, Err(Error::ConfigParse { .. })));
}

#[test]
fn test_load_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "demucs_bin = \"demucs-gpu\"\n").unwrap();

    let (config, source) = TomlConfig::load_or_default(Some(&path)).unwrap();
    assert_eq!(source.as_deref(), Some(path.as_path()));
    assert_eq!(config.demucs_bin.as_deref(), Some("demucs-gpu"));
}

#[test]
fn test_explicit_missing_file_is_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("missing.toml");

    let result = TomlConfig::load_or_default(Some(&path));
    assert!(matches!(result, Err(Error::ConfigRead { .. })));
}
