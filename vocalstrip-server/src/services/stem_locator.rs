//! Accompaniment stem search
//!
//! demucs writes `{out}/{model}/{track}/no_vocals.wav` in two-stem mode, but
//! the exact layout depends on model and version, so the output tree is
//! searched instead of guessed.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Non-vocal stem names across separator versions
static ACCOMPANIMENT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(no[_ ]?vocals|accompaniment|instrumental)\.wav$")
        .expect("accompaniment pattern is a valid regex")
});

pub fn is_accompaniment_name(name: &str) -> bool {
    ACCOMPANIMENT_PATTERN.is_match(name)
}

/// All accompaniment files under `root`, in traversal order
///
/// Depth-first, entries sorted by file name, so the order is the same on
/// every filesystem.
pub fn find_accompaniments(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Error accessing separation output: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .map(is_accompaniment_name)
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect()
}

/// First accompaniment file under `root`, if any
pub fn find_accompaniment(root: &Path) -> Option<PathBuf> {
    let mut matches = find_accompaniments(root);
    if matches.len() > 1 {
        tracing::warn!(
            count = matches.len(),
            chosen = %matches[0].display(),
            "Multiple accompaniment stems found, using the first"
        );
    }
    if matches.is_empty() {
        None
    } else {
        Some(matches.swap_remove(0))
    }
}
