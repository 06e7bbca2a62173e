//! Filesystem path helpers
//!
//! Every read or write against the checksum cache must go through
//! [`normalize_path`] first. The cache is keyed by path, so two spellings
//! of the same file (symlink vs. real path, relative vs. absolute) would
//! otherwise miss the cache and get hashed twice.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Video file extensions we recognize
pub const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi"];

/// Resolve a path to its canonical absolute form.
///
/// Symlinks are resolved and relative components removed, so repeated
/// calls on any spelling of the same file agree. Fails with NotFound when
/// the path does not point at an existing filesystem entry.
pub fn normalize_path(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path)
        .with_context(|| format!("failed to resolve path {}", path.display()))
}

/// Whether a path has one of the recognized video container extensions.
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Sanitize a catalog title into a filesystem-safe filename.
pub fn sanitize_title(title: &str) -> String {
    sanitize_filename::sanitize(title).trim().to_string()
}
