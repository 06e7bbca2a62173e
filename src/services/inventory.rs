//! Local inventory builder
//!
//! Walks a directory tree for recognized video files and resolves each to
//! a content checksum, consulting the durable cache first so only new
//! files get hashed. Unreadable files are skipped and logged; the scan
//! never aborts over a single bad file, and cancellation between files
//! keeps everything already cached.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::db::ChecksumCache;
use super::checksum::checksum_file;
use super::fs_utils::{is_video_file, normalize_path};

/// A second physical file hashed to a checksum already owned by a
/// different cached path. Reported, never silently resolved: overwriting
/// would corrupt the missing/present computation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("checksum {checksum} already recorded for {existing_path}, also computed for {new_path}")]
pub struct ChecksumConflict {
    pub checksum: String,
    pub existing_path: String,
    pub new_path: String,
}

/// Result of one inventory scan
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Every checksum present under the scan root
    pub checksums: HashSet<String>,
    pub total_files: u32,
    pub cached_files: u32,
    pub hashed_files: u32,
    pub skipped_files: u32,
    pub conflicts: Vec<ChecksumConflict>,
    pub cancelled: bool,
}

impl ScanOutcome {
    /// Whether the scan ran to the end of the walk. An interrupted scan
    /// holds a partial checksum set and must not drive a report write.
    pub fn is_complete(&self) -> bool {
        !self.cancelled
    }
}

/// Builds the local inventory against the checksum cache
pub struct InventoryBuilder {
    cache: ChecksumCache,
}

impl InventoryBuilder {
    pub fn new(cache: ChecksumCache) -> Self {
        Self { cache }
    }

    /// Count video files under `root` and how many are already cached.
    pub async fn count_files(&self, root: &Path) -> Result<(u32, u32)> {
        let mut total = 0u32;
        let mut recorded = 0u32;
        for path in video_files(root) {
            total += 1;
            let Ok(normalized) = normalize_path(&path) else { continue };
            if self.cache.contains_path(&normalized.to_string_lossy()).await? {
                recorded += 1;
            }
        }
        Ok((total, recorded))
    }

    /// Scan `root`, returning the set of local checksums.
    pub async fn scan(&self, root: &Path, cancel: &CancellationToken) -> Result<ScanOutcome> {
        anyhow::ensure!(root.is_dir(), "scan root {} is not a directory", root.display());

        let mut outcome = ScanOutcome::default();
        for path in video_files(root) {
            if cancel.is_cancelled() {
                info!("Inventory scan cancelled, keeping partial results");
                outcome.cancelled = true;
                break;
            }
            outcome.total_files += 1;

            let normalized = match normalize_path(&path) {
                Ok(p) => p,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unresolvable path");
                    outcome.skipped_files += 1;
                    continue;
                }
            };
            let key = normalized.to_string_lossy().to_string();

            if let Some(crc) = self.cache.checksum_for_path(&key).await? {
                outcome.checksums.insert(crc);
                outcome.cached_files += 1;
                continue;
            }

            debug!(path = %key, "Computing checksum");
            let crc = match checksum_file(&normalized) {
                Ok(crc) => crc,
                Err(e) => {
                    warn!(path = %key, error = %e, "Skipping unreadable file");
                    outcome.skipped_files += 1;
                    continue;
                }
            };

            // Uniqueness invariant: one canonical path per checksum
            match self.cache.path_for_checksum(&crc).await? {
                Some(existing) if existing != key => {
                    warn!(
                        checksum = %crc,
                        existing = %existing,
                        duplicate = %key,
                        "Duplicate content detected, cache entry left untouched"
                    );
                    outcome.conflicts.push(ChecksumConflict {
                        checksum: crc.clone(),
                        existing_path: existing,
                        new_path: key,
                    });
                }
                _ => {
                    self.cache
                        .insert(&key, &crc)
                        .await
                        .with_context(|| format!("failed to cache checksum for {key}"))?;
                    outcome.hashed_files += 1;
                }
            }
            outcome.checksums.insert(crc);
        }

        info!(
            total = outcome.total_files,
            cached = outcome.cached_files,
            hashed = outcome.hashed_files,
            skipped = outcome.skipped_files,
            conflicts = outcome.conflicts.len(),
            "Inventory scan complete"
        );
        Ok(outcome)
    }
}

/// Recognized video files under a root, in walk order.
fn video_files(root: &Path) -> impl Iterator<Item = std::path::PathBuf> {
    WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file() && is_video_file(e.path()))
        .map(|e| e.path().to_path_buf())
}
