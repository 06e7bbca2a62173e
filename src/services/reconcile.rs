//! Reconciliation engine
//!
//! Pure set computation between the local inventory and the remote
//! catalog, plus the rename workflow that aligns on-disk names with
//! canonical catalog titles. Owns no persistent state; every run
//! recomputes from the two inputs, so results are idempotent.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{info, warn};

use crate::db::{ChecksumCache, LocalFileRecord};
use super::catalog::RemoteEntry;
use super::fs_utils::sanitize_title;

/// Outcome of the missing/present computation
#[derive(Debug)]
pub struct Reconciliation {
    /// Remote entries absent locally, in remote fetch order
    pub missing: Vec<RemoteEntry>,
    /// Checksums present on both sides
    pub present: HashSet<String>,
}

/// Compute the reconciled difference between local and remote.
///
/// `missing` preserves the insertion order of the remote fetch so
/// repeated runs against an unchanged catalog produce a stable diff.
pub fn reconcile(local: &HashSet<String>, remote: &[RemoteEntry]) -> Reconciliation {
    let mut missing = Vec::new();
    let mut present = HashSet::new();
    for entry in remote {
        if local.contains(&entry.checksum) {
            present.insert(entry.checksum.clone());
        } else {
            missing.push(entry.clone());
        }
    }
    Reconciliation { missing, present }
}

/// Entries missing now that were not in the previously exported report.
/// Purely informational.
pub fn new_since_last<'a>(
    missing: &'a [RemoteEntry],
    previous_missing: &HashSet<String>,
) -> Vec<&'a RemoteEntry> {
    missing
        .iter()
        .filter(|entry| !previous_missing.contains(&entry.checksum))
        .collect()
}

/// One planned rename, derived by joining the checksum cache against the
/// episode index. Exists only for the duration of a rename operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamePlanEntry {
    pub current_path: PathBuf,
    pub checksum: String,
    pub target_path: PathBuf,
}

/// Build the rename plan for every cached file whose name differs from
/// the sanitized canonical title of its checksum. Local checksums with
/// no index match are skipped.
pub fn build_rename_plan(
    records: &[LocalFileRecord],
    titles: &HashMap<String, String>,
) -> Vec<RenamePlanEntry> {
    let mut plan = Vec::new();
    for record in records {
        let Some(title) = titles.get(&record.crc32) else { continue };
        let sanitized = sanitize_title(title);
        if sanitized.is_empty() {
            warn!(checksum = %record.crc32, "Canonical title sanitizes to nothing, skipping");
            continue;
        }
        let current = PathBuf::from(&record.file_path);
        let target = current
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(&sanitized);
        if current != target {
            plan.push(RenamePlanEntry {
                current_path: current,
                checksum: record.crc32.clone(),
                target_path: target,
            });
        }
    }
    plan
}

/// Per-entry results of applying a rename plan
#[derive(Debug, Default)]
pub struct RenameReport {
    pub renamed: Vec<RenamePlanEntry>,
    pub failed: Vec<(RenamePlanEntry, String)>,
}

/// Apply a rename plan. Each entry either succeeds (and the cache row
/// follows the file to its new path) or is reported as failed; one
/// failure does not abort the remaining entries.
pub async fn apply_rename_plan(
    plan: Vec<RenamePlanEntry>,
    cache: &ChecksumCache,
) -> Result<RenameReport> {
    let mut report = RenameReport::default();
    for entry in plan {
        if entry.target_path.exists() {
            warn!(
                from = %entry.current_path.display(),
                to = %entry.target_path.display(),
                "Rename target already exists"
            );
            report.failed.push((entry, "target file already exists".to_string()));
            continue;
        }
        if let Err(e) = std::fs::rename(&entry.current_path, &entry.target_path) {
            warn!(
                from = %entry.current_path.display(),
                to = %entry.target_path.display(),
                error = %e,
                "Rename failed"
            );
            report.failed.push((entry, e.to_string()));
            continue;
        }
        cache
            .update_path(
                &entry.current_path.to_string_lossy(),
                &entry.target_path.to_string_lossy(),
            )
            .await?;
        info!(
            from = %entry.current_path.display(),
            to = %entry.target_path.display(),
            "Renamed"
        );
        report.renamed.push(entry);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(crc: &str) -> RemoteEntry {
        RemoteEntry {
            checksum: crc.to_string(),
            title: format!("[One Pace] {crc} [1080p][{crc}].mkv"),
            page_link: format!("https://nyaa.si/view/{crc}"),
            magnet: None,
        }
    }

    #[test]
    fn test_reconcile_missing_in_fetch_order() {
        let local: HashSet<String> = ["AAAA1111", "BBBB2222"].iter().map(|s| s.to_string()).collect();
        let remote = vec![entry("AAAA1111"), entry("CCCC3333"), entry("DDDD4444")];

        let result = reconcile(&local, &remote);
        let missing: Vec<&str> = result.missing.iter().map(|e| e.checksum.as_str()).collect();
        assert_eq!(missing, vec!["CCCC3333", "DDDD4444"]);
        assert_eq!(result.present, HashSet::from(["AAAA1111".to_string()]));
    }

    #[test]
    fn test_reconcile_is_stable_across_runs() {
        let local = HashSet::new();
        let remote = vec![entry("CCCC3333"), entry("AAAA1111"), entry("BBBB2222")];
        let a = reconcile(&local, &remote);
        let b = reconcile(&local, &remote);
        assert_eq!(a.missing, b.missing);
        // Fetch order, not sorted order
        assert_eq!(a.missing[0].checksum, "CCCC3333");
    }

    #[test]
    fn test_new_since_last() {
        let missing = vec![entry("AAAA1111"), entry("BBBB2222")];
        let previous: HashSet<String> = HashSet::from(["AAAA1111".to_string()]);
        let new = new_since_last(&missing, &previous);
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].checksum, "BBBB2222");
    }

    #[test]
    fn test_rename_plan_skips_matching_names() {
        let records = vec![LocalFileRecord {
            file_path: "/media/[One Pace] Ep 1 [1080p][AAAA1111].mkv".to_string(),
            crc32: "AAAA1111".to_string(),
        }];
        let titles = HashMap::from([(
            "AAAA1111".to_string(),
            "[One Pace] Ep 1 [1080p][AAAA1111].mkv".to_string(),
        )]);
        assert!(build_rename_plan(&records, &titles).is_empty());
    }

    #[test]
    fn test_rename_plan_targets_sanitized_title() {
        let records = vec![LocalFileRecord {
            file_path: "/media/ep1.mkv".to_string(),
            crc32: "AAAA1111".to_string(),
        }];
        let titles = HashMap::from([(
            "AAAA1111".to_string(),
            "[One Pace] Ep 1: Romance? [1080p][AAAA1111].mkv".to_string(),
        )]);

        let plan = build_rename_plan(&records, &titles);
        assert_eq!(plan.len(), 1);
        assert_eq!(
            plan[0].target_path,
            PathBuf::from("/media/[One Pace] Ep 1 Romance [1080p][AAAA1111].mkv")
        );
    }

    #[test]
    fn test_rename_plan_skips_unindexed_checksums() {
        let records = vec![LocalFileRecord {
            file_path: "/media/unknown.mkv".to_string(),
            crc32: "FFFF9999".to_string(),
        }];
        assert!(build_rename_plan(&records, &HashMap::new()).is_empty());
    }

    #[tokio::test]
    async fn test_scan_reconcile_report_pipeline() {
        use crate::services::inventory::InventoryBuilder;
        use crate::services::report::{read_previous_missing, write_missing_report};
        use tokio_util::sync::CancellationToken;

        // CRC32 of "123456789" is CBF43926, and the file already carries
        // its canonical name
        let dir = tempfile::tempdir().unwrap();
        let title = "[One Pace] Ep 1 [1080p][CBF43926].mkv";
        std::fs::write(dir.path().join(title), b"123456789").unwrap();

        let cache = ChecksumCache::open_in_memory().await.unwrap();
        let builder = InventoryBuilder::new(cache.clone());
        let inventory = builder.scan(dir.path(), &CancellationToken::new()).await.unwrap();
        assert_eq!(
            inventory.checksums,
            HashSet::from(["CBF43926".to_string()])
        );

        let remote = vec![entry("CBF43926"), entry("BBBB2222")];
        let result = reconcile(&inventory.checksums, &remote);
        let missing: Vec<&str> = result.missing.iter().map(|e| e.checksum.as_str()).collect();
        assert_eq!(missing, vec!["BBBB2222"]);
        assert_eq!(result.present, HashSet::from(["CBF43926".to_string()]));

        // The on-disk name matches the canonical title, so nothing renames
        let titles = HashMap::from([("CBF43926".to_string(), title.to_string())]);
        let plan = build_rename_plan(&cache.all_records().await.unwrap(), &titles);
        assert!(plan.is_empty());

        let report_path = dir.path().join("missing.csv");
        write_missing_report(&report_path, &result.missing).unwrap();
        assert_eq!(
            read_previous_missing(&report_path).unwrap(),
            HashSet::from(["BBBB2222".to_string()])
        );
    }

    #[tokio::test]
    async fn test_apply_rename_plan_updates_cache_and_survives_failures() {
        let dir = tempfile::tempdir().unwrap();
        let ok_src = dir.path().join("a.mkv");
        let blocked_src = dir.path().join("b.mkv");
        let blocked_target = dir.path().join("taken.mkv");
        std::fs::write(&ok_src, b"a").unwrap();
        std::fs::write(&blocked_src, b"b").unwrap();
        std::fs::write(&blocked_target, b"occupied").unwrap();

        let cache = ChecksumCache::open_in_memory().await.unwrap();
        cache.insert(&ok_src.to_string_lossy(), "AAAA1111").await.unwrap();
        cache.insert(&blocked_src.to_string_lossy(), "BBBB2222").await.unwrap();

        let plan = vec![
            RenamePlanEntry {
                current_path: blocked_src.clone(),
                checksum: "BBBB2222".to_string(),
                target_path: blocked_target.clone(),
            },
            RenamePlanEntry {
                current_path: ok_src.clone(),
                checksum: "AAAA1111".to_string(),
                target_path: dir.path().join("renamed.mkv"),
            },
        ];

        let report = apply_rename_plan(plan, &cache).await.unwrap();
        // The blocked entry fails, the later entry still applies
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.renamed.len(), 1);
        assert!(dir.path().join("renamed.mkv").exists());
        assert_eq!(
            cache
                .checksum_for_path(&dir.path().join("renamed.mkv").to_string_lossy())
                .await
                .unwrap()
                .as_deref(),
            Some("AAAA1111")
        );
    }
}
