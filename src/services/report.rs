//! Missing-report and cache export CSV artifacts
//!
//! The missing report is both an output and an input: it is rewritten on
//! every reconciliation run and read back on the next one to compute the
//! "new since last report" delta, and the download command pulls its
//! magnet links from it.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use tracing::info;

use crate::db::LocalFileRecord;
use super::catalog::RemoteEntry;
use super::identity::extract_checksum;

const MISSING_HEADERS: [&str; 3] = ["Title", "Page Link", "Magnet Link"];
const CACHE_HEADERS: [&str; 2] = ["File Path", "CRC32"];

/// Write the missing-episodes report.
pub fn write_missing_report(path: &Path, missing: &[RemoteEntry]) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_path(path)
        .with_context(|| format!("failed to create report {}", path.display()))?;

    writer.write_record(MISSING_HEADERS)?;
    for entry in missing {
        writer.write_record([
            entry.title.as_str(),
            entry.page_link.as_str(),
            entry.magnet.as_deref().unwrap_or(""),
        ])?;
    }
    writer.flush()?;
    info!(path = %path.display(), entries = missing.len(), "Missing report written");
    Ok(())
}

/// Checksum set of a previously exported missing report. A report that
/// does not exist yet reads as the empty set.
pub fn read_previous_missing(path: &Path) -> Result<HashSet<String>> {
    if !path.exists() {
        return Ok(HashSet::new());
    }
    let mut reader = ReaderBuilder::new()
        .from_path(path)
        .with_context(|| format!("failed to read report {}", path.display()))?;

    let mut checksums = HashSet::new();
    for record in reader.records() {
        let record = record?;
        // Checksum is re-extracted from the title column
        if let Some(crc) = record.get(0).and_then(extract_checksum) {
            checksums.insert(crc);
        }
    }
    Ok(checksums)
}

/// Magnet links from the missing report, for download submission.
pub fn load_magnet_links(path: &Path) -> Result<Vec<String>> {
    anyhow::ensure!(
        path.exists(),
        "missing report {} not found, run the reconciliation first",
        path.display()
    );
    let mut reader = ReaderBuilder::new()
        .from_path(path)
        .with_context(|| format!("failed to read report {}", path.display()))?;

    let headers = reader.headers()?.clone();
    let magnet_column = headers
        .iter()
        .position(|h| h == "Magnet Link")
        .context("report has no Magnet Link column")?;

    let mut magnets = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(link) = record.get(magnet_column) {
            let link = link.trim();
            if link.starts_with("magnet:") {
                magnets.push(link.to_string());
            }
        }
    }
    Ok(magnets)
}

/// Export the local checksum cache for inspection.
pub fn export_cache_csv(path: &Path, records: &[LocalFileRecord]) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_path(path)
        .with_context(|| format!("failed to create export {}", path.display()))?;

    writer.write_record(CACHE_HEADERS)?;
    for record in records {
        writer.write_record([record.file_path.as_str(), record.crc32.as_str()])?;
    }
    writer.flush()?;
    info!(path = %path.display(), entries = records.len(), "Cache exported");
    Ok(())
}
