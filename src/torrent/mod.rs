//! Download client integrations
//!
//! The core only ever talks to the [`DownloadSubmitter`] capability:
//! hand over magnet links, get back per-item accepted/duplicate/error.
//! Client-specific auth and protocol live entirely behind the trait.

pub mod qbittorrent;
pub mod transmission;

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::{ClientConfig, ClientKind};

pub use qbittorrent::QBittorrentClient;
pub use transmission::TransmissionClient;

/// BitTorrent info hash embedded in a magnet link
static INFO_HASH_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"xt=urn:btih:([a-fA-F0-9]{40})").unwrap());

/// Result of submitting one magnet link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    Duplicate,
    Failed(String),
}

/// Aggregated results of a submission batch
#[derive(Debug, Default)]
pub struct SubmitSummary {
    pub accepted: u32,
    pub duplicates: u32,
    /// (magnet, error) per failed submission
    pub failures: Vec<(String, String)>,
}

impl SubmitSummary {
    pub fn record(&mut self, magnet: &str, outcome: SubmitOutcome) {
        match outcome {
            SubmitOutcome::Accepted => self.accepted += 1,
            SubmitOutcome::Duplicate => self.duplicates += 1,
            SubmitOutcome::Failed(error) => self.failures.push((magnet.to_string(), error)),
        }
    }
}

/// Capability interface for download clients.
#[async_trait]
pub trait DownloadSubmitter: Send + Sync {
    /// Submit magnet links one at a time; a per-item failure never aborts
    /// the rest of the batch.
    async fn submit(&self, magnets: &[String]) -> Result<SubmitSummary>;
}

/// Lowercase info hash from a magnet link, if present.
pub fn info_hash_from_magnet(magnet: &str) -> Option<String> {
    INFO_HASH_REGEX
        .captures(magnet)
        .map(|caps| caps[1].to_lowercase())
}

/// Truncated magnet for log lines.
pub(crate) fn magnet_summary(magnet: &str) -> String {
    if magnet.len() > 50 {
        format!("{}...", &magnet[..50])
    } else {
        magnet.to_string()
    }
}

/// Connect the configured download client.
pub async fn connect_client(config: &ClientConfig) -> Result<Box<dyn DownloadSubmitter>> {
    match config.kind {
        ClientKind::QBittorrent => {
            Ok(Box::new(QBittorrentClient::connect(config).await?))
        }
        ClientKind::Transmission => {
            Ok(Box::new(TransmissionClient::connect(config).await?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_hash_extraction() {
        let magnet = "magnet:?xt=urn:btih:0123456789ABCDEF0123456789abcdef01234567&dn=ep";
        assert_eq!(
            info_hash_from_magnet(magnet).as_deref(),
            Some("0123456789abcdef0123456789abcdef01234567")
        );
    }

    #[test]
    fn test_info_hash_rejects_short_hashes() {
        assert_eq!(info_hash_from_magnet("magnet:?xt=urn:btih:abcdef"), None);
        assert_eq!(info_hash_from_magnet("not a magnet"), None);
    }

    #[test]
    fn test_summary_records_outcomes() {
        let mut summary = SubmitSummary::default();
        summary.record("m1", SubmitOutcome::Accepted);
        summary.record("m2", SubmitOutcome::Duplicate);
        summary.record("m3", SubmitOutcome::Failed("boom".to_string()));
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.failures, vec![("m3".to_string(), "boom".to_string())]);
    }

    #[test]
    fn test_magnet_summary_truncates() {
        let long = "m".repeat(80);
        assert_eq!(magnet_summary(&long).len(), 53);
        assert_eq!(magnet_summary("short"), "short");
    }
}
