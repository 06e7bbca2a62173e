//! Application configuration management
//!
//! Everything is loaded from environment variables once at startup and
//! threaded through call sites explicitly; there is no ambient global
//! state. `RUN_DOCKER` switches the tool to non-interactive mode, where
//! prompts auto-answer and the media root defaults to `/media`.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use crate::services::identity::{QualityGate, QualityPolicy};

/// Listing hosts the catalog query URL may point at
pub const ALLOWED_CATALOG_HOSTS: &[&str] = &["https://nyaa.si", "https://nyaa.land"];

/// Default catalog site
pub const DEFAULT_BASE_URL: &str = "https://nyaa.si";

/// Supported download clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    QBittorrent,
    Transmission,
}

impl ClientKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "qbittorrent" => Some(Self::QBittorrent),
            "transmission" => Some(Self::Transmission),
            _ => None,
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Self::Transmission => 9091,
            Self::QBittorrent => 8080,
        }
    }
}

/// Connection settings for a download client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub kind: ClientKind,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub download_folder: Option<String>,
    pub tags: Vec<String>,
    pub category: Option<String>,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Catalog site root, e.g. `https://nyaa.si`
    pub base_url: String,

    /// Query URL for the on-demand reconciliation fetch (no page param)
    pub query_url: String,

    /// Search term for the full-catalog index refresh
    pub refresh_query: String,

    /// Non-interactive mode (`RUN_DOCKER`)
    pub non_interactive: bool,

    /// Local checksum cache database file
    pub cache_db_path: PathBuf,

    /// Episode index database file
    pub index_db_path: PathBuf,

    /// Missing-report CSV artifact
    pub missing_report_path: PathBuf,

    /// Cache CSV export artifact
    pub cache_export_path: PathBuf,

    /// Accepted resolution band
    pub quality: QualityPolicy,

    /// Required provenance marker, e.g. `[One Pace]`
    pub provenance_marker: String,

    /// Fixed delay between catalog page requests
    pub request_delay: Duration,

    /// Timeout applied to every HTTP request
    pub http_timeout: Duration,

    /// Index age beyond which a refresh is suggested, and within which a
    /// forced refresh is skipped
    pub index_max_age: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let base_url =
            env::var("CATALOG_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let query_url = env::var("CATALOG_QUERY_URL")
            .unwrap_or_else(|_| format!("{base_url}/?f=0&c=0_0&q=one+pace+1080p&o=asc"));

        let quality = match env::var("QUALITY_POLICY") {
            Ok(value) => parse_quality_policy(&value)
                .with_context(|| format!("invalid QUALITY_POLICY '{value}'"))?,
            Err(_) => QualityPolicy::PreferredWithFallback { preferred: 1080, fallback: 720 },
        };

        Ok(Self {
            base_url,
            query_url,
            refresh_query: env::var("REFRESH_QUERY").unwrap_or_else(|_| "one pace".to_string()),
            non_interactive: env::var("RUN_DOCKER").is_ok(),
            cache_db_path: env_path("CACHE_DB_PATH", "crc32_files.db"),
            index_db_path: env_path("INDEX_DB_PATH", "episodes_index.db"),
            missing_report_path: env_path("MISSING_REPORT_PATH", "Ace-Pace_Missing.csv"),
            cache_export_path: env_path("CACHE_EXPORT_PATH", "Ace-Pace_DB.csv"),
            quality,
            provenance_marker: env::var("PROVENANCE_MARKER")
                .unwrap_or_else(|_| "[One Pace]".to_string()),
            request_delay: Duration::from_millis(env_u64("REQUEST_DELAY_MS", 200)?),
            http_timeout: Duration::from_secs(env_u64("HTTP_TIMEOUT_SECS", 30)?),
            index_max_age: Duration::from_secs(env_u64("INDEX_MAX_AGE_MINUTES", 60)? * 60),
        })
    }

    /// The quality gate configured for this run.
    pub fn quality_gate(&self) -> QualityGate {
        QualityGate::new(self.quality, self.provenance_marker.clone())
    }

    /// Validate that a query URL points at a recognized listing host.
    /// The only configuration error that is fatal before any work starts.
    pub fn validate_query_url(url: &str) -> Result<()> {
        if ALLOWED_CATALOG_HOSTS.iter().any(|host| url.starts_with(host)) {
            Ok(())
        } else {
            Err(anyhow!(
                "query URL must point at one of {}",
                ALLOWED_CATALOG_HOSTS.join(", ")
            ))
        }
    }

    /// Media root default in non-interactive mode.
    pub fn default_media_root(&self) -> Option<PathBuf> {
        self.non_interactive.then(|| PathBuf::from("/media"))
    }

    /// Assemble download-client settings from CLI values with environment
    /// overrides (the environment wins in non-interactive deployments).
    pub fn client_config(
        &self,
        cli_client: Option<&str>,
        cli_host: Option<&str>,
        cli_port: Option<u16>,
        cli_username: Option<&str>,
        cli_password: Option<&str>,
        cli_download_folder: Option<&str>,
        tags: Vec<String>,
        category: Option<String>,
    ) -> Result<ClientConfig> {
        let kind_name = env::var("TORRENT_CLIENT")
            .ok()
            .or_else(|| cli_client.map(str::to_string))
            .context("no download client configured (--client or TORRENT_CLIENT)")?;
        let kind = ClientKind::parse(&kind_name)
            .with_context(|| format!("unknown download client '{kind_name}'"))?;

        let host = env::var("TORRENT_HOST")
            .ok()
            .or_else(|| cli_host.map(str::to_string))
            .unwrap_or_else(|| "localhost".to_string());
        let port = match env::var("TORRENT_PORT").ok().and_then(|p| p.parse().ok()) {
            Some(port) => port,
            None => cli_port.unwrap_or_else(|| kind.default_port()),
        };
        let username = env::var("TORRENT_USER")
            .ok()
            .or_else(|| cli_username.map(str::to_string))
            .unwrap_or_default();
        let password = env::var("TORRENT_PASSWORD")
            .ok()
            .or_else(|| cli_password.map(str::to_string))
            .unwrap_or_default();
        let download_folder = cli_download_folder
            .map(str::to_string)
            .or_else(|| self.non_interactive.then(|| "/media".to_string()));

        Ok(ClientConfig {
            kind,
            host,
            port,
            username,
            password,
            download_folder,
            tags,
            category,
        })
    }
}

/// Parse a quality policy string: `1080` (exact) or `1080+720`
/// (preferred with fallback).
pub fn parse_quality_policy(value: &str) -> Result<QualityPolicy> {
    match value.split_once('+') {
        Some((preferred, fallback)) => Ok(QualityPolicy::PreferredWithFallback {
            preferred: preferred.trim().parse()?,
            fallback: fallback.trim().parse()?,
        }),
        None => Ok(QualityPolicy::Exact(value.trim().parse()?)),
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    env::var(key).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(default))
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(value) => value.parse().with_context(|| format!("invalid {key} '{value}'")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quality_policy() {
        assert_eq!(parse_quality_policy("1080").unwrap(), QualityPolicy::Exact(1080));
        assert_eq!(
            parse_quality_policy("1080+720").unwrap(),
            QualityPolicy::PreferredWithFallback { preferred: 1080, fallback: 720 }
        );
        assert!(parse_quality_policy("best").is_err());
    }

    #[test]
    fn test_query_url_validation() {
        assert!(Config::validate_query_url("https://nyaa.si/?q=one+pace").is_ok());
        assert!(Config::validate_query_url("https://nyaa.land/?q=one+pace").is_ok());
        assert!(Config::validate_query_url("https://example.com/?q=one+pace").is_err());
    }

    #[test]
    fn test_client_kind_parsing_and_ports() {
        assert_eq!(ClientKind::parse("qBittorrent"), Some(ClientKind::QBittorrent));
        assert_eq!(ClientKind::parse("TRANSMISSION"), Some(ClientKind::Transmission));
        assert_eq!(ClientKind::parse("deluge"), None);
        assert_eq!(ClientKind::Transmission.default_port(), 9091);
        assert_eq!(ClientKind::QBittorrent.default_port(), 8080);
    }
}
