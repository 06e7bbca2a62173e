//! qBittorrent Web API client
//!
//! Uses the v2 Web API with cookie-session auth. Duplicate submissions
//! are detected by querying the info hash before adding; duplicates get
//! the configured tags applied rather than being re-added.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::ClientConfig;
use super::{DownloadSubmitter, SubmitOutcome, SubmitSummary, info_hash_from_magnet, magnet_summary};

/// Delay between successive submissions
const SUBMIT_DELAY: Duration = Duration::from_millis(100);

pub struct QBittorrentClient {
    http: Client,
    base_url: String,
    download_folder: Option<String>,
    tags: Vec<String>,
    category: Option<String>,
}

impl QBittorrentClient {
    /// Connect and authenticate against the Web API.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let base_url = format!("http://{}:{}", config.host, config.port);
        let http = Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;

        let response = http
            .post(format!("{base_url}/api/v2/auth/login"))
            .form(&[
                ("username", config.username.as_str()),
                ("password", config.password.as_str()),
            ])
            .send()
            .await
            .context("failed to connect to qBittorrent")?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() || body.trim() == "Fails." {
            return Err(anyhow!("qBittorrent login failed (status {status})"));
        }
        info!(url = %base_url, "Connected to qBittorrent");

        Ok(Self {
            http,
            base_url,
            download_folder: config.download_folder.clone(),
            tags: config.tags.clone(),
            category: config.category.clone(),
        })
    }

    fn tags_joined(&self) -> Option<String> {
        (!self.tags.is_empty()).then(|| self.tags.join(","))
    }

    async fn create_tags(&self) -> Result<()> {
        if let Some(tags) = self.tags_joined() {
            self.http
                .post(format!("{}/api/v2/torrents/createTags", self.base_url))
                .form(&[("tags", tags.as_str())])
                .send()
                .await?
                .error_for_status()?;
        }
        Ok(())
    }

    /// Whether a torrent with this info hash is already in the client.
    async fn torrent_exists(&self, info_hash: &str) -> Result<bool> {
        let response = self
            .http
            .get(format!("{}/api/v2/torrents/info", self.base_url))
            .query(&[("hashes", info_hash)])
            .send()
            .await?
            .error_for_status()?;
        let torrents: Value = response.json().await?;
        Ok(torrents.as_array().is_some_and(|list| !list.is_empty()))
    }

    async fn tag_existing(&self, info_hash: &str) -> Result<()> {
        if let Some(tags) = self.tags_joined() {
            self.http
                .post(format!("{}/api/v2/torrents/addTags", self.base_url))
                .form(&[("hashes", info_hash), ("tags", tags.as_str())])
                .send()
                .await?
                .error_for_status()?;
        }
        Ok(())
    }

    async fn add_magnet(&self, magnet: &str) -> Result<()> {
        let mut form = vec![("urls", magnet.to_string())];
        if let Some(folder) = &self.download_folder {
            form.push(("savepath", folder.clone()));
        }
        if let Some(tags) = self.tags_joined() {
            form.push(("tags", tags));
        }
        if let Some(category) = &self.category {
            form.push(("category", category.clone()));
        }
        self.http
            .post(format!("{}/api/v2/torrents/add", self.base_url))
            .form(&form)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn submit_one(&self, magnet: &str) -> SubmitOutcome {
        let Some(info_hash) = info_hash_from_magnet(magnet) else {
            return SubmitOutcome::Failed("no info hash in magnet link".to_string());
        };

        match self.torrent_exists(&info_hash).await {
            Ok(true) => {
                if let Err(e) = self.tag_existing(&info_hash).await {
                    warn!(error = %e, "Failed to tag existing torrent");
                }
                SubmitOutcome::Duplicate
            }
            Ok(false) => match self.add_magnet(magnet).await {
                Ok(()) => SubmitOutcome::Accepted,
                Err(e) => SubmitOutcome::Failed(e.to_string()),
            },
            Err(e) => SubmitOutcome::Failed(e.to_string()),
        }
    }
}

#[async_trait]
impl DownloadSubmitter for QBittorrentClient {
    async fn submit(&self, magnets: &[String]) -> Result<SubmitSummary> {
        if let Err(e) = self.create_tags().await {
            warn!(error = %e, "Failed to create tags");
        }

        let mut summary = SubmitSummary::default();
        let total = magnets.len();
        for (idx, magnet) in magnets.iter().enumerate() {
            info!(
                item = idx + 1,
                total = total,
                magnet = %magnet_summary(magnet),
                "Submitting magnet"
            );
            let outcome = self.submit_one(magnet).await;
            if let SubmitOutcome::Failed(error) = &outcome {
                warn!(magnet = %magnet_summary(magnet), error = %error, "Submission failed");
            }
            summary.record(magnet, outcome);
            tokio::time::sleep(SUBMIT_DELAY).await;
        }

        info!(
            accepted = summary.accepted,
            duplicates = summary.duplicates,
            failed = summary.failures.len(),
            "qBittorrent submission complete"
        );
        Ok(summary)
    }
}
