//! Transmission RPC client
//!
//! Speaks the JSON-RPC-over-HTTP protocol, including the CSRF handshake:
//! Transmission answers 409 with a fresh `X-Transmission-Session-Id`
//! header, after which the request is retried once with the new id.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::ClientConfig;
use super::{DownloadSubmitter, SubmitOutcome, SubmitSummary, magnet_summary};

const SESSION_HEADER: &str = "X-Transmission-Session-Id";
const SUBMIT_DELAY: Duration = Duration::from_millis(100);

pub struct TransmissionClient {
    http: Client,
    rpc_url: String,
    auth: Option<(String, String)>,
    session_id: Mutex<Option<String>>,
    download_folder: Option<String>,
}

impl TransmissionClient {
    /// Connect and verify the RPC endpoint with a `session-get` call.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        if !config.tags.is_empty() || config.category.is_some() {
            warn!("Transmission does not support tags or categories, ignoring");
        }

        let client = Self {
            http: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .context("failed to build HTTP client")?,
            rpc_url: format!("http://{}:{}/transmission/rpc", config.host, config.port),
            auth: (!config.username.is_empty())
                .then(|| (config.username.clone(), config.password.clone())),
            session_id: Mutex::new(None),
            download_folder: config.download_folder.clone(),
        };

        client
            .rpc(json!({ "method": "session-get" }))
            .await
            .context("failed to connect to Transmission RPC")?;
        info!(url = %client.rpc_url, "Connected to Transmission");
        Ok(client)
    }

    /// Issue an RPC call, renewing the session id on a 409 response.
    async fn rpc(&self, payload: Value) -> Result<Value> {
        let mut session_id = self.session_id.lock().await;

        for _ in 0..2 {
            let mut request = self.http.post(&self.rpc_url).json(&payload);
            if let Some((user, pass)) = &self.auth {
                request = request.basic_auth(user, Some(pass));
            }
            if let Some(id) = session_id.as_deref() {
                request = request.header(SESSION_HEADER, id);
            }

            let response = request.send().await?;
            if response.status() == StatusCode::CONFLICT {
                *session_id = response
                    .headers()
                    .get(SESSION_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                continue;
            }
            let response = response.error_for_status()?;
            return Ok(response.json().await?);
        }
        Err(anyhow!("Transmission kept answering 409 after session renewal"))
    }

    async fn submit_one(&self, magnet: &str) -> SubmitOutcome {
        let mut arguments = json!({ "filename": magnet });
        if let Some(folder) = &self.download_folder {
            arguments["download-dir"] = json!(folder);
        }
        let payload = json!({ "method": "torrent-add", "arguments": arguments });

        match self.rpc(payload).await {
            Ok(body) => {
                let result = body.get("result").and_then(Value::as_str).unwrap_or("");
                if result != "success" {
                    return SubmitOutcome::Failed(result.to_string());
                }
                let duplicate = body
                    .get("arguments")
                    .and_then(|args| args.get("torrent-duplicate"))
                    .is_some();
                if duplicate {
                    SubmitOutcome::Duplicate
                } else {
                    SubmitOutcome::Accepted
                }
            }
            Err(e) => SubmitOutcome::Failed(e.to_string()),
        }
    }
}

#[async_trait]
impl DownloadSubmitter for TransmissionClient {
    async fn submit(&self, magnets: &[String]) -> Result<SubmitSummary> {
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
            "Transmission submission complete"
        );
        Ok(summary)
    }
}
