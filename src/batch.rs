use crate::config::ClientConfig;
use crate::error::{LumoError, Result};
use crate::types::{BatchRequest, BatchResponse, QueueItem};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// HTTP client for the remote batch endpoint
pub struct BatchClient {
    config: ClientConfig,
    http_client: reqwest::Client,
    last_success: Arc<AtomicU64>, // Unix timestamp in seconds
}

impl BatchClient {
    pub fn new(config: ClientConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            config,
            http_client,
            last_success: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/offline/batch", self.config.base_url())
    }

    pub fn last_success_timestamp(&self) -> u64 {
        self.last_success.load(Ordering::Relaxed)
    }

    /// Submit queued actions in one request
    pub async fn submit(&self, items: &[QueueItem]) -> Result<BatchResponse> {
        let url = self.endpoint();
        let body = BatchRequest {
            actions: items.to_vec(),
        };

        let response = self
            .config
            .authorize(self.http_client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| LumoError::Request(format!("Failed to send batch to {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LumoError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let resp: BatchResponse = response
            .json()
            .await
            .map_err(|e| LumoError::Json(format!("Failed to parse batch response: {}", e)))?;

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.last_success.store(now, Ordering::Relaxed);

        Ok(resp)
    }
}
