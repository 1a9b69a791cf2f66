use crate::endpoints::session_url;
use crate::types::SessionState;
use lumo::{ClientConfig, LumoError, Result};

/// HTTP client for one-shot session snapshots
pub struct SessionClient {
    config: ClientConfig,
    http_client: reqwest::Client,
}

impl SessionClient {
    pub fn new(config: ClientConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            config,
            http_client,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Fetch the full state of a session
    pub async fn fetch_state(&self, session_id: &str) -> Result<SessionState> {
        let url = session_url(&self.config, session_id)?;

        let response = self
            .config
            .authorize(self.http_client.get(url.as_str()))
            .send()
            .await
            .map_err(|e| {
                LumoError::Request(format!("Failed to fetch session {}: {}", session_id, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LumoError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response.json().await.map_err(|e| {
            LumoError::Json(format!(
                "Failed to parse session {} snapshot: {}",
                session_id, e
            ))
        })
    }
}
