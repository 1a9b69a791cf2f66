use crate::error::{LumoError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/api";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub access_token: Option<String>,
    pub tenant_id: Option<String>,
    pub data_dir: PathBuf,
    pub request_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub probe_interval_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            access_token: None,
            tenant_id: None,
            data_dir: PathBuf::from("./data"),
            request_timeout_secs: 10,
            poll_interval_ms: 2000,
            probe_interval_secs: 15,
        }
    }
}

impl ClientConfig {
    /// Load client configuration from {data_dir}/client.json or return defaults
    pub fn load_or_default(data_dir: &Path) -> Self {
        let client_json = data_dir.join("client.json");

        if client_json.exists() {
            match std::fs::read_to_string(&client_json) {
                Ok(content) => match serde_json::from_str::<ClientConfig>(&content) {
                    Ok(mut config) => {
                        config.data_dir = data_dir.to_path_buf();
                        tracing::info!(
                            "Loaded client config: api={}, tenant={}",
                            config.api_base_url,
                            config.tenant_id.as_deref().unwrap_or("-")
                        );
                        return config;
                    }
                    Err(e) => {
                        tracing::error!("Failed to parse client.json: {}, using defaults", e);
                    }
                },
                Err(e) => {
                    tracing::error!("Failed to read client.json: {}, using defaults", e);
                }
            }
        }

        ClientConfig {
            data_dir: data_dir.to_path_buf(),
            ..ClientConfig::default()
        }
    }

    /// Build configuration from `LUMO_*` environment variables.
    ///
    /// Optional: LUMO_DATA_DIR (client.json there is loaded first)
    /// Optional: LUMO_API_URL, LUMO_ACCESS_TOKEN, LUMO_TENANT_ID
    /// Optional: LUMO_REQUEST_TIMEOUT_SECS, LUMO_POLL_INTERVAL_MS
    pub fn from_env() -> Result<Self> {
        let data_dir = env::var("LUMO_DATA_DIR").unwrap_or_else(|_| "./data".to_string());
        let mut config = Self::load_or_default(Path::new(&data_dir));

        if let Ok(url) = env::var("LUMO_API_URL") {
            config.api_base_url = url;
        }
        if let Ok(token) = env::var("LUMO_ACCESS_TOKEN") {
            config.access_token = Some(token).filter(|t| !t.is_empty());
        }
        if let Ok(tenant) = env::var("LUMO_TENANT_ID") {
            config.tenant_id = Some(tenant).filter(|t| !t.is_empty());
        }
        if let Ok(raw) = env::var("LUMO_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = raw.parse().map_err(|_| {
                LumoError::Config(format!("Invalid LUMO_REQUEST_TIMEOUT_SECS: {}", raw))
            })?;
        }
        if let Ok(raw) = env::var("LUMO_POLL_INTERVAL_MS") {
            config.poll_interval_ms = raw.parse().map_err(|_| {
                LumoError::Config(format!("Invalid LUMO_POLL_INTERVAL_MS: {}", raw))
            })?;
        }

        if !config.api_base_url.starts_with("http://") && !config.api_base_url.starts_with("https://")
        {
            return Err(LumoError::Config(format!(
                "API URL must be http(s), got: {}",
                config.api_base_url
            )));
        }

        Ok(config)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_credentials(mut self, token: impl Into<String>, tenant: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self.tenant_id = Some(tenant.into());
        self
    }

    /// Base URL without a trailing slash, ready for path concatenation.
    pub fn base_url(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }

    pub fn queue_dir(&self) -> PathBuf {
        self.data_dir.join("queue")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs.max(1))
    }

    /// Access token and tenant id, both of which a push connection needs.
    pub fn require_credentials(&self) -> Result<(&str, &str)> {
        let token = self
            .access_token
            .as_deref()
            .ok_or_else(|| LumoError::Config("access token is not configured".into()))?;
        let tenant = self
            .tenant_id
            .as_deref()
            .ok_or_else(|| LumoError::Config("tenant id is not configured".into()))?;
        Ok((token, tenant))
    }

    /// Attach bearer + tenant headers when configured.
    pub fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let req = match &self.access_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        };
        match &self.tenant_id {
            Some(tenant) => req.header("X-Tenant-Id", tenant),
            None => req,
        }
    }
}
