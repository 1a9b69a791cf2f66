use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum LumoError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Push channel error: {0}")]
    Channel(String),
}

pub type Result<T> = std::result::Result<T, LumoError>;

impl From<std::io::Error> for LumoError {
    fn from(e: std::io::Error) -> Self {
        LumoError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for LumoError {
    fn from(e: serde_json::Error) -> Self {
        LumoError::Json(e.to_string())
    }
}

impl From<reqwest::Error> for LumoError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            LumoError::Json(e.to_string())
        } else {
            LumoError::Request(e.to_string())
        }
    }
}

impl LumoError {
    /// Transport-level failures are retried on the next natural trigger
    /// (flush cycle or poll tick); everything else needs intervention.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LumoError::Request(_) | LumoError::Status { .. } | LumoError::Channel(_)
        )
    }
}
