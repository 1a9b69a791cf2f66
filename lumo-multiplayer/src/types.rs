use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Waiting,
    InProgress,
    Finished,
    /// Anything the server sends that this client does not know yet
    #[default]
    #[serde(other)]
    Unknown,
}

/// Full snapshot of a multiplayer match. Game-specific fields are kept
/// opaque in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub session_id: String,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

pub const LABEL_CONNECTING: &str = "Conectando...";
pub const LABEL_WAITING: &str = "Esperando jugadores";
pub const LABEL_IN_PROGRESS: &str = "Partida en curso";
pub const LABEL_FINISHED: &str = "Partida finalizada";
pub const LABEL_UNKNOWN: &str = "Estado desconocido";

impl SessionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::Waiting => LABEL_WAITING,
            SessionStatus::InProgress => LABEL_IN_PROGRESS,
            SessionStatus::Finished => LABEL_FINISHED,
            SessionStatus::Unknown => LABEL_UNKNOWN,
        }
    }
}

/// Human-readable status for whatever snapshot is currently loaded.
pub fn status_label(state: Option<&SessionState>) -> &'static str {
    match state {
        None => LABEL_CONNECTING,
        Some(s) => s.status.label(),
    }
}
