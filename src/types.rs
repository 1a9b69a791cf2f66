use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of user action carried by a queued item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    /// A routine checklist item was marked done.
    MarkRoutineItem,
    /// The child asked the coach for a message.
    RequestCoachInteraction,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::MarkRoutineItem => "MARK_ROUTINE_ITEM",
            ActionKind::RequestCoachInteraction => "REQUEST_COACH_INTERACTION",
        }
    }
}

impl std::str::FromStr for ActionKind {
    type Err = crate::error::LumoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "MARK_ROUTINE_ITEM" => Ok(ActionKind::MarkRoutineItem),
            "REQUEST_COACH_INTERACTION" => Ok(ActionKind::RequestCoachInteraction),
            other => Err(crate::error::LumoError::Config(format!(
                "unknown action kind: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: String,
    pub kind: ActionKind,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl QueueItem {
    pub fn new(kind: ActionKind, payload: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            payload,
            created_at: Utc::now(),
        }
    }
}

/// Body of a batch submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub actions: Vec<QueueItem>,
}

/// Per-item failure reported by the batch endpoint. Only `id` decides what
/// stays queued; `kind` and `error` are kept as raw strings for logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub id: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    #[serde(default)]
    pub processed: usize,
    #[serde(default)]
    pub failed: Vec<BatchFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Offline,
    InFlight,
}

/// Result of one flush attempt.
///
/// `RequestFailed` and `BatchPartialResult` stay distinct: the former
/// commits nothing, the latter commits everything the server did not
/// report as failed.
#[derive(Debug, Clone, PartialEq)]
pub enum FlushOutcome {
    Skipped(SkipReason),
    Empty,
    BatchPartialResult {
        committed: Vec<String>,
        retained: Vec<String>,
    },
    RequestFailed {
        error: String,
        retained: usize,
    },
}

impl FlushOutcome {
    pub fn committed_count(&self) -> usize {
        match self {
            FlushOutcome::BatchPartialResult { committed, .. } => committed.len(),
            _ => 0,
        }
    }

    pub fn retained_count(&self) -> usize {
        match self {
            FlushOutcome::BatchPartialResult { retained, .. } => retained.len(),
            FlushOutcome::RequestFailed { retained, .. } => *retained,
            _ => 0,
        }
    }
}
