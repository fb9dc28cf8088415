//! Execution History Models

use std::fmt;
use std::str::FromStr;

use prompt_studio_core::ExecutionState;
use prompt_studio_llm::CompletionOptions;
use serde::{Deserialize, Serialize};

/// Final status of a recorded execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// Map a terminal execution state. Non-terminal states have no status.
    pub fn from_state(state: ExecutionState) -> Option<Self> {
        match state {
            ExecutionState::Completed => Some(ExecutionStatus::Completed),
            ExecutionState::Failed => Some(ExecutionStatus::Failed),
            ExecutionState::Cancelled => Some(ExecutionStatus::Cancelled),
            ExecutionState::Idle | ExecutionState::InFlight => None,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Failed => write!(f, "failed"),
            ExecutionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            "cancelled" => Ok(ExecutionStatus::Cancelled),
            _ => Err(format!("Unknown execution status: {}", s)),
        }
    }
}

/// What was sent to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    /// Rendered prompt text
    pub text: String,
    #[serde(default)]
    pub options: CompletionOptions,
}

/// One recorded execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub prompt_id: Option<String>,
    pub backend: String,
    pub model: String,
    pub request_payload: RequestPayload,
    /// Full text, or the partial text of a cancelled execution
    pub response_text: String,
    pub status: ExecutionStatus,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub created_at: Option<String>,
}

/// Data for a new history entry
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub prompt_id: Option<String>,
    pub backend: String,
    pub model: String,
    pub request_payload: RequestPayload,
    pub response_text: String,
    pub status: ExecutionStatus,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Filters for listing history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryFilter {
    pub prompt_id: Option<String>,
    pub backend: Option<String>,
    /// Substring matched against the request payload and response
    pub search: Option<String>,
    pub limit: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
            ExecutionStatus::Cancelled,
        ] {
            assert_eq!(status.to_string().parse::<ExecutionStatus>(), Ok(status));
        }
        assert!("running".parse::<ExecutionStatus>().is_err());
    }

    #[test]
    fn test_status_from_state() {
        assert_eq!(
            ExecutionStatus::from_state(ExecutionState::Cancelled),
            Some(ExecutionStatus::Cancelled)
        );
        assert_eq!(ExecutionStatus::from_state(ExecutionState::InFlight), None);
    }
}
