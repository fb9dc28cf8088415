//! Execution Lifecycle
//!
//! `idle -> in_flight -> (completed | failed | cancelled)`

use serde::{Deserialize, Serialize};

/// State of one dispatch to a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Created, request not yet sent
    #[default]
    Idle,
    /// Request sent, response not finished
    InFlight,
    /// Response finished normally
    Completed,
    /// Backend or transport failure
    Failed,
    /// Stopped by the caller
    Cancelled,
}

impl ExecutionState {
    /// Check if this state is final
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Completed | ExecutionState::Failed | ExecutionState::Cancelled
        )
    }

    /// Whether moving to `next` is a legal transition.
    pub fn can_transition_to(&self, next: ExecutionState) -> bool {
        match self {
            ExecutionState::Idle => matches!(
                next,
                ExecutionState::InFlight | ExecutionState::Failed | ExecutionState::Cancelled
            ),
            ExecutionState::InFlight => next.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionState::Idle => write!(f, "idle"),
            ExecutionState::InFlight => write!(f, "in_flight"),
            ExecutionState::Completed => write!(f, "completed"),
            ExecutionState::Failed => write!(f, "failed"),
            ExecutionState::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for ExecutionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(ExecutionState::Idle),
            "in_flight" => Ok(ExecutionState::InFlight),
            "completed" => Ok(ExecutionState::Completed),
            "failed" => Ok(ExecutionState::Failed),
            "cancelled" => Ok(ExecutionState::Cancelled),
            _ => Err(format!("Unknown execution state: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_from_str() {
        for state in [
            ExecutionState::Idle,
            ExecutionState::InFlight,
            ExecutionState::Completed,
            ExecutionState::Failed,
            ExecutionState::Cancelled,
        ] {
            assert_eq!(state.to_string().parse::<ExecutionState>().unwrap(), state);
        }
        assert!("paused".parse::<ExecutionState>().is_err());
    }

    #[test]
    fn test_transitions() {
        assert!(ExecutionState::Idle.can_transition_to(ExecutionState::InFlight));
        assert!(ExecutionState::InFlight.can_transition_to(ExecutionState::Cancelled));
        assert!(!ExecutionState::Completed.can_transition_to(ExecutionState::InFlight));
        assert!(!ExecutionState::InFlight.can_transition_to(ExecutionState::Idle));
        assert!(ExecutionState::Failed.is_terminal());
        assert!(!ExecutionState::InFlight.is_terminal());
    }

    #[test]
    fn test_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&ExecutionState::InFlight).unwrap(),
            "\"in_flight\""
        );
    }
}
