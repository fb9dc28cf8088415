//! Dispatcher Types
//!
//! Backend descriptors, completion options and results, and the error
//! taxonomy shared by every connector.

use std::time::Duration;

use prompt_studio_core::ExecutionState;
use serde::{Deserialize, Serialize};

/// Default per-request timeout. Streaming uses it as the idle timeout
/// between chunks.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Where a backend's credential is looked up.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialKey {
    pub service: String,
    pub account: String,
}

impl CredentialKey {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }
}

/// Immutable description of a registered backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    pub id: String,
    pub display_name: String,
    pub base_url: String,
    /// Set when the backend needs a bearer credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<CredentialKey>,
    pub supports_streaming: bool,
    pub supports_model_listing: bool,
    /// Model used when the caller does not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl BackendDescriptor {
    pub fn requires_credential(&self) -> bool {
        self.credential.is_some()
    }
}

/// Per-call generation options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Overrides the connector's default timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl CompletionOptions {
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// The effective timeout given a connector default.
    pub fn timeout_or(&self, default: Duration) -> Duration {
        self.timeout_secs.map(Duration::from_secs).unwrap_or(default)
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A finished completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

/// How a streaming execution ended, when it did not fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Completed(Completion),
    /// Stopped by the caller; `partial` holds the fragments delivered so far
    Cancelled { partial: String },
}

impl ExecutionOutcome {
    /// Text received, complete or partial.
    pub fn text(&self) -> &str {
        match self {
            ExecutionOutcome::Completed(completion) => &completion.text,
            ExecutionOutcome::Cancelled { partial } => partial,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecutionOutcome::Cancelled { .. })
    }

    pub fn state(&self) -> ExecutionState {
        match self {
            ExecutionOutcome::Completed(_) => ExecutionState::Completed,
            ExecutionOutcome::Cancelled { .. } => ExecutionState::Cancelled,
        }
    }
}

/// Error types for dispatcher operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LlmError {
    /// Server unreachable, connection dropped, or stream cut short
    Connection { message: String },
    /// Missing, invalid or rejected credential
    Authentication { message: String },
    /// Backend asked us to slow down
    RateLimited {
        message: String,
        /// Seconds, from `Retry-After`
        retry_after: Option<u64>,
    },
    /// Unexpected status or a body we could not interpret
    MalformedResponse {
        message: String,
        status: Option<u16>,
    },
    /// No response (or no stream data) within the timeout
    Timeout { message: String },
    /// No backend registered under this id
    UnknownBackend { backend: String },
    /// Backend configuration that cannot be used (bad URL, bad payload template)
    InvalidConfig { message: String },
}

impl LlmError {
    /// Whether retrying later might succeed. The dispatcher never retries on
    /// its own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::Connection { .. } | LlmError::RateLimited { .. } | LlmError::Timeout { .. }
        )
    }

    /// Short machine-readable kind, used as the stream error code.
    pub fn code(&self) -> &'static str {
        match self {
            LlmError::Connection { .. } => "connection",
            LlmError::Authentication { .. } => "authentication",
            LlmError::RateLimited { .. } => "rate_limited",
            LlmError::MalformedResponse { .. } => "malformed_response",
            LlmError::Timeout { .. } => "timeout",
            LlmError::UnknownBackend { .. } => "unknown_backend",
            LlmError::InvalidConfig { .. } => "invalid_config",
        }
    }
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmError::Connection { message } => write!(f, "Connection error: {}", message),
            LlmError::Authentication { message } => {
                write!(f, "Authentication failed: {}", message)
            }
            LlmError::RateLimited {
                message,
                retry_after,
            } => match retry_after {
                Some(secs) => write!(f, "Rate limited (retry after {}s): {}", secs, message),
                None => write!(f, "Rate limited: {}", message),
            },
            LlmError::MalformedResponse { message, status } => match status {
                Some(s) => write!(f, "Malformed response ({}): {}", s, message),
                None => write!(f, "Malformed response: {}", message),
            },
            LlmError::Timeout { message } => write!(f, "Timed out: {}", message),
            LlmError::UnknownBackend { backend } => write!(f, "Unknown backend: {}", backend),
            LlmError::InvalidConfig { message } => write!(f, "Invalid backend configuration: {}", message),
        }
    }
}

impl std::error::Error for LlmError {}

/// Result type for dispatcher operations
pub type LlmResult<T> = Result<T, LlmError>;
