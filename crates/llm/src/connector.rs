//! Connector Trait
//!
//! The uniform capability set every backend offers, plus the shared error
//! normalization for HTTP statuses and transport failures.

use async_trait::async_trait;
use prompt_studio_core::streaming::StreamEvent;
use tokio::sync::mpsc;

use crate::types::{BackendDescriptor, Completion, CompletionOptions, LlmError, LlmResult};

/// Trait that every registered backend implements.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Static description of the backend.
    fn descriptor(&self) -> &BackendDescriptor;

    /// Registry key.
    fn id(&self) -> &str {
        &self.descriptor().id
    }

    /// Model identifiers the backend offers.
    async fn list_models(&self) -> LlmResult<Vec<String>>;

    /// Complete `text` in one request.
    async fn complete(
        &self,
        model: &str,
        text: &str,
        options: &CompletionOptions,
    ) -> LlmResult<Completion>;

    /// Complete `text`, forwarding `TextDelta` and `Usage` events through
    /// `tx` as they arrive.
    ///
    /// Implementations never send `Complete` or `Error`: the returned result
    /// decides how the stream ends. Returns once the backend's end marker is
    /// seen; a body that ends without one is a `Connection` error.
    async fn stream(
        &self,
        model: &str,
        text: &str,
        options: &CompletionOptions,
        tx: mpsc::Sender<StreamEvent>,
    ) -> LlmResult<Completion>;
}

/// Helper function to create an error for a missing credential
pub fn missing_api_key_error(backend: &str) -> LlmError {
    LlmError::Authentication {
        message: format!("API key not configured for {}", backend),
    }
}

/// Map a non-success HTTP status to the error taxonomy.
///
/// 401/403 → Authentication, 429 → RateLimited, 408/504 → Timeout, other
/// 5xx → Connection, anything else → MalformedResponse with the status.
pub fn parse_http_error(status: u16, body: &str, retry_after: Option<u64>, backend: &str) -> LlmError {
    let detail = error_detail(body);
    match status {
        401 => LlmError::Authentication {
            message: format!("{}: invalid API key ({})", backend, detail),
        },
        403 => LlmError::Authentication {
            message: format!("{}: access denied ({})", backend, detail),
        },
        429 => LlmError::RateLimited {
            message: format!("{}: {}", backend, detail),
            retry_after,
        },
        408 | 504 => LlmError::Timeout {
            message: format!("{}: HTTP {} ({})", backend, status, detail),
        },
        500..=599 => LlmError::Connection {
            message: format!("{}: server error HTTP {} ({})", backend, status, detail),
        },
        _ => LlmError::MalformedResponse {
            message: format!("{}: {}", backend, detail),
            status: Some(status),
        },
    }
}

/// Pull a readable message out of an error body: `error.message`, a string
/// `error`, `message`, or the raw text.
fn error_detail(body: &str) -> String {
    let trimmed = body.trim();
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        let found = value
            .pointer("/error/message")
            .or_else(|| value.get("error"))
            .or_else(|| value.get("message"))
            .and_then(|v| v.as_str());
        if let Some(message) = found {
            return message.to_string();
        }
    }
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        trimmed.chars().take(500).collect()
    }
}

/// Map a transport-level failure to the error taxonomy.
pub fn classify_transport_error(backend: &str, err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout {
            message: format!("{}: {}", backend, err),
        }
    } else if err.is_connect() {
        LlmError::Connection {
            message: format!("Cannot connect to {}: {}", backend, err),
        }
    } else if err.is_decode() {
        LlmError::MalformedResponse {
            message: format!("{}: {}", backend, err),
            status: err.status().map(|s| s.as_u16()),
        }
    } else {
        LlmError::Connection {
            message: format!("{}: {}", backend, err),
        }
    }
}
