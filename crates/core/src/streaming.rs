//! Stream Event Types
//!
//! Backend-agnostic events produced while a completion streams in, and the
//! adapter trait that turns one wire format's frames into them. Adapters live
//! in the `prompt-studio-llm` crate; the application consumes the events.

use serde::{Deserialize, Serialize};

/// Event delivered to the caller of a streaming execution.
///
/// A well-formed stream is zero or more `TextDelta`s (with `Usage` anywhere)
/// followed by exactly one of `Complete` or `Error`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Text fragment from the model
    TextDelta { content: String },

    /// Token usage information
    Usage { input_tokens: u32, output_tokens: u32 },

    /// Error during streaming
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    /// Stream complete
    Complete {
        #[serde(skip_serializing_if = "Option::is_none")]
        stop_reason: Option<String>,
    },
}

impl StreamEvent {
    pub fn text(content: impl Into<String>) -> Self {
        StreamEvent::TextDelta {
            content: content.into(),
        }
    }

    /// Whether this event ends the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete { .. } | StreamEvent::Error { .. })
    }
}

/// Errors that can occur during stream adaptation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AdapterError {
    /// Invalid format that couldn't be parsed
    InvalidFormat(String),
    /// JSON/data parsing error
    ParseError(String),
    /// Event type not supported by this adapter
    UnsupportedEvent(String),
}

impl std::fmt::Display for AdapterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterError::InvalidFormat(msg) => write!(f, "Invalid format: {}", msg),
            AdapterError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            AdapterError::UnsupportedEvent(msg) => write!(f, "Unsupported event: {}", msg),
        }
    }
}

impl std::error::Error for AdapterError {}

/// Trait for adapting one wire format's stream frames to [`StreamEvent`]s.
///
/// The connector splits the response body into lines and feeds each one
/// here; a line may produce zero, one, or several events. An adapter emits
/// `Complete` only when it sees the format's own end marker.
pub trait StreamAdapter: Send + Sync {
    /// Returns the wire format name for logging.
    fn dialect_name(&self) -> &'static str;

    /// Adapt a raw stream line to events.
    fn adapt(&mut self, input: &str) -> Result<Vec<StreamEvent>, AdapterError>;

    /// Called when the body ends before `Complete` was emitted. Formats whose
    /// end can be recognized some other way may still complete here.
    fn finish(&mut self) -> Result<Vec<StreamEvent>, AdapterError> {
        Err(AdapterError::InvalidFormat(format!(
            "{} stream ended before its end marker",
            self.dialect_name()
        )))
    }

    /// Reset adapter state for a new stream.
    fn reset(&mut self) {}
}
