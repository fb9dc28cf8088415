//! Ollama NDJSON Adapter
//!
//! Handles the newline-delimited JSON stream of `/api/generate`. The end
//! marker is an object with `"done": true`.

use prompt_studio_core::streaming::{AdapterError, StreamAdapter, StreamEvent};
use serde::Deserialize;

/// Ollama response format
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

/// Adapter for Ollama JSON stream format
#[derive(Debug, Default)]
pub struct OllamaAdapter;

impl OllamaAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl StreamAdapter for OllamaAdapter {
    fn dialect_name(&self) -> &'static str {
        "ollama"
    }

    fn adapt(&mut self, input: &str) -> Result<Vec<StreamEvent>, AdapterError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(vec![]);
        }

        let response: OllamaResponse =
            serde_json::from_str(trimmed).map_err(|e| AdapterError::ParseError(e.to_string()))?;

        if let Some(message) = response.error {
            return Ok(vec![StreamEvent::Error {
                message,
                code: None,
            }]);
        }

        let mut events = vec![];

        if let Some(content) = response.response {
            if !content.is_empty() {
                events.push(StreamEvent::TextDelta { content });
            }
        }

        if response.done {
            if response.prompt_eval_count.is_some() || response.eval_count.is_some() {
                events.push(StreamEvent::Usage {
                    input_tokens: response.prompt_eval_count.unwrap_or(0),
                    output_tokens: response.eval_count.unwrap_or(0),
                });
            }
            events.push(StreamEvent::Complete {
                stop_reason: Some(response.done_reason.unwrap_or_else(|| "stop".to_string())),
            });
        }

        Ok(events)
    }
}
