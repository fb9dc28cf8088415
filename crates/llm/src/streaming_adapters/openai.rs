//! OpenAI-Compatible SSE Adapter
//!
//! Handles `data:` lines from `/chat/completions` with `stream: true`, as
//! served by OpenAI and LM Studio. The end marker is `data: [DONE]`.

use prompt_studio_core::streaming::{AdapterError, StreamAdapter, StreamEvent};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct OpenAiChunk {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<Delta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

/// Adapter for OpenAI-compatible SSE streams
#[derive(Debug, Default)]
pub struct OpenAiAdapter {
    /// Last `finish_reason` seen; reported with `Complete`
    finish_reason: Option<String>,
    done: bool,
}

impl OpenAiAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StreamAdapter for OpenAiAdapter {
    fn dialect_name(&self) -> &'static str {
        "openai"
    }

    fn adapt(&mut self, input: &str) -> Result<Vec<StreamEvent>, AdapterError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.starts_with(':') || self.done {
            return Ok(vec![]);
        }

        let payload = match trimmed.strip_prefix("data:") {
            Some(rest) => rest.trim_start(),
            // event:, id:, retry: fields carry nothing we use
            None if trimmed.starts_with("event:")
                || trimmed.starts_with("id:")
                || trimmed.starts_with("retry:") =>
            {
                return Ok(vec![])
            }
            None => trimmed,
        };

        if payload == "[DONE]" {
            self.done = true;
            return Ok(vec![StreamEvent::Complete {
                stop_reason: self.finish_reason.take(),
            }]);
        }

        let chunk: OpenAiChunk =
            serde_json::from_str(payload).map_err(|e| AdapterError::ParseError(e.to_string()))?;

        if let Some(error) = chunk.error {
            return Ok(vec![StreamEvent::Error {
                message: error.message,
                code: error.kind,
            }]);
        }

        let mut events = vec![];
        for choice in chunk.choices {
            if let Some(content) = choice.delta.and_then(|d| d.content) {
                if !content.is_empty() {
                    events.push(StreamEvent::TextDelta { content });
                }
            }
            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(reason);
            }
        }

        if let Some(usage) = chunk.usage {
            events.push(StreamEvent::Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            });
        }

        Ok(events)
    }

    /// Some servers close the stream after the final `finish_reason` without
    /// sending `[DONE]`; that still counts as a finished completion.
    fn finish(&mut self) -> Result<Vec<StreamEvent>, AdapterError> {
        match self.finish_reason.take() {
            Some(reason) => {
                self.done = true;
                Ok(vec![StreamEvent::Complete {
                    stop_reason: Some(reason),
                }])
            }
            None => Err(AdapterError::InvalidFormat(
                "openai stream ended without [DONE]".to_string(),
            )),
        }
    }

    fn reset(&mut self) {
        self.finish_reason = None;
        self.done = false;
    }
}
