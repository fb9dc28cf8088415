//! Wire Dialects
//!
//! Request/response envelope formats. A dialect decides the endpoint paths,
//! the JSON request body, how a completion and a model list are read back,
//! and which stream adapter parses streamed frames. Everything else about a
//! connector is shared.

use prompt_studio_core::streaming::StreamAdapter;
use serde_json::{json, Map, Value};

use crate::streaming_adapters::{OllamaAdapter, OpenAiAdapter};
use crate::types::{CompletionOptions, LlmError, LlmResult, UsageStats};

/// Keys searched, in order, for the text of a custom backend's response.
pub const CUSTOM_RESPONSE_KEYS: &[&str] = &["text", "response", "content", "output"];

/// Model list reported by custom backends.
pub const CUSTOM_MODEL: &str = "default";

/// Envelope format of a backend family.
#[derive(Debug, Clone, PartialEq)]
pub enum WireDialect {
    /// `/chat/completions` and `/models` (OpenAI, LM Studio)
    OpenAi,
    /// `/api/generate` and `/api/tags`
    Ollama,
    /// User-defined JSON payload posted to a fixed URL
    Custom(PayloadTemplate),
}

/// JSON payload with `{prompt}`, `{system}`, `{model}`, `{temperature}` and
/// `{max_tokens}` slots.
///
/// Text slots are substituted JSON-escaped without surrounding quotes, so
/// they belong inside a string literal: `{"input": "{prompt}"}`. Numeric
/// slots become a number or `null`.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadTemplate {
    template: String,
}

impl PayloadTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Fill the slots and parse the result.
    pub fn render(&self, model: &str, text: &str, options: &CompletionOptions) -> LlmResult<Value> {
        let system = options.system.as_deref().unwrap_or("");
        let temperature = options
            .temperature
            .map(|t| t.to_string())
            .unwrap_or_else(|| "null".to_string());
        let max_tokens = options
            .max_tokens
            .map(|m| m.to_string())
            .unwrap_or_else(|| "null".to_string());

        let filled = fill_slots(&self.template, |slot| match slot {
            "prompt" => Some(escape_json_text(text)),
            "system" => Some(escape_json_text(system)),
            "model" => Some(escape_json_text(model)),
            "temperature" => Some(temperature.clone()),
            "max_tokens" => Some(max_tokens.clone()),
            _ => None,
        });

        serde_json::from_str(&filled).map_err(|e| LlmError::InvalidConfig {
            message: format!("custom payload template is not valid JSON once filled: {}", e),
        })
    }
}

/// Replace every `{name}` slot that `value_of` knows in a single pass.
/// Substituted values are emitted as-is and never scanned again.
fn fill_slots<F>(template: &str, value_of: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let slot = after
            .find('}')
            .map(|close| &after[..close])
            .filter(|name| {
                !name.is_empty() && name.bytes().all(|b| b.is_ascii_lowercase() || b == b'_')
            })
            .and_then(|name| value_of(name).map(|value| (name.len(), value)));
        match slot {
            Some((len, value)) => {
                out.push_str(&value);
                rest = &after[len + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// JSON string escaping, without the surrounding quotes.
fn escape_json_text(text: &str) -> String {
    let quoted = Value::String(text.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

fn malformed(message: impl Into<String>) -> LlmError {
    LlmError::MalformedResponse {
        message: message.into(),
        status: None,
    }
}

/// Text, usage and stop reason read from a non-streaming response.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCompletion {
    pub text: String,
    pub usage: Option<UsageStats>,
    pub stop_reason: Option<String>,
}

impl WireDialect {
    /// Path appended to the base URL for completions.
    pub fn completion_path(&self) -> &'static str {
        match self {
            WireDialect::OpenAi => "/chat/completions",
            WireDialect::Ollama => "/api/generate",
            WireDialect::Custom(_) => "",
        }
    }

    /// Path appended to the base URL for model listing, if the dialect has one.
    pub fn models_path(&self) -> Option<&'static str> {
        match self {
            WireDialect::OpenAi => Some("/models"),
            WireDialect::Ollama => Some("/api/tags"),
            WireDialect::Custom(_) => None,
        }
    }

    pub fn supports_streaming(&self) -> bool {
        !matches!(self, WireDialect::Custom(_))
    }

    /// Adapter for streamed frames, if the dialect streams.
    pub fn stream_adapter(&self) -> Option<Box<dyn StreamAdapter>> {
        match self {
            WireDialect::OpenAi => Some(Box::new(OpenAiAdapter::new())),
            WireDialect::Ollama => Some(Box::new(OllamaAdapter::new())),
            WireDialect::Custom(_) => None,
        }
    }

    pub fn build_request(
        &self,
        model: &str,
        text: &str,
        options: &CompletionOptions,
        stream: bool,
    ) -> LlmResult<Value> {
        match self {
            WireDialect::OpenAi => {
                let mut messages = Vec::new();
                if let Some(system) = &options.system {
                    messages.push(json!({"role": "system", "content": system}));
                }
                messages.push(json!({"role": "user", "content": text}));

                let mut body = json!({
                    "model": model,
                    "messages": messages,
                    "stream": stream,
                });
                if let Some(temperature) = options.temperature {
                    body["temperature"] = json!(temperature);
                }
                if let Some(max_tokens) = options.max_tokens {
                    body["max_tokens"] = json!(max_tokens);
                }
                Ok(body)
            }
            WireDialect::Ollama => {
                let mut body = json!({
                    "model": model,
                    "prompt": text,
                    "stream": stream,
                });
                if let Some(system) = &options.system {
                    body["system"] = json!(system);
                }
                let mut model_options = Map::new();
                if let Some(temperature) = options.temperature {
                    model_options.insert("temperature".to_string(), json!(temperature));
                }
                if let Some(max_tokens) = options.max_tokens {
                    model_options.insert("num_predict".to_string(), json!(max_tokens));
                }
                if !model_options.is_empty() {
                    body["options"] = Value::Object(model_options);
                }
                Ok(body)
            }
            WireDialect::Custom(payload) => payload.render(model, text, options),
        }
    }

    pub fn parse_completion(&self, body: &Value) -> LlmResult<ParsedCompletion> {
        match self {
            WireDialect::OpenAi => {
                let choice = body
                    .pointer("/choices/0")
                    .ok_or_else(|| malformed("response has no choices"))?;
                let text = choice
                    .pointer("/message/content")
                    .and_then(Value::as_str)
                    .ok_or_else(|| malformed("choice has no message content"))?
                    .to_string();
                let usage = body.get("usage").map(|u| UsageStats {
                    input_tokens: read_u32(u, "prompt_tokens"),
                    output_tokens: read_u32(u, "completion_tokens"),
                });
                let stop_reason = choice
                    .get("finish_reason")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Ok(ParsedCompletion {
                    text,
                    usage,
                    stop_reason,
                })
            }
            WireDialect::Ollama => {
                if let Some(error) = body.get("error").and_then(Value::as_str) {
                    return Err(malformed(error));
                }
                let text = body
                    .get("response")
                    .and_then(Value::as_str)
                    .ok_or_else(|| malformed("response has no 'response' field"))?
                    .to_string();
                let usage = if body.get("prompt_eval_count").is_some() || body.get("eval_count").is_some() {
                    Some(UsageStats {
                        input_tokens: read_u32(body, "prompt_eval_count"),
                        output_tokens: read_u32(body, "eval_count"),
                    })
                } else {
                    None
                };
                let stop_reason = body
                    .get("done_reason")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Ok(ParsedCompletion {
                    text,
                    usage,
                    stop_reason,
                })
            }
            WireDialect::Custom(_) => {
                let text = match body {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(map) => CUSTOM_RESPONSE_KEYS
                        .iter()
                        .find_map(|key| map.get(*key))
                        .map(|v| match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        }),
                    _ => None,
                };
                let text = text.ok_or_else(|| {
                    malformed(format!(
                        "response has none of the keys {}",
                        CUSTOM_RESPONSE_KEYS.join(", ")
                    ))
                })?;
                Ok(ParsedCompletion {
                    text,
                    usage: None,
                    stop_reason: None,
                })
            }
        }
    }

    pub fn parse_models(&self, body: &Value) -> LlmResult<Vec<String>> {
        let (list, key) = match self {
            WireDialect::OpenAi => (body.get("data"), "id"),
            WireDialect::Ollama => (body.get("models"), "name"),
            WireDialect::Custom(_) => return Ok(vec![CUSTOM_MODEL.to_string()]),
        };
        let list = list
            .and_then(Value::as_array)
            .ok_or_else(|| malformed("model listing has no model array"))?;
        Ok(list
            .iter()
            .filter_map(|entry| entry.get(key).and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }
}

fn read_u32(value: &Value, key: &str) -> u32 {
    value
        .get(key)
        .and_then(Value::as_u64)
        .map(|n| n.min(u32::MAX as u64) as u32)
        .unwrap_or(0)
}
