//! HTTP Connector
//!
//! One generic connector for every backend. The [`WireDialect`] decides paths,
//! request bodies and response parsing; this type owns the client, credential
//! injection, timeouts and the streaming read loop.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use prompt_studio_core::proxy::ProxyConfig;
use prompt_studio_core::streaming::{AdapterError, StreamEvent};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::connector::{classify_transport_error, missing_api_key_error, parse_http_error, Connector};
use crate::credentials::{CredentialSource, NoCredentials, CREDENTIAL_SERVICE, OPENAI_ACCOUNT};
use crate::dialect::{PayloadTemplate, WireDialect, CUSTOM_MODEL};
use crate::http_client::build_http_client;
use crate::settings::{BackendSettings, CustomBackendConfig};
use crate::types::{
    BackendDescriptor, Completion, CompletionOptions, CredentialKey, LlmError, LlmResult,
    UsageStats,
};

/// Connect timeout, independent of the request timeout.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Bearer token LM Studio accepts in place of a real key.
const LMSTUDIO_TOKEN: &str = "lm-studio";

/// How a connector authenticates its requests.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendAuth {
    None,
    /// Fixed bearer token
    Static(String),
    /// Bearer token looked up at call time
    Credential(CredentialKey),
}

/// Connector that speaks a [`WireDialect`] over HTTP.
pub struct HttpConnector {
    descriptor: BackendDescriptor,
    dialect: WireDialect,
    client: reqwest::Client,
    auth: BackendAuth,
    credentials: Arc<dyn CredentialSource>,
    headers: BTreeMap<String, String>,
    timeout: Duration,
}

impl HttpConnector {
    pub fn new(
        descriptor: BackendDescriptor,
        dialect: WireDialect,
        auth: BackendAuth,
        credentials: Arc<dyn CredentialSource>,
        proxy: Option<&ProxyConfig>,
        timeout: Duration,
    ) -> LlmResult<Self> {
        let client = build_http_client(proxy, Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .map_err(|e| LlmError::Connection {
                message: format!("{}: failed to build HTTP client: {}", descriptor.id, e),
            })?;
        Ok(Self {
            descriptor,
            dialect,
            client,
            auth,
            credentials,
            headers: BTreeMap::new(),
            timeout,
        })
    }

    /// Extra headers sent with every request.
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// The hosted OpenAI-compatible backend.
    pub fn openai(
        settings: &BackendSettings,
        credentials: Arc<dyn CredentialSource>,
    ) -> LlmResult<Self> {
        let key = CredentialKey::new(CREDENTIAL_SERVICE, OPENAI_ACCOUNT);
        let descriptor = BackendDescriptor {
            id: "openai".to_string(),
            display_name: "OpenAI".to_string(),
            base_url: settings.openai_base_url.clone(),
            credential: Some(key.clone()),
            supports_streaming: true,
            supports_model_listing: true,
            default_model: Some(settings.openai_model.clone()),
        };
        Self::new(
            descriptor,
            WireDialect::OpenAi,
            BackendAuth::Credential(key),
            credentials,
            settings.proxy_for("openai").as_ref(),
            Duration::from_secs(settings.timeout_secs),
        )
    }

    /// A local Ollama server.
    pub fn ollama(settings: &BackendSettings) -> LlmResult<Self> {
        let descriptor = BackendDescriptor {
            id: "ollama".to_string(),
            display_name: "Ollama".to_string(),
            base_url: settings.ollama_base_url.clone(),
            credential: None,
            supports_streaming: true,
            supports_model_listing: true,
            default_model: None,
        };
        Self::new(
            descriptor,
            WireDialect::Ollama,
            BackendAuth::None,
            Arc::new(NoCredentials),
            settings.proxy_for("ollama").as_ref(),
            Duration::from_secs(settings.timeout_secs),
        )
    }

    /// A local LM Studio server (OpenAI-compatible).
    pub fn lmstudio(settings: &BackendSettings) -> LlmResult<Self> {
        let descriptor = BackendDescriptor {
            id: "lmstudio".to_string(),
            display_name: "LM Studio".to_string(),
            base_url: settings.lmstudio_base_url.clone(),
            credential: None,
            supports_streaming: true,
            supports_model_listing: true,
            default_model: None,
        };
        Self::new(
            descriptor,
            WireDialect::OpenAi,
            BackendAuth::Static(LMSTUDIO_TOKEN.to_string()),
            Arc::new(NoCredentials),
            settings.proxy_for("lmstudio").as_ref(),
            Duration::from_secs(settings.timeout_secs),
        )
    }

    /// A user-defined backend driven by a payload template.
    pub fn custom(
        config: &CustomBackendConfig,
        settings: &BackendSettings,
        credentials: Arc<dyn CredentialSource>,
    ) -> LlmResult<Self> {
        config
            .validate()
            .map_err(|message| LlmError::InvalidConfig { message })?;
        let key = config
            .credential_account
            .as_ref()
            .map(|account| CredentialKey::new(CREDENTIAL_SERVICE, account.clone()));
        let descriptor = BackendDescriptor {
            id: config.id.clone(),
            display_name: config.display_name.clone(),
            base_url: config.url.clone(),
            credential: key.clone(),
            supports_streaming: false,
            supports_model_listing: false,
            default_model: Some(CUSTOM_MODEL.to_string()),
        };
        let auth = match key {
            Some(key) => BackendAuth::Credential(key),
            None => BackendAuth::None,
        };
        Ok(Self::new(
            descriptor,
            WireDialect::Custom(PayloadTemplate::new(config.payload_template.clone())),
            auth,
            credentials,
            settings.proxy_for(&config.id).as_ref(),
            Duration::from_secs(settings.timeout_secs),
        )?
        .with_headers(config.headers.clone()))
    }

    pub fn dialect(&self) -> &WireDialect {
        &self.dialect
    }

    fn endpoint(&self, path: &str) -> String {
        if path.is_empty() {
            self.descriptor.base_url.clone()
        } else {
            format!("{}{}", self.descriptor.base_url.trim_end_matches('/'), path)
        }
    }

    fn authorize(&self, mut request: reqwest::RequestBuilder) -> LlmResult<reqwest::RequestBuilder> {
        match &self.auth {
            BackendAuth::None => {}
            BackendAuth::Static(token) => request = request.bearer_auth(token),
            BackendAuth::Credential(key) => {
                let secret = self
                    .credentials
                    .get_credential(&key.service, &key.account)
                    .filter(|s| !s.trim().is_empty())
                    .ok_or_else(|| missing_api_key_error(&self.descriptor.id))?;
                request = request.bearer_auth(secret);
            }
        }
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        Ok(request)
    }

    /// POST a JSON body. Streaming requests only bound the wait for the
    /// response head; the body is read under an idle timeout instead.
    async fn post(
        &self,
        path: &str,
        body: &Value,
        timeout: Duration,
        streaming: bool,
    ) -> LlmResult<reqwest::Response> {
        let url = self.endpoint(path);
        debug!("[{}] POST {}", self.descriptor.id, url);

        let request = self.authorize(self.client.post(&url).json(body))?;
        let sent = if streaming {
            tokio::time::timeout(timeout, request.send())
                .await
                .map_err(|_| self.timeout_error(timeout))?
        } else {
            request.timeout(timeout).send().await
        };
        let response = sent.map_err(|e| classify_transport_error(&self.descriptor.id, e))?;
        self.check_status(response).await
    }

    async fn check_status(&self, response: reqwest::Response) -> LlmResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        Err(parse_http_error(
            status.as_u16(),
            &body,
            retry_after,
            &self.descriptor.id,
        ))
    }

    fn timeout_error(&self, timeout: Duration) -> LlmError {
        LlmError::Timeout {
            message: format!(
                "{}: no response within {}s",
                self.descriptor.id,
                timeout.as_secs()
            ),
        }
    }

    /// Forward adapted events. Returns true once `Complete` was seen.
    async fn forward(
        &self,
        adapted: Result<Vec<StreamEvent>, AdapterError>,
        completion: &mut Completion,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> LlmResult<bool> {
        let events = match adapted {
            Ok(events) => events,
            Err(e) => {
                warn!("[{}] Skipping malformed stream frame: {}", self.descriptor.id, e);
                return Ok(false);
            }
        };

        for event in events {
            match event {
                StreamEvent::TextDelta { ref content } => {
                    completion.text.push_str(content);
                }
                StreamEvent::Usage {
                    input_tokens,
                    output_tokens,
                } => {
                    completion.usage = Some(UsageStats {
                        input_tokens,
                        output_tokens,
                    });
                }
                StreamEvent::Error { message, .. } => {
                    return Err(LlmError::Connection {
                        message: format!("{}: {}", self.descriptor.id, message),
                    });
                }
                StreamEvent::Complete { stop_reason } => {
                    completion.stop_reason = stop_reason;
                    return Ok(true);
                }
            }
            if tx.send(event).await.is_err() {
                return Err(LlmError::Connection {
                    message: format!("{}: stream receiver closed", self.descriptor.id),
                });
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl Connector for HttpConnector {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn list_models(&self) -> LlmResult<Vec<String>> {
        let Some(path) = self.dialect.models_path() else {
            return self.dialect.parse_models(&Value::Null);
        };
        let url = self.endpoint(path);
        debug!("[{}] GET {}", self.descriptor.id, url);

        let request = self.authorize(self.client.get(&url).timeout(self.timeout))?;
        let response = request
            .send()
            .await
            .map_err(|e| classify_transport_error(&self.descriptor.id, e))?;
        let body: Value = self
            .check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| classify_transport_error(&self.descriptor.id, e))?;
        self.dialect.parse_models(&body)
    }

    async fn complete(
        &self,
        model: &str,
        text: &str,
        options: &CompletionOptions,
    ) -> LlmResult<Completion> {
        let body = self.dialect.build_request(model, text, options, false)?;
        let response = self
            .post(
                self.dialect.completion_path(),
                &body,
                options.timeout_or(self.timeout),
                false,
            )
            .await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| classify_transport_error(&self.descriptor.id, e))?;
        let parsed = self.dialect.parse_completion(&body)?;
        Ok(Completion {
            text: parsed.text,
            model: model.to_string(),
            usage: parsed.usage,
            stop_reason: parsed.stop_reason,
        })
    }

    async fn stream(
        &self,
        model: &str,
        text: &str,
        options: &CompletionOptions,
        tx: mpsc::Sender<StreamEvent>,
    ) -> LlmResult<Completion> {
        let Some(mut adapter) = self.dialect.stream_adapter() else {
            // Non-streaming dialects deliver the whole text as one fragment
            let completion = self.complete(model, text, options).await?;
            if !completion.text.is_empty()
                && tx.send(StreamEvent::text(completion.text.clone())).await.is_err()
            {
                return Err(LlmError::Connection {
                    message: format!("{}: stream receiver closed", self.descriptor.id),
                });
            }
            return Ok(completion);
        };

        let timeout = options.timeout_or(self.timeout);
        let body = self.dialect.build_request(model, text, options, true)?;
        let response = self
            .post(self.dialect.completion_path(), &body, timeout, true)
            .await?;

        let mut completion = Completion {
            text: String::new(),
            model: model.to_string(),
            usage: None,
            stop_reason: None,
        };
        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        loop {
            let next = tokio::time::timeout(timeout, stream.next())
                .await
                .map_err(|_| LlmError::Timeout {
                    message: format!(
                        "{}: no stream data for {}s",
                        self.descriptor.id,
                        timeout.as_secs()
                    ),
                })?;
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| classify_transport_error(&self.descriptor.id, e))?;
            buffer.extend_from_slice(&chunk);

            // Process complete lines
            while let Some(line_end) = buffer.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = buffer.drain(..=line_end).collect();
                let line = String::from_utf8_lossy(&raw);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if self
                    .forward(adapter.adapt(line), &mut completion, &tx)
                    .await?
                {
                    return Ok(completion);
                }
            }
        }

        let rest = String::from_utf8_lossy(&buffer).trim().to_string();
        if !rest.is_empty()
            && self
                .forward(adapter.adapt(&rest), &mut completion, &tx)
                .await?
        {
            return Ok(completion);
        }

        let finished = adapter.finish().map_err(|e| LlmError::Connection {
            message: format!("{}: {}", self.descriptor.id, e),
        })?;
        if self.forward(Ok(finished), &mut completion, &tx).await? {
            Ok(completion)
        } else {
            Err(LlmError::Connection {
                message: format!(
                    "{}: {} stream ended before its end marker",
                    self.descriptor.id,
                    adapter.dialect_name()
                ),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentials;

    fn openai_at(url: &str, key: Option<&str>) -> HttpConnector {
        let settings = BackendSettings {
            openai_base_url: url.to_string(),
            ..Default::default()
        };
        let credentials: Arc<dyn CredentialSource> = match key {
            Some(k) => Arc::new(StaticCredentials::new().with(CREDENTIAL_SERVICE, OPENAI_ACCOUNT, k)),
            None => Arc::new(NoCredentials),
        };
        HttpConnector::openai(&settings, credentials).unwrap()
    }

    fn ollama_at(url: &str) -> HttpConnector {
        let settings = BackendSettings {
            ollama_base_url: url.to_string(),
            ..Default::default()
        };
        HttpConnector::ollama(&settings).unwrap()
    }

    async fn collect(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_complete_sends_bearer_and_parses() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"content":"Hi there"},"finish_reason":"stop"}]}"#)
            .create_async()
            .await;

        let connector = openai_at(&server.url(), Some("sk-test"));
        let completion = connector
            .complete("gpt-4o-mini", "Hello", &CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(completion.text, "Hi there");
        assert_eq!(completion.stop_reason.as_deref(), Some("stop"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_credential_fails_before_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .expect(0)
            .create_async()
            .await;

        let connector = openai_at(&server.url(), None);
        let err = connector
            .complete("gpt-4o-mini", "Hello", &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Authentication { .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_reads_retry_after() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_header("retry-after", "12")
            .with_body(r#"{"error":{"message":"Too many requests"}}"#)
            .create_async()
            .await;

        let connector = openai_at(&server.url(), Some("sk-test"));
        let err = connector
            .complete("gpt-4o-mini", "Hello", &CompletionOptions::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LlmError::RateLimited {
                message: "openai: Too many requests".to_string(),
                retry_after: Some(12),
            }
        );
    }

    #[tokio::test]
    async fn test_unparseable_body_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let err = ollama_at(&server.url())
            .complete("llama3.2", "Hello", &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_openai_sse_stream() {
        let mut server = mockito::Server::new_async().await;
        let body = concat!(
            ": keep-alive\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let connector = openai_at(&server.url(), Some("sk-test"));
        let (tx, rx) = mpsc::channel(16);
        let completion = connector
            .stream("gpt-4o-mini", "Hello", &CompletionOptions::default(), tx)
            .await
            .unwrap();
        assert_eq!(completion.text, "Hello");
        assert_eq!(completion.stop_reason.as_deref(), Some("stop"));
        assert_eq!(
            collect(rx).await,
            vec![StreamEvent::text("Hel"), StreamEvent::text("lo")]
        );
    }

    #[tokio::test]
    async fn test_ollama_ndjson_stream_with_usage() {
        let mut server = mockito::Server::new_async().await;
        let body = concat!(
            "{\"response\":\"Hel\",\"done\":false}\n",
            "not json\n",
            "{\"response\":\"lo\",\"done\":false}\n",
            "{\"response\":\"\",\"done\":true,\"prompt_eval_count\":3,\"eval_count\":2}",
        );
        let _mock = server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let (tx, rx) = mpsc::channel(16);
        let completion = ollama_at(&server.url())
            .stream("llama3.2", "Hello", &CompletionOptions::default(), tx)
            .await
            .unwrap();
        assert_eq!(completion.text, "Hello");
        assert_eq!(
            completion.usage,
            Some(UsageStats {
                input_tokens: 3,
                output_tokens: 2
            })
        );
        let events = collect(rx).await;
        assert_eq!(events.len(), 3);
        assert!(matches!(events[2], StreamEvent::Usage { .. }));
    }

    #[tokio::test]
    async fn test_stream_without_end_marker_is_connection_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body("{\"response\":\"Hel\",\"done\":false}\n")
            .create_async()
            .await;

        let (tx, rx) = mpsc::channel(16);
        let err = ollama_at(&server.url())
            .stream("llama3.2", "Hello", &CompletionOptions::default(), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Connection { .. }));
        assert_eq!(collect(rx).await, vec![StreamEvent::text("Hel")]);
    }

    #[tokio::test]
    async fn test_stream_error_frame() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body("{\"error\":\"model 'nope' not found\"}\n")
            .create_async()
            .await;

        let (tx, _rx) = mpsc::channel(16);
        let err = ollama_at(&server.url())
            .stream("nope", "Hello", &CompletionOptions::default(), tx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("model 'nope' not found"));
    }

    #[tokio::test]
    async fn test_list_models() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_body(r#"{"models":[{"name":"llama3.2:latest"},{"name":"mistral:7b"}]}"#)
            .create_async()
            .await;

        let models = ollama_at(&server.url()).list_models().await.unwrap();
        assert_eq!(models, vec!["llama3.2:latest", "mistral:7b"]);
    }

    #[tokio::test]
    async fn test_closed_port_is_connection_error() {
        // Port 9 (discard) is reliably closed on test hosts
        let connector = ollama_at("http://127.0.0.1:9");
        let err = connector.list_models().await.unwrap_err();
        assert!(matches!(err, LlmError::Connection { .. }), "got {:?}", err);

        let err = connector
            .complete("llama3.2", "Hello", &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_custom_backend_round_trip() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/generate")
            .match_header("x-team", "prompts")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "input": "Say \"hi\"",
                "temperature": null
            })))
            .with_status(200)
            .with_body(r#"{"output":"hi"}"#)
            .create_async()
            .await;

        let mut headers = BTreeMap::new();
        headers.insert("x-team".to_string(), "prompts".to_string());
        let config = CustomBackendConfig {
            id: "mine".to_string(),
            display_name: "Mine".to_string(),
            url: format!("{}/generate", server.url()),
            payload_template: r#"{"input": "{prompt}", "temperature": {temperature}}"#.to_string(),
            headers,
            credential_account: None,
        };
        let connector =
            HttpConnector::custom(&config, &BackendSettings::default(), Arc::new(NoCredentials))
                .unwrap();
        assert_eq!(connector.list_models().await.unwrap(), vec!["default"]);

        let (tx, rx) = mpsc::channel(4);
        let completion = connector
            .stream("default", "Say \"hi\"", &CompletionOptions::default(), tx)
            .await
            .unwrap();
        assert_eq!(completion.text, "hi");
        assert_eq!(collect(rx).await, vec![StreamEvent::text("hi")]);
        mock.assert_async().await;
    }

    #[test]
    fn test_invalid_custom_config_is_config_error() {
        let config = CustomBackendConfig {
            id: "mine".to_string(),
            display_name: "Mine".to_string(),
            url: "not a url".to_string(),
            payload_template: r#"{"input": "{prompt}"}"#.to_string(),
            headers: BTreeMap::new(),
            credential_account: None,
        };
        let err = HttpConnector::custom(&config, &BackendSettings::default(), Arc::new(NoCredentials))
            .err()
            .unwrap();
        assert!(matches!(err, LlmError::InvalidConfig { .. }), "got {:?}", err);
    }
}
