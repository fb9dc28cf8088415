//! Execution Service
//!
//! Sends rendered prompts to a backend through the dispatcher and records
//! each run in the history, whatever its outcome.

use std::sync::Arc;
use std::time::Instant;

use prompt_studio_core::StreamEvent;
use prompt_studio_llm::{BackendRegistry, CompletionOptions, Dispatcher, ExecutionOutcome, LlmError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::history::{ExecutionStatus, HistoryEntry, NewHistoryEntry, RequestPayload};
use crate::models::settings::AppConfig;
use crate::services::history::HistoryService;
use crate::services::prompt::PromptService;
use crate::storage::secrets::{SecretStore, PROXY_PASSWORD_ACCOUNT};
use crate::storage::Database;
use crate::utils::error::AppResult;

/// Build a dispatcher for the configured backends.
///
/// Credentials and the proxy password come from the secret store.
pub fn build_dispatcher(config: &AppConfig, secrets: Arc<SecretStore>) -> AppResult<Dispatcher> {
    let mut settings = config.backend_settings();
    if let Some(proxy) = settings.proxy.as_mut() {
        if proxy.username.is_some() && proxy.password.is_none() {
            proxy.password = secrets.get(PROXY_PASSWORD_ACCOUNT)?;
        }
    }

    let registry = BackendRegistry::with_defaults(&settings, secrets)?;
    debug!("[Execution] Dispatcher ready with {} backends", registry.len());
    Ok(Dispatcher::new(registry))
}

/// One execution to run
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Library prompt the text was rendered from, if any
    pub prompt_id: Option<String>,
    pub backend: String,
    /// Falls back to the backend's default model
    pub model: Option<String>,
    pub text: String,
    pub options: CompletionOptions,
}

/// Runs executions and keeps the history
pub struct ExecutionService {
    dispatcher: Dispatcher,
    prompts: PromptService,
    history: HistoryService,
}

impl ExecutionService {
    pub fn new(dispatcher: Dispatcher, db: &Database) -> Self {
        Self {
            dispatcher,
            prompts: PromptService::from_database(db),
            history: HistoryService::from_database(db),
        }
    }

    /// Single request, whole response.
    ///
    /// A backend failure is recorded and returned as a `failed` entry; only
    /// caller errors (unknown backend, unresolvable model) are `Err`.
    pub async fn run_once(&self, request: ExecutionRequest) -> AppResult<HistoryEntry> {
        let model = self
            .dispatcher
            .resolve_model(&request.backend, request.model.as_deref())
            .await?;

        let started = Instant::now();
        let result = self
            .dispatcher
            .send(&request.backend, &model, &request.text, &request.options)
            .await;

        let (status, response_text, error) = match result {
            Ok(completion) => (ExecutionStatus::Completed, completion.text, None),
            Err(e) => (ExecutionStatus::Failed, String::new(), Some(e)),
        };
        self.finish(request, model, started, status, response_text, error)
    }

    /// Streaming request. `on_fragment` sees each piece of text as it
    /// arrives; cancelling `cancel` stops the request and records the
    /// partial response.
    pub async fn run_streaming<F>(
        &self,
        request: ExecutionRequest,
        mut on_fragment: F,
        cancel: CancellationToken,
    ) -> AppResult<HistoryEntry>
    where
        F: FnMut(&str),
    {
        let model = self
            .dispatcher
            .resolve_model(&request.backend, request.model.as_deref())
            .await?;

        let started = Instant::now();
        let mut handle = self.dispatcher.spawn(
            request.backend.clone(),
            model.clone(),
            request.text.clone(),
            request.options.clone(),
        );

        let mut received = String::new();
        let mut cancel_sent = false;
        loop {
            tokio::select! {
                _ = cancel.cancelled(), if !cancel_sent => {
                    handle.cancel();
                    cancel_sent = true;
                }
                event = handle.next_event() => match event {
                    Some(StreamEvent::TextDelta { content }) => {
                        on_fragment(&content);
                        received.push_str(&content);
                    }
                    Some(_) => {}
                    None => break,
                }
            }
        }

        let (status, response_text, error) = match handle.join().await {
            Ok(ExecutionOutcome::Completed(completion)) => {
                (ExecutionStatus::Completed, completion.text, None)
            }
            Ok(ExecutionOutcome::Cancelled { partial }) => {
                (ExecutionStatus::Cancelled, partial, None)
            }
            Err(e) => (ExecutionStatus::Failed, received, Some(e)),
        };
        self.finish(request, model, started, status, response_text, error)
    }

    fn finish(
        &self,
        request: ExecutionRequest,
        model: String,
        started: Instant,
        status: ExecutionStatus,
        response_text: String,
        error: Option<LlmError>,
    ) -> AppResult<HistoryEntry> {
        let duration_ms = started.elapsed().as_millis() as u64;
        match &error {
            Some(e) => warn!("[Execution] {} / {} failed: {}", request.backend, model, e),
            None => info!(
                "[Execution] {} / {} {} in {}ms",
                request.backend, model, status, duration_ms
            ),
        }

        if let Some(prompt_id) = &request.prompt_id {
            self.prompts.record_use(prompt_id)?;
        }

        self.history.record(NewHistoryEntry {
            prompt_id: request.prompt_id,
            backend: request.backend,
            model,
            request_payload: RequestPayload {
                text: request.text,
                options: request.options,
            },
            response_text,
            status,
            error: error.map(|e| e.to_string()),
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::history::HistoryFilter;
    use crate::utils::error::AppError;
    use prompt_studio_llm::{BackendSettings, HttpConnector};

    fn service_for(base_url: &str) -> (ExecutionService, Database) {
        let db = Database::new_in_memory().unwrap();
        let settings = BackendSettings {
            ollama_base_url: base_url.to_string(),
            ..Default::default()
        };
        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(HttpConnector::ollama(&settings).unwrap()));
        let service = ExecutionService::new(Dispatcher::new(registry), &db);
        (service, db)
    }

    fn request(text: &str) -> ExecutionRequest {
        ExecutionRequest {
            prompt_id: None,
            backend: "ollama".to_string(),
            model: Some("llama3".to_string()),
            text: text.to_string(),
            options: CompletionOptions::default(),
        }
    }

    #[tokio::test]
    async fn test_streaming_run_recorded() {
        let mut server = mockito::Server::new_async().await;
        let body = concat!(
            "{\"model\":\"llama3\",\"response\":\"Hel\",\"done\":false}\n",
            "{\"model\":\"llama3\",\"response\":\"lo\",\"done\":false}\n",
            "{\"model\":\"llama3\",\"response\":\"\",\"done\":true,\"done_reason\":\"stop\"}\n",
        );
        let mock = server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_header("content-type", "application/x-ndjson")
            .with_body(body)
            .create_async()
            .await;

        let (service, db) = service_for(&server.url());
        let mut fragments = Vec::new();
        let entry = service
            .run_streaming(
                request("Say hello"),
                |f| fragments.push(f.to_string()),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(fragments, vec!["Hel", "lo"]);
        assert_eq!(entry.status, ExecutionStatus::Completed);
        assert_eq!(entry.response_text, "Hello");
        assert_eq!(entry.request_payload.text, "Say hello");

        let history = HistoryService::from_database(&db)
            .list(&HistoryFilter::default())
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_backend_down_recorded_as_failed() {
        let (service, _db) = service_for("http://127.0.0.1:9");
        let entry = service.run_once(request("anyone there?")).await.unwrap();
        assert_eq!(entry.status, ExecutionStatus::Failed);
        assert!(entry.error.is_some());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (service, _db) = service_for("http://127.0.0.1:9");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let entry = service
            .run_streaming(request("never sent"), |_| {}, cancel)
            .await
            .unwrap();
        assert_eq!(entry.status, ExecutionStatus::Cancelled);
        assert_eq!(entry.response_text, "");
    }

    #[tokio::test]
    async fn test_unknown_backend_is_caller_error() {
        let (service, _db) = service_for("http://127.0.0.1:9");
        let mut req = request("x");
        req.backend = "nope".to_string();
        let err = service.run_once(req).await.unwrap_err();
        assert!(matches!(err, AppError::Llm(LlmError::UnknownBackend { .. })));
    }

    #[tokio::test]
    async fn test_run_counts_prompt_use() {
        let (service, db) = service_for("http://127.0.0.1:9");
        let prompts = PromptService::from_database(&db);
        let prompt = prompts
            .create_prompt(crate::models::prompt::PromptCreateRequest {
                name: "Ping".to_string(),
                content: "ping".to_string(),
                ..Default::default()
            })
            .unwrap();

        let mut req = request("ping");
        req.prompt_id = Some(prompt.id.clone());
        service.run_once(req).await.unwrap();

        assert_eq!(prompts.get_prompt(&prompt.id).unwrap().unwrap().use_count, 1);
    }

    #[tokio::test]
    async fn test_build_dispatcher_registers_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let secrets = Arc::new(SecretStore::open(dir.path()).unwrap());
        secrets.set(PROXY_PASSWORD_ACCOUNT, "pw").unwrap();

        let mut config = AppConfig::default();
        config.proxy = Some(prompt_studio_core::ProxyConfig {
            protocol: prompt_studio_core::ProxyProtocol::Http,
            host: "127.0.0.1".to_string(),
            port: 3128,
            username: Some("me".to_string()),
            password: None,
        });

        let dispatcher = build_dispatcher(&config, secrets).unwrap();
        let ids: Vec<String> = dispatcher.backends().await.into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["openai", "ollama", "lmstudio"]);
    }
}
