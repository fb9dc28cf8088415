//! Backend Dispatcher
//!
//! Routes a rendered prompt to a registered backend, either as a single
//! request or as a stream of events with cooperative cancellation.
//!
//! A streaming execution always ends its event stream with exactly one
//! `Complete` or `Error`, unless it is cancelled, in which case nothing more
//! is delivered once the cancellation is observed.

use std::sync::Arc;
use std::time::Instant;

use prompt_studio_core::streaming::StreamEvent;
use prompt_studio_core::ExecutionState;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connector::Connector;
use crate::registry::BackendRegistry;
use crate::types::{
    BackendDescriptor, Completion, CompletionOptions, ExecutionOutcome, LlmError, LlmResult,
};

/// Capacity of event channels created by the dispatcher.
pub const STREAM_BUFFER: usize = 64;

/// Prompt used by [`Dispatcher::test_backend`] when none is given.
pub const DEFAULT_TEST_PROMPT: &str = "Reply with the single word: ready";

fn error_event(err: &LlmError) -> StreamEvent {
    StreamEvent::Error {
        message: err.to_string(),
        code: Some(err.code().to_string()),
    }
}

/// Move a published state forward. Illegal transitions are ignored, so a
/// finished execution never reports `in_flight` again.
fn advance_state(state: &watch::Sender<ExecutionState>, next: ExecutionState) {
    state.send_if_modified(|current| {
        if current.can_transition_to(next) {
            *current = next;
            true
        } else {
            warn!("[Dispatcher] Ignoring state change {:?} -> {:?}", current, next);
            false
        }
    });
}

/// Result of testing one backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendTestReport {
    pub backend: String,
    pub success: bool,
    pub models: Vec<String>,
    pub model: Option<String>,
    pub response: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<RwLock<BackendRegistry>>,
}

impl Dispatcher {
    pub fn new(registry: BackendRegistry) -> Self {
        Self {
            registry: Arc::new(RwLock::new(registry)),
        }
    }

    /// Register or replace a backend at runtime.
    pub async fn register(&self, connector: Arc<dyn Connector>) {
        self.registry.write().await.register(connector);
    }

    pub async fn backends(&self) -> Vec<BackendDescriptor> {
        self.registry.read().await.descriptors()
    }

    /// Look up a connector. The lock is released before any I/O happens.
    async fn connector(&self, backend: &str) -> LlmResult<Arc<dyn Connector>> {
        self.registry.read().await.require(backend)
    }

    /// Pick the model to use: the requested one, else the backend's default,
    /// else the first one it lists.
    pub async fn resolve_model(&self, backend: &str, requested: Option<&str>) -> LlmResult<String> {
        if let Some(model) = requested.map(str::trim).filter(|m| !m.is_empty()) {
            return Ok(model.to_string());
        }
        let connector = self.connector(backend).await?;
        if let Some(model) = &connector.descriptor().default_model {
            return Ok(model.clone());
        }
        let mut models = connector.list_models().await?;
        models.sort();
        models
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::MalformedResponse {
                message: format!("{} reports no models", backend),
                status: None,
            })
    }

    /// Non-streaming completion.
    pub async fn send(
        &self,
        backend: &str,
        model: &str,
        text: &str,
        options: &CompletionOptions,
    ) -> LlmResult<Completion> {
        let connector = self.connector(backend).await?;
        debug!("[Dispatcher] send {} / {} ({} chars)", backend, model, text.len());

        let started = Instant::now();
        let result = connector.complete(model, text, options).await;
        match &result {
            Ok(_) => info!(
                "[Dispatcher] {} / {} completed in {}ms",
                backend,
                model,
                started.elapsed().as_millis()
            ),
            Err(e) => warn!("[Dispatcher] {} / {} failed: {}", backend, model, e),
        }
        result
    }

    /// Streaming completion.
    ///
    /// Events go to `tx`: `TextDelta`s and `Usage` as they arrive, then one
    /// `Complete` or `Error`. Cancelling `cancel`, or dropping the receiver,
    /// drops the in-flight request and returns `Cancelled` with the text
    /// delivered so far; no terminal event is sent in that case.
    pub async fn send_streaming(
        &self,
        backend: &str,
        model: &str,
        text: &str,
        options: &CompletionOptions,
        tx: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> LlmResult<ExecutionOutcome> {
        let connector = match self.connector(backend).await {
            Ok(connector) => connector,
            Err(e) => {
                let _ = tx.send(error_event(&e)).await;
                return Err(e);
            }
        };
        debug!("[Dispatcher] stream {} / {} ({} chars)", backend, model, text.len());

        let started = Instant::now();
        let (inner_tx, mut inner_rx) = mpsc::channel(STREAM_BUFFER);
        let call = connector.stream(model, text, options, inner_tx);
        tokio::pin!(call);

        let mut partial = String::new();
        let mut outcome: Option<LlmResult<Completion>> = None;
        let mut channel_open = true;

        let result = loop {
            if !channel_open {
                if let Some(result) = outcome.take() {
                    break result;
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("[Dispatcher] {} / {} cancelled after {} chars", backend, model, partial.len());
                    return Ok(ExecutionOutcome::Cancelled { partial });
                }
                event = inner_rx.recv(), if channel_open => {
                    let Some(event) = event else {
                        channel_open = false;
                        continue;
                    };
                    // The terminal event is ours to send, once
                    if event.is_terminal() {
                        warn!("[Dispatcher] {} sent a terminal event, dropping it", backend);
                        continue;
                    }
                    if let StreamEvent::TextDelta { content } = &event {
                        partial.push_str(content);
                    }
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            info!("[Dispatcher] {} / {} cancelled after {} chars", backend, model, partial.len());
                            return Ok(ExecutionOutcome::Cancelled { partial });
                        }
                        sent = tx.send(event) => {
                            if sent.is_err() {
                                info!("[Dispatcher] {} / {} receiver dropped, stopping", backend, model);
                                return Ok(ExecutionOutcome::Cancelled { partial });
                            }
                        }
                    }
                }
                result = &mut call, if outcome.is_none() => {
                    outcome = Some(result);
                }
            }
        };

        match result {
            Ok(completion) => {
                info!(
                    "[Dispatcher] {} / {} streamed {} chars in {}ms",
                    backend,
                    model,
                    completion.text.len(),
                    started.elapsed().as_millis()
                );
                let _ = tx
                    .send(StreamEvent::Complete {
                        stop_reason: completion.stop_reason.clone(),
                    })
                    .await;
                Ok(ExecutionOutcome::Completed(completion))
            }
            Err(e) => {
                warn!("[Dispatcher] {} / {} stream failed: {}", backend, model, e);
                let _ = tx.send(error_event(&e)).await;
                Err(e)
            }
        }
    }

    /// Run a streaming execution on its own task.
    pub fn spawn(
        &self,
        backend: impl Into<String>,
        model: impl Into<String>,
        text: impl Into<String>,
        options: CompletionOptions,
    ) -> ExecutionHandle {
        let (backend, model, text) = (backend.into(), model.into(), text.into());
        let (tx, events) = mpsc::channel(STREAM_BUFFER);
        let (state_tx, state) = watch::channel(ExecutionState::Idle);
        let cancel = CancellationToken::new();

        let dispatcher = self.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            advance_state(&state_tx, ExecutionState::InFlight);
            let result = dispatcher
                .send_streaming(&backend, &model, &text, &options, tx, token)
                .await;
            advance_state(
                &state_tx,
                match &result {
                    Ok(outcome) => outcome.state(),
                    Err(_) => ExecutionState::Failed,
                },
            );
            result
        });

        ExecutionHandle {
            events,
            state,
            cancel,
            task,
        }
    }

    /// Models offered by a backend, sorted.
    pub async fn list_models(&self, backend: &str) -> LlmResult<Vec<String>> {
        let connector = self.connector(backend).await?;
        let mut models = connector.list_models().await?;
        models.sort();
        Ok(models)
    }

    /// Like [`list_models`](Self::list_models), but failures yield an empty
    /// list.
    pub async fn models_or_empty(&self, backend: &str) -> Vec<String> {
        match self.list_models(backend).await {
            Ok(models) => models,
            Err(e) => {
                warn!("[Dispatcher] Could not list models for {}: {}", backend, e);
                Vec::new()
            }
        }
    }

    /// List models, then complete a short prompt with the first one.
    ///
    /// Only an unknown backend is an error; backend failures are reported.
    pub async fn test_backend(
        &self,
        backend: &str,
        prompt: Option<&str>,
    ) -> LlmResult<BackendTestReport> {
        let connector = self.connector(backend).await?;
        let started = Instant::now();
        let mut report = BackendTestReport {
            backend: backend.to_string(),
            success: false,
            models: Vec::new(),
            model: None,
            response: None,
            error: None,
            duration_ms: 0,
        };

        match connector.list_models().await {
            Ok(mut models) => {
                models.sort();
                report.models = models;
            }
            Err(e) => {
                report.error = Some(e.to_string());
                report.duration_ms = started.elapsed().as_millis() as u64;
                return Ok(report);
            }
        }

        let model = report
            .models
            .first()
            .cloned()
            .or_else(|| connector.descriptor().default_model.clone());
        let Some(model) = model else {
            report.error = Some(format!("{} reports no models", backend));
            report.duration_ms = started.elapsed().as_millis() as u64;
            return Ok(report);
        };

        let options = CompletionOptions::default().with_max_tokens(32);
        match connector
            .complete(&model, prompt.unwrap_or(DEFAULT_TEST_PROMPT), &options)
            .await
        {
            Ok(completion) => {
                report.success = true;
                report.response = Some(completion.text);
            }
            Err(e) => report.error = Some(e.to_string()),
        }
        report.model = Some(model);
        report.duration_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }
}

/// A streaming execution running on its own task.
pub struct ExecutionHandle {
    events: mpsc::Receiver<StreamEvent>,
    state: watch::Receiver<ExecutionState>,
    cancel: CancellationToken,
    task: JoinHandle<LlmResult<ExecutionOutcome>>,
}

impl ExecutionHandle {
    /// Request cancellation. Returns immediately.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> ExecutionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ExecutionState> {
        self.state.clone()
    }

    /// Next event, or `None` once the execution has stopped sending.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Wait for the execution to finish. Events not yet taken are discarded.
    pub async fn join(mut self) -> LlmResult<ExecutionOutcome> {
        while self.events.recv().await.is_some() {}
        self.task.await.map_err(|e| LlmError::Connection {
            message: format!("execution task failed: {}", e),
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_connector::HttpConnector;
    use crate::settings::BackendSettings;
    use crate::types::UsageStats;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    /// Emits fixed fragments, optionally waiting on a gate between them.
    struct FakeConnector {
        descriptor: BackendDescriptor,
        fragments: Vec<&'static str>,
        gate: Option<Arc<Notify>>,
        fail_after: Option<LlmError>,
        models: Vec<&'static str>,
        /// Sends its own `Complete` before the fragments
        early_complete: bool,
    }

    impl FakeConnector {
        fn new(id: &str, fragments: Vec<&'static str>) -> Self {
            Self {
                descriptor: BackendDescriptor {
                    id: id.to_string(),
                    display_name: id.to_string(),
                    base_url: "memory://".to_string(),
                    credential: None,
                    supports_streaming: true,
                    supports_model_listing: true,
                    default_model: None,
                },
                fragments,
                gate: None,
                fail_after: None,
                models: vec!["zeta", "alpha"],
                early_complete: false,
            }
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        fn descriptor(&self) -> &BackendDescriptor {
            &self.descriptor
        }

        async fn list_models(&self) -> LlmResult<Vec<String>> {
            Ok(self.models.iter().map(|m| m.to_string()).collect())
        }

        async fn complete(
            &self,
            model: &str,
            _text: &str,
            _options: &CompletionOptions,
        ) -> LlmResult<Completion> {
            Ok(Completion {
                text: self.fragments.concat(),
                model: model.to_string(),
                usage: None,
                stop_reason: Some("stop".to_string()),
            })
        }

        async fn stream(
            &self,
            model: &str,
            _text: &str,
            _options: &CompletionOptions,
            tx: mpsc::Sender<StreamEvent>,
        ) -> LlmResult<Completion> {
            if self.early_complete {
                let _ = tx
                    .send(StreamEvent::Complete {
                        stop_reason: Some("early".to_string()),
                    })
                    .await;
            }
            for (i, fragment) in self.fragments.iter().enumerate() {
                if i > 0 {
                    if let Some(gate) = &self.gate {
                        gate.notified().await;
                    }
                }
                let _ = tx.send(StreamEvent::text(*fragment)).await;
            }
            if let Some(err) = &self.fail_after {
                return Err(err.clone());
            }
            let _ = tx
                .send(StreamEvent::Usage {
                    input_tokens: 4,
                    output_tokens: 2,
                })
                .await;
            Ok(Completion {
                text: self.fragments.concat(),
                model: model.to_string(),
                usage: Some(UsageStats {
                    input_tokens: 4,
                    output_tokens: 2,
                }),
                stop_reason: Some("stop".to_string()),
            })
        }
    }

    fn dispatcher_with(connector: FakeConnector) -> Dispatcher {
        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(connector));
        Dispatcher::new(registry)
    }

    #[tokio::test]
    async fn test_stream_fragments_then_complete() {
        let dispatcher = dispatcher_with(FakeConnector::new("fake", vec!["Hel", "lo"]));
        let mut handle = dispatcher.spawn("fake", "m", "Hi", CompletionOptions::default());

        let mut events = Vec::new();
        while let Some(event) = handle.next_event().await {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                StreamEvent::text("Hel"),
                StreamEvent::text("lo"),
                StreamEvent::Usage {
                    input_tokens: 4,
                    output_tokens: 2
                },
                StreamEvent::Complete {
                    stop_reason: Some("stop".to_string())
                },
            ]
        );

        let outcome = handle.join().await.unwrap();
        assert_eq!(outcome.text(), "Hello");
        assert_eq!(outcome.state(), ExecutionState::Completed);
    }

    #[tokio::test]
    async fn test_single_terminal_event() {
        let mut fake = FakeConnector::new("fake", vec!["Hel", "lo"]);
        fake.early_complete = true;
        let dispatcher = dispatcher_with(fake);
        let mut handle = dispatcher.spawn("fake", "m", "Hi", CompletionOptions::default());

        let mut events = Vec::new();
        while let Some(event) = handle.next_event().await {
            events.push(event);
        }
        let terminals: Vec<&StreamEvent> = events.iter().filter(|e| e.is_terminal()).collect();
        assert_eq!(
            terminals,
            vec![&StreamEvent::Complete {
                stop_reason: Some("stop".to_string())
            }]
        );
        assert!(events.last().is_some_and(StreamEvent::is_terminal));
        assert_eq!(events[0], StreamEvent::text("Hel"));
    }

    #[tokio::test]
    async fn test_state_never_leaves_terminal() {
        let (tx, rx) = watch::channel(ExecutionState::Idle);
        advance_state(&tx, ExecutionState::InFlight);
        advance_state(&tx, ExecutionState::Completed);
        advance_state(&tx, ExecutionState::InFlight);
        advance_state(&tx, ExecutionState::Failed);
        assert_eq!(*rx.borrow(), ExecutionState::Completed);

        let dispatcher = dispatcher_with(FakeConnector::new("fake", vec!["ok"]));
        let handle = dispatcher.spawn("fake", "m", "Hi", CompletionOptions::default());
        let state = handle.watch_state();
        handle.join().await.unwrap();
        assert_eq!(*state.borrow(), ExecutionState::Completed);
    }

    #[tokio::test]
    async fn test_no_fragment_after_cancel() {
        let gate = Arc::new(Notify::new());
        let mut fake = FakeConnector::new("fake", vec!["Hel", "lo"]);
        fake.gate = Some(gate.clone());
        let dispatcher = dispatcher_with(fake);

        let mut handle = dispatcher.spawn("fake", "m", "Hi", CompletionOptions::default());
        assert_eq!(handle.next_event().await, Some(StreamEvent::text("Hel")));

        handle.cancel();
        gate.notify_one();

        assert_eq!(handle.next_event().await, None);
        let mut state = handle.watch_state();
        let outcome = handle.join().await.unwrap();
        assert_eq!(
            outcome,
            ExecutionOutcome::Cancelled {
                partial: "Hel".to_string()
            }
        );
        assert_eq!(*state.borrow_and_update(), ExecutionState::Cancelled);
    }

    #[tokio::test]
    async fn test_stream_failure_sends_error_event() {
        let mut fake = FakeConnector::new("fake", vec!["Hel"]);
        fake.fail_after = Some(LlmError::Connection {
            message: "reset by peer".to_string(),
        });
        let dispatcher = dispatcher_with(fake);

        let (tx, mut rx) = mpsc::channel(8);
        let err = dispatcher
            .send_streaming("fake", "m", "Hi", &CompletionOptions::default(), tx, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Connection { .. }));

        assert_eq!(rx.recv().await, Some(StreamEvent::text("Hel")));
        match rx.recv().await {
            Some(StreamEvent::Error { code, .. }) => assert_eq!(code.as_deref(), Some("connection")),
            other => panic!("expected error event, got {:?}", other),
        }
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_unknown_backend() {
        let dispatcher = Dispatcher::new(BackendRegistry::new());
        let err = dispatcher
            .send("nope", "m", "Hi", &CompletionOptions::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LlmError::UnknownBackend {
                backend: "nope".to_string()
            }
        );

        let handle = dispatcher.spawn("nope", "m", "Hi", CompletionOptions::default());
        assert!(handle.join().await.is_err());
    }

    #[tokio::test]
    async fn test_models_sorted_and_model_resolution() {
        let dispatcher = dispatcher_with(FakeConnector::new("fake", vec!["ok"]));
        assert_eq!(dispatcher.list_models("fake").await.unwrap(), vec!["alpha", "zeta"]);
        assert_eq!(dispatcher.resolve_model("fake", None).await.unwrap(), "alpha");
        assert_eq!(
            dispatcher.resolve_model("fake", Some("zeta")).await.unwrap(),
            "zeta"
        );
    }

    #[tokio::test]
    async fn test_local_backend_down() {
        let settings = BackendSettings {
            ollama_base_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        };
        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(HttpConnector::ollama(&settings).unwrap()));
        let dispatcher = Dispatcher::new(registry);

        let err = dispatcher
            .send("ollama", "llama3.2", "Hi", &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Connection { .. }));
        assert!(dispatcher.models_or_empty("ollama").await.is_empty());

        let report = dispatcher.test_backend("ollama", None).await.unwrap();
        assert!(!report.success);
        assert!(report.error.is_some());
    }

    #[tokio::test]
    async fn test_backend_report() {
        let dispatcher = dispatcher_with(FakeConnector::new("fake", vec!["ready"]));
        let report = dispatcher.test_backend("fake", None).await.unwrap();
        assert!(report.success);
        assert_eq!(report.model.as_deref(), Some("alpha"));
        assert_eq!(report.response.as_deref(), Some("ready"));
    }
}
