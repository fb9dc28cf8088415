//! Dispatcher Tests
//!
//! Backend dispatch through the public `prompt_studio_llm` API against
//! mock servers and closed ports.

use std::sync::Arc;

use prompt_studio_core::{ExecutionState, StreamEvent};
use prompt_studio_llm::{
    BackendRegistry, BackendSettings, CompletionOptions, Dispatcher, ExecutionOutcome,
    HttpConnector, LlmError, StaticCredentials, CREDENTIAL_SERVICE, OPENAI_ACCOUNT,
};

fn openai_dispatcher(base_url: &str) -> Dispatcher {
    let settings = BackendSettings {
        openai_base_url: base_url.to_string(),
        ..Default::default()
    };
    let creds = StaticCredentials::new().with(CREDENTIAL_SERVICE, OPENAI_ACCOUNT, "sk-test");
    let mut registry = BackendRegistry::new();
    registry.register(Arc::new(HttpConnector::openai(&settings, Arc::new(creds)).unwrap()));
    Dispatcher::new(registry)
}

fn ollama_dispatcher(base_url: &str) -> Dispatcher {
    let settings = BackendSettings {
        ollama_base_url: base_url.to_string(),
        ..Default::default()
    };
    let mut registry = BackendRegistry::new();
    registry.register(Arc::new(HttpConnector::ollama(&settings).unwrap()));
    Dispatcher::new(registry)
}

#[tokio::test]
async fn test_unreachable_backend_lists_no_models() {
    let dispatcher = ollama_dispatcher("http://127.0.0.1:9");

    assert!(dispatcher.models_or_empty("ollama").await.is_empty());
    let err = dispatcher.list_models("ollama").await.unwrap_err();
    assert!(matches!(err, LlmError::Connection { .. } | LlmError::Timeout { .. }));

    let report = dispatcher.test_backend("ollama", None).await.unwrap();
    assert!(!report.success);
    assert!(report.error.is_some());
}

#[tokio::test]
async fn test_unknown_backend_rejected() {
    let dispatcher = ollama_dispatcher("http://127.0.0.1:9");
    let err = dispatcher
        .send("nope", "m", "hi", &CompletionOptions::default())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LlmError::UnknownBackend {
            backend: "nope".to_string()
        }
    );
    assert!(dispatcher.test_backend("nope", None).await.is_err());
}

#[tokio::test]
async fn test_openai_stream_fragments_then_complete() {
    let mut server = mockito::Server::new_async().await;
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let dispatcher = openai_dispatcher(&server.url());
    let mut handle = dispatcher.spawn(
        "openai".to_string(),
        "gpt-4o-mini".to_string(),
        "Say hello".to_string(),
        CompletionOptions::default(),
    );

    let mut fragments = Vec::new();
    let mut terminal = None;
    while let Some(event) = handle.next_event().await {
        match event {
            StreamEvent::TextDelta { content } => fragments.push(content),
            StreamEvent::Complete { .. } | StreamEvent::Error { .. } => terminal = Some(event),
            _ => {}
        }
    }

    assert_eq!(fragments, vec!["Hel", "lo"]);
    assert!(matches!(terminal, Some(StreamEvent::Complete { .. })));
    let state = handle.watch_state();
    match handle.join().await.unwrap() {
        ExecutionOutcome::Completed(completion) => assert_eq!(completion.text, "Hello"),
        other => panic!("expected completion, got {:?}", other),
    }
    assert_eq!(*state.borrow(), ExecutionState::Completed);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_ollama_models_listed_sorted() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/tags")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"models":[{"name":"mistral:latest"},{"name":"llama3.2:latest"}]}"#)
        .create_async()
        .await;

    let dispatcher = ollama_dispatcher(&server.url());
    assert_eq!(
        dispatcher.list_models("ollama").await.unwrap(),
        vec!["llama3.2:latest", "mistral:latest"]
    );
    assert_eq!(
        dispatcher.resolve_model("ollama", None).await.unwrap(),
        "llama3.2:latest"
    );
    assert_eq!(
        dispatcher.resolve_model("ollama", Some("phi3")).await.unwrap(),
        "phi3"
    );
}

#[tokio::test]
async fn test_http_status_mapping() {
    let cases: [(usize, fn(&LlmError) -> bool); 5] = [
        (401, |e| matches!(e, LlmError::Authentication { .. })),
        (429, |e| matches!(e, LlmError::RateLimited { .. })),
        (504, |e| matches!(e, LlmError::Timeout { .. })),
        (500, |e| matches!(e, LlmError::Connection { .. })),
        (418, |e| {
            matches!(
                e,
                LlmError::MalformedResponse {
                    status: Some(418),
                    ..
                }
            )
        }),
    ];

    for (status, expected) in cases {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(status)
            .with_body(r#"{"error":{"message":"nope"}}"#)
            .create_async()
            .await;

        let err = openai_dispatcher(&server.url())
            .send("openai", "gpt-4o-mini", "hi", &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(expected(&err), "HTTP {} gave {:?}", status, err);
    }
}
