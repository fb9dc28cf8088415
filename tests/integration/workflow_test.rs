//! Workflow Tests
//!
//! The command layer over a real `AppState` in a temporary data directory:
//! library management, rendering, execution against a mock backend, history
//! and settings.

use prompt_studio::models::history::{ExecutionStatus, HistoryFilter};
use prompt_studio::models::prompt::{PromptCreateRequest, PromptFilter, PromptUpdateRequest};
use prompt_studio::*;
use prompt_studio_template::{ParamValue, PlaceholderKind, RenderContext};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

async fn initialized() -> (AppState, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::new();
    let init = init_app(&state, Some(dir.path())).await.into_result().unwrap();
    assert!(init.seeded_prompts > 0);
    (state, dir)
}

fn context(pairs: &[(&str, &str)]) -> RenderContext {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), ParamValue::Text(v.to_string())))
        .collect()
}

async fn point_ollama_at(state: &AppState, url: &str) {
    let update = SettingsUpdate::from_key_value("ollama_base_url", url).unwrap();
    update_settings(state, update).await.into_result().unwrap();
}

#[tokio::test]
async fn test_seeded_library_renders() {
    let (state, dir) = initialized().await;

    let health = get_health(&state).await.into_result().unwrap();
    assert!(health.database && health.secrets && health.config);

    let placeholders = get_placeholders(&state, "Expert Helper".to_string())
        .await
        .into_result()
        .unwrap();
    let names: Vec<&str> = placeholders.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["expertise", "task"]);

    let text = render_prompt(
        &state,
        "Expert Helper".to_string(),
        context(&[("expertise", "historian"), ("task", "dating an artifact")]),
    )
    .await
    .into_result()
    .unwrap();
    assert_eq!(text, "Act as a historian and help with dating an artifact.");

    let err = render_prompt(&state, "Expert Helper".to_string(), RenderContext::new())
        .await
        .into_result()
        .unwrap_err();
    assert!(err.contains("expertise"));

    // A second init leaves the library alone
    let again = init_app(&state, Some(dir.path())).await.into_result().unwrap();
    assert_eq!(again.seeded_prompts, 0);
}

#[tokio::test]
async fn test_prompt_lifecycle() {
    let (state, _dir) = initialized().await;

    let created = create_prompt(
        &state,
        PromptCreateRequest {
            name: "Summarize".to_string(),
            content: "Summarize in {{ words }} words: {{ text }}".to_string(),
            category: Some("writing".to_string()),
            tags: vec!["short".to_string()],
            ..Default::default()
        },
    )
    .await
    .into_result()
    .unwrap();
    assert_eq!(created.placeholders.len(), 2);

    let duplicate = create_prompt(
        &state,
        PromptCreateRequest {
            name: "Summarize".to_string(),
            content: "x".to_string(),
            ..Default::default()
        },
    )
    .await;
    assert!(!duplicate.success);

    // Retyping a placeholder survives a content edit that keeps it
    let mut placeholders = created.placeholders.clone();
    placeholders[0].kind = PlaceholderKind::Integer;
    placeholders[0].default = None;
    update_prompt(
        &state,
        created.id.clone(),
        PromptUpdateRequest {
            placeholders: Some(placeholders),
            ..Default::default()
        },
    )
    .await
    .into_result()
    .unwrap();
    let edited = update_prompt(
        &state,
        "Summarize".to_string(),
        PromptUpdateRequest {
            content: Some("In {{ words }} words: {{ text }}".to_string()),
            ..Default::default()
        },
    )
    .await
    .into_result()
    .unwrap();
    assert_eq!(edited.placeholders[0].kind, PlaceholderKind::Integer);

    let err = render_prompt(
        &state,
        "Summarize".to_string(),
        context(&[("words", "many"), ("text", "...")]),
    )
    .await
    .into_result()
    .unwrap_err();
    assert!(err.contains("words"));

    let favorite = toggle_favorite(&state, "Summarize".to_string())
        .await
        .into_result()
        .unwrap();
    assert!(favorite.is_favorite);
    let favorites = list_prompts(
        &state,
        PromptFilter {
            favorites_only: true,
            ..Default::default()
        },
    )
    .await
    .into_result()
    .unwrap();
    assert_eq!(favorites.len(), 1);

    assert!(list_categories(&state)
        .await
        .into_result()
        .unwrap()
        .contains(&"writing".to_string()));
    assert!(list_tags(&state)
        .await
        .into_result()
        .unwrap()
        .contains(&"short".to_string()));

    delete_prompt(&state, "Summarize".to_string())
        .await
        .into_result()
        .unwrap();
    assert!(!get_prompt(&state, created.id).await.success);
}

#[tokio::test]
async fn test_run_prompt_streams_and_records_history() {
    let (state, _dir) = initialized().await;

    let mut server = mockito::Server::new_async().await;
    let body = concat!(
        "{\"model\":\"llama3\",\"response\":\"Carbon \",\"done\":false}\n",
        "{\"model\":\"llama3\",\"response\":\"dating.\",\"done\":false}\n",
        "{\"model\":\"llama3\",\"response\":\"\",\"done\":true,\"done_reason\":\"stop\"}\n",
    );
    let mock = server
        .mock("POST", "/api/generate")
        .with_status(200)
        .with_header("content-type", "application/x-ndjson")
        .with_body(body)
        .create_async()
        .await;
    point_ollama_at(&state, &server.url()).await;

    let mut fragments = Vec::new();
    let entry = run_prompt(
        &state,
        RunPromptRequest {
            prompt: "Expert Helper".to_string(),
            context: context(&[("expertise", "historian"), ("task", "dating an artifact")]),
            backend: Some("ollama".to_string()),
            model: Some("llama3".to_string()),
            options: Default::default(),
            stream: true,
        },
        |f| fragments.push(f.to_string()),
        CancellationToken::new(),
    )
    .await
    .into_result()
    .unwrap();
    mock.assert_async().await;

    assert_eq!(fragments, vec!["Carbon ", "dating."]);
    assert_eq!(entry.status, ExecutionStatus::Completed);
    assert_eq!(entry.response_text, "Carbon dating.");
    assert_eq!(
        entry.request_payload.text,
        "Act as a historian and help with dating an artifact."
    );

    let prompt = get_prompt(&state, "Expert Helper".to_string())
        .await
        .into_result()
        .unwrap();
    assert_eq!(prompt.use_count, 1);

    let history = list_history(
        &state,
        HistoryFilter {
            prompt_id: Some("Expert Helper".to_string()),
            ..Default::default()
        },
    )
    .await
    .into_result()
    .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, entry.id);

    assert_eq!(clear_history(&state).await.into_result().unwrap(), 1);
}

#[tokio::test]
async fn test_run_prompt_backend_down_is_failed_entry() {
    let (state, _dir) = initialized().await;
    point_ollama_at(&state, "http://127.0.0.1:9").await;

    let entry = run_prompt(
        &state,
        RunPromptRequest {
            prompt: "Expert Helper".to_string(),
            context: context(&[("expertise", "chemist"), ("task", "titration")]),
            backend: Some("ollama".to_string()),
            model: Some("llama3".to_string()),
            options: Default::default(),
            stream: false,
        },
        |_| {},
        CancellationToken::new(),
    )
    .await
    .into_result()
    .unwrap();
    assert_eq!(entry.status, ExecutionStatus::Failed);
    assert!(entry.error.is_some());

    let models = list_models(&state, "ollama".to_string()).await;
    assert!(!models.success);
}

#[tokio::test]
async fn test_run_prompt_render_error_sends_nothing() {
    let (state, _dir) = initialized().await;

    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/generate")
        .expect(0)
        .create_async()
        .await;
    point_ollama_at(&state, &server.url()).await;

    let response = run_prompt(
        &state,
        RunPromptRequest {
            prompt: "Expert Helper".to_string(),
            context: RenderContext::new(),
            backend: Some("ollama".to_string()),
            model: Some("llama3".to_string()),
            options: Default::default(),
            stream: true,
        },
        |_| {},
        CancellationToken::new(),
    )
    .await;
    assert!(!response.success);
    mock.assert_async().await;

    let history = list_history(&state, HistoryFilter::default())
        .await
        .into_result()
        .unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn test_settings_and_backends() {
    let (state, dir) = initialized().await;

    let ids: Vec<String> = list_backends(&state)
        .await
        .into_result()
        .unwrap()
        .into_iter()
        .map(|b| b.id)
        .collect();
    assert_eq!(ids, vec!["openai", "ollama", "lmstudio"]);

    let report = test_backend(&state, "nope".to_string(), None).await;
    assert!(!report.success);

    let update = SettingsUpdate::from_key_value("request_timeout_secs", "5").unwrap();
    let config = update_settings(&state, update).await.into_result().unwrap();
    assert_eq!(config.request_timeout_secs, 5);

    // Persisted for the next process
    let reopened = AppState::new();
    reopened.initialize_in(dir.path()).await.unwrap();
    assert_eq!(reopened.get_config().await.unwrap().request_timeout_secs, 5);

    set_secret(&state, "openai_api_key".to_string(), "sk-test".to_string())
        .await
        .into_result()
        .unwrap();
    assert_eq!(
        list_secrets(&state).await.into_result().unwrap(),
        vec!["openai_api_key"]
    );
    assert!(!std::fs::read_to_string(dir.path().join("secrets.enc"))
        .unwrap()
        .contains("sk-test"));

    let reset = reset_settings(&state).await.into_result().unwrap();
    assert_eq!(reset, AppConfig::default());
}
