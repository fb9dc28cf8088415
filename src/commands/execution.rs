//! Execution Commands
//!
//! Render a stored prompt and send it to a backend.

use prompt_studio_llm::CompletionOptions;
use prompt_studio_template::RenderContext;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::models::history::HistoryEntry;
use crate::models::response::CommandResponse;
use crate::services::composer;
use crate::services::execution::ExecutionRequest;
use crate::services::prompt::PromptService;
use crate::state::AppState;
use crate::utils::error::AppResult;

fn default_stream() -> bool {
    true
}

/// Request to run a library prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPromptRequest {
    /// Prompt ID or name
    pub prompt: String,
    #[serde(default)]
    pub context: RenderContext,
    /// Defaults to the configured backend
    pub backend: Option<String>,
    /// Defaults to the configured model, then the backend's own default
    pub model: Option<String>,
    #[serde(default)]
    pub options: CompletionOptions,
    #[serde(default = "default_stream")]
    pub stream: bool,
}

/// Render a prompt and run it.
///
/// Rendering errors are reported before anything is sent. Backend failures
/// come back as a recorded entry with status `failed`.
pub async fn run_prompt<F>(
    state: &AppState,
    request: RunPromptRequest,
    on_fragment: F,
    cancel: CancellationToken,
) -> CommandResponse<HistoryEntry>
where
    F: FnMut(&str),
{
    let result: AppResult<HistoryEntry> = async {
        let (prompt_id, text) = state
            .with_database(|db| {
                let prompt = PromptService::from_database(db).find(&request.prompt)?;
                let text = composer::compose(&prompt, &request.context)?;
                Ok((prompt.id, text))
            })
            .await?;

        let config = state.get_config().await?;
        let backend = request
            .backend
            .unwrap_or_else(|| config.default_backend.clone());
        let model = request.model.or_else(|| {
            if backend == config.default_backend {
                config.default_model.clone()
            } else {
                None
            }
        });

        let execution = ExecutionRequest {
            prompt_id: Some(prompt_id),
            backend,
            model,
            text,
            options: request.options,
        };

        let service = state.execution_service().await?;
        if request.stream {
            service.run_streaming(execution, on_fragment, cancel).await
        } else {
            service.run_once(execution).await
        }
    }
    .await;

    result.into()
}
