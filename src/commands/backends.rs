//! Backend Commands
//!
//! Listing, testing and model discovery for the registered backends.

use prompt_studio_llm::{BackendDescriptor, BackendTestReport};

use crate::models::response::CommandResponse;
use crate::state::AppState;
use crate::utils::error::AppResult;

/// Registered backends, in registration order
pub async fn list_backends(state: &AppState) -> CommandResponse<Vec<BackendDescriptor>> {
    let result: AppResult<Vec<BackendDescriptor>> = async {
        Ok(state.dispatcher().await?.backends().await)
    }
    .await;
    result.into()
}

/// Models offered by a backend, sorted
pub async fn list_models(state: &AppState, backend: String) -> CommandResponse<Vec<String>> {
    let result: AppResult<Vec<String>> = async {
        Ok(state.dispatcher().await?.list_models(&backend).await?)
    }
    .await;
    result.into()
}

/// List models and run a short completion against a backend
pub async fn test_backend(
    state: &AppState,
    backend: String,
    prompt: Option<String>,
) -> CommandResponse<BackendTestReport> {
    let result: AppResult<BackendTestReport> = async {
        let dispatcher = state.dispatcher().await?;
        Ok(dispatcher.test_backend(&backend, prompt.as_deref()).await?)
    }
    .await;
    result.into()
}
