//! Prompt Commands
//!
//! Command handlers for prompt template management and rendering.

use prompt_studio_template::{PlaceholderSpec, RenderContext};

use crate::models::prompt::{PromptCreateRequest, PromptFilter, PromptTemplate, PromptUpdateRequest};
use crate::models::response::CommandResponse;
use crate::services::composer;
use crate::services::prompt::PromptService;
use crate::state::AppState;

/// List prompts matching a filter
pub async fn list_prompts(state: &AppState, filter: PromptFilter) -> CommandResponse<Vec<PromptTemplate>> {
    state
        .with_database(|db| PromptService::from_database(db).list_prompts(&filter))
        .await
        .into()
}

/// Get a prompt by ID or name
pub async fn get_prompt(state: &AppState, id_or_name: String) -> CommandResponse<PromptTemplate> {
    state
        .with_database(|db| PromptService::from_database(db).find(&id_or_name))
        .await
        .into()
}

/// Create a new prompt template
pub async fn create_prompt(
    state: &AppState,
    request: PromptCreateRequest,
) -> CommandResponse<PromptTemplate> {
    state
        .with_database(|db| PromptService::from_database(db).create_prompt(request))
        .await
        .into()
}

/// Update an existing prompt template
pub async fn update_prompt(
    state: &AppState,
    id_or_name: String,
    request: PromptUpdateRequest,
) -> CommandResponse<PromptTemplate> {
    state
        .with_database(|db| {
            let service = PromptService::from_database(db);
            let prompt = service.find(&id_or_name)?;
            service.update_prompt(&prompt.id, request)
        })
        .await
        .into()
}

/// Delete a prompt template
pub async fn delete_prompt(state: &AppState, id_or_name: String) -> CommandResponse<()> {
    state
        .with_database(|db| {
            let service = PromptService::from_database(db);
            let prompt = service.find(&id_or_name)?;
            service.delete_prompt(&prompt.id)
        })
        .await
        .into()
}

/// Toggle the favorite flag of a prompt
pub async fn toggle_favorite(state: &AppState, id_or_name: String) -> CommandResponse<PromptTemplate> {
    state
        .with_database(|db| {
            let service = PromptService::from_database(db);
            let prompt = service.find(&id_or_name)?;
            service.toggle_favorite(&prompt.id)
        })
        .await
        .into()
}

/// Placeholder schema of a prompt, in template order
pub async fn get_placeholders(
    state: &AppState,
    id_or_name: String,
) -> CommandResponse<Vec<PlaceholderSpec>> {
    state
        .with_database(|db| {
            PromptService::from_database(db)
                .find(&id_or_name)
                .map(|prompt| prompt.placeholders)
        })
        .await
        .into()
}

pub async fn list_categories(state: &AppState) -> CommandResponse<Vec<String>> {
    state
        .with_database(|db| PromptService::from_database(db).list_categories())
        .await
        .into()
}

pub async fn list_tags(state: &AppState) -> CommandResponse<Vec<String>> {
    state
        .with_database(|db| PromptService::from_database(db).list_tags())
        .await
        .into()
}

/// Render a prompt with the supplied values. Nothing is sent anywhere.
pub async fn render_prompt(
    state: &AppState,
    id_or_name: String,
    context: RenderContext,
) -> CommandResponse<String> {
    state
        .with_database(|db| {
            let prompt = PromptService::from_database(db).find(&id_or_name)?;
            composer::compose(&prompt, &context)
        })
        .await
        .into()
}
