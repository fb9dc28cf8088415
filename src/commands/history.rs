//! History Commands

use crate::models::history::{HistoryEntry, HistoryFilter};
use crate::models::response::CommandResponse;
use crate::services::history::HistoryService;
use crate::services::prompt::PromptService;
use crate::state::AppState;

/// List recorded executions, newest first.
///
/// `filter.prompt_id` may hold a prompt name as well as an ID.
pub async fn list_history(state: &AppState, mut filter: HistoryFilter) -> CommandResponse<Vec<HistoryEntry>> {
    state
        .with_database(|db| {
            if let Some(prompt) = filter.prompt_id.take() {
                filter.prompt_id = Some(PromptService::from_database(db).find(&prompt)?.id);
            }
            HistoryService::from_database(db).list(&filter)
        })
        .await
        .into()
}

pub async fn get_history_entry(state: &AppState, id: String) -> CommandResponse<Option<HistoryEntry>> {
    state
        .with_database(|db| HistoryService::from_database(db).get(&id))
        .await
        .into()
}

pub async fn delete_history_entry(state: &AppState, id: String) -> CommandResponse<()> {
    state
        .with_database(|db| HistoryService::from_database(db).delete(&id))
        .await
        .into()
}

/// Remove every entry; returns how many were removed
pub async fn clear_history(state: &AppState) -> CommandResponse<usize> {
    state
        .with_database(|db| HistoryService::from_database(db).clear())
        .await
        .into()
}
