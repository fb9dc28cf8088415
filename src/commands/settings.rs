//! Settings Commands
//!
//! Commands for reading and updating application settings and secrets.

use crate::models::response::CommandResponse;
use crate::models::settings::{AppConfig, SettingsUpdate};
use crate::state::AppState;

/// Get current application settings
pub async fn get_settings(state: &AppState) -> CommandResponse<AppConfig> {
    state.get_config().await.into()
}

/// Update application settings with a partial update
pub async fn update_settings(state: &AppState, update: SettingsUpdate) -> CommandResponse<AppConfig> {
    state.update_config(update).await.into()
}

/// Restore default settings
pub async fn reset_settings(state: &AppState) -> CommandResponse<AppConfig> {
    state.reset_config().await.into()
}

/// Store a secret (API key or proxy password)
pub async fn set_secret(state: &AppState, account: String, secret: String) -> CommandResponse<()> {
    state.set_secret(&account, secret.trim()).await.into()
}

pub async fn delete_secret(state: &AppState, account: String) -> CommandResponse<()> {
    state.delete_secret(&account).await.into()
}

/// Accounts with a stored secret. Values are never returned.
pub async fn list_secrets(state: &AppState) -> CommandResponse<Vec<String>> {
    state.list_secrets().await.into()
}
