//! Initialization Commands
//!
//! Commands for application initialization and setup.
//! On startup, opens every store and seeds an empty prompt library.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::models::response::CommandResponse;
use crate::services::prompt::PromptService;
use crate::state::AppState;
use crate::utils::error::AppResult;

/// Result of application initialization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitResult {
    /// Success message
    pub message: String,
    /// Example prompts added to an empty library
    pub seeded_prompts: usize,
}

/// Initialize the application on startup.
///
/// `data_dir` overrides the default data directory.
pub async fn init_app(state: &AppState, data_dir: Option<&Path>) -> CommandResponse<InitResult> {
    let result: AppResult<InitResult> = async {
        match data_dir {
            Some(dir) => state.initialize_in(dir).await?,
            None => state.initialize().await?,
        }

        let seeded_prompts = state
            .with_database(|db| PromptService::from_database(db).seed_examples())
            .await?;

        let message = if seeded_prompts > 0 {
            format!(
                "Application initialized successfully. Added {} example prompt(s).",
                seeded_prompts
            )
        } else {
            "Application initialized successfully".to_string()
        };

        Ok(InitResult {
            message,
            seeded_prompts,
        })
    }
    .await;

    result.into()
}

/// Get the application version
pub fn get_version() -> CommandResponse<String> {
    CommandResponse::ok(env!("CARGO_PKG_VERSION").to_string())
}
