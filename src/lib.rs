//! Prompt Studio
//!
//! Application layer of Prompt Studio: a local library of prompt templates
//! whose placeholders are filled in and sent to interchangeable LLM backends.
//! It includes:
//! - Command handlers used by the `prompt-studio` CLI
//! - Business logic services (prompt library, composer, execution, history)
//! - Storage layer (SQLite, encrypted secrets, JSON config)
//! - Data models and utilities
//!
//! Template rendering lives in `prompt-studio-template`, backend dispatch in
//! `prompt-studio-llm`.

pub mod commands;
pub mod models;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;

// Re-export commonly used items from commands
pub use commands::{
    // Init commands
    init_app, get_version,
    // Health commands
    get_health,
    // Settings commands
    get_settings, update_settings, reset_settings, set_secret, delete_secret, list_secrets,
    // Prompt commands
    list_prompts, get_prompt, create_prompt, update_prompt, delete_prompt, toggle_favorite,
    get_placeholders, list_categories, list_tags, render_prompt,
    // Execution commands
    run_prompt, RunPromptRequest,
    // Backend commands
    list_backends, list_models, test_backend,
    // History commands
    list_history, get_history_entry, delete_history_entry, clear_history,
};
// Re-export models (avoiding settings module conflict)
pub use models::response::*;
pub use models::settings::{AppConfig, SettingsUpdate};
pub use state::AppState;
pub use utils::error::{AppError, AppResult};
