//! Services
//!
//! Business logic services for the application.
//! Services handle the core functionality and are called by commands.

pub mod composer;
pub mod execution;
pub mod history;
pub mod prompt;

pub use execution::{build_dispatcher, ExecutionRequest, ExecutionService};
pub use history::HistoryService;
pub use prompt::PromptService;
