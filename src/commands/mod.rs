//! Commands
//!
//! Entry points called by the command-line front end. Every command takes
//! the shared [`AppState`](crate::state::AppState) and answers with a
//! [`CommandResponse`](crate::models::response::CommandResponse).

pub mod backends;
pub mod execution;
pub mod health;
pub mod history;
pub mod init;
pub mod prompts;
pub mod settings;

pub use backends::*;
pub use execution::*;
pub use health::*;
pub use history::*;
pub use init::*;
pub use prompts::*;
pub use settings::*;
