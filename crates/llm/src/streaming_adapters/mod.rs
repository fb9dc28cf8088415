//! Wire-Format Stream Adapters
//!
//! Each adapter handles the streaming frame format of one dialect.

pub mod ollama;
pub mod openai;

pub use ollama::OllamaAdapter;
pub use openai::OpenAiAdapter;
