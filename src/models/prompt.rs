//! Prompt Template Models
//!
//! Data structures for the prompt library.

use prompt_studio_template::PlaceholderSpec;
use serde::{Deserialize, Serialize};

/// A prompt template in the library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: String,
    /// Unique, human-facing name
    pub name: String,
    pub content: String,
    pub description: Option<String>,
    pub category: Option<String>,
    /// Tags as a list of strings (stored as JSON in DB)
    pub tags: Vec<String>,
    /// Placeholder schema, in template order (stored as JSON in DB)
    pub placeholders: Vec<PlaceholderSpec>,
    pub is_favorite: bool,
    /// Number of times this prompt has been run
    pub use_count: u32,
    pub last_used_at: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Request to create a new prompt template
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptCreateRequest {
    pub name: String,
    pub content: String,
    pub description: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Explicit schema; missing placeholders are inferred
    #[serde(default)]
    pub placeholders: Option<Vec<PlaceholderSpec>>,
    #[serde(default)]
    pub is_favorite: bool,
}

/// Request to update an existing prompt template
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptUpdateRequest {
    pub name: Option<String>,
    pub content: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub placeholders: Option<Vec<PlaceholderSpec>>,
    pub is_favorite: Option<bool>,
}

/// Filters for listing prompts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptFilter {
    pub category: Option<String>,
    /// Substring matched against name, description and content
    pub search: Option<String>,
    pub tag: Option<String>,
    #[serde(default)]
    pub favorites_only: bool,
}
