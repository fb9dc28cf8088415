//! Template Error Types

use thiserror::Error;

use crate::placeholder::PlaceholderKind;

/// Errors raised while checking or rendering a template.
///
/// All of these are produced before any network interaction happens and are
/// recoverable by correcting the template or the supplied values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    /// One or more required placeholders had no value
    #[error("Missing required placeholders: {}", .names.join(", "))]
    MissingRequired { names: Vec<String> },

    /// A supplied value could not be coerced to the placeholder's kind
    #[error("Type mismatch for '{name}': expected {expected}, got '{value}'")]
    TypeMismatch {
        name: String,
        expected: PlaceholderKind,
        value: String,
    },

    /// A choice value outside the allowed options
    #[error("Invalid choice for '{name}': '{value}' (allowed: {})", .allowed.join(", "))]
    InvalidChoice {
        name: String,
        value: String,
        allowed: Vec<String>,
    },

    /// Placeholder schema problems, all of them
    #[error("Invalid placeholder schema: {}", .0.join("; "))]
    InvalidSchema(Vec<String>),

    /// A construct outside the allowed expression forms
    #[error("Forbidden template construct {construct} at offset {offset}")]
    Forbidden { construct: String, offset: usize },

    /// Malformed template text
    #[error("Template syntax error at offset {offset}: {message}")]
    Syntax { message: String, offset: usize },

    /// Failure inside the renderer (e.g. execution budget exhausted)
    #[error("Render error: {0}")]
    Render(String),
}

/// Result type alias for template operations
pub type TemplateResult<T> = Result<T, TemplateError>;

impl TemplateError {
    /// Create a syntax error
    pub fn syntax(message: impl Into<String>, offset: usize) -> Self {
        Self::Syntax {
            message: message.into(),
            offset,
        }
    }

    /// Create a forbidden-construct error
    pub fn forbidden(construct: impl Into<String>, offset: usize) -> Self {
        Self::Forbidden {
            construct: construct.into(),
            offset,
        }
    }

    /// Whether the error is about supplied values rather than the template.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TemplateError::MissingRequired { .. }
                | TemplateError::TypeMismatch { .. }
                | TemplateError::InvalidChoice { .. }
                | TemplateError::InvalidSchema(_)
        )
    }
}
