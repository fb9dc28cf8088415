//! Prompt Composer
//!
//! Turns a stored prompt plus user-supplied values into the final text sent
//! to a backend. Values come from `key=value` assignments, a JSON file, or
//! both; assignments win.

use std::path::Path;

use prompt_studio_template::{default_context, ParamValue, RenderContext, TemplateEngine};

use crate::models::prompt::PromptTemplate;
use crate::utils::error::{AppError, AppResult};

/// Parse one `key=value` assignment. The value is kept as text and coerced
/// later against the placeholder's kind.
pub fn parse_assignment(assignment: &str) -> AppResult<(String, ParamValue)> {
    let (key, value) = assignment.split_once('=').ok_or_else(|| {
        AppError::validation(format!("Expected key=value, got '{}'", assignment))
    })?;
    let key = key.trim();
    if key.is_empty() {
        return Err(AppError::validation(format!(
            "Missing placeholder name in '{}'",
            assignment
        )));
    }
    Ok((key.to_string(), ParamValue::Text(value.to_string())))
}

/// Load placeholder values from a JSON object file
pub fn load_values_file(path: &Path) -> AppResult<RenderContext> {
    let content = std::fs::read_to_string(path)?;
    let values: RenderContext = serde_json::from_str(&content).map_err(|e| {
        AppError::validation(format!(
            "{} must hold a JSON object of placeholder values: {}",
            path.display(),
            e
        ))
    })?;
    Ok(values)
}

/// Build a render context from an optional values file and assignments
pub fn build_context(values_file: Option<&Path>, assignments: &[String]) -> AppResult<RenderContext> {
    let mut context = match values_file {
        Some(path) => load_values_file(path)?,
        None => RenderContext::new(),
    };
    for assignment in assignments {
        let (key, value) = parse_assignment(assignment)?;
        context.insert(key, value);
    }
    Ok(context)
}

/// Render a stored prompt with the supplied values
pub fn compose(prompt: &PromptTemplate, context: &RenderContext) -> AppResult<String> {
    Ok(TemplateEngine::new().render(&prompt.content, &prompt.placeholders, context)?)
}

/// Render a stored prompt with every placeholder at its default
pub fn preview(prompt: &PromptTemplate) -> AppResult<String> {
    compose(prompt, &default_context(&prompt.placeholders))
}
