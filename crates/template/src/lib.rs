//! Prompt Studio Template
//!
//! Placeholder inference and sandboxed rendering for prompt templates.
//!
//! ## Modules
//!
//! - `placeholder`: placeholder kinds, specs, supplied values and coercion
//! - `syntax`: allow-list scanner for template expressions and tags
//! - `schema`: schema inference, merging, validation and default contexts
//! - `engine`: the fuel-bounded renderer
//! - `error`: template error types

pub mod engine;
pub mod error;
pub mod placeholder;
pub mod schema;
pub mod syntax;

pub use engine::{TemplateEngine, DEFAULT_FUEL, NOW_FORMAT};
pub use error::{TemplateError, TemplateResult};
pub use placeholder::{
    ParamValue, PlaceholderKind, PlaceholderSpec, RenderContext, MULTI_CHOICE_SEPARATOR,
};
pub use schema::{
    default_context, infer_schema, merge_with_placeholders, merge_with_uses, specs_from_uses,
    validate_schema,
};
pub use syntax::{is_reserved, scan, Literal, PlaceholderUse, ScanReport, UseRole, RESERVED_NAMES};

/// Distinct placeholder names in order of first appearance. Never fails.
pub fn infer(source: &str) -> Vec<String> {
    syntax::scan(source).names()
}

/// Syntax and allow-list validation only.
pub fn check(source: &str) -> TemplateResult<()> {
    syntax::scan(source).into_result().map(|_| ())
}

/// Render with a default engine.
pub fn render(
    source: &str,
    schema: &[PlaceholderSpec],
    context: &RenderContext,
) -> TemplateResult<String> {
    TemplateEngine::new().render(source, schema, context)
}
