//! Template Engine
//!
//! Renders templates that passed the syntax scanner with a locked-down
//! minijinja environment: no loader, lenient undefined, no auto-escaping and
//! a fuel bound on execution.

use std::collections::BTreeMap;

use minijinja::{AutoEscape, Environment, UndefinedBehavior, Value};
use tracing::debug;

use crate::error::{TemplateError, TemplateResult};
use crate::placeholder::{ParamValue, PlaceholderSpec, RenderContext};
use crate::schema::{self, merge_with_uses};
use crate::syntax;

/// Execution budget for a single render.
pub const DEFAULT_FUEL: u64 = 50_000;

/// Format of the `now` builtin.
pub const NOW_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `default` / `d` filter: undefined, none and the empty string all count as
/// missing.
fn default_filter(value: Value, fallback: Option<Value>) -> Value {
    let missing = value.is_undefined() || value.is_none() || value.as_str() == Some("");
    if missing {
        fallback.unwrap_or_else(|| Value::from(""))
    } else {
        value
    }
}

/// Sandboxed template renderer.
pub struct TemplateEngine {
    env: Environment<'static>,
    builtins: BTreeMap<String, Value>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_keep_trailing_newline(true);
        env.set_undefined_behavior(UndefinedBehavior::Lenient);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_fuel(Some(DEFAULT_FUEL));
        env.add_filter("default", default_filter);
        env.add_filter("d", default_filter);

        let mut builtins = BTreeMap::new();
        builtins.insert("user".to_string(), Value::from("User"));
        builtins.insert("app".to_string(), Value::from("Prompt Studio"));

        Self { env, builtins }
    }

    /// Override a builtin such as `user`.
    pub fn with_builtin(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.builtins.insert(name.into(), value.into().to_value());
        self
    }

    pub fn with_fuel(mut self, fuel: u64) -> Self {
        self.env.set_fuel(Some(fuel));
        self
    }

    pub fn infer(&self, source: &str) -> Vec<String> {
        syntax::scan(source).names()
    }

    pub fn check(&self, source: &str) -> TemplateResult<()> {
        syntax::scan(source).into_result().map(|_| ())
    }

    pub fn infer_schema(&self, source: &str) -> Vec<PlaceholderSpec> {
        schema::infer_schema(source)
    }

    /// Render with an explicit schema, merged with whatever the template
    /// uses that the schema does not cover.
    pub fn render(
        &self,
        source: &str,
        schema: &[PlaceholderSpec],
        context: &RenderContext,
    ) -> TemplateResult<String> {
        let uses = syntax::scan(source).into_result()?;
        let effective = merge_with_uses(schema, &uses);

        let missing: Vec<String> = effective
            .iter()
            .filter(|spec| spec.required && !context.contains_key(&spec.name))
            .map(|spec| spec.name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(TemplateError::MissingRequired { names: missing });
        }

        let mut values: BTreeMap<String, Value> = BTreeMap::new();
        for spec in &effective {
            let value = match (context.get(&spec.name), &spec.default) {
                (Some(supplied), _) => spec.coerce(supplied)?,
                (None, Some(default)) => spec.coerce(default)?,
                (None, None) => continue,
            };
            values.insert(spec.name.clone(), value);
        }

        for (name, value) in context {
            values.entry(name.clone()).or_insert_with(|| value.to_value());
        }
        for (name, value) in &self.builtins {
            values.entry(name.clone()).or_insert_with(|| value.clone());
        }
        values
            .entry("now".to_string())
            .or_insert_with(|| Value::from(chrono::Local::now().format(NOW_FORMAT).to_string()));

        debug!(
            placeholders = effective.len(),
            supplied = context.len(),
            "Rendering template"
        );
        self.env
            .render_str(source, &values)
            .map_err(|err| TemplateError::Render(err.to_string()))
    }

    /// Render against the inferred schema only.
    pub fn render_inferred(&self, source: &str, context: &RenderContext) -> TemplateResult<String> {
        self.render(source, &[], context)
    }
}
