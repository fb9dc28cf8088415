//! Placeholder Schema
//!
//! Inference, merging and validation of the placeholder schema attached to a
//! template, plus default render contexts built from it.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{TemplateError, TemplateResult};
use crate::placeholder::{ParamValue, PlaceholderKind, PlaceholderSpec, RenderContext};
use crate::syntax::{self, is_reserved, Literal, PlaceholderUse, UseRole};

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("identifier pattern compiles")
    })
}

fn literal_to_param(literal: &Literal) -> Option<ParamValue> {
    match literal {
        Literal::Str(s) => Some(ParamValue::Text(s.clone())),
        Literal::Int(i) => Some(ParamValue::Integer(*i)),
        Literal::Float(f) => Some(ParamValue::Float(*f)),
        Literal::Bool(b) => Some(ParamValue::Bool(*b)),
        Literal::None => None,
    }
}

/// Infer one spec per distinct placeholder in `uses`, in first-appearance order.
///
/// - a use with a literal `default(...)` makes the placeholder optional with
///   that default (kind follows the literal)
/// - otherwise any output use makes it a required short text
/// - a name only ever tested for truthiness becomes an optional boolean
/// - anything else is an optional short text
pub fn specs_from_uses(uses: &[PlaceholderUse]) -> Vec<PlaceholderSpec> {
    let mut order: Vec<&str> = Vec::new();
    for u in uses {
        if !is_reserved(&u.name) && !order.contains(&u.name.as_str()) {
            order.push(&u.name);
        }
    }

    order
        .into_iter()
        .map(|name| {
            let sites: Vec<&PlaceholderUse> = uses.iter().filter(|u| u.name == name).collect();
            infer_spec(name, &sites)
        })
        .collect()
}

fn infer_spec(name: &str, sites: &[&PlaceholderUse]) -> PlaceholderSpec {
    if let Some(literal) = sites.iter().find_map(|u| u.default.as_ref()) {
        return match literal_to_param(literal) {
            Some(default) => {
                let kind = match default {
                    ParamValue::Integer(_) => PlaceholderKind::Integer,
                    ParamValue::Float(_) => PlaceholderKind::Float,
                    ParamValue::Bool(_) => PlaceholderKind::Boolean,
                    _ => PlaceholderKind::ShortText,
                };
                PlaceholderSpec::new(name, kind).optional().with_default(default)
            }
            None => PlaceholderSpec::new(name, PlaceholderKind::ShortText).optional(),
        };
    }

    if sites.iter().any(|u| u.role == UseRole::Output) {
        return PlaceholderSpec::new(name, PlaceholderKind::ShortText).with_default("");
    }

    if sites.iter().all(|u| u.role == UseRole::Truthiness) {
        return PlaceholderSpec::new(name, PlaceholderKind::Boolean)
            .optional()
            .with_default(false);
    }

    PlaceholderSpec::new(name, PlaceholderKind::ShortText).optional()
}

/// Infer a schema from template text. Best effort: malformed regions still
/// contribute the names they mention.
pub fn infer_schema(source: &str) -> Vec<PlaceholderSpec> {
    specs_from_uses(&syntax::scan(source).uses)
}

/// Reconcile an existing schema with the placeholders a template now uses.
///
/// Specs for names still present are kept as they are, in template order;
/// new names get inferred specs; specs for names no longer used are dropped.
pub fn merge_with_uses(existing: &[PlaceholderSpec], uses: &[PlaceholderUse]) -> Vec<PlaceholderSpec> {
    specs_from_uses(uses)
        .into_iter()
        .map(|inferred| {
            existing
                .iter()
                .find(|spec| spec.name == inferred.name)
                .cloned()
                .unwrap_or(inferred)
        })
        .collect()
}

pub fn merge_with_placeholders(existing: &[PlaceholderSpec], source: &str) -> Vec<PlaceholderSpec> {
    merge_with_uses(existing, &syntax::scan(source).uses)
}

/// Check a schema against its template, reporting every problem at once.
pub fn validate_schema(source: &str, schema: &[PlaceholderSpec]) -> TemplateResult<()> {
    let present: HashSet<String> = syntax::scan(source).names().into_iter().collect();
    let mut problems = Vec::new();
    let mut seen = HashSet::new();

    for spec in schema {
        if !seen.insert(spec.name.as_str()) {
            problems.push(format!("duplicate placeholder '{}'", spec.name));
        }

        if !identifier_pattern().is_match(&spec.name) {
            problems.push(format!("'{}' is not a valid identifier", spec.name));
        } else if is_reserved(&spec.name) {
            problems.push(format!("'{}' is a reserved name", spec.name));
        } else if !present.contains(&spec.name) {
            problems.push(format!("'{}' does not appear in the template", spec.name));
        }

        if spec.kind.is_choice() && spec.choices.is_empty() {
            problems.push(format!(
                "'{}' is a {} placeholder without options",
                spec.name, spec.kind
            ));
        } else if let Some(default) = &spec.default {
            if let Err(err) = spec.coerce(default) {
                problems.push(format!("default for '{}' is invalid: {}", spec.name, err));
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(TemplateError::InvalidSchema(problems))
    }
}

/// A context holding every placeholder's default or kind fallback.
pub fn default_context(schema: &[PlaceholderSpec]) -> RenderContext {
    schema
        .iter()
        .map(|spec| (spec.name.clone(), spec.fallback_value()))
        .collect()
}
