//! Placeholder Types
//!
//! Typed placeholder specifications and the values a render context carries.
//! Coercion turns a user-supplied [`ParamValue`] into the value the renderer
//! substitutes, or rejects it with a typed error.

use std::collections::BTreeMap;
use std::fmt;

use minijinja::Value;
use serde::{Deserialize, Serialize};

use crate::error::{TemplateError, TemplateResult};

/// Separator used when substituting multi-choice selections.
pub const MULTI_CHOICE_SEPARATOR: &str = ", ";

const TRUTHY: &[&str] = &["true", "1", "yes", "on"];
const FALSY: &[&str] = &["false", "0", "no", "off"];

/// Placeholder kind.
///
/// Serialized with the short type names used in stored schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlaceholderKind {
    /// Single-line text input
    #[default]
    #[serde(rename = "str")]
    ShortText,
    /// Multi-line text input
    #[serde(rename = "text")]
    LongText,
    #[serde(rename = "int")]
    Integer,
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "bool")]
    Boolean,
    /// One value out of `options`
    #[serde(rename = "choice")]
    SingleChoice,
    /// Any subset of `options`
    #[serde(rename = "multichoice")]
    MultiChoice,
}

impl PlaceholderKind {
    /// All supported kinds, in form order.
    pub const ALL: [PlaceholderKind; 7] = [
        PlaceholderKind::ShortText,
        PlaceholderKind::LongText,
        PlaceholderKind::Integer,
        PlaceholderKind::Float,
        PlaceholderKind::Boolean,
        PlaceholderKind::SingleChoice,
        PlaceholderKind::MultiChoice,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlaceholderKind::ShortText => "str",
            PlaceholderKind::LongText => "text",
            PlaceholderKind::Integer => "int",
            PlaceholderKind::Float => "float",
            PlaceholderKind::Boolean => "bool",
            PlaceholderKind::SingleChoice => "choice",
            PlaceholderKind::MultiChoice => "multichoice",
        }
    }

    /// Whether this kind draws its values from an options list.
    pub fn is_choice(&self) -> bool {
        matches!(
            self,
            PlaceholderKind::SingleChoice | PlaceholderKind::MultiChoice
        )
    }
}

impl fmt::Display for PlaceholderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlaceholderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlaceholderKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unsupported placeholder type: {}", s))
    }
}

/// A value supplied for a placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

impl ParamValue {
    /// Convert to a renderer value without any placeholder-specific coercion.
    pub fn to_value(&self) -> Value {
        match self {
            ParamValue::Bool(b) => Value::from(*b),
            ParamValue::Integer(i) => Value::from(*i),
            ParamValue::Float(f) => Value::from(*f),
            ParamValue::Text(s) => Value::from(s.as_str()),
            ParamValue::List(items) => Value::from(items.join(MULTI_CHOICE_SEPARATOR)),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Integer(i) => write!(f, "{}", i),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Text(s) => f.write_str(s),
            ParamValue::List(items) => f.write_str(&items.join(MULTI_CHOICE_SEPARATOR)),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Text(s)
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Integer(i)
    }
}

impl From<f64> for ParamValue {
    fn from(f: f64) -> Self {
        ParamValue::Float(f)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(items: Vec<String>) -> Self {
        ParamValue::List(items)
    }
}

/// Placeholder name to supplied value.
pub type RenderContext = BTreeMap<String, ParamValue>;

/// Declared shape of one placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceholderSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: PlaceholderKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ParamValue>,
    #[serde(default)]
    pub description: String,
    /// Allowed values for choice kinds
    #[serde(rename = "options", default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

impl PlaceholderSpec {
    /// A required placeholder with no default.
    pub fn new(name: impl Into<String>, kind: PlaceholderKind) -> Self {
        let name = name.into();
        let description = format!("Value for {}", name);
        Self {
            name,
            kind,
            required: true,
            default: None,
            description,
            choices: Vec::new(),
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_default(mut self, default: impl Into<ParamValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    /// The value used when building a default context: the declared default,
    /// or a kind-appropriate fallback.
    pub fn fallback_value(&self) -> ParamValue {
        if let Some(default) = &self.default {
            return default.clone();
        }
        match self.kind {
            PlaceholderKind::Integer => ParamValue::Integer(0),
            PlaceholderKind::Float => ParamValue::Float(0.0),
            PlaceholderKind::Boolean => ParamValue::Bool(false),
            PlaceholderKind::SingleChoice => {
                ParamValue::Text(self.choices.first().cloned().unwrap_or_default())
            }
            PlaceholderKind::MultiChoice => {
                ParamValue::List(self.choices.first().cloned().into_iter().collect())
            }
            PlaceholderKind::ShortText | PlaceholderKind::LongText => {
                ParamValue::Text(String::new())
            }
        }
    }

    /// Coerce a supplied value to what gets substituted for this placeholder.
    pub fn coerce(&self, value: &ParamValue) -> TemplateResult<Value> {
        match self.kind {
            PlaceholderKind::ShortText | PlaceholderKind::LongText => match value {
                ParamValue::List(_) => Err(self.mismatch(value)),
                other => Ok(Value::from(other.to_string())),
            },
            PlaceholderKind::Integer => self.coerce_integer(value).map(Value::from),
            PlaceholderKind::Float => self.coerce_float(value).map(Value::from),
            PlaceholderKind::Boolean => self.coerce_bool(value).map(Value::from),
            PlaceholderKind::SingleChoice => {
                let choice = match value {
                    ParamValue::List(_) => return Err(self.mismatch(value)),
                    ParamValue::Text(s) => s.trim().to_string(),
                    other => other.to_string(),
                };
                self.check_choice(&choice)?;
                Ok(Value::from(choice))
            }
            PlaceholderKind::MultiChoice => {
                let selected: Vec<String> = match value {
                    ParamValue::List(items) => items.iter().map(|s| s.trim().to_string()).collect(),
                    ParamValue::Text(s) => s
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect(),
                    other => return Err(self.mismatch(other)),
                };
                for item in &selected {
                    self.check_choice(item)?;
                }
                Ok(Value::from(selected.join(MULTI_CHOICE_SEPARATOR)))
            }
        }
    }

    fn coerce_integer(&self, value: &ParamValue) -> TemplateResult<i64> {
        match value {
            ParamValue::Integer(i) => Ok(*i),
            // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive
            ParamValue::Float(f)
                if f.is_finite()
                    && f.fract() == 0.0
                    && *f >= i64::MIN as f64
                    && *f < i64::MAX as f64 =>
            {
                Ok(*f as i64)
            }
            ParamValue::Text(s) => s.trim().parse::<i64>().map_err(|_| self.mismatch(value)),
            _ => Err(self.mismatch(value)),
        }
    }

    fn coerce_float(&self, value: &ParamValue) -> TemplateResult<f64> {
        let parsed = match value {
            ParamValue::Float(f) => Some(*f),
            ParamValue::Integer(i) => Some(*i as f64),
            ParamValue::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        parsed
            .filter(|f| f.is_finite())
            .ok_or_else(|| self.mismatch(value))
    }

    fn coerce_bool(&self, value: &ParamValue) -> TemplateResult<bool> {
        match value {
            ParamValue::Bool(b) => Ok(*b),
            ParamValue::Integer(0) => Ok(false),
            ParamValue::Integer(1) => Ok(true),
            ParamValue::Text(s) => {
                let lowered = s.trim().to_lowercase();
                if TRUTHY.contains(&lowered.as_str()) {
                    Ok(true)
                } else if FALSY.contains(&lowered.as_str()) {
                    Ok(false)
                } else {
                    Err(self.mismatch(value))
                }
            }
            _ => Err(self.mismatch(value)),
        }
    }

    fn check_choice(&self, choice: &str) -> TemplateResult<()> {
        if self.choices.iter().any(|c| c == choice) {
            Ok(())
        } else {
            Err(TemplateError::InvalidChoice {
                name: self.name.clone(),
                value: choice.to_string(),
                allowed: self.choices.clone(),
            })
        }
    }

    fn mismatch(&self, value: &ParamValue) -> TemplateError {
        TemplateError::TypeMismatch {
            name: self.name.clone(),
            expected: self.kind,
            value: value.to_string(),
        }
    }
}
