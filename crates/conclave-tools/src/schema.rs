//! Argument schemas.
//!
//! A deliberately small subset of JSON-schema: top-level named parameters
//! with a type and a required flag. Validation collects every violation
//! instead of stopping at the first one.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    Any,
}

impl ParamType {
    pub fn matches(self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::Array => value.is_array(),
            ParamType::Any => true,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
            ParamType::Any => "any",
        };
        f.write_str(name)
    }
}

/// JSON type name of a value, used in violation messages.
fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One way in which arguments failed a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum SchemaViolation {
    NotAnObject { found: String },
    MissingRequired { param: String },
    WrongType {
        param: String,
        expected: ParamType,
        found: String,
    },
    Unexpected { param: String },
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaViolation::NotAnObject { found } => {
                write!(f, "arguments must be an object, found {found}")
            }
            SchemaViolation::MissingRequired { param } => {
                write!(f, "missing required parameter '{param}'")
            }
            SchemaViolation::WrongType {
                param,
                expected,
                found,
            } => write!(f, "parameter '{param}' must be {expected}, found {found}"),
            SchemaViolation::Unexpected { param } => write!(f, "unexpected parameter '{param}'"),
        }
    }
}

/// Declared shape of a tool's arguments.
///
/// ```rust
/// use conclave_tools::{ParamType, ToolSchema};
/// use serde_json::json;
///
/// let schema = ToolSchema::new("Write a value into session state")
///     .required("key", ParamType::String)
///     .required("value", ParamType::Any);
///
/// assert!(schema.validate(&json!({"key": "title", "value": 1})).is_ok());
/// assert_eq!(schema.validate(&json!({"value": 1})).unwrap_err().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ToolSchema {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamSpec>,
    /// Accept parameters not listed in `params`.
    #[serde(default)]
    pub allow_extra: bool,
    /// Skip validation entirely; any JSON value is accepted.
    #[serde(default)]
    pub accepts_any: bool,
}

impl ToolSchema {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    /// A schema that accepts any arguments, including non-objects.
    pub fn any(description: impl Into<String>) -> Self {
        Self {
            accepts_any: true,
            ..Self::new(description)
        }
    }

    pub fn required(self, name: impl Into<String>, param_type: ParamType) -> Self {
        self.param(name, param_type, true)
    }

    pub fn optional(self, name: impl Into<String>, param_type: ParamType) -> Self {
        self.param(name, param_type, false)
    }

    fn param(mut self, name: impl Into<String>, param_type: ParamType, required: bool) -> Self {
        self.params.insert(
            name.into(),
            ParamSpec {
                param_type,
                required,
                description: None,
            },
        );
        self
    }

    pub fn allow_extra(mut self) -> Self {
        self.allow_extra = true;
        self
    }

    /// Check `arguments` against the schema, reporting every violation.
    ///
    /// `null` is treated as an empty argument object.
    pub fn validate(&self, arguments: &Value) -> Result<(), Vec<SchemaViolation>> {
        if self.accepts_any {
            return Ok(());
        }

        let empty = serde_json::Map::new();
        let object = match arguments {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(vec![SchemaViolation::NotAnObject {
                    found: type_name(other).to_string(),
                }]);
            }
        };

        let mut violations = Vec::new();

        for (name, spec) in &self.params {
            match object.get(name) {
                None | Some(Value::Null) if spec.required => {
                    violations.push(SchemaViolation::MissingRequired {
                        param: name.clone(),
                    });
                }
                None | Some(Value::Null) => {}
                Some(value) if !spec.param_type.matches(value) => {
                    violations.push(SchemaViolation::WrongType {
                        param: name.clone(),
                        expected: spec.param_type,
                        found: type_name(value).to_string(),
                    });
                }
                Some(_) => {}
            }
        }

        if !self.allow_extra {
            violations.extend(
                object
                    .keys()
                    .filter(|key| !self.params.contains_key(*key))
                    .map(|key| SchemaViolation::Unexpected { param: key.clone() }),
            );
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}
