//! Deterministic output-schema validation.
//!
//! A contract's `output_schema` is compiled once into an internal form and
//! then applied to derived claim payloads. Validation is deterministic:
//! traversal is depth-first with siblings visited in lexicographic key
//! order, every failure carries a stable `(path, code)` pair, and the full
//! violation list is sorted canonically. The first violation in that order
//! is the single failure surfaced to the compiler.
//!
//! Error codes are a closed set; messages never vary by locale or input
//! phrasing.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Stable validation error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaErrorCode {
    /// Value type does not match the schema type.
    TypeMismatch,
    /// A required property is absent.
    MissingRequired,
    /// Value is not one of the enumerated alternatives.
    EnumViolation,
    /// Number is outside `minimum`/`maximum`.
    RangeViolation,
    /// String length is outside `minLength`/`maxLength`.
    LengthViolation,
    /// String does not match `pattern`.
    PatternViolation,
    /// Property not declared and `additionalProperties` is false.
    AdditionalProperty,
}

impl SchemaErrorCode {
    /// The stable snake_case code string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TypeMismatch => "type_mismatch",
            Self::MissingRequired => "missing_required",
            Self::EnumViolation => "enum_violation",
            Self::RangeViolation => "range_violation",
            Self::LengthViolation => "length_violation",
            Self::PatternViolation => "pattern_violation",
            Self::AdditionalProperty => "additional_property",
        }
    }
}

impl fmt::Display for SchemaErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaViolation {
    /// JSON path of the failing value, `$`-rooted.
    pub path: String,
    /// Stable error code.
    pub code: SchemaErrorCode,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.path)
    }
}

/// Errors compiling a schema document.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SchemaCompileError {
    /// The `type` keyword names an unknown type.
    #[error("unknown schema type: '{value}'")]
    UnknownType {
        /// The unrecognized type name.
        value: String,
    },

    /// A `pattern` keyword holds an invalid regular expression.
    #[error("invalid pattern at '{path}': {source}")]
    InvalidPattern {
        /// Path of the failing schema node.
        path: String,
        /// The regex compile failure.
        source: regex::Error,
    },
}

/// JSON value types recognized by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JsonType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Null,
}

impl JsonType {
    fn parse(s: &str) -> Result<Self, SchemaCompileError> {
        match s {
            "string" => Ok(Self::String),
            "number" => Ok(Self::Number),
            "integer" => Ok(Self::Integer),
            "boolean" => Ok(Self::Boolean),
            "array" => Ok(Self::Array),
            "object" => Ok(Self::Object),
            "null" => Ok(Self::Null),
            other => Err(SchemaCompileError::UnknownType {
                value: other.to_string(),
            }),
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.as_i64().is_some() || value.as_u64().is_some(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Null => value.is_null(),
        }
    }
}

#[derive(Debug)]
struct SchemaNode {
    ty: Option<JsonType>,
    properties: BTreeMap<String, SchemaNode>,
    required: Vec<String>,
    additional_properties: bool,
    items: Option<Box<SchemaNode>>,
    enum_values: Option<Vec<Value>>,
    minimum: Option<f64>,
    maximum: Option<f64>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    pattern: Option<Regex>,
}

/// A compiled output schema ready for repeated validation.
#[derive(Debug)]
pub struct CompiledSchema {
    root: SchemaNode,
}

impl CompiledSchema {
    /// Compiles a schema document.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaCompileError`] for unknown types or invalid
    /// patterns.
    pub fn compile(schema: &Value) -> Result<Self, SchemaCompileError> {
        Ok(Self {
            root: compile_node(schema, "$")?,
        })
    }

    /// Validates a value, returning the canonical sorted violation list on
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns the sorted `(path, code)` violations.
    pub fn validate(&self, value: &Value) -> Result<(), Vec<SchemaViolation>> {
        let mut violations = Vec::new();
        validate_node(&self.root, value, "$", &mut violations);
        if violations.is_empty() {
            Ok(())
        } else {
            violations.sort();
            Err(violations)
        }
    }

    /// Validates a value and surfaces only the first violation in canonical
    /// order.
    ///
    /// # Errors
    ///
    /// Returns the first `(path, code)` violation.
    pub fn validate_first(&self, value: &Value) -> Result<(), SchemaViolation> {
        self.validate(value).map_err(|mut violations| {
            // Sorted already; the canonical first error is authoritative.
            violations.remove(0)
        })
    }
}

fn compile_node(schema: &Value, path: &str) -> Result<SchemaNode, SchemaCompileError> {
    let obj = schema.as_object();

    let ty = obj
        .and_then(|o| o.get("type"))
        .and_then(Value::as_str)
        .map(JsonType::parse)
        .transpose()?;

    let mut properties = BTreeMap::new();
    if let Some(props) = obj.and_then(|o| o.get("properties")).and_then(Value::as_object) {
        for (key, sub) in props {
            let sub_path = format!("{path}.{key}");
            properties.insert(key.clone(), compile_node(sub, &sub_path)?);
        }
    }

    let mut required: Vec<String> = obj
        .and_then(|o| o.get("required"))
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    required.sort();

    let additional_properties = obj
        .and_then(|o| o.get("additionalProperties"))
        .and_then(Value::as_bool)
        .unwrap_or(true);

    let items = obj
        .and_then(|o| o.get("items"))
        .map(|sub| compile_node(sub, &format!("{path}[]")))
        .transpose()?
        .map(Box::new);

    let enum_values = obj
        .and_then(|o| o.get("enum"))
        .and_then(Value::as_array)
        .map(Vec::clone);

    let pattern = obj
        .and_then(|o| o.get("pattern"))
        .and_then(Value::as_str)
        .map(|p| {
            Regex::new(p).map_err(|source| SchemaCompileError::InvalidPattern {
                path: path.to_string(),
                source,
            })
        })
        .transpose()?;

    Ok(SchemaNode {
        ty,
        properties,
        required,
        additional_properties,
        items,
        enum_values,
        minimum: obj.and_then(|o| o.get("minimum")).and_then(Value::as_f64),
        maximum: obj.and_then(|o| o.get("maximum")).and_then(Value::as_f64),
        min_length: obj
            .and_then(|o| o.get("minLength"))
            .and_then(Value::as_u64)
            .map(|v| v as usize),
        max_length: obj
            .and_then(|o| o.get("maxLength"))
            .and_then(Value::as_u64)
            .map(|v| v as usize),
        pattern,
    })
}

fn validate_node(node: &SchemaNode, value: &Value, path: &str, out: &mut Vec<SchemaViolation>) {
    if let Some(ty) = node.ty {
        if !ty.matches(value) {
            out.push(SchemaViolation {
                path: path.to_string(),
                code: SchemaErrorCode::TypeMismatch,
            });
            // Nothing below a type mismatch is meaningful.
            return;
        }
    }

    if let Some(allowed) = &node.enum_values {
        if !allowed.contains(value) {
            out.push(SchemaViolation {
                path: path.to_string(),
                code: SchemaErrorCode::EnumViolation,
            });
        }
    }

    match value {
        Value::Object(obj) => {
            for field in &node.required {
                if !obj.contains_key(field) {
                    out.push(SchemaViolation {
                        path: format!("{path}.{field}"),
                        code: SchemaErrorCode::MissingRequired,
                    });
                }
            }
            // Siblings in lexicographic order for deterministic traversal.
            let mut keys: Vec<&String> = obj.keys().collect();
            keys.sort();
            for key in keys {
                let sub_path = format!("{path}.{key}");
                if let Some(sub_schema) = node.properties.get(key) {
                    validate_node(sub_schema, &obj[key], &sub_path, out);
                } else if !node.additional_properties {
                    out.push(SchemaViolation {
                        path: sub_path,
                        code: SchemaErrorCode::AdditionalProperty,
                    });
                }
            }
        },
        Value::Array(arr) => {
            if let Some(items) = &node.items {
                for (i, item) in arr.iter().enumerate() {
                    validate_node(items, item, &format!("{path}[{i}]"), out);
                }
            }
        },
        Value::String(s) => {
            let len = s.chars().count();
            if node.min_length.is_some_and(|min| len < min)
                || node.max_length.is_some_and(|max| len > max)
            {
                out.push(SchemaViolation {
                    path: path.to_string(),
                    code: SchemaErrorCode::LengthViolation,
                });
            }
            if let Some(pattern) = &node.pattern {
                if !pattern.is_match(s) {
                    out.push(SchemaViolation {
                        path: path.to_string(),
                        code: SchemaErrorCode::PatternViolation,
                    });
                }
            }
        },
        Value::Number(n) => {
            if let Some(v) = n.as_f64() {
                if node.minimum.is_some_and(|min| v < min)
                    || node.maximum.is_some_and(|max| v > max)
                {
                    out.push(SchemaViolation {
                        path: path.to_string(),
                        code: SchemaErrorCode::RangeViolation,
                    });
                }
            }
        },
        _ => {},
    }
}
