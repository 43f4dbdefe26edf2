//! Shape contracts for seed datasets.
//!
//! A [`ShapeContract`] declares the fields every record of a dataset must
//! carry, and their scalar types. Validation runs before any write: a
//! single malformed record rejects the whole batch, so a failed run never
//! leaves a partial insert behind.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::seeds::dataset::Record;

/// Scalar type a contract field must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// JSON string
    Text,
    /// JSON boolean
    Bool,
    /// JSON number (integer or float)
    Number,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Text => write!(f, "text"),
            FieldType::Bool => write!(f, "bool"),
            FieldType::Number => write!(f, "number"),
        }
    }
}

/// One required field in a shape contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name as it appears in the source record
    pub name: String,
    /// Required scalar type
    pub field_type: FieldType,
    /// Whether an explicit null satisfies the requirement
    pub nullable: bool,
}

/// A single field-level violation within a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldViolation {
    /// Required field is absent from the record
    Missing { field: String, expected: FieldType },
    /// Field is null but the contract does not allow null
    NullNotAllowed { field: String, expected: FieldType },
    /// Field is present but has the wrong type
    TypeMismatch {
        field: String,
        expected: FieldType,
        found: String,
    },
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldViolation::Missing { field, expected } => {
                write!(f, "missing required field '{}' ({})", field, expected)
            }
            FieldViolation::NullNotAllowed { field, expected } => {
                write!(f, "field '{}' must not be null (expected {})", field, expected)
            }
            FieldViolation::TypeMismatch {
                field,
                expected,
                found,
            } => {
                write!(
                    f,
                    "field '{}' expected {} but found {}",
                    field, expected, found
                )
            }
        }
    }
}

/// Errors that can occur during dataset validation.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum ValidationError {
    /// A record does not satisfy the shape contract. Carries the record's
    /// position in the dataset and every violation found in that record.
    #[error("validation failed for record {index}: {}", summarize(.violations))]
    Record {
        index: usize,
        violations: Vec<FieldViolation>,
    },

    /// A record is not a JSON object
    #[error("validation failed for record {index}: expected an object, found {found}")]
    NotAnObject { index: usize, found: String },
}

fn summarize(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Declares the required fields of one dataset.
///
/// Built with [`ShapeContract::require`] and
/// [`ShapeContract::require_nullable`]; fields not declared by the
/// contract pass through validation untouched.
///
/// # Examples
///
/// ```
/// use seed_runner::validation::contract::{FieldType, ShapeContract};
///
/// let contract = ShapeContract::new()
///     .require("name", FieldType::Text)
///     .require("on_spine", FieldType::Bool)
///     .require("code", FieldType::Text)
///     .require_nullable("parent_summary_level", FieldType::Text);
///
/// assert!(contract.validate(&[]).is_ok()); // empty dataset is valid
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShapeContract {
    fields: Vec<FieldSpec>,
}

impl ShapeContract {
    /// Create an empty contract.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a non-null field of the given type.
    pub fn require(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            field_type,
            nullable: false,
        });
        self
    }

    /// Require a field of the given type, accepting an explicit null.
    pub fn require_nullable(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            field_type,
            nullable: true,
        });
        self
    }

    /// Declared fields.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Validate a dataset against this contract.
    ///
    /// Checks every record in source order and fails on the first
    /// offending record, listing all of that record's violations. An
    /// empty dataset is valid. Purely a read-only check.
    pub fn validate(&self, records: &[Record]) -> ValidationResult<()> {
        for (index, record) in records.iter().enumerate() {
            let violations = self.check_record(record);
            if !violations.is_empty() {
                return Err(ValidationError::Record { index, violations });
            }
        }
        Ok(())
    }

    fn check_record(&self, record: &Record) -> Vec<FieldViolation> {
        let mut violations = Vec::new();

        for spec in &self.fields {
            match record.get(&spec.name) {
                None => violations.push(FieldViolation::Missing {
                    field: spec.name.clone(),
                    expected: spec.field_type,
                }),
                Some(serde_json::Value::Null) => {
                    if !spec.nullable {
                        violations.push(FieldViolation::NullNotAllowed {
                            field: spec.name.clone(),
                            expected: spec.field_type,
                        });
                    }
                }
                Some(value) => {
                    let matches = match spec.field_type {
                        FieldType::Text => value.is_string(),
                        FieldType::Bool => value.is_boolean(),
                        FieldType::Number => value.is_number(),
                    };
                    if !matches {
                        violations.push(FieldViolation::TypeMismatch {
                            field: spec.name.clone(),
                            expected: spec.field_type,
                            found: json_type_name(value).to_string(),
                        });
                    }
                }
            }
        }

        violations
    }
}

/// Human-readable name of a JSON value's type.
pub fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
