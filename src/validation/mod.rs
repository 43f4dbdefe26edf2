//! Validation functionality
//!
//! Provides validation logic for:
//! - Dataset shape contracts (required fields and scalar types)
//! - SQL identifier validation (security)

pub mod contract;
pub mod identifier;

pub use contract::{
    FieldSpec, FieldType, FieldViolation, ShapeContract, ValidationError, ValidationResult,
};
pub use identifier::{IdentifierError, validate_column_name, validate_table_name};
