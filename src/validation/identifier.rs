//! SQL identifier validation.
//!
//! Table and column names arrive from seed target configuration and from
//! dataset field names, and end up interpolated into SQL text. These
//! functions reject anything that is not a plain unquoted identifier
//! before a statement is assembled.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length for table and column names.
///
/// PostgreSQL truncates identifiers at 63 bytes; anything longer is a
/// configuration mistake.
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Errors that can occur during identifier validation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum IdentifierError {
    /// Identifier is empty when a value is required
    #[error("{0} cannot be empty")]
    Empty(&'static str),

    /// Identifier exceeds maximum allowed length
    #[error("{kind} exceeds maximum length (max: {max}, got: {actual})")]
    TooLong {
        kind: &'static str,
        max: usize,
        actual: usize,
    },

    /// Identifier does not start with a letter or underscore
    #[error("{kind} must start with a letter or underscore: {name}")]
    InvalidStart { kind: &'static str, name: String },

    /// Identifier contains a character outside [A-Za-z0-9_]
    #[error("{kind} contains invalid character: '{ch}'")]
    InvalidCharacter { kind: &'static str, ch: char },

    /// Identifier is a SQL reserved word
    #[error("{kind} cannot be a reserved word: {word}")]
    ReservedWord { kind: &'static str, word: String },
}

/// Result type for identifier validation.
pub type IdentifierResult<T> = Result<T, IdentifierError>;

/// Validate a table name.
///
/// # Rules
///
/// - Must not be empty
/// - Must not exceed 63 characters
/// - Must start with an ASCII letter or underscore
/// - May contain ASCII letters, digits, and underscores
/// - Cannot be a SQL reserved word
///
/// # Examples
///
/// ```
/// use seed_runner::validation::identifier::validate_table_name;
///
/// assert!(validate_table_name("summary_levels").is_ok());
/// assert!(validate_table_name("").is_err());
/// assert!(validate_table_name("123_invalid").is_err());
/// assert!(validate_table_name("users; DROP TABLE users").is_err());
/// ```
pub fn validate_table_name(name: &str) -> IdentifierResult<()> {
    validate_identifier("table name", name)
}

/// Validate a column name.
///
/// Same rules as [`validate_table_name`].
///
/// # Examples
///
/// ```
/// use seed_runner::validation::identifier::validate_column_name;
///
/// assert!(validate_column_name("id").is_ok());
/// assert!(validate_column_name("parent_summary_level").is_ok());
/// assert!(validate_column_name("code'--").is_err());
/// ```
pub fn validate_column_name(name: &str) -> IdentifierResult<()> {
    validate_identifier("column name", name)
}

fn validate_identifier(kind: &'static str, name: &str) -> IdentifierResult<()> {
    if name.is_empty() {
        return Err(IdentifierError::Empty(kind));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(IdentifierError::TooLong {
            kind,
            max: MAX_IDENTIFIER_LENGTH,
            actual: name.len(),
        });
    }

    let first_char = name.chars().next().unwrap_or('_');
    if !first_char.is_ascii_alphabetic() && first_char != '_' {
        return Err(IdentifierError::InvalidStart {
            kind,
            name: name.to_string(),
        });
    }

    for c in name.chars() {
        if !c.is_ascii_alphanumeric() && c != '_' {
            return Err(IdentifierError::InvalidCharacter { kind, ch: c });
        }
    }

    if is_sql_reserved_word(name) {
        return Err(IdentifierError::ReservedWord {
            kind,
            word: name.to_string(),
        });
    }

    Ok(())
}

/// Check if a word is a SQL reserved word (basic set).
fn is_sql_reserved_word(word: &str) -> bool {
    const RESERVED_WORDS: &[&str] = &[
        "select",
        "from",
        "where",
        "insert",
        "update",
        "delete",
        "create",
        "drop",
        "alter",
        "table",
        "index",
        "view",
        "grant",
        "revoke",
        "commit",
        "rollback",
        "begin",
        "end",
        "transaction",
        "primary",
        "foreign",
        "key",
        "references",
        "constraint",
        "union",
        "join",
        "group",
        "order",
        "having",
        "null",
        "not",
        "and",
        "or",
        "on",
        "into",
        "values",
        "set",
        "as",
    ];

    RESERVED_WORDS.contains(&word.to_lowercase().as_str())
}
