//! Store abstraction for the seeding engine.
//!
//! This module provides the narrow interface the engine drives:
//! - PostgreSQL: for real deployments (feature `postgres-store`)
//! - Memory: embedded in-process store for tests and dry runs
//!
//! The engine issues three kinds of statements through a store: per-record
//! skip-on-conflict inserts, one set-based correlated update for reference
//! resolution, and arbitrary DDL/DML supplied by seed hooks.

use async_trait::async_trait;

pub mod config;
pub mod memory;

#[cfg(feature = "postgres-store")]
pub mod postgres;

pub use config::SeedConfig;
pub use memory::MemoryStore;

#[cfg(feature = "postgres-store")]
pub use postgres::PostgresStore;

use crate::seeds::dataset::Record;
use crate::seeds::resolve::{ReferenceSpec, ResolutionReport};
use crate::validation::IdentifierError;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Failed to connect to the store
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Fatal query failure; carries the SQLSTATE code when the server
    /// reported one
    #[error("query failed [{}]: {message}", .code.as_deref().unwrap_or("unreported"))]
    QueryFailed {
        code: Option<String>,
        message: String,
    },

    /// Transient conflict (deadlock, serialization failure); safe to retry
    #[error("transient store conflict [{code}]: {message}")]
    Transient { code: String, message: String },

    /// A blocking stage was cancelled or timed out; never retried
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// A table or column name failed identifier validation
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(#[from] IdentifierError),

    /// Operation not supported by this store
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),
}

impl StoreError {
    /// Whether the error is a transient conflict worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient { .. })
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Query result row as a JSON value.
pub type QueryRow = serde_json::Value;

/// Store trait for seed operations.
///
/// Implementations own a connected session for the duration of a run; the
/// engine never takes an application-level lock and relies on the store's
/// own conflict handling for concurrent seeders.
#[async_trait(?Send)]
pub trait SeedStore: Send + Sync {
    /// Execute a parameterized statement and return result rows.
    ///
    /// Parameter placeholders follow the store's convention (`$1`, `$2`,
    /// ... for PostgreSQL). Statements without a result set return an
    /// empty row list.
    async fn execute(&self, sql: &str, params: &[serde_json::Value])
    -> StoreResult<Vec<QueryRow>>;

    /// Execute one or more statements without parameters or results.
    ///
    /// Used by pre-seed hooks for idempotent schema preparation
    /// (`CREATE ... IF NOT EXISTS`).
    async fn batch_execute(&self, sql: &str) -> StoreResult<()>;

    /// Insert records into `table`, skipping any record whose value in
    /// `conflict_column` collides with an existing row. Existing rows are
    /// never modified. Records are inserted in source order.
    ///
    /// # Returns
    /// Number of rows actually inserted (collisions are silent no-ops).
    async fn insert_ignore(
        &self,
        table: &str,
        conflict_column: &str,
        records: &[Record],
    ) -> StoreResult<u64>;

    /// Rewrite every row's surrogate reference to the surrogate key of
    /// the row whose natural key matches the natural reference value,
    /// as one set-based operation over the whole table. References that
    /// match no row are set to null and reported as orphans.
    async fn resolve_self_references(
        &self,
        spec: &ReferenceSpec,
    ) -> StoreResult<ResolutionReport>;

    /// Fetch every row of a table, for inspection and verification.
    async fn fetch_all(&self, table: &str) -> StoreResult<Vec<QueryRow>>;

    /// Check that the store is reachable.
    async fn health_check(&self) -> StoreResult<bool>;

    /// Store type name ("postgres" or "memory").
    fn store_type(&self) -> &'static str;

    /// Close the store connection.
    async fn close(&self) -> StoreResult<()>;
}
