//! Seed Runner - Declarative, idempotent dataset seeding for relational stores
//!
//! Provides unified interfaces for:
//! - Shape validation of datasets before any write
//! - Skip-on-conflict batch upserts keyed on a natural key
//! - Self-referencing relationship resolution (natural key to surrogate key)
//! - Run orchestration with hooks, bounded retry and per-stage timeouts

pub mod seeds;
pub mod store;
pub mod validation;

// Re-export commonly used types
pub use seeds::dataset::{Record, extract_dataset};
pub use seeds::resolve::{ReferenceSpec, ResolutionReport, ResolveReferences, resolve_references};
pub use seeds::runner::{RunnerState, SeedRunner, SeedSummary};
pub use seeds::target::{AfterSeed, BeforeSeed, SeedTarget};
pub use seeds::upsert::{RetryPolicy, upsert_with_retry};
pub use seeds::{SeedError, SeedResult};

pub use store::{MemoryStore, QueryRow, SeedConfig, SeedStore, StoreError, StoreResult};

#[cfg(feature = "postgres-store")]
pub use store::PostgresStore;

pub use validation::{
    FieldSpec, FieldType, FieldViolation, IdentifierError, ShapeContract, ValidationError,
    ValidationResult, validate_column_name, validate_table_name,
};
