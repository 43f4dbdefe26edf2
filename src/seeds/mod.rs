//! Seeding engine: dataset extraction, idempotent upsert, reference
//! resolution, and the orchestrator that sequences them.
//!
//! Data flow for one dataset: raw dataset → validator → upsert executor →
//! relationship resolver → diagnostic report. Control flow is strictly
//! sequential per dataset; independent datasets share no state.

pub mod dataset;
pub mod resolve;
pub mod runner;
pub mod target;
pub mod upsert;

use crate::store::StoreError;
use crate::validation::ValidationError;

pub use dataset::{Record, extract_dataset};
pub use resolve::{ReferenceSpec, ResolutionReport, ResolveReferences, resolve_references};
pub use runner::{RunnerState, SeedRunner, SeedSummary};
pub use target::{AfterSeed, BeforeSeed, SeedTarget};
pub use upsert::{RetryPolicy, upsert_with_retry};

/// Error type for seed operations.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    /// A record failed shape validation; the whole dataset is rejected
    /// before any write
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The underlying store reported a fatal error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The data path did not resolve to an array of objects
    #[error("data path '{path}': {detail}")]
    DataPath { path: String, detail: String },

    /// A before/after seed hook failed
    #[error("{stage} hook failed: {source}")]
    Hook {
        stage: &'static str,
        #[source]
        source: Box<SeedError>,
    },

    /// The runner has no connected store
    #[error("seed runner is not connected")]
    NotConnected,
}

/// Result type for seed operations.
pub type SeedResult<T> = Result<T, SeedError>;
