//! Self-referencing relationship resolution.
//!
//! After a dataset is inserted, every row's natural reference (a
//! human-readable code pointing at another row's natural key in the same
//! table) is rewritten into a surrogate-key foreign key. Resolution runs
//! as one set-based update over the whole table, so it is insensitive to
//! insertion order: a child inserted before its parent still resolves.
//!
//! References that match no natural key are left with a null surrogate
//! reference and reported as orphans; orphans are a warning, never an
//! error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::seeds::SeedResult;
use crate::seeds::target::AfterSeed;
use crate::store::{QueryRow, SeedStore, StoreResult};

/// Configuration for resolving one self-referencing table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceSpec {
    /// Label used in diagnostic output (e.g. "Geography levels")
    pub entity: String,
    /// Table holding both sides of the relationship
    pub table: String,
    /// Column holding each row's natural key
    pub natural_key_column: String,
    /// Column holding the natural-key reference to the parent row
    pub natural_ref_column: String,
    /// Column receiving the resolved surrogate reference (nullable)
    pub surrogate_ref_column: String,
    /// Column holding the store-assigned surrogate key
    pub surrogate_key_column: String,
}

impl ReferenceSpec {
    /// Create a spec with the surrogate key column defaulting to `id`.
    pub fn new(
        entity: impl Into<String>,
        table: impl Into<String>,
        natural_key_column: impl Into<String>,
        natural_ref_column: impl Into<String>,
        surrogate_ref_column: impl Into<String>,
    ) -> Self {
        Self {
            entity: entity.into(),
            table: table.into(),
            natural_key_column: natural_key_column.into(),
            natural_ref_column: natural_ref_column.into(),
            surrogate_ref_column: surrogate_ref_column.into(),
            surrogate_key_column: "id".to_string(),
        }
    }

    /// Override the surrogate key column name.
    pub fn with_surrogate_key_column(mut self, column: impl Into<String>) -> Self {
        self.surrogate_key_column = column.into();
        self
    }
}

/// Outcome of one resolution pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolutionReport {
    /// Total rows in the table
    pub total: u64,
    /// Rows carrying a non-null natural reference
    pub with_reference: u64,
    /// Rows whose reference resolved to an existing natural key
    pub resolved: u64,
    /// Rows whose reference matched nothing (full row, natural key
    /// included)
    pub orphans: Vec<QueryRow>,
}

impl ResolutionReport {
    /// Number of orphaned rows.
    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    /// Whether every referencing row resolved.
    pub fn is_fully_resolved(&self) -> bool {
        self.resolved == self.with_reference
    }
}

/// Resolve every natural reference in `spec.table` and report the result.
///
/// Emits a diagnostic line of the form
/// `"<entity>: <total> total, <resolved>/<with_reference> with parents"`,
/// and a separate warning listing orphan records when any exist.
pub async fn resolve_references<S>(store: &S, spec: &ReferenceSpec) -> StoreResult<ResolutionReport>
where
    S: SeedStore + ?Sized,
{
    let report = store.resolve_self_references(spec).await?;

    info!(
        "{}: {} total, {}/{} with parents",
        spec.entity, report.total, report.resolved, report.with_reference
    );

    if !report.orphans.is_empty() {
        let listing = serde_json::to_string(&report.orphans).unwrap_or_else(|_| "[]".to_string());
        warn!("Orphaned records: {}", listing);
    }

    Ok(report)
}

/// After-seed hook that runs [`resolve_references`] for one table.
///
/// The typical post-seed step: attach it to a [`crate::seeds::SeedTarget`]
/// so resolution runs after every row of the dataset exists.
pub struct ResolveReferences {
    spec: ReferenceSpec,
}

impl ResolveReferences {
    /// Create a resolution hook for the given spec.
    pub fn new(spec: ReferenceSpec) -> Self {
        Self { spec }
    }
}

#[async_trait(?Send)]
impl AfterSeed for ResolveReferences {
    async fn run(&self, store: &dyn SeedStore) -> SeedResult<()> {
        resolve_references(store, &self.spec).await?;
        Ok(())
    }
}
