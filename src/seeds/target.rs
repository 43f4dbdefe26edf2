//! Seed target configuration.
//!
//! A [`SeedTarget`] describes one seeding unit: where the dataset lives
//! inside the source document, which table and conflict column it lands
//! on, the shape contract it must satisfy, and the hooks that run around
//! the upsert. Targets are created once per dataset definition and are
//! immutable for the duration of a run.

use async_trait::async_trait;

use crate::seeds::SeedResult;
use crate::seeds::dataset::Record;
use crate::store::SeedStore;
use crate::validation::ShapeContract;

/// Hook invoked before validation and upsert.
///
/// Typically idempotent schema preparation such as
/// `CREATE INDEX IF NOT EXISTS`. Receives the dataset so it can perform
/// its own checks, but must not write rows.
#[async_trait(?Send)]
pub trait BeforeSeed: Send + Sync {
    async fn run(&self, store: &dyn SeedStore, records: &[Record]) -> SeedResult<()>;
}

/// Hook invoked after the upsert completes.
///
/// Typically reference resolution; see
/// [`crate::seeds::resolve::ResolveReferences`].
#[async_trait(?Send)]
pub trait AfterSeed: Send + Sync {
    async fn run(&self, store: &dyn SeedStore) -> SeedResult<()>;
}

/// Configuration for one seeding unit.
pub struct SeedTarget {
    /// Source file identifier (used for diagnostics; the engine does not
    /// read files itself)
    pub file: String,
    /// Destination table
    pub table: String,
    /// Natural-key column used for conflict detection
    pub conflict_column: String,
    /// Dot-separated path to the dataset array within the source document
    pub data_path: String,
    /// Shape contract checked before any write
    pub contract: Option<ShapeContract>,
    /// Hook run before validation and upsert
    pub before_seed: Option<Box<dyn BeforeSeed>>,
    /// Hook run after the upsert
    pub after_seed: Option<Box<dyn AfterSeed>>,
}

impl SeedTarget {
    /// Create a target with no contract and no hooks.
    pub fn new(
        file: impl Into<String>,
        table: impl Into<String>,
        conflict_column: impl Into<String>,
        data_path: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            table: table.into(),
            conflict_column: conflict_column.into(),
            data_path: data_path.into(),
            contract: None,
            before_seed: None,
            after_seed: None,
        }
    }

    /// Attach a shape contract; the runner validates the dataset against
    /// it before any write.
    pub fn with_contract(mut self, contract: ShapeContract) -> Self {
        self.contract = Some(contract);
        self
    }

    /// Attach a before-seed hook.
    pub fn with_before_seed(mut self, hook: impl BeforeSeed + 'static) -> Self {
        self.before_seed = Some(Box::new(hook));
        self
    }

    /// Attach an after-seed hook.
    pub fn with_after_seed(mut self, hook: impl AfterSeed + 'static) -> Self {
        self.after_seed = Some(Box::new(hook));
        self
    }
}
