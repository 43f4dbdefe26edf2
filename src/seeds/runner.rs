//! Seed orchestration.
//!
//! [`SeedRunner`] sequences one dataset through its stages: before-seed
//! hook → validation → upsert → after-seed hook. Any stage failure aborts
//! the remaining stages and propagates the originating error. No rollback
//! is performed: rows already committed stay, which is safe because the
//! upsert is idempotent and re-invoking `seed` with the same input is
//! always safe.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::seeds::dataset::extract_dataset;
use crate::seeds::target::SeedTarget;
use crate::seeds::upsert::{RetryPolicy, upsert_with_retry};
use crate::seeds::{SeedError, SeedResult};
use crate::store::{SeedStore, StoreError};

/// Lifecycle state of a [`SeedRunner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunnerState {
    /// Constructed, store not yet verified
    Idle,
    /// Store reachable, ready to seed
    Connected,
    /// Running the before-seed hook and shape validation
    Validating,
    /// Running the batch upsert
    Seeding,
    /// Running the after-seed hook
    Resolving,
    /// Store closed; terminal
    Disconnected,
    /// A stage failed; a retried `seed` call is safe
    Failed,
}

/// Outcome of one successful `seed` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedSummary {
    /// Destination table
    pub table: String,
    /// Records in the dataset
    pub records: usize,
    /// Rows actually inserted (the rest already existed)
    pub inserted: u64,
    /// Duration of the whole call in milliseconds
    pub duration_ms: u64,
}

/// Orchestrates seeding for one store connection.
///
/// The store is exclusively owned by the runner for the duration of a
/// run. Multiple datasets may be seeded through one runner sequentially;
/// callers seeding tables with cross-table natural references must
/// sequence those calls themselves.
pub struct SeedRunner<S: SeedStore> {
    store: S,
    state: RunnerState,
    retry: RetryPolicy,
    timeout: Option<Duration>,
}

impl<S: SeedStore> SeedRunner<S> {
    /// Create a runner around a store. The runner starts `Idle`; call
    /// [`SeedRunner::connect`] before seeding.
    pub fn new(store: S) -> Self {
        Self {
            store,
            state: RunnerState::Idle,
            retry: RetryPolicy::default(),
            timeout: None,
        }
    }

    /// Override the retry policy used by the upsert stage.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Bound every store-facing stage by a timeout. An elapsed timeout
    /// surfaces as [`StoreError::Cancelled`] and is never retried.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Verify the store is reachable and mark the runner connected.
    pub async fn connect(&mut self) -> SeedResult<()> {
        match self.store.health_check().await {
            Ok(true) => {
                self.state = RunnerState::Connected;
                info!("connected to {} store", self.store.store_type());
                Ok(())
            }
            Ok(false) => {
                self.state = RunnerState::Failed;
                Err(StoreError::ConnectionFailed("health check failed".to_string()).into())
            }
            Err(error) => {
                self.state = RunnerState::Failed;
                Err(error.into())
            }
        }
    }

    /// Seed one dataset: before hook → validation → upsert → after hook.
    ///
    /// `document` is the parsed source document; the dataset is the array
    /// at `target.data_path` within it. Accepts a runner in the `Failed`
    /// state so a failed run can be retried without reconnecting
    /// (idempotence is the recovery mechanism).
    pub async fn seed(
        &mut self,
        target: &SeedTarget,
        document: &serde_json::Value,
    ) -> SeedResult<SeedSummary> {
        if !matches!(self.state, RunnerState::Connected | RunnerState::Failed) {
            return Err(SeedError::NotConnected);
        }

        let start = Instant::now();
        match self.run_stages(target, document).await {
            Ok(mut summary) => {
                summary.duration_ms = start.elapsed().as_millis() as u64;
                self.state = RunnerState::Connected;
                info!(
                    "seeded {} from {}: {} records, {} inserted, {}ms",
                    summary.table, target.file, summary.records, summary.inserted, summary.duration_ms
                );
                Ok(summary)
            }
            Err(error) => {
                self.state = RunnerState::Failed;
                Err(error)
            }
        }
    }

    /// Close the store. Terminal: a disconnected runner cannot seed.
    pub async fn disconnect(&mut self) -> SeedResult<()> {
        self.store.close().await?;
        self.state = RunnerState::Disconnected;
        Ok(())
    }

    async fn run_stages(
        &mut self,
        target: &SeedTarget,
        document: &serde_json::Value,
    ) -> SeedResult<SeedSummary> {
        let records = extract_dataset(document, &target.data_path)?;

        self.state = RunnerState::Validating;
        if let Some(hook) = &target.before_seed {
            bounded(self.timeout, hook.run(&self.store, &records))
                .await
                .map_err(|e| SeedError::Hook {
                    stage: "before_seed",
                    source: Box::new(e),
                })?;
        }
        if let Some(contract) = &target.contract {
            contract.validate(&records)?;
        }

        self.state = RunnerState::Seeding;
        let inserted = bounded(self.timeout, async {
            upsert_with_retry(
                &self.store,
                &target.table,
                &target.conflict_column,
                &records,
                &self.retry,
            )
            .await
            .map_err(SeedError::from)
        })
        .await?;

        self.state = RunnerState::Resolving;
        if let Some(hook) = &target.after_seed {
            bounded(self.timeout, hook.run(&self.store))
                .await
                .map_err(|e| SeedError::Hook {
                    stage: "after_seed",
                    source: Box::new(e),
                })?;
        }

        Ok(SeedSummary {
            table: target.table.clone(),
            records: records.len(),
            inserted,
            duration_ms: 0,
        })
    }
}

/// Run a stage under the configured timeout, mapping an elapsed timeout
/// to a cancellation error.
async fn bounded<T>(
    limit: Option<Duration>,
    stage: impl Future<Output = SeedResult<T>>,
) -> SeedResult<T> {
    match limit {
        Some(limit) => match tokio::time::timeout(limit, stage).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Cancelled(format!(
                "stage did not complete within {}ms",
                limit.as_millis()
            ))
            .into()),
        },
        None => stage.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::store::MemoryStore;
    use crate::validation::{FieldType, ShapeContract};

    fn target() -> SeedTarget {
        SeedTarget::new("levels.json", "levels", "code", "levels")
            .with_contract(ShapeContract::new().require("code", FieldType::Text))
    }

    fn document() -> serde_json::Value {
        json!({ "levels": [ { "code": "010", "parent": null } ] })
    }

    #[tokio::test]
    async fn test_seed_requires_connect() {
        let mut runner = SeedRunner::new(MemoryStore::new());
        assert_eq!(runner.state(), RunnerState::Idle);

        let err = runner.seed(&target(), &document()).await.unwrap_err();
        assert!(matches!(err, SeedError::NotConnected));
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let mut runner = SeedRunner::new(MemoryStore::new());

        runner.connect().await.unwrap();
        assert_eq!(runner.state(), RunnerState::Connected);

        let summary = runner.seed(&target(), &document()).await.unwrap();
        assert_eq!(runner.state(), RunnerState::Connected);
        assert_eq!(summary.records, 1);
        assert_eq!(summary.inserted, 1);

        runner.disconnect().await.unwrap();
        assert_eq!(runner.state(), RunnerState::Disconnected);

        let err = runner.seed(&target(), &document()).await.unwrap_err();
        assert!(matches!(err, SeedError::NotConnected));
    }

    #[tokio::test]
    async fn test_failed_state_allows_retry() {
        let mut runner = SeedRunner::new(MemoryStore::new());
        runner.connect().await.unwrap();

        // Invalid dataset: code is a number, not text.
        let bad = json!({ "levels": [ { "code": 10 } ] });
        let err = runner.seed(&target(), &bad).await.unwrap_err();
        assert!(matches!(err, SeedError::Validation(_)));
        assert_eq!(runner.state(), RunnerState::Failed);

        // Retrying with valid input succeeds without reconnecting.
        runner.seed(&target(), &document()).await.unwrap();
        assert_eq!(runner.state(), RunnerState::Connected);
    }

    #[tokio::test]
    async fn test_empty_dataset_is_a_noop_success() {
        let mut runner = SeedRunner::new(MemoryStore::new());
        runner.connect().await.unwrap();

        let empty = json!({ "levels": [] });
        let summary = runner.seed(&target(), &empty).await.unwrap();
        assert_eq!(summary.records, 0);
        assert_eq!(summary.inserted, 0);
    }
}
