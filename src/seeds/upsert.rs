//! Idempotent batch upsert with bounded retry.
//!
//! Each record is inserted with skip-on-conflict semantics keyed on the
//! natural-key column; re-running the same dataset N times yields the
//! same row set as running it once. The whole batch is retried as a unit
//! when the store reports a transient conflict (deadlock, serialization
//! failure), with exponential backoff capped at a fixed attempt count.
//! The last error is surfaced verbatim on exhaustion.

use std::time::Duration;

use tracing::warn;

use crate::seeds::dataset::Record;
use crate::store::{SeedStore, StoreResult};

/// Bounded retry policy for transient store conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (must be at least 1)
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles on each further attempt
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with explicit bounds.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Backoff delay after the given attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Insert `records` into `table` with skip-on-conflict semantics,
/// retrying the whole batch on transient conflicts.
///
/// Safe to retry because every insert is a silent no-op for rows that
/// already exist. Returns the number of rows actually inserted.
pub async fn upsert_with_retry<S>(
    store: &S,
    table: &str,
    conflict_column: &str,
    records: &[Record],
    policy: &RetryPolicy,
) -> StoreResult<u64>
where
    S: SeedStore + ?Sized,
{
    let mut attempt = 1;
    loop {
        match store.insert_ignore(table, conflict_column, records).await {
            Ok(inserted) => return Ok(inserted),
            Err(error) if error.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    "transient conflict seeding {} (attempt {}/{}), retrying in {:?}: {}",
                    table, attempt, policy.max_attempts, delay, error
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
