//! Embedded in-memory store.
//!
//! Implements the full seeding contract against process-local tables so
//! the engine can be exercised without a running server. Tables are
//! created implicitly on first insert; surrogate keys are assigned from a
//! per-table monotonic counter, matching the serial-column behavior the
//! engine expects from a relational store.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::seeds::dataset::Record;
use crate::seeds::resolve::{ReferenceSpec, ResolutionReport};
use crate::store::{QueryRow, SeedStore, StoreError, StoreResult};
use crate::validation::{validate_column_name, validate_table_name};

#[derive(Debug, Default)]
struct MemTable {
    next_id: i64,
    rows: Vec<Record>,
}

/// In-memory store for tests and dry runs.
///
/// Single-writer by construction (one async mutex over all tables), so
/// transient conflicts never occur here.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, MemTable>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait(?Send)]
impl SeedStore for MemoryStore {
    /// Arbitrary SQL is not interpreted by the memory store.
    async fn execute(&self, sql: &str, _params: &[Value]) -> StoreResult<Vec<QueryRow>> {
        Err(StoreError::Unsupported(format!(
            "memory store does not execute raw statements: {sql}"
        )))
    }

    /// Accepted as a no-op so idempotent schema-preparation hooks run
    /// unchanged against either store.
    async fn batch_execute(&self, sql: &str) -> StoreResult<()> {
        debug!("memory store ignoring batch statement: {}", sql);
        Ok(())
    }

    async fn insert_ignore(
        &self,
        table: &str,
        conflict_column: &str,
        records: &[Record],
    ) -> StoreResult<u64> {
        validate_table_name(table)?;
        validate_column_name(conflict_column)?;

        let mut tables = self.tables.lock().await;
        let mem = tables.entry(table.to_string()).or_default();

        let mut inserted = 0u64;
        for record in records {
            let key = record.get(conflict_column).cloned().unwrap_or(Value::Null);
            let exists = !key.is_null()
                && mem
                    .rows
                    .iter()
                    .any(|row| row.get(conflict_column) == Some(&key));
            if exists {
                continue;
            }

            mem.next_id += 1;
            let mut row = record.clone();
            row.insert("id".to_string(), Value::from(mem.next_id));
            mem.rows.push(row);
            inserted += 1;
        }

        Ok(inserted)
    }

    async fn resolve_self_references(
        &self,
        spec: &ReferenceSpec,
    ) -> StoreResult<ResolutionReport> {
        validate_table_name(&spec.table)?;
        validate_column_name(&spec.natural_key_column)?;
        validate_column_name(&spec.natural_ref_column)?;
        validate_column_name(&spec.surrogate_ref_column)?;
        validate_column_name(&spec.surrogate_key_column)?;

        let mut tables = self.tables.lock().await;
        let mem = tables
            .entry(spec.table.clone())
            .or_default();

        // Natural key -> surrogate key, over the whole table. Building the
        // index first makes resolution order-independent.
        let mut index: HashMap<String, i64> = HashMap::new();
        for row in &mem.rows {
            if let Some(key) = row.get(&spec.natural_key_column)
                && !key.is_null()
                && let Some(id) = row.get(&spec.surrogate_key_column).and_then(Value::as_i64)
            {
                index.insert(key.to_string(), id);
            }
        }

        let mut report = ResolutionReport {
            total: mem.rows.len() as u64,
            ..Default::default()
        };

        for row in &mut mem.rows {
            let reference = row
                .get(&spec.natural_ref_column)
                .cloned()
                .unwrap_or(Value::Null);
            if reference.is_null() {
                continue;
            }
            report.with_reference += 1;

            match index.get(&reference.to_string()) {
                Some(id) => {
                    row.insert(spec.surrogate_ref_column.clone(), Value::from(*id));
                    report.resolved += 1;
                }
                None => {
                    row.insert(spec.surrogate_ref_column.clone(), Value::Null);
                    report.orphans.push(Value::Object(row.clone()));
                }
            }
        }

        Ok(report)
    }

    async fn fetch_all(&self, table: &str) -> StoreResult<Vec<QueryRow>> {
        validate_table_name(table)?;

        let tables = self.tables.lock().await;
        match tables.get(table) {
            Some(mem) => Ok(mem.rows.iter().cloned().map(Value::Object).collect()),
            None => Err(StoreError::QueryFailed {
                code: None,
                message: format!("no such table: {table}"),
            }),
        }
    }

    async fn health_check(&self) -> StoreResult<bool> {
        Ok(true)
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}
