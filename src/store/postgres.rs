//! PostgreSQL store implementation
//!
//! Provides a PostgreSQL store for server deployments. One connection per
//! store; the engine drives it sequentially, so no pooling is needed.
//! Conflict handling (skip-on-conflict inserts, deadlock classification)
//! is delegated to the server via SQLSTATE codes.

use async_trait::async_trait;
use bytes::BytesMut;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use tracing::error;

use crate::seeds::dataset::Record;
use crate::seeds::resolve::{ReferenceSpec, ResolutionReport};
use crate::store::{QueryRow, SeedStore, StoreError, StoreResult};
use crate::validation::{validate_column_name, validate_table_name};

/// PostgreSQL store
///
/// Wraps a single client; the connection task runs in the background for
/// the lifetime of the store.
pub struct PostgresStore {
    /// Connection string
    connection_string: String,
    /// PostgreSQL client (wrapped for async access)
    client: Arc<Mutex<tokio_postgres::Client>>,
}

impl PostgresStore {
    /// Connect to a PostgreSQL server
    ///
    /// # Arguments
    /// * `connection_string` - PostgreSQL connection string
    ///
    /// # Returns
    /// A connected store instance
    pub async fn connect(connection_string: &str) -> StoreResult<Self> {
        let (client, connection) =
            tokio_postgres::connect(connection_string, tokio_postgres::NoTls)
                .await
                .map_err(|e| {
                    StoreError::ConnectionFailed(format!(
                        "Failed to connect to PostgreSQL: {}",
                        e
                    ))
                })?;

        // Spawn connection handler
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {}", e);
            }
        });

        Ok(Self {
            connection_string: connection_string.to_string(),
            client: Arc::new(Mutex::new(client)),
        })
    }

    /// Get the connection string (masked for security)
    pub fn connection_string_masked(&self) -> String {
        // Mask password in connection string
        if let Some(at_pos) = self.connection_string.find('@')
            && let Some(colon_pos) = self.connection_string[..at_pos].rfind(':')
        {
            let prefix = &self.connection_string[..colon_pos + 1];
            let suffix = &self.connection_string[at_pos..];
            return format!("{}****{}", prefix, suffix);
        }
        self.connection_string.clone()
    }

    /// Convert a PostgreSQL row to a JSON value
    fn row_to_json(row: &tokio_postgres::Row) -> QueryRow {
        let mut map = serde_json::Map::new();

        for (i, column) in row.columns().iter().enumerate() {
            let value = Self::get_column_value(row, i);
            map.insert(column.name().to_string(), value);
        }

        serde_json::Value::Object(map)
    }

    /// Get a column value as JSON
    fn get_column_value(row: &tokio_postgres::Row, idx: usize) -> serde_json::Value {
        // Try different types
        if let Ok(v) = row.try_get::<_, Option<String>>(idx) {
            return v
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<i64>>(idx) {
            return v
                .map(|n| serde_json::Value::Number(n.into()))
                .unwrap_or(serde_json::Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<i32>>(idx) {
            return v
                .map(|n| serde_json::Value::Number(n.into()))
                .unwrap_or(serde_json::Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<bool>>(idx) {
            return v
                .map(serde_json::Value::Bool)
                .unwrap_or(serde_json::Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<f64>>(idx) {
            return v
                .and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null);
        }

        serde_json::Value::Null
    }
}

/// Classify a server error by SQLSTATE
fn map_pg_error(e: tokio_postgres::Error) -> StoreError {
    match e.code() {
        Some(code)
            if *code == SqlState::T_R_DEADLOCK_DETECTED
                || *code == SqlState::T_R_SERIALIZATION_FAILURE =>
        {
            StoreError::Transient {
                code: code.code().to_string(),
                message: e.to_string(),
            }
        }
        Some(code) => StoreError::QueryFailed {
            code: Some(code.code().to_string()),
            message: e.to_string(),
        },
        None => StoreError::QueryFailed {
            code: None,
            message: e.to_string(),
        },
    }
}

/// SQL parameter adapted from a JSON value
///
/// The engine carries record fields as JSON; this maps them onto wire
/// types the server expects, widening or narrowing numbers to the column
/// type at bind time.
#[derive(Debug)]
enum PgValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<&serde_json::Value> for PgValue {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => PgValue::Null,
            serde_json::Value::Bool(b) => PgValue::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    PgValue::Int(i)
                } else {
                    PgValue::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => PgValue::Text(s.clone()),
            // Arrays and objects land as their JSON text
            other => PgValue::Text(other.to_string()),
        }
    }
}

impl ToSql for PgValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            PgValue::Null => Ok(IsNull::Yes),
            PgValue::Bool(b) => b.to_sql(ty, out),
            PgValue::Int(n) => {
                if *ty == Type::INT2 {
                    (*n as i16).to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    (*n as i32).to_sql(ty, out)
                } else if *ty == Type::FLOAT4 {
                    (*n as f32).to_sql(ty, out)
                } else if *ty == Type::FLOAT8 {
                    (*n as f64).to_sql(ty, out)
                } else if *ty == Type::TEXT || *ty == Type::VARCHAR {
                    n.to_string().to_sql(ty, out)
                } else {
                    n.to_sql(ty, out)
                }
            }
            PgValue::Float(f) => {
                if *ty == Type::FLOAT4 {
                    (*f as f32).to_sql(ty, out)
                } else {
                    f.to_sql(ty, out)
                }
            }
            PgValue::Text(s) => s.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // Adaptation happens per value in to_sql
        true
    }

    to_sql_checked!();
}

fn insert_sql(table: &str, columns: &[&String], conflict_column: &str) -> String {
    let column_list = columns
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=columns.len())
        .map(|i| format!("${}", i))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO NOTHING",
        table, column_list, placeholders, conflict_column
    )
}

fn resolve_update_sql(spec: &ReferenceSpec) -> String {
    format!(
        "UPDATE {t} SET {sur} = (SELECT parent.{sk} FROM {t} parent WHERE parent.{nk} = {t}.{nref}) WHERE {t}.{nref} IS NOT NULL",
        t = spec.table,
        sur = spec.surrogate_ref_column,
        sk = spec.surrogate_key_column,
        nk = spec.natural_key_column,
        nref = spec.natural_ref_column,
    )
}

fn resolve_counts_sql(spec: &ReferenceSpec) -> String {
    format!(
        "SELECT COUNT(*) AS total, COUNT({nref}) AS with_reference, COUNT({sur}) AS resolved FROM {t}",
        t = spec.table,
        nref = spec.natural_ref_column,
        sur = spec.surrogate_ref_column,
    )
}

fn orphans_sql(spec: &ReferenceSpec) -> String {
    format!(
        "SELECT * FROM {t} WHERE {nref} IS NOT NULL AND {sur} IS NULL",
        t = spec.table,
        nref = spec.natural_ref_column,
        sur = spec.surrogate_ref_column,
    )
}

fn validate_spec(spec: &ReferenceSpec) -> StoreResult<()> {
    validate_table_name(&spec.table)?;
    validate_column_name(&spec.natural_key_column)?;
    validate_column_name(&spec.natural_ref_column)?;
    validate_column_name(&spec.surrogate_ref_column)?;
    validate_column_name(&spec.surrogate_key_column)?;
    Ok(())
}

#[async_trait(?Send)]
impl SeedStore for PostgresStore {
    async fn execute(
        &self,
        sql: &str,
        params: &[serde_json::Value],
    ) -> StoreResult<Vec<QueryRow>> {
        let client = self.client.lock().await;

        let values: Vec<PgValue> = params.iter().map(PgValue::from).collect();
        let param_refs: Vec<&(dyn ToSql + Sync)> = values
            .iter()
            .map(|v| v as &(dyn ToSql + Sync))
            .collect();

        let rows = client
            .query(sql, &param_refs)
            .await
            .map_err(map_pg_error)?;

        Ok(rows.iter().map(Self::row_to_json).collect())
    }

    async fn batch_execute(&self, sql: &str) -> StoreResult<()> {
        let client = self.client.lock().await;
        client.batch_execute(sql).await.map_err(map_pg_error)
    }

    async fn insert_ignore(
        &self,
        table: &str,
        conflict_column: &str,
        records: &[Record],
    ) -> StoreResult<u64> {
        validate_table_name(table)?;
        validate_column_name(conflict_column)?;

        let client = self.client.lock().await;
        let mut inserted = 0u64;

        for record in records {
            let columns: Vec<&String> = record.keys().collect();
            for column in &columns {
                validate_column_name(column)?;
            }

            let values: Vec<PgValue> = record.values().map(PgValue::from).collect();
            let param_refs: Vec<&(dyn ToSql + Sync)> = values
                .iter()
                .map(|v| v as &(dyn ToSql + Sync))
                .collect();

            let sql = insert_sql(table, &columns, conflict_column);
            match client.execute(sql.as_str(), &param_refs).await {
                Ok(count) => inserted += count,
                // Raced with another seeder past the conflict target;
                // the row exists, which is all the insert guarantees.
                Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => {}
                Err(e) => return Err(map_pg_error(e)),
            }
        }

        Ok(inserted)
    }

    async fn resolve_self_references(
        &self,
        spec: &ReferenceSpec,
    ) -> StoreResult<ResolutionReport> {
        validate_spec(spec)?;

        let client = self.client.lock().await;

        client
            .execute(resolve_update_sql(spec).as_str(), &[])
            .await
            .map_err(map_pg_error)?;

        let counts = client
            .query_one(resolve_counts_sql(spec).as_str(), &[])
            .await
            .map_err(map_pg_error)?;

        let total: i64 = counts.try_get("total").map_err(map_pg_error)?;
        let with_reference: i64 = counts.try_get("with_reference").map_err(map_pg_error)?;
        let resolved: i64 = counts.try_get("resolved").map_err(map_pg_error)?;

        let orphan_rows = client
            .query(orphans_sql(spec).as_str(), &[])
            .await
            .map_err(map_pg_error)?;

        Ok(ResolutionReport {
            total: total as u64,
            with_reference: with_reference as u64,
            resolved: resolved as u64,
            orphans: orphan_rows.iter().map(Self::row_to_json).collect(),
        })
    }

    async fn fetch_all(&self, table: &str) -> StoreResult<Vec<QueryRow>> {
        validate_table_name(table)?;

        let client = self.client.lock().await;
        let sql = format!("SELECT * FROM {}", table);
        let rows = client
            .query(sql.as_str(), &[])
            .await
            .map_err(map_pg_error)?;

        Ok(rows.iter().map(Self::row_to_json).collect())
    }

    async fn health_check(&self) -> StoreResult<bool> {
        let client = self.client.lock().await;
        let rows = client
            .query("SELECT 1 AS healthy", &[])
            .await
            .map_err(map_pg_error)?;
        Ok(!rows.is_empty())
    }

    fn store_type(&self) -> &'static str {
        "postgres"
    }

    async fn close(&self) -> StoreResult<()> {
        // Connection task ends when the client is dropped
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec() -> ReferenceSpec {
        ReferenceSpec::new(
            "Geography levels",
            "summary_levels",
            "code",
            "parent_summary_level",
            "parent_summary_level_id",
        )
    }

    #[test]
    fn test_insert_sql_shape() {
        let code = "code".to_string();
        let name = "name".to_string();
        let columns = vec![&code, &name];
        let sql = insert_sql("summary_levels", &columns, "code");
        assert_eq!(
            sql,
            "INSERT INTO summary_levels (code, name) VALUES ($1, $2) ON CONFLICT (code) DO NOTHING"
        );
    }

    #[test]
    fn test_resolve_update_is_set_based() {
        let sql = resolve_update_sql(&spec());
        assert!(sql.starts_with("UPDATE summary_levels SET parent_summary_level_id ="));
        assert!(sql.contains("SELECT parent.id FROM summary_levels parent"));
        assert!(sql.contains("WHERE summary_levels.parent_summary_level IS NOT NULL"));
    }

    #[test]
    fn test_counts_and_orphans_sql() {
        let counts = resolve_counts_sql(&spec());
        assert!(counts.contains("COUNT(*) AS total"));
        assert!(counts.contains("COUNT(parent_summary_level) AS with_reference"));
        assert!(counts.contains("COUNT(parent_summary_level_id) AS resolved"));

        let orphans = orphans_sql(&spec());
        assert!(orphans.contains("parent_summary_level IS NOT NULL"));
        assert!(orphans.contains("parent_summary_level_id IS NULL"));
    }

    #[test]
    fn test_spec_identifiers_validated() {
        let mut bad = spec();
        bad.table = "summary levels".to_string();
        assert!(matches!(
            validate_spec(&bad),
            Err(StoreError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_pg_value_from_json() {
        assert!(matches!(PgValue::from(&json!(null)), PgValue::Null));
        assert!(matches!(PgValue::from(&json!(true)), PgValue::Bool(true)));
        assert!(matches!(PgValue::from(&json!(42)), PgValue::Int(42)));
        assert!(matches!(PgValue::from(&json!(1.5)), PgValue::Float(_)));
        assert!(matches!(PgValue::from(&json!("010")), PgValue::Text(_)));
        // Structured values are carried as JSON text
        assert!(matches!(PgValue::from(&json!({ "a": 1 })), PgValue::Text(_)));
    }
}
