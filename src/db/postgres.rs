//! PostgreSQL catalog and execution access
//!
//! Every call checks a single connection out of the pool for its duration.
//! The `PoolConnection` guard hands it back when dropped, including on the
//! error and timeout paths.

use crate::error::{AgentError, Result};
use crate::executor::QueryRunner;
use crate::schema::introspector::{Catalog, CatalogForeignKey};
use crate::schema::{ColumnInfo, ForeignKeyRef, Row};
use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use std::time::Duration;
use tracing::debug;

const LIST_TABLES_SQL: &str = r#"
    SELECT table_name::text
    FROM information_schema.tables
    WHERE table_schema = $1
      AND table_type = 'BASE TABLE'
    ORDER BY table_name
"#;

const COLUMNS_SQL: &str = r#"
    SELECT c.column_name::text,
           c.data_type::text,
           (c.is_nullable = 'YES') AS nullable,
           EXISTS (
               SELECT 1
               FROM information_schema.table_constraints AS tc
               JOIN information_schema.key_column_usage AS ku
                 ON tc.constraint_name = ku.constraint_name
                AND tc.table_schema = ku.table_schema
                AND tc.table_name = ku.table_name
               WHERE tc.constraint_type = 'PRIMARY KEY'
                 AND tc.table_schema = c.table_schema
                 AND tc.table_name = c.table_name
                 AND ku.column_name = c.column_name
           ) AS is_primary_key
    FROM information_schema.columns AS c
    WHERE c.table_schema = $1 AND c.table_name = $2
    ORDER BY c.ordinal_position
"#;

const FOREIGN_KEYS_SQL: &str = r#"
    SELECT tc.table_name::text,
           kcu.column_name::text,
           ccu.table_name::text AS referenced_table_name,
           ccu.column_name::text AS referenced_column_name
    FROM information_schema.table_constraints AS tc
    JOIN information_schema.key_column_usage AS kcu
      ON tc.constraint_name = kcu.constraint_name
     AND tc.table_schema = kcu.table_schema
    JOIN information_schema.constraint_column_usage AS ccu
      ON ccu.constraint_name = tc.constraint_name
     AND ccu.table_schema = tc.table_schema
    WHERE tc.constraint_type = 'FOREIGN KEY'
      AND tc.table_schema = $1
    ORDER BY tc.table_name, kcu.column_name
"#;

pub struct PgDatabase {
    pool: PgPool,
    schema: String,
    timeout: Duration,
}

impl PgDatabase {
    pub fn new(pool: PgPool, schema: String, timeout: Duration) -> Self {
        Self {
            pool,
            schema,
            timeout,
        }
    }

    async fn acquire(&self, fail: fn(String) -> AgentError) -> Result<PoolConnection<Postgres>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| fail(format!("Failed to acquire connection: {}", e)))
    }

    /// Fetch a statement's rows as JSON objects by letting the engine
    /// aggregate them, so any column type comes back as a JSON value.
    async fn fetch_json_rows(&self, sql: &str, fail: fn(String) -> AgentError) -> Result<Vec<Row>> {
        let wrapped = wrap_as_json_rows(sql);
        let mut conn = self.acquire(fail).await?;
        let value: serde_json::Value = run_with_deadline(
            self.timeout,
            sqlx::query_scalar::<_, serde_json::Value>(&wrapped).fetch_one(&mut *conn),
            fail,
        )
        .await?;
        json_to_rows(value).map_err(fail)
    }
}

/// `SELECT COALESCE(json_agg(q), '[]'::json) FROM (<sql>) AS q`
///
/// The newline before the closing parenthesis keeps a trailing `--` comment
/// in the inner statement from swallowing it.
pub fn wrap_as_json_rows(sql: &str) -> String {
    format!(
        "SELECT COALESCE(json_agg(q), '[]'::json) FROM (\n{}\n) AS q",
        crate::executor::normalize_sql(sql)
    )
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn json_to_rows(value: serde_json::Value) -> std::result::Result<Vec<Row>, String> {
    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                serde_json::Value::Object(row) => Ok(row),
                other => Err(format!("expected a row object, got {}", other)),
            })
            .collect(),
        serde_json::Value::Null => Ok(Vec::new()),
        other => Err(format!("expected an array of rows, got {}", other)),
    }
}

/// The engine's own message when there is one, otherwise the driver's.
fn engine_message(err: &sqlx::Error) -> String {
    match err.as_database_error() {
        Some(db_err) => db_err.message().to_string(),
        None => err.to_string(),
    }
}

async fn run_with_deadline<T>(
    timeout: Duration,
    fut: impl std::future::Future<Output = std::result::Result<T, sqlx::Error>>,
    fail: fn(String) -> AgentError,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(fail(engine_message(&e))),
        Err(_) => Err(fail(format!("timed out after {}s", timeout.as_secs()))),
    }
}

#[async_trait]
impl Catalog for PgDatabase {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let mut conn = self.acquire(AgentError::SchemaIntrospection).await?;
        run_with_deadline(
            self.timeout,
            sqlx::query_scalar::<_, String>(LIST_TABLES_SQL)
                .bind(&self.schema)
                .fetch_all(&mut *conn),
            AgentError::SchemaIntrospection,
        )
        .await
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let mut conn = self.acquire(AgentError::SchemaIntrospection).await?;
        let rows: Vec<(String, String, bool, bool)> = run_with_deadline(
            self.timeout,
            sqlx::query_as(COLUMNS_SQL)
                .bind(&self.schema)
                .bind(table)
                .fetch_all(&mut *conn),
            AgentError::SchemaIntrospection,
        )
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, declared_type, nullable, is_primary_key)| ColumnInfo {
                name,
                declared_type,
                nullable,
                is_primary_key,
            })
            .collect())
    }

    async fn sample_rows(&self, table: &str, limit: usize) -> Result<Vec<Row>> {
        let sql = format!(
            "SELECT * FROM {}.{} LIMIT {}",
            quote_ident(&self.schema),
            quote_ident(table),
            limit
        );
        debug!("Sampling {}", table);
        self.fetch_json_rows(&sql, AgentError::SchemaIntrospection).await
    }

    async fn foreign_keys(&self) -> Result<Vec<CatalogForeignKey>> {
        let mut conn = self.acquire(AgentError::SchemaIntrospection).await?;
        let rows: Vec<(String, String, String, String)> = run_with_deadline(
            self.timeout,
            sqlx::query_as(FOREIGN_KEYS_SQL)
                .bind(&self.schema)
                .fetch_all(&mut *conn),
            AgentError::SchemaIntrospection,
        )
        .await?;

        Ok(rows
            .into_iter()
            .map(|(table, column_name, referenced_table, referenced_column)| CatalogForeignKey {
                table,
                key: ForeignKeyRef {
                    column_name,
                    referenced_table,
                    referenced_column,
                },
            })
            .collect())
    }
}

#[async_trait]
impl QueryRunner for PgDatabase {
    async fn fetch_rows(&self, sql: &str) -> Result<Vec<Row>> {
        self.fetch_json_rows(sql, AgentError::QueryExecution).await
    }

    async fn execute_statement(&self, sql: &str) -> Result<u64> {
        let mut conn = self.acquire(AgentError::QueryExecution).await?;
        let done = run_with_deadline(
            self.timeout,
            sqlx::query(sql).execute(&mut *conn),
            AgentError::QueryExecution,
        )
        .await?;
        Ok(done.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("order_details"), "\"order_details\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_wrap_keeps_trailing_comment_harmless() {
        let wrapped = wrap_as_json_rows("SELECT 1 AS n -- one;");
        assert!(wrapped.starts_with("SELECT COALESCE(json_agg(q), '[]'::json) FROM (\n"));
        assert!(wrapped.ends_with("\n) AS q"));
    }

    #[test]
    fn test_json_to_rows_keeps_column_order() {
        let value: serde_json::Value =
            serde_json::from_str(r#"[{"name": "Widget", "revenue": 10.5, "a": 1}]"#).unwrap();
        let rows = json_to_rows(value).unwrap();
        let keys: Vec<_> = rows[0].keys().cloned().collect();
        assert_eq!(keys, vec!["name", "revenue", "a"]);
    }

    #[test]
    fn test_json_to_rows_keeps_numeric_digits() {
        let raw = r#"[{"revenue":12345678901234567890.12,"big":9007199254740993.5}]"#;
        let rows = json_to_rows(serde_json::from_str(raw).unwrap()).unwrap();
        assert_eq!(rows[0]["revenue"].to_string(), "12345678901234567890.12");
        assert_eq!(rows[0]["big"].to_string(), "9007199254740993.5");
        assert_eq!(serde_json::to_string(&rows).unwrap(), raw);
    }

    #[test]
    fn test_json_to_rows_rejects_scalars() {
        assert!(json_to_rows(json!([1, 2])).is_err());
        assert!(json_to_rows(json!(null)).unwrap().is_empty());
    }
}
