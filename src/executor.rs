//! Query Executor
//!
//! Runs generated SQL and returns rows in engine order. Engine errors are
//! surfaced with the engine's own message. The only check made before the
//! database sees the statement is the read-only guard.

use crate::error::{AgentError, Result};
use crate::schema::Row;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlparser::ast::Statement;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Rows produced by one statement, in the order the engine returned them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionResult {
    pub rows: Vec<Row>,
}

impl ExecutionResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Database side of execution. Each call checks a connection out of the
/// pool and returns it before completing, on every exit path.
#[async_trait]
pub trait QueryRunner: Send + Sync {
    /// Run a statement that produces rows.
    async fn fetch_rows(&self, sql: &str) -> Result<Vec<Row>>;

    /// Run a statement that produces no rows; returns the affected row count.
    async fn execute_statement(&self, sql: &str) -> Result<u64>;
}

/// How the guard sees a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    Query,
    /// A single non-query statement, e.g. `INSERT`.
    Other(String),
    Multiple(usize),
    /// Not understood by the parser; left for the engine to judge.
    Unparsed,
}

pub fn classify_statement(sql: &str) -> StatementKind {
    match Parser::parse_sql(&PostgreSqlDialect {}, sql) {
        Ok(statements) => match statements.as_slice() {
            [] => StatementKind::Unparsed,
            [Statement::Query(_)] => StatementKind::Query,
            [other] => StatementKind::Other(statement_keyword(other)),
            many => StatementKind::Multiple(many.len()),
        },
        Err(e) => {
            debug!("sqlparser could not parse statement: {}", e);
            StatementKind::Unparsed
        }
    }
}

fn statement_keyword(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or("UNKNOWN")
        .to_uppercase()
}

/// Drop surrounding whitespace and trailing semicolons.
pub fn normalize_sql(sql: &str) -> &str {
    sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace())
}

pub struct QueryExecutor {
    runner: Arc<dyn QueryRunner>,
    read_only: bool,
    timeout: Duration,
}

impl QueryExecutor {
    pub fn new(runner: Arc<dyn QueryRunner>, read_only: bool, timeout: Duration) -> Self {
        Self {
            runner,
            read_only,
            timeout,
        }
    }

    pub async fn execute(&self, sql: &str) -> Result<ExecutionResult> {
        let sql = normalize_sql(sql);
        if sql.is_empty() {
            return Err(AgentError::QueryExecution("empty SQL statement".to_string()));
        }

        let kind = classify_statement(sql);
        match &kind {
            StatementKind::Multiple(n) => {
                return Err(AgentError::QueryExecution(format!(
                    "expected a single SQL statement, got {}",
                    n
                )));
            }
            StatementKind::Other(keyword) if self.read_only => {
                warn!("Rejected non-query statement: {}", keyword);
                return Err(AgentError::QueryExecution(format!(
                    "only read-only queries are allowed, got {}",
                    keyword
                )));
            }
            _ => {}
        }

        info!("🔍 Executing SQL: {}", sql);
        let start_time = std::time::Instant::now();

        let rows = match kind {
            StatementKind::Other(_) => {
                let affected = self.with_deadline(self.runner.execute_statement(sql)).await?;
                debug!("Statement affected {} rows", affected);
                Vec::new()
            }
            _ => self.with_deadline(self.runner.fetch_rows(sql)).await?,
        };

        info!(
            "✅ Query completed in {}ms, returned {} rows",
            start_time.elapsed().as_millis(),
            rows.len()
        );
        Ok(ExecutionResult { rows })
    }

    async fn with_deadline<T>(&self, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AgentError::QueryExecution(format!(
                "query timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingRunner {
        fetches: AtomicUsize,
        statements: AtomicUsize,
    }

    #[async_trait]
    impl QueryRunner for RecordingRunner {
        async fn fetch_rows(&self, sql: &str) -> Result<Vec<Row>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if sql.contains("missing_col") {
                return Err(AgentError::QueryExecution(
                    "column \"missing_col\" does not exist".to_string(),
                ));
            }
            if sql.contains("pg_sleep") {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok(vec![json!({"n": 1}).as_object().cloned().unwrap()])
        }

        async fn execute_statement(&self, _sql: &str) -> Result<u64> {
            self.statements.fetch_add(1, Ordering::SeqCst);
            Ok(3)
        }
    }

    fn executor(runner: Arc<RecordingRunner>, read_only: bool) -> QueryExecutor {
        QueryExecutor::new(runner, read_only, Duration::from_millis(200))
    }

    #[test]
    fn test_classify_statement() {
        assert_eq!(classify_statement("SELECT 1"), StatementKind::Query);
        assert_eq!(
            classify_statement("WITH t AS (SELECT 1 AS x) SELECT x FROM t"),
            StatementKind::Query
        );
        assert_eq!(
            classify_statement("DELETE FROM orders"),
            StatementKind::Other("DELETE".to_string())
        );
        assert_eq!(classify_statement("SELECT 1; SELECT 2"), StatementKind::Multiple(2));
        assert_eq!(classify_statement("SELEKT nonsense ((("), StatementKind::Unparsed);
    }

    #[test]
    fn test_normalize_sql_strips_trailing_semicolons() {
        assert_eq!(normalize_sql("  SELECT 1;; \n"), "SELECT 1");
    }

    #[tokio::test]
    async fn test_read_only_guard_blocks_writes_before_database() {
        let runner = Arc::new(RecordingRunner::default());
        let err = executor(Arc::clone(&runner), true)
            .execute("DROP TABLE orders;")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::QueryExecution(_)));
        assert!(err.to_string().contains("DROP"));
        assert_eq!(runner.fetches.load(Ordering::SeqCst), 0);
        assert_eq!(runner.statements.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_writes_allowed_when_guard_disabled() {
        let runner = Arc::new(RecordingRunner::default());
        let result = executor(Arc::clone(&runner), false)
            .execute("UPDATE orders SET s = 'shipped'")
            .await
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(runner.statements.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_engine_message_is_preserved() {
        let runner = Arc::new(RecordingRunner::default());
        let err = executor(runner, true)
            .execute("SELECT missing_col FROM orders")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("column \"missing_col\" does not exist"));
    }

    #[tokio::test]
    async fn test_unparsed_statement_reaches_engine() {
        let runner = Arc::new(RecordingRunner::default());
        let result = executor(Arc::clone(&runner), true)
            .execute("SELEKT nonsense (((")
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(runner.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_query_execution_error() {
        let runner = Arc::new(RecordingRunner::default());
        let err = executor(runner, true)
            .execute("SELECT pg_sleep(10)")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::QueryExecution(_)));
        assert!(err.to_string().contains("timed out"));
    }
}
