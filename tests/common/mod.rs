//! Mock collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use business_agent::error::{AgentError, Result};
use business_agent::executor::{QueryExecutor, QueryRunner};
use business_agent::llm::TextGenerator;
use business_agent::narrator::Narrator;
use business_agent::pipeline::Pipeline;
use business_agent::schema::introspector::{Catalog, CatalogForeignKey};
use business_agent::schema::{ColumnInfo, ForeignKeyRef, Row, SchemaCache, SchemaIntrospector};
use business_agent::translate::Translator;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TOP_PRODUCTS_REPLY: &str = r#"```sql
SELECT p.name AS product_name, SUM(od.t) AS revenue
FROM products p
JOIN order_details od ON od.p_id = p.prod_id
GROUP BY p.name
ORDER BY revenue DESC
LIMIT 5;
```

Explanation:
Joins order lines to products, sums the line totals and keeps the five highest.

Visualization:
Bar chart
"#;

pub const SUMMARY_REPLY: &str = "Widget leads revenue, followed closely by Gadget.";

/// Replays canned replies in order and records every prompt it receives.
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String>>>,
    pub prompts: Mutex<Vec<String>>,
    pub calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn replying(replies: &[&str]) -> Arc<Self> {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompt(&self, index: usize) -> String {
        self.prompts.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AgentError::Generation("no scripted reply left".to_string())))
    }
}

fn row(value: serde_json::Value) -> Row {
    value.as_object().cloned().expect("row literal must be an object")
}

fn column(name: &str, declared_type: &str, is_primary_key: bool) -> ColumnInfo {
    ColumnInfo {
        name: name.to_string(),
        declared_type: declared_type.to_string(),
        nullable: !is_primary_key,
        is_primary_key,
    }
}

/// In-memory stand-in for the analytics database: orders, order_details,
/// products. Acts as both catalog and query runner.
#[derive(Default)]
pub struct FakeDatabase {
    pub catalog_calls: AtomicUsize,
    pub list_table_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub catalog_down: AtomicBool,
    /// Rows returned by every successful query; `None` uses the default five.
    pub result_rows: Mutex<Option<Vec<Row>>>,
}

impl FakeDatabase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn catalog_touches(&self) -> usize {
        self.catalog_calls.load(Ordering::SeqCst)
    }

    fn top_products() -> Vec<Row> {
        vec![
            row(json!({"product_name": "Widget", "revenue": 1520.5})),
            row(json!({"product_name": "Gadget", "revenue": 1310.0})),
            row(json!({"product_name": "Doohickey", "revenue": 990.25})),
            row(json!({"product_name": "Gizmo", "revenue": 870.0})),
            row(json!({"product_name": "Thingamajig", "revenue": 455.75})),
        ]
    }

    fn touch(&self) -> Result<()> {
        self.catalog_calls.fetch_add(1, Ordering::SeqCst);
        if self.catalog_down.load(Ordering::SeqCst) {
            return Err(AgentError::SchemaIntrospection("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Catalog for FakeDatabase {
    async fn list_tables(&self) -> Result<Vec<String>> {
        self.list_table_calls.fetch_add(1, Ordering::SeqCst);
        self.touch()?;
        Ok(vec![
            "orders".to_string(),
            "order_details".to_string(),
            "products".to_string(),
        ])
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        self.touch()?;
        Ok(match table {
            "orders" => vec![
                column("oid", "integer", true),
                column("cid", "integer", false),
                column("odate", "timestamp without time zone", false),
                column("a", "numeric", false),
            ],
            "order_details" => vec![
                column("od_id", "integer", true),
                column("o_id", "integer", false),
                column("p_id", "integer", false),
                column("q", "integer", false),
                column("t", "numeric", false),
            ],
            "products" => vec![
                column("prod_id", "integer", true),
                column("name", "character varying", false),
                column("base_price", "numeric", false),
            ],
            other => return Err(AgentError::SchemaIntrospection(format!("unknown table {}", other))),
        })
    }

    async fn sample_rows(&self, table: &str, _limit: usize) -> Result<Vec<Row>> {
        self.touch()?;
        Ok(match table {
            "products" => vec![row(json!({"prod_id": 1, "name": "Widget", "base_price": "19.99"}))],
            "order_details" => vec![row(json!({"od_id": 1, "o_id": 10, "p_id": 1, "q": 2, "t": "39.98"}))],
            _ => Vec::new(),
        })
    }

    async fn foreign_keys(&self) -> Result<Vec<CatalogForeignKey>> {
        self.touch()?;
        let fk = |table: &str, column_name: &str, referenced_table: &str, referenced_column: &str| {
            CatalogForeignKey {
                table: table.to_string(),
                key: ForeignKeyRef {
                    column_name: column_name.to_string(),
                    referenced_table: referenced_table.to_string(),
                    referenced_column: referenced_column.to_string(),
                },
            }
        };
        Ok(vec![
            fk("order_details", "o_id", "orders", "oid"),
            fk("order_details", "p_id", "products", "prod_id"),
        ])
    }
}

#[async_trait]
impl QueryRunner for FakeDatabase {
    async fn fetch_rows(&self, sql: &str) -> Result<Vec<Row>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if sql.contains("nonexistent_col") {
            return Err(AgentError::QueryExecution(
                "column p.nonexistent_col does not exist".to_string(),
            ));
        }
        let configured = self.result_rows.lock().unwrap().clone();
        Ok(configured.unwrap_or_else(Self::top_products))
    }

    async fn execute_statement(&self, _sql: &str) -> Result<u64> {
        Ok(0)
    }
}

pub fn pipeline(database: Arc<FakeDatabase>, generator: Arc<ScriptedGenerator>) -> Pipeline {
    let schema = Arc::new(SchemaCache::new(SchemaIntrospector::new(database.clone())));
    Pipeline::new(
        Arc::clone(&schema),
        Translator::new(schema, generator.clone()),
        QueryExecutor::new(database, true, Duration::from_secs(5)),
        Narrator::new(generator),
    )
}
