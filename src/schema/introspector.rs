//! Schema Introspector
//!
//! Reads the live catalog into a `SchemaModel`. Per-table metadata is
//! fetched concurrently; any failure aborts the whole introspection so a
//! partial model is never returned.

use crate::error::{AgentError, Result};
use crate::schema::{ColumnInfo, ForeignKeyRef, Row, SchemaModel, TableInfo};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Sample rows fetched per table for prompt grounding.
pub const SAMPLE_ROW_LIMIT: usize = 5;

/// A foreign key together with the table that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogForeignKey {
    pub table: String,
    pub key: ForeignKeyRef,
}

/// Read access to catalog metadata.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// User tables in the configured namespace.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Columns of one table in declaration order, primary keys tagged.
    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>>;

    async fn sample_rows(&self, table: &str, limit: usize) -> Result<Vec<Row>>;

    /// Every foreign key constraint in the namespace.
    async fn foreign_keys(&self) -> Result<Vec<CatalogForeignKey>>;
}

pub struct SchemaIntrospector {
    catalog: Arc<dyn Catalog>,
}

impl SchemaIntrospector {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    /// Build a fresh model from the catalog. Does not touch any cache.
    pub async fn introspect(&self) -> Result<SchemaModel> {
        let table_names = self.catalog.list_tables().await.map_err(as_introspection_error)?;
        info!("📚 Introspecting {} tables", table_names.len());

        let mut tasks = JoinSet::new();
        for table in table_names {
            let catalog = Arc::clone(&self.catalog);
            tasks.spawn(async move {
                let columns = catalog.columns(&table).await?;
                let mut sample_rows = catalog.sample_rows(&table, SAMPLE_ROW_LIMIT).await?;
                sample_rows.truncate(SAMPLE_ROW_LIMIT);
                debug!("Table {}: {} columns, {} sample rows", table, columns.len(), sample_rows.len());
                Ok::<_, AgentError>((
                    table,
                    TableInfo {
                        columns,
                        sample_rows,
                        relationships: Vec::new(),
                    },
                ))
            });
        }

        // Runs while the per-table tasks are in flight.
        let foreign_keys = self.catalog.foreign_keys().await.map_err(as_introspection_error)?;

        let mut tables = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            let (name, info) = joined
                .map_err(|e| AgentError::SchemaIntrospection(format!("introspection task failed: {}", e)))?
                .map_err(as_introspection_error)?;
            tables.insert(name, info);
        }

        for fk in foreign_keys {
            match tables.get_mut(&fk.table) {
                Some(info) => {
                    if !info.relationships.contains(&fk.key) {
                        info.relationships.push(fk.key);
                    }
                }
                None => warn!(
                    "Foreign key {}.{} belongs to a table outside the model, skipping",
                    fk.table, fk.key.column_name
                ),
            }
        }

        info!("✅ Schema introspected: {} tables", tables.len());
        Ok(SchemaModel { tables })
    }
}

fn as_introspection_error(err: AgentError) -> AgentError {
    match err {
        AgentError::SchemaIntrospection(_) => err,
        other => AgentError::SchemaIntrospection(other.to_string()),
    }
}
