//! Schema model
//!
//! In-memory view of the live catalog used to ground SQL generation.

pub mod cache;
pub mod introspector;

pub use cache::SchemaCache;
pub use introspector::{Catalog, SchemaIntrospector, SAMPLE_ROW_LIMIT};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One result or sample row: column name to value, in engine column order.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    pub nullable: bool,
    pub is_primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    pub column_name: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub columns: Vec<ColumnInfo>,
    /// At most `SAMPLE_ROW_LIMIT` rows.
    pub sample_rows: Vec<Row>,
    pub relationships: Vec<ForeignKeyRef>,
}

/// Table name to table description. Keyed by name so names stay unique and
/// rendering order is stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaModel {
    pub tables: BTreeMap<String, TableInfo>,
}

impl SchemaModel {
    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.get(name)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
