//! Prompt Composer
//!
//! Renders the schema, the alias dictionary and a fixed instruction block
//! into the translation prompt. The reply shape requested at the end (SQL
//! fence, `Explanation:`, `Visualization:`) is what `translate` parses.

use crate::error::{AgentError, Result};
use crate::schema::{SchemaModel, TableInfo};
use std::fmt::Write;

/// Readable labels for abbreviated column names found in the analytics
/// database. Table-agnostic: it only steers generation and is never used to
/// rewrite identifiers.
pub const COLUMN_ALIASES: &[(&str, &str)] = &[
    // orders
    ("oid", "Order ID"),
    ("cid", "Customer ID"),
    ("odate", "Order Date"),
    ("s", "Status"),
    ("a", "Amount"),
    ("tx", "Tax"),
    ("sh", "Shipping Cost"),
    ("ch", "Channel"),
    ("pm", "Payment Method"),
    ("dm", "Delivery Method"),
    // order_details
    ("o_id", "Order ID"),
    ("p_id", "Product ID"),
    ("q", "Quantity"),
    ("up", "Unit Price"),
    ("d", "Discount"),
    ("t", "Total"),
    // campaign performance
    ("c_id", "Campaign ID"),
    ("dt", "Date"),
    ("imp", "Impressions"),
    ("clk", "Clicks"),
    ("cnv", "Conversions"),
    ("rev", "Revenue"),
    ("cst", "Cost"),
    // sup
    ("s_id", "Supplier ID"),
    ("s_name", "Supplier Name"),
    ("s_contact", "Supplier Contact"),
    ("s_email", "Supplier Email"),
    ("s_addr", "Supplier Address"),
    ("s_country", "Supplier Country"),
];

const TRANSLATION_PREAMBLE: &str = r#"You are an AI data analyst expert at converting natural language queries into SQL.

The database has intentionally poor naming in some places and dirty data. You need to interpret the
human's question, understand the schema, and generate the correct SQL query.

Your task is to:
1. Understand the user's business question
2. Analyze the database schema provided
3. Generate a valid SQL query that answers the question
4. Provide a brief explanation of what the query does
5. Suggest an appropriate visualization type (bar chart, line chart, pie chart, etc.)

The database is an e-commerce analytics database with information about products, orders, customers,
marketing campaigns, and more. Some column names are abbreviated or unclear, for example 'a' for Amount
in the orders table.

Always provide a valid SQL query and include all necessary joins. Check that column names and table names
are correct. Ensure your query makes sense for the business question being asked.

Rules:
- Queries should work with PostgreSQL syntax (not MySQL)
- Use double quotes for table and column names when needed
- Prefer explicit column names over '*'
- Join tables as needed, only through the relationships listed in the schema
- Use aliases for readability
- Comment any complex parts of the query
- For time-based queries, use PostgreSQL date functions
- Handle null values appropriately (COALESCE, NULLIF, IS NULL checks)
- For visualization data, limit the result to a reasonable size (e.g., top 10)
- Include appropriate aggregations for business metrics
- Add ORDER BY clauses when relevant
- When returning visualization data, focus on the most insightful dimensions

Important: Make sure your query will actually run on the schema provided."#;

const RESPONSE_FORMAT: &str = r#"Format your response as follows:
```sql
YOUR SQL QUERY HERE
```

Explanation:
Brief explanation of what the query does

Visualization:
Suggested visualization type (bar chart, line chart, pie chart, etc.)"#;

/// Render the schema section: per table its columns, relationships and one
/// example row, followed by the alias dictionary.
pub fn describe_schema(schema: &SchemaModel) -> String {
    let mut out = String::from("Database Schema:\n\n");

    for (table_name, table) in &schema.tables {
        describe_table(&mut out, table_name, table);
    }

    out.push_str("Column Name Mappings (for poorly named columns):\n");
    for (short, label) in COLUMN_ALIASES {
        let _ = writeln!(out, "- {}: {}", short, label);
    }
    out
}

fn describe_table(out: &mut String, table_name: &str, table: &TableInfo) {
    let _ = writeln!(out, "Table: {}", table_name);
    out.push_str("Columns:\n");
    for col in &table.columns {
        let _ = writeln!(
            out,
            "- {} ({}){}{}",
            col.name,
            col.declared_type,
            if col.is_primary_key { " PRIMARY KEY" } else { "" },
            if col.nullable { "" } else { " NOT NULL" },
        );
    }

    if !table.relationships.is_empty() {
        out.push_str("Relationships:\n");
        for rel in &table.relationships {
            let _ = writeln!(
                out,
                "- {}.{} references {}({})",
                table_name, rel.column_name, rel.referenced_table, rel.referenced_column
            );
        }
    }

    out.push_str("Sample Data:\n");
    match table.sample_rows.first() {
        Some(row) => {
            let rendered = serde_json::to_string(row).unwrap_or_else(|_| "{}".to_string());
            let _ = writeln!(out, "- Example: {}", rendered);
        }
        None => out.push_str("- No sample data available\n"),
    }
    out.push('\n');
}

/// Build the translation prompt for one question.
pub fn compose_prompt(question: &str, schema: &SchemaModel) -> Result<String> {
    let question = question.trim();
    if question.is_empty() {
        return Err(AgentError::InvalidInput("Query is required".to_string()));
    }

    Ok(format!(
        "{}\n\nHere is the database schema:\n\n{}\nPlease convert this question into SQL: \"{}\"\n\n{}",
        TRANSLATION_PREAMBLE,
        describe_schema(schema),
        question,
        RESPONSE_FORMAT
    ))
}
