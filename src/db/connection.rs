//! Database connection management using sqlx

use crate::error::{AgentError, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

/// Initialize the database connection pool
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await
        .map_err(|e| AgentError::Config(format!("Failed to connect to database: {}", e)))?;

    // Test the connection
    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|e| AgentError::Config(format!("Database connection test failed: {}", e)))?;

    info!(
        "🔌 Connected to {}",
        database_url.rsplit('@').next().unwrap_or("database")
    );
    Ok(pool)
}
