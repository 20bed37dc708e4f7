//! Runtime configuration
//!
//! Values come from the environment (a `.env` file is honoured by the
//! binaries through `dotenv`). Command line flags override them afterwards.

use crate::error::{AgentError, Result};
use std::time::Duration;

pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
/// Used when the only key found is `GEMINI_API_KEY`.
pub const GEMINI_LLM_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const GEMINI_LLM_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Namespace whose tables are introspected.
    pub db_schema: String,
    pub db_max_connections: u32,
    pub llm_api_key: String,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_timeout: Duration,
    pub query_timeout: Duration,
    /// Reject anything but a single query statement before execution.
    pub read_only_sql: bool,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup. Blank values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL")
            .ok_or_else(|| AgentError::Config("DATABASE_URL is not set".to_string()))?;

        let (llm_api_key, default_base_url, default_model) =
            match get("LLM_API_KEY").or_else(|| get("OPENAI_API_KEY")) {
                Some(key) => (key, DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL),
                None => match get("GEMINI_API_KEY") {
                    Some(key) => (key, GEMINI_LLM_BASE_URL, GEMINI_LLM_MODEL),
                    None => (String::new(), DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL),
                },
            };

        let cors_allowed_origins = get("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            database_url,
            db_schema: get("DB_SCHEMA").unwrap_or_else(|| "public".to_string()),
            db_max_connections: parse_value(&get, "DB_MAX_CONNECTIONS", 10)?,
            llm_api_key,
            llm_base_url: get("LLM_BASE_URL").unwrap_or_else(|| default_base_url.to_string()),
            llm_model: get("LLM_MODEL").unwrap_or_else(|| default_model.to_string()),
            llm_timeout: Duration::from_secs(parse_value(&get, "LLM_TIMEOUT_SECS", 60)?),
            query_timeout: Duration::from_secs(parse_value(&get, "QUERY_TIMEOUT_SECS", 30)?),
            read_only_sql: parse_value(&get, "READ_ONLY_SQL", true)?,
            port: parse_value(&get, "PORT", 5000)?,
            cors_allowed_origins,
        })
    }

    /// Fail early when the model cannot be reached at all.
    pub fn require_api_key(&self) -> Result<()> {
        if self.llm_api_key.trim().is_empty() {
            return Err(AgentError::Config(
                "no LLM API key found (set LLM_API_KEY, OPENAI_API_KEY or GEMINI_API_KEY)".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_value<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| AgentError::Config(format!("invalid value for {}: {} ({})", key, raw, e))),
        None => Ok(default),
    }
}
