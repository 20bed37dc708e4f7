pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod llm;
pub mod narrator;
pub mod pipeline;
pub mod prompt;
pub mod schema;
pub mod translate;

pub use error::{AgentError, Result};
pub use pipeline::{Pipeline, QueryRequest, QueryResponse};
