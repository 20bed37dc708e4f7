use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Schema introspection error: {0}")]
    SchemaIntrospection(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Query execution error: {0}")]
    QueryExecution(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Bad request shape rather than a failure of the pipeline itself.
    pub fn is_client_error(&self) -> bool {
        matches!(self, AgentError::InvalidInput(_))
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_invalid_input_is_client_error() {
        assert!(AgentError::InvalidInput("empty".to_string()).is_client_error());
        assert!(!AgentError::Generation("quota".to_string()).is_client_error());
        assert!(!AgentError::QueryExecution("boom".to_string()).is_client_error());
    }

    #[test]
    fn test_query_execution_keeps_engine_message() {
        let err = AgentError::QueryExecution("column \"foo\" does not exist".to_string());
        assert_eq!(err.to_string(), "Query execution error: column \"foo\" does not exist");
    }
}
