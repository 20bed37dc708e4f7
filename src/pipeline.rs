//! Pipeline Orchestrator
//!
//! Runs one question through schema lookup, translation, execution and
//! narration. Stages are strictly sequential; the first failure ends the
//! request and nothing partial is returned.

use crate::config::Config;
use crate::db::{init_pool, PgDatabase};
use crate::error::{AgentError, Result};
use crate::executor::{ExecutionResult, QueryExecutor};
use crate::llm::{LlmClient, TextGenerator};
use crate::narrator::{NarrationInput, Narrator};
use crate::schema::{SchemaCache, SchemaIntrospector};
use crate::translate::Translator;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: Option<String>,
}

/// What the UI receives for an answered question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub query: String,
    pub sql: String,
    pub explanation: Option<String>,
    pub results: ExecutionResult,
    pub summary: String,
    pub visualization_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    SchemaReady,
    Translated,
    Executed,
    Summarized,
    Responded,
    Failed,
}

impl Stage {
    fn next(self) -> Option<Stage> {
        match self {
            Stage::Received => Some(Stage::SchemaReady),
            Stage::SchemaReady => Some(Stage::Translated),
            Stage::Translated => Some(Stage::Executed),
            Stage::Executed => Some(Stage::Summarized),
            Stage::Summarized => Some(Stage::Responded),
            Stage::Responded | Stage::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Responded | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "RECEIVED",
            Stage::SchemaReady => "SCHEMA_READY",
            Stage::Translated => "TRANSLATED",
            Stage::Executed => "EXECUTED",
            Stage::Summarized => "SUMMARIZED",
            Stage::Responded => "RESPONDED",
            Stage::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Per-request progress through the linear stage machine.
struct RequestState {
    id: String,
    stage: Stage,
}

impl RequestState {
    fn new() -> Self {
        let state = Self {
            id: uuid::Uuid::new_v4().to_string(),
            stage: Stage::Received,
        };
        info!(request_id = %state.id, stage = %state.stage, "request received");
        state
    }

    fn advance(&mut self) {
        if let Some(next) = self.stage.next() {
            self.stage = next;
            info!(request_id = %self.id, stage = %self.stage, "stage complete");
        }
    }

    fn fail(&mut self, err: AgentError) -> PipelineFailure {
        let failed_at = self.stage;
        self.stage = Stage::Failed;
        error!(request_id = %self.id, after = %failed_at, "request failed: {}", err);
        PipelineFailure { failed_at, error: err }
    }
}

/// A request that ended in `FAILED`, with the last stage it completed.
#[derive(Debug)]
pub struct PipelineFailure {
    pub failed_at: Stage,
    pub error: AgentError,
}

impl PipelineFailure {
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.error.to_string(),
        }
    }
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed after {}: {}", self.failed_at, self.error)
    }
}

impl std::error::Error for PipelineFailure {}

pub struct Pipeline {
    schema: Arc<SchemaCache>,
    translator: Translator,
    executor: QueryExecutor,
    narrator: Narrator,
}

impl Pipeline {
    pub fn new(
        schema: Arc<SchemaCache>,
        translator: Translator,
        executor: QueryExecutor,
        narrator: Narrator,
    ) -> Self {
        Self {
            schema,
            translator,
            executor,
            narrator,
        }
    }

    /// Wire the Postgres database and the LLM client described by `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = init_pool(&config.database_url, config.db_max_connections).await?;
        let database = Arc::new(PgDatabase::new(
            pool,
            config.db_schema.clone(),
            config.query_timeout,
        ));
        let generator: Arc<dyn TextGenerator> = Arc::new(LlmClient::new(
            config.llm_api_key.clone(),
            config.llm_model.clone(),
            config.llm_base_url.clone(),
            config.llm_timeout,
        ));

        let schema = Arc::new(SchemaCache::new(SchemaIntrospector::new(database.clone())));
        Ok(Self::new(
            Arc::clone(&schema),
            Translator::new(schema, Arc::clone(&generator)),
            QueryExecutor::new(database, config.read_only_sql, config.query_timeout),
            Narrator::new(generator),
        ))
    }

    pub fn schema_cache(&self) -> &Arc<SchemaCache> {
        &self.schema
    }

    /// Entry point for a raw request body.
    pub async fn handle(&self, request: QueryRequest) -> std::result::Result<QueryResponse, PipelineFailure> {
        self.answer(request.query.as_deref().unwrap_or_default()).await
    }

    pub async fn answer(&self, question: &str) -> std::result::Result<QueryResponse, PipelineFailure> {
        let mut state = RequestState::new();
        match self.run(question, &mut state).await {
            Ok(response) => {
                state.advance();
                Ok(response)
            }
            Err(err) => Err(state.fail(err)),
        }
    }

    async fn run(&self, raw_question: &str, state: &mut RequestState) -> Result<QueryResponse> {
        let question = raw_question.trim();
        if question.is_empty() {
            return Err(AgentError::InvalidInput("Query is required".to_string()));
        }
        info!(request_id = %state.id, "Question: {}", question);

        let schema = self.schema.get().await?;
        state.advance();

        let generated = self.translator.translate_with_schema(question, &schema).await?;
        let sql = generated
            .sql
            .ok_or_else(|| AgentError::Generation("Failed to generate SQL query".to_string()))?;
        state.advance();

        let results = self.executor.execute(&sql).await?;
        state.advance();

        let summary = self
            .narrator
            .summarize(NarrationInput {
                question,
                sql: &sql,
                results: &results,
                explanation: generated.explanation.as_deref(),
                visualization_hint: generated.visualization_hint.as_deref(),
            })
            .await?;
        state.advance();

        Ok(QueryResponse {
            query: raw_question.to_string(),
            sql,
            explanation: generated.explanation,
            results,
            summary,
            visualization_type: generated.visualization_hint,
        })
    }
}
