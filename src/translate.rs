//! Translation Engine
//!
//! Turns a question into SQL by prompting the model with the grounded
//! schema, then pulls the SQL, explanation and visualization hint out of the
//! free-text reply. Each section is located by its marker independently, so
//! a reply that drops or reorders sections still yields whatever it has.

use crate::error::{AgentError, Result};
use crate::llm::TextGenerator;
use crate::prompt::compose_prompt;
use crate::schema::{SchemaCache, SchemaModel};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

lazy_static::lazy_static! {
    static ref SQL_FENCE: Regex = Regex::new(r"(?is)```sql[ \t]*\r?\n(.*?)```").unwrap();
    static ref EXPLANATION: Regex =
        Regex::new(r"(?is)Explanation:(.*?)(?:Visualization:|```sql|\z)").unwrap();
    static ref VISUALIZATION: Regex =
        Regex::new(r"(?is)Visualization:(.*?)(?:Explanation:|```sql|\z)").unwrap();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// `None` when no SQL block could be found; the question has failed.
    pub sql: Option<String>,
    pub explanation: Option<String>,
    pub visualization_hint: Option<String>,
    pub raw_text: String,
}

/// Extract the three reply sections.
pub fn parse_reply(raw: &str) -> GenerationResult {
    let sql = SQL_FENCE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty());

    GenerationResult {
        sql,
        explanation: section(&EXPLANATION, raw),
        visualization_hint: section(&VISUALIZATION, raw),
        raw_text: raw.to_string(),
    }
}

fn section(pattern: &Regex, raw: &str) -> Option<String> {
    pattern
        .captures(raw)
        .and_then(|c| c.get(1))
        // Markers are often bolded as `**Explanation:**`.
        .map(|m| m.as_str().trim_matches(|c: char| c.is_whitespace() || c == '*').to_string())
        .filter(|s| !s.is_empty())
}

pub struct Translator {
    schema: Arc<SchemaCache>,
    generator: Arc<dyn TextGenerator>,
}

impl Translator {
    pub fn new(schema: Arc<SchemaCache>, generator: Arc<dyn TextGenerator>) -> Self {
        Self { schema, generator }
    }

    /// Translate a question, introspecting the schema first if needed.
    pub async fn translate(&self, question: &str) -> Result<GenerationResult> {
        if question.trim().is_empty() {
            return Err(AgentError::InvalidInput("Query is required".to_string()));
        }
        let schema = self.schema.get().await?;
        self.translate_with_schema(question, &schema).await
    }

    /// Translate against an already resolved schema.
    pub async fn translate_with_schema(
        &self,
        question: &str,
        schema: &SchemaModel,
    ) -> Result<GenerationResult> {
        let prompt = compose_prompt(question, schema)?;
        debug!("Translation prompt is {} characters", prompt.len());

        let reply = self.generator.complete(&prompt).await?;
        debug!("Model reply: {}", reply);

        let result = parse_reply(&reply);
        match &result.sql {
            Some(sql) => info!("🧠 Generated SQL: {}", sql),
            None => warn!("No SQL block found in model reply"),
        }
        Ok(result)
    }
}
