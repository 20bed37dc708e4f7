//! Result Narrator
//!
//! Asks the model for a plain-language summary of a finished query. Large
//! result sets are cut down to a representative prefix before they are put
//! into the prompt.

use crate::error::Result;
use crate::executor::ExecutionResult;
use crate::llm::TextGenerator;
use crate::schema::Row;
use std::sync::Arc;
use tracing::{debug, info};

/// Serialized results longer than this many characters get truncated.
pub const RESULT_CHAR_LIMIT: usize = 10_000;
/// Rows kept when truncating.
pub const TRUNCATED_ROW_COUNT: usize = 20;
pub const TRUNCATION_MARKER: &str = " ... (truncated)";

/// Results as JSON text, bounded for the summary prompt.
///
/// Over the limit, at most `TRUNCATED_ROW_COUNT` rows are kept followed by
/// the truncation marker. Fewer rows are kept when that is needed for the
/// result to stay both within the limit and shorter than the full text.
pub fn serialize_results(rows: &[Row]) -> Result<String> {
    let full = serde_json::to_string(rows)?;
    let full_len = full.chars().count();
    if full_len <= RESULT_CHAR_LIMIT {
        return Ok(full);
    }

    let mut keep = rows.len().min(TRUNCATED_ROW_COUNT);
    loop {
        let text = format!("{}{}", serde_json::to_string(&rows[..keep])?, TRUNCATION_MARKER);
        let len = text.chars().count();
        if keep == 0 || (len < full_len && len <= RESULT_CHAR_LIMIT) {
            debug!("Truncated results from {} to {} characters ({} rows)", full_len, len, keep);
            return Ok(text);
        }
        keep -= 1;
    }
}

/// Everything the summary prompt refers to.
pub struct NarrationInput<'a> {
    pub question: &'a str,
    pub sql: &'a str,
    pub results: &'a ExecutionResult,
    pub explanation: Option<&'a str>,
    pub visualization_hint: Option<&'a str>,
}

pub fn summary_prompt(input: &NarrationInput<'_>) -> Result<String> {
    let results_text = serialize_results(&input.results.rows)?;

    Ok(format!(
        r#"You are an AI data analyst expert at explaining data analysis results clearly.

Your task is to:
1. Interpret the SQL query results
2. Create a clear, natural language summary of the findings
3. Highlight key insights that answer the user's question
4. Explain any patterns or trends in the data
5. Keep your explanation concise and business-focused

Rules:
- Use plain language a business user would understand
- Relate the results back to the original question
- Highlight 3-5 key insights from the data
- Provide context when discussing metrics
- Avoid technical jargon unless necessary
- Don't just repeat numbers from the results - interpret them
- Point out any limitations or caveats to the analysis
- Be honest about what the data does and doesn't show

Original question: "{}"

SQL query used:
```sql
{}
```

Query explanation: {}

Suggested visualization: {}

Query results ({} rows):
{}

Please provide a clear, natural language summary of what these results mean in business terms."#,
        input.question,
        input.sql,
        input.explanation.unwrap_or("not provided"),
        input.visualization_hint.unwrap_or("not provided"),
        input.results.len(),
        results_text
    ))
}

pub struct Narrator {
    generator: Arc<dyn TextGenerator>,
}

impl Narrator {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Summarize executed results. Returns the model's raw text.
    pub async fn summarize(&self, input: NarrationInput<'_>) -> Result<String> {
        let prompt = summary_prompt(&input)?;
        let summary = self.generator.complete(&prompt).await?;
        info!("📝 Summary generated ({} characters)", summary.len());
        Ok(summary)
    }
}
