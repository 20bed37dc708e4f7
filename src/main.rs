use anyhow::Result;
use business_agent::config::Config;
use business_agent::prompt::compose_prompt;
use business_agent::Pipeline;
use clap::Parser;
use itertools::Itertools;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Rows printed in the plain-text preview.
const PREVIEW_ROWS: usize = 10;

#[derive(Parser)]
#[command(name = "business-agent")]
#[command(about = "Answer business questions over the analytics database in plain language")]
struct Args {
    /// The business question in natural language
    query: String,

    /// Print the full response as JSON
    #[arg(long)]
    json: bool,

    /// Print the translation prompt and exit without calling the model
    #[arg(long)]
    show_prompt: bool,

    /// PostgreSQL connection string (or set DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,

    /// LLM API key (or set LLM_API_KEY / OPENAI_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Model name (or set LLM_MODEL)
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = Config::from_lookup(|key| match key {
        "DATABASE_URL" if args.database_url.is_some() => args.database_url.clone(),
        _ => std::env::var(key).ok(),
    })?;
    if let Some(key) = args.api_key {
        config.llm_api_key = key;
    }
    if let Some(model) = args.model {
        config.llm_model = model;
    }

    let pipeline = Pipeline::from_config(&config).await?;

    if args.show_prompt {
        let schema = pipeline.schema_cache().get().await?;
        println!("{}", compose_prompt(&args.query, &schema)?);
        return Ok(());
    }

    config.require_api_key()?;
    info!("Query: {}", args.query);

    let response = pipeline.answer(&args.query).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("\n=== SQL ===\n{}", response.sql);
    if let Some(explanation) = &response.explanation {
        println!("\n=== Explanation ===\n{}", explanation);
    }

    println!("\n=== Results ({} rows) ===", response.results.len());
    if let Some(first) = response.results.rows.first() {
        println!("{}", first.keys().join(" | "));
    }
    for row in response.results.rows.iter().take(PREVIEW_ROWS) {
        println!("{}", row.values().map(|v| v.to_string()).join(" | "));
    }
    if response.results.len() > PREVIEW_ROWS {
        println!("... {} more", response.results.len() - PREVIEW_ROWS);
    }

    println!("\n=== Summary ===\n{}", response.summary);
    if let Some(visualization) = &response.visualization_type {
        println!("\n=== Suggested visualization ===\n{}", visualization);
    }

    Ok(())
}
