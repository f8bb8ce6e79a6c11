use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sql_crew::db::SqliteStore;
use sql_crew::knowledge_base::builder::KnowledgeBaseBuilder;
use sql_crew::knowledge_base::SchemaKnowledgeBase;
use sql_crew::llm::LlmClient;
use sql_crew::rate_limiter::RateLimiter;
use sql_crew::{logging, PipelineConfig, SqlPipeline, SqlTool, StageContext};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "sql-crew")]
#[command(about = "Answer natural-language questions with validated SQL")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a question about the database
    Ask {
        /// The question in natural language
        query: String,

        /// Print the full pipeline state as JSON instead of the tool output
        #[arg(long)]
        show_state: bool,
    },

    /// Build the schema knowledge base from sampled rows
    BuildKb {
        /// JSON file with {"table": "human description"}
        #[arg(long)]
        descriptions: PathBuf,

        /// Where to write the knowledge base (default: SQL_CREW_KB_PATH)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show which tables the knowledge base describes
    InspectKb {
        /// Knowledge base file (default: SQL_CREW_KB_PATH)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = PipelineConfig::from_env()?;

    let log_file = logging::init(&config.log_dir)?;
    info!("Log File: {}", log_file.display());

    match args.command {
        Command::Ask { query, show_state } => {
            let ctx = StageContext::from_config(config).context("Failed to initialize pipeline")?;
            let pipeline = SqlPipeline::new(ctx);

            if show_state {
                let state = pipeline.run_with_state(&query).await;
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                let tool = SqlTool::new(Arc::new(pipeline));
                println!("{}", tool.run(&query).await);
            }
        }
        Command::BuildKb {
            descriptions,
            output,
        } => {
            let api_key = config
                .api_key
                .clone()
                .context("OPENAI_API_KEY is not set")?;
            let llm = LlmClient::new(api_key, config.model.clone(), config.base_url.clone())
                .with_temperature(0.4);
            let limiter = RateLimiter::new(config.rate_limit_threshold, config.rate_limit_pause)?;
            let store = SqliteStore::new(config.database_path.clone());

            info!(
                "Annotating tables in {} with model {}",
                store.path().display(),
                llm.model()
            );

            let tables = KnowledgeBaseBuilder::load_descriptions(&descriptions)?;
            let builder =
                KnowledgeBaseBuilder::new(Arc::new(llm), Arc::new(limiter), Arc::new(store));
            let kb = builder.build(&tables).await;

            let output = output.unwrap_or(config.kb_path);
            kb.save(&output)?;
            println!(
                "Knowledge base saved to {} ({}/{} tables)",
                output.display(),
                kb.len(),
                tables.len()
            );
        }
        Command::InspectKb { path } => {
            let path = path.unwrap_or(config.kb_path);
            let kb = SchemaKnowledgeBase::load(&path)?;
            if kb.is_empty() {
                warn!("Knowledge base at {} is EMPTY", path.display());
            }
            println!("Tables: {}", kb.len());
            for name in kb.table_names() {
                let columns = kb.table(name).map(|t| t.columns.len()).unwrap_or(0);
                println!("  - {} ({} columns)", name, columns);
            }
        }
    }

    Ok(())
}
