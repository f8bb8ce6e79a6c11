pub mod agent;
pub mod config;
pub mod error;
pub mod fuzzy_matcher;
pub mod literal;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod prompts;
pub mod rate_limiter;
pub mod sql_sanitizer;
pub mod stages;

// Offline-built schema descriptions and the domain catalog
pub mod knowledge_base;

// Target database access (SQLite)
pub mod db;

pub use agent::{QueryRunner, SqlTool};
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use pipeline::{PipelineState, SqlPipeline, StageContext};
