//! Offline knowledge base annotation.
//!
//! For each table named in the input descriptions the builder samples a few
//! random rows, asks the model for a table description plus one description
//! per column, and collects the parsed answers into a [`SchemaKnowledgeBase`].

use super::{SchemaKnowledgeBase, TableKnowledge};
use crate::db::{quote_identifier, DataStore};
use crate::error::{PipelineError, Result};
use crate::literal::{extract_list, Literal};
use crate::llm::LanguageModel;
use crate::prompts;
use crate::rate_limiter::RateLimiter;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

pub struct KnowledgeBaseBuilder {
    llm: Arc<dyn LanguageModel>,
    limiter: Arc<RateLimiter>,
    store: Arc<dyn DataStore>,
    sample_rows: usize,
}

impl KnowledgeBaseBuilder {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        limiter: Arc<RateLimiter>,
        store: Arc<dyn DataStore>,
    ) -> Self {
        Self {
            llm,
            limiter,
            store,
            sample_rows: 5,
        }
    }

    pub fn with_sample_rows(mut self, sample_rows: usize) -> Self {
        self.sample_rows = sample_rows;
        self
    }

    /// Load `{table: human description}` from a JSON file.
    pub fn load_descriptions(path: impl AsRef<Path>) -> Result<BTreeMap<String, String>> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            PipelineError::Config(format!("Invalid table descriptions {}: {}", path.display(), e))
        })
    }

    /// Annotate every table. Tables whose sampling, model call or parsing
    /// fails are logged and left out.
    pub async fn build(&self, descriptions: &BTreeMap<String, String>) -> SchemaKnowledgeBase {
        info!("Building knowledge base for {} tables", descriptions.len());
        let mut tables = BTreeMap::new();

        for (table, description) in descriptions {
            match self.annotate_table(table, description).await {
                Ok(knowledge) => {
                    info!("Annotated {} ({} columns)", table, knowledge.columns.len());
                    tables.insert(table.clone(), knowledge);
                }
                Err(e) => error!("Skipping table {}: {}", table, e),
            }
        }

        SchemaKnowledgeBase::new(tables)
    }

    async fn annotate_table(&self, table: &str, description: &str) -> Result<TableKnowledge> {
        let sql = format!(
            "SELECT * FROM {} ORDER BY RANDOM() LIMIT {}",
            quote_identifier(table),
            self.sample_rows
        );
        let sample = self.store.fetch(&sql, self.sample_rows).await?;

        self.limiter.check_and_wait().await;
        let request = prompts::kb_annotation(description, &sample.to_markdown());
        let response = self.llm.complete(&request).await?;

        parse_annotation(&response).ok_or_else(|| {
            PipelineError::KnowledgeBase(format!(
                "Unparseable annotation for {}: {}",
                table, response
            ))
        })
    }
}

/// Parse `["<table description>", [["<col>: ..."], ...]]`.
pub fn parse_annotation(response: &str) -> Option<TableKnowledge> {
    let items = extract_list(response).ok()?;
    let [description, columns] = items.as_slice() else {
        return None;
    };

    let columns = columns
        .as_list()?
        .iter()
        .filter_map(|entry| match entry {
            Literal::Str(s) => Some(s.clone()),
            Literal::List(parts) if !parts.is_empty() => Some(
                parts
                    .iter()
                    .map(Literal::to_plain_string)
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            _ => None,
        })
        .collect();

    Some(TableKnowledge {
        description: description.as_str()?.to_string(),
        columns,
    })
}
