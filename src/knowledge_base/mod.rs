//! Schema knowledge base and domain catalog.
//!
//! The knowledge base is produced offline by [`builder::KnowledgeBaseBuilder`]
//! and loaded once at startup. File shape, one entry per table:
//!
//! ```json
//! { "transactions": ["All financial transactions ...", [["date: ..."], ["merchant: ..."]]] }
//! ```

pub mod builder;

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// Descriptions for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableKnowledge {
    pub description: String,
    /// One free-text description per column, usually `"<name>: <details>"`.
    pub columns: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ColumnEntry {
    Text(String),
    Parts(Vec<String>),
}

impl ColumnEntry {
    fn into_text(self) -> String {
        match self {
            ColumnEntry::Text(s) => s,
            ColumnEntry::Parts(parts) => parts.join(" "),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RawTableEntry(String, Vec<ColumnEntry>);

impl From<RawTableEntry> for TableKnowledge {
    fn from(raw: RawTableEntry) -> Self {
        Self {
            description: raw.0,
            columns: raw.1.into_iter().map(ColumnEntry::into_text).collect(),
        }
    }
}

impl From<&TableKnowledge> for RawTableEntry {
    fn from(table: &TableKnowledge) -> Self {
        RawTableEntry(
            table.description.clone(),
            table
                .columns
                .iter()
                .map(|c| ColumnEntry::Parts(vec![c.clone()]))
                .collect(),
        )
    }
}

/// Read-only mapping from table name to its descriptions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaKnowledgeBase {
    tables: BTreeMap<String, TableKnowledge>,
}

impl SchemaKnowledgeBase {
    pub fn new(tables: BTreeMap<String, TableKnowledge>) -> Self {
        Self { tables }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::KnowledgeBase(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let kb = Self::from_json_str(&content)?;
        info!("Loaded knowledge base from {} ({} tables)", path.display(), kb.len());
        Ok(kb)
    }

    /// Parse a knowledge base document. Tables whose entry does not have the
    /// `[description, [columns...]]` shape are skipped with a warning.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(content)
            .map_err(|e| PipelineError::KnowledgeBase(format!("Invalid knowledge base JSON: {}", e)))?;

        let mut tables = BTreeMap::new();
        for (name, value) in raw {
            match serde_json::from_value::<RawTableEntry>(value) {
                Ok(entry) => {
                    tables.insert(name, entry.into());
                }
                Err(e) => warn!("Skipping malformed knowledge base entry '{}': {}", name, e),
            }
        }
        Ok(Self { tables })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let raw: BTreeMap<&str, RawTableEntry> = self
            .tables
            .iter()
            .map(|(name, table)| (name.as_str(), RawTableEntry::from(table)))
            .collect();
        let json = serde_json::to_string_pretty(&raw)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn table(&self, name: &str) -> Option<&TableKnowledge> {
        self.tables.get(name)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Render every table with its column descriptions for the validation prompt.
    pub fn render_full(&self) -> String {
        self.tables
            .iter()
            .map(|(name, table)| {
                let mut block = format!("Table {}: {}", name, table.description);
                for column in &table.columns {
                    block.push_str("\n  - ");
                    block.push_str(column);
                }
                block
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Domain label -> tables belonging to that domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainCatalog {
    domains: BTreeMap<String, Vec<String>>,
}

impl Default for DomainCatalog {
    fn default() -> Self {
        let mut domains = BTreeMap::new();
        domains.insert(
            "finance".to_string(),
            vec![
                "transactions".to_string(),
                "budgets".to_string(),
                "recurring_subscriptions".to_string(),
            ],
        );
        Self { domains }
    }
}

impl DomainCatalog {
    pub fn new(domains: BTreeMap<String, Vec<String>>) -> Self {
        Self { domains }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            PipelineError::Config(format!("Invalid domain catalog {}: {}", path.display(), e))
        })
    }

    pub fn labels(&self) -> Vec<String> {
        self.domains.keys().cloned().collect()
    }

    pub fn tables(&self, domain: &str) -> Option<&[String]> {
        self.domains.get(domain).map(|t| t.as_slice())
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.domains.contains_key(domain)
    }
}
