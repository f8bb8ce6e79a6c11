use crate::literal::Literal;
use serde::Serialize;
use std::collections::HashMap;

/// A column selected as grounding context, tagged with its owning table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
    pub description: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            description: description.into(),
        }
    }

    /// Identity used for deduplication: trimmed, lower-cased, whitespace collapsed.
    pub fn normalized_key(&self) -> (String, String, String) {
        fn norm(s: &str) -> String {
            s.split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase()
        }
        (norm(&self.table), norm(&self.column), norm(&self.description))
    }
}

/// One decomposed question aimed at a single table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubQuestion {
    pub question: String,
    pub table: String,
}

/// Output of one domain sub-pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DomainExtract {
    pub sub_questions: Vec<SubQuestion>,
    pub columns: Vec<ColumnRef>,
}

/// A literal the user mentioned that must be matched against stored values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterExpression {
    pub table: String,
    pub column: String,
    pub value: String,
}

/// A filter literal resolved to a value that actually exists in the column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedFilter {
    pub table: String,
    pub column: String,
    pub requested: String,
    pub matched: String,
    pub similarity: f64,
}

/// Per-request state threaded through the stages.
///
/// Each field is written by exactly one stage, through the orchestrator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineState {
    pub user_query: String,
    pub router_out: Vec<String>,
    pub domain_results: HashMap<String, DomainExtract>,
    pub filtered_columns: Vec<ColumnRef>,
    /// Classifier output: `["no"]` or `["yes", [table, column, value], ...]`.
    pub filter_directives: Vec<Literal>,
    pub resolved_filters: Vec<ResolvedFilter>,
    pub draft_sql: String,
    pub validated_sql: String,
    pub result_text: String,
}

impl PipelineState {
    pub fn new(user_query: impl Into<String>) -> Self {
        Self {
            user_query: user_query.into(),
            ..Default::default()
        }
    }
}

/// Render grounding columns, one per line.
pub fn render_columns(columns: &[ColumnRef]) -> String {
    columns
        .iter()
        .map(|c| {
            if c.description.is_empty() {
                format!("- name of table:{} | {}", c.table, c.column)
            } else {
                format!("- name of table:{} | {} | {}", c.table, c.column, c.description)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render resolved filters, one per line. No filters renders as an empty string.
pub fn render_filters(filters: &[ResolvedFilter]) -> String {
    filters
        .iter()
        .map(|f| {
            format!(
                "- {}.{} = '{}' (user wrote '{}')",
                f.table, f.column, f.matched, f.requested
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
