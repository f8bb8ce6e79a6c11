//! Per-domain extraction: decompose the question into table-level
//! sub-questions, then pick the columns each sub-question needs.

use crate::error::Result;
use crate::literal::{extract_list, Literal};
use crate::pipeline::state::{ColumnRef, DomainExtract, SubQuestion};
use crate::pipeline::StageContext;
use crate::prompts;
use tracing::{error, info, warn};

pub async fn extract_domain(ctx: &StageContext, query: &str, domain: &str) -> Result<DomainExtract> {
    let tables = ctx.catalog.tables(domain).unwrap_or_default();
    let sub_questions = sub_questions(ctx, query, tables).await?;

    let mut columns = Vec::new();
    for sub_question in &sub_questions {
        columns.extend(select_columns(ctx, query, sub_question).await?);
    }

    info!(
        "Domain '{}': {} sub-questions, {} columns",
        domain,
        sub_questions.len(),
        columns.len()
    );
    Ok(DomainExtract {
        sub_questions,
        columns,
    })
}

/// Render `table: description` lines for the tables present in the knowledge base.
fn table_grounding(ctx: &StageContext, tables: &[String]) -> Vec<String> {
    tables
        .iter()
        .filter_map(|table| match ctx.kb.table(table) {
            Some(knowledge) => Some(format!("{}: {}", table, knowledge.description)),
            None => {
                warn!("Table '{}' is not in the knowledge base, skipping", table);
                None
            }
        })
        .collect()
}

async fn sub_questions(ctx: &StageContext, query: &str, tables: &[String]) -> Result<Vec<SubQuestion>> {
    let grounding = table_grounding(ctx, tables);
    if grounding.is_empty() {
        warn!("No known tables to ground sub-questions on");
        return Ok(Vec::new());
    }

    let request = prompts::sub_questions(query, &grounding.join("\n"));
    let response = ctx.call_model(&request).await?;
    Ok(parse_sub_questions(&response))
}

async fn select_columns(
    ctx: &StageContext,
    main_question: &str,
    sub_question: &SubQuestion,
) -> Result<Vec<ColumnRef>> {
    let Some(knowledge) = ctx.kb.table(&sub_question.table) else {
        warn!(
            "Sub-question targets unknown table '{}', skipping",
            sub_question.table
        );
        return Ok(Vec::new());
    };

    let request = prompts::column_selection(main_question, &sub_question.question, &knowledge.columns);
    let response = ctx.call_model(&request).await?;
    Ok(parse_column_selection(&sub_question.table, &response))
}

/// Parse `[[sub_question, table_name], ...]`. Malformed pairs are skipped.
pub fn parse_sub_questions(response: &str) -> Vec<SubQuestion> {
    let items = match extract_list(response) {
        Ok(items) => items,
        Err(e) => {
            error!("Failed to parse subquestion output: {}. Error: {}", response, e);
            return Vec::new();
        }
    };

    items
        .iter()
        .filter_map(|item| match item.as_list() {
            Some([Literal::Str(question), Literal::Str(table), ..]) => Some(SubQuestion {
                question: question.clone(),
                table: table.trim().to_string(),
            }),
            Some([]) => None,
            _ => {
                warn!("Ignoring malformed sub-question {}", item);
                None
            }
        })
        .collect()
}

/// Parse `[[column, description...], ...]` into columns owned by `table`.
pub fn parse_column_selection(table: &str, response: &str) -> Vec<ColumnRef> {
    let items = match extract_list(response) {
        Ok(items) => items,
        Err(e) => {
            error!("Failed to parse column selection output: {}. Error: {}", response, e);
            return Vec::new();
        }
    };

    items
        .iter()
        .filter_map(|item| match item {
            Literal::Str(column) => Some(ColumnRef::new(table, column.trim(), "")),
            Literal::List(parts) => {
                let (first, rest) = parts.split_first()?;
                let description = rest
                    .iter()
                    .map(Literal::to_plain_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                Some(ColumnRef::new(table, first.to_plain_string().trim(), description))
            }
            other => {
                warn!("Ignoring malformed column selection {}", other);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sub_questions() {
        let parsed = parse_sub_questions(
            "```\n[['Total spent last month', 'transactions'], [], ['Budget for food', ' budgets ', 'extra']]\n```",
        );
        assert_eq!(
            parsed,
            vec![
                SubQuestion {
                    question: "Total spent last month".into(),
                    table: "transactions".into()
                },
                SubQuestion {
                    question: "Budget for food".into(),
                    table: "budgets".into()
                },
            ]
        );
    }

    #[test]
    fn test_parse_sub_questions_failure_is_empty() {
        assert!(parse_sub_questions("I need more context").is_empty());
        assert!(parse_sub_questions("[['only a question']]").is_empty());
    }

    #[test]
    fn test_parse_column_selection() {
        let cols = parse_column_selection(
            "transactions",
            "[['amount', 'decimal value'], ['date'], 'merchant', [], 7]",
        );
        assert_eq!(
            cols,
            vec![
                ColumnRef::new("transactions", "amount", "decimal value"),
                ColumnRef::new("transactions", "date", ""),
                ColumnRef::new("transactions", "merchant", ""),
            ]
        );
        assert!(parse_column_selection("transactions", "[[").is_empty());
    }
}
