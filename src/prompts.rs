//! Prompt templates for every model call in the pipeline.
//!
//! Each constructor returns a [`CompletionRequest`] carrying the rendered
//! prompt and the named inputs it was rendered from, so fakes in tests can
//! assert on what a stage actually sent.

use crate::llm::{CompletionRequest, ModelTask};
use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{(\w+)\}").expect("placeholder pattern is valid");
}

pub const ROUTER_SYSTEM_PROMPT: &str = r#"You route analytics questions to the parts of a database that can answer them.
Answer with a Python-style list of domain labels and nothing else."#;

pub const ROUTER_PROMPT: &str = r#"Available domains:
{domains}

Question: {query}

Return the domains needed to answer the question, most relevant first.
Output Format (Strict List): ["<domain>", ...]"#;

pub const SUB_QUESTION_SYSTEM_PROMPT: &str = r#"You are a data analyst who breaks a business question into smaller questions, each answerable from a single table.
Give output without any verbose and without any additional explanation."#;

pub const SUB_QUESTION_PROMPT: &str = r#"Tables (name: description):
{tables}

Question: {query}

- Write one sub-question per table that contributes to the answer.
- Only use table names from the list above.

Output Format (Strict List): [["<sub question>", "<table name>"], ...]"#;

pub const COLUMN_SELECTION_SYSTEM_PROMPT: &str = r#"You select the columns of a table that are required to answer a question.
Give output without any verbose and without any additional explanation."#;

pub const COLUMN_SELECTION_PROMPT: &str = r#"Main question (context): {main_question}
Sub-question: {query}

Column descriptions:
{columns}

- Pick every column needed for the sub-question, including columns used for filtering, grouping and joining.
- Copy the column name exactly as written before the colon.

Output Format (Strict List): [["<column name>", "<short description>"], ...]"#;

pub const FILTER_CHECK_SYSTEM_PROMPT: &str = r#"You decide whether a question mentions literal values (names, merchants, categories, places) that must be matched against values stored in the database.
Dates, numbers and relative time expressions do not count."#;

pub const FILTER_CHECK_PROMPT: &str = r#"Columns:
{columns}

Question: {query}

If no stored value needs to be matched, answer exactly: ["no"]
Otherwise answer: ["yes", ["<table>", "<column>", "<value as the user wrote it>"], ...]
Return only the list."#;

pub const QUERY_GENERATION_SYSTEM_PROMPT: &str = r#"You are an expert SQLite developer. You write a single read-only SQL statement that answers the question.
Use only the tables and columns provided. Output only the SQL."#;

pub const QUERY_GENERATION_PROMPT: &str = r#"Columns:
{columns}

Question: {query}

Resolved filter values (use these exact values in WHERE clauses):
{filters}

Write one SELECT (or WITH ... SELECT) statement for SQLite."#;

pub const QUERY_VALIDATION_SYSTEM_PROMPT: &str = r#"You review SQLite queries written by another developer. Fix wrong table names, wrong column names, missing joins and dialect errors.
Return the corrected query inside a ```sql block and nothing else."#;

pub const QUERY_VALIDATION_PROMPT: &str = r#"Full schema:
{all_table_info}

Columns selected for this question:
{columns}

Question: {user_query}

Resolved filter values:
{filters}

Query to review:
{sql_query}"#;

pub const KB_ANNOTATION_SYSTEM_PROMPT: &str = r#"You are an intelligent data annotator. Please annotate data as mentioned by human and give output without any verbose and without any additional explanation.
You will be given a SQL table description and sample rows from the table.
The description you generate will be the 'context' for a Text-to-SQL system.
Make sure your description is precise and highlights the relationship between columns."#;

pub const KB_ANNOTATION_PROMPT: &str = r#"- Generate a high-level description for the entire table.
- Generate detailed descriptions for each column, including the inferred datatype and 1-2 sample values.
- Look at the provided Table Description for context and include relevant nuances.

Output Format (Strict List):
["<table description>", [["<column 1>: description, type, <samples>"], ["<column 2>: description, type, <samples>"]]]

SQL Table Metadata:
{description}

Sample Rows:
{data_sample}"#;

/// Substitute `{name}` placeholders in one pass over the template, so
/// substituted text is never scanned again. Unknown placeholders are left as-is.
fn render(template: &str, inputs: &[(&'static str, String)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            match inputs.iter().find(|(name, _)| *name == &caps[1]) {
                Some((_, value)) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn request(
    task: ModelTask,
    system: &str,
    template: &str,
    inputs: Vec<(&'static str, String)>,
) -> CompletionRequest {
    CompletionRequest {
        task,
        system: system.to_string(),
        prompt: render(template, &inputs),
        inputs,
    }
}

pub fn router(query: &str, domains: &[String]) -> CompletionRequest {
    request(
        ModelTask::Router,
        ROUTER_SYSTEM_PROMPT,
        ROUTER_PROMPT,
        vec![("domains", domains.join(", ")), ("query", query.to_string())],
    )
}

/// `tables` is the rendered `{table: description}` grounding.
pub fn sub_questions(query: &str, tables: &str) -> CompletionRequest {
    request(
        ModelTask::SubQuestion,
        SUB_QUESTION_SYSTEM_PROMPT,
        SUB_QUESTION_PROMPT,
        vec![("tables", tables.to_string()), ("query", query.to_string())],
    )
}

pub fn column_selection(main_question: &str, sub_question: &str, columns: &[String]) -> CompletionRequest {
    let rendered = columns
        .iter()
        .map(|c| format!("- {}", c))
        .collect::<Vec<_>>()
        .join("\n");
    request(
        ModelTask::ColumnSelection,
        COLUMN_SELECTION_SYSTEM_PROMPT,
        COLUMN_SELECTION_PROMPT,
        vec![
            ("columns", rendered),
            ("query", sub_question.to_string()),
            ("main_question", main_question.to_string()),
        ],
    )
}

pub fn filter_check(columns: &str, query: &str) -> CompletionRequest {
    request(
        ModelTask::FilterCheck,
        FILTER_CHECK_SYSTEM_PROMPT,
        FILTER_CHECK_PROMPT,
        vec![("columns", columns.to_string()), ("query", query.to_string())],
    )
}

/// `filters` must be the empty string when nothing was resolved.
pub fn query_generation(columns: &str, query: &str, filters: &str) -> CompletionRequest {
    request(
        ModelTask::QueryGeneration,
        QUERY_GENERATION_SYSTEM_PROMPT,
        QUERY_GENERATION_PROMPT,
        vec![
            ("columns", columns.to_string()),
            ("query", query.to_string()),
            ("filters", filters.to_string()),
        ],
    )
}

pub fn query_validation(
    columns: &str,
    query: &str,
    filters: &str,
    draft_sql: &str,
    all_table_info: &str,
) -> CompletionRequest {
    request(
        ModelTask::QueryValidation,
        QUERY_VALIDATION_SYSTEM_PROMPT,
        QUERY_VALIDATION_PROMPT,
        vec![
            ("columns", columns.to_string()),
            ("user_query", query.to_string()),
            ("filters", filters.to_string()),
            ("sql_query", draft_sql.to_string()),
            ("all_table_info", all_table_info.to_string()),
        ],
    )
}

pub fn kb_annotation(description: &str, data_sample: &str) -> CompletionRequest {
    request(
        ModelTask::KbAnnotation,
        KB_ANNOTATION_SYSTEM_PROMPT,
        KB_ANNOTATION_PROMPT,
        vec![
            ("description", description.to_string()),
            ("data_sample", data_sample.to_string()),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_prompt_keeps_empty_filters() {
        let req = query_generation("- name of table:transactions | amount", "total spend", "");
        assert_eq!(req.task, ModelTask::QueryGeneration);
        assert_eq!(req.input("filters"), Some(""));
        assert!(req.prompt.contains("Question: total spend"));
        assert!(!req.prompt.contains("{filters}"));
    }

    #[test]
    fn test_column_selection_lists_columns() {
        let req = column_selection(
            "How much did I spend?",
            "Sum of amounts",
            &["amount: decimal".to_string(), "date: text".to_string()],
        );
        assert!(req.prompt.contains("- amount: decimal\n- date: text"));
        assert_eq!(req.input("main_question"), Some("How much did I spend?"));
    }

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        assert_eq!(render("{a} and {b}", &[("a", "x".to_string())]), "x and {b}");
    }

    #[test]
    fn test_placeholders_inside_inputs_stay_literal() {
        let req = query_generation(
            "- name of table:transactions | note: use {query} here",
            "show {filters} and {all_table_info}",
            "",
        );
        assert!(req.prompt.contains("Question: show {filters} and {all_table_info}"));
        assert!(req.prompt.contains("use {query} here"));
    }
}
