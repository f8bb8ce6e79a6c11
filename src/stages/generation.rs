use crate::error::Result;
use crate::pipeline::state::{render_columns, render_filters, ColumnRef, ResolvedFilter};
use crate::pipeline::StageContext;
use crate::prompts;
use crate::sql_sanitizer::extract_sql_block;
use tracing::{info, warn};

fn preview(sql: &str) -> String {
    sql.chars().take(100).collect()
}

/// Draft a statement from the grounding columns and resolved filters.
/// The model output is kept verbatim.
pub async fn generate_sql(
    ctx: &StageContext,
    columns: &[ColumnRef],
    query: &str,
    filters: &[ResolvedFilter],
) -> Result<String> {
    let request = prompts::query_generation(&render_columns(columns), query, &render_filters(filters));
    let sql = ctx.call_model(&request).await?;
    info!(
        "Query Generation Node: Generated query (first 100 chars): {}...",
        preview(&sql)
    );
    Ok(sql)
}

/// Re-check the draft against the full knowledge base and extract the SQL.
pub async fn validate_sql(
    ctx: &StageContext,
    columns: &[ColumnRef],
    query: &str,
    filters: &[ResolvedFilter],
    draft_sql: &str,
) -> Result<String> {
    let request = prompts::query_validation(
        &render_columns(columns),
        query,
        &render_filters(filters),
        draft_sql,
        &ctx.kb.render_full(),
    );
    let response = ctx.call_model(&request).await?;

    let cleaned = extract_sql_block(&response);
    if cleaned != response.trim() {
        warn!("Query Validation Node: Cleaned markdown formatting from SQL output.");
    }
    Ok(cleaned)
}
