use crate::error::PipelineError;
use crate::pipeline::StageContext;
use crate::sql_sanitizer::sanitize;
use tracing::{error, info, warn};

pub const NO_RESULTS_MESSAGE: &str = "No results found for this query.";

/// Sanitize and run the validated statement, returning the text shown to
/// the caller. Never fails: errors become an "Error during execution" message.
pub async fn execute(ctx: &StageContext, validated_sql: &str) -> String {
    let sql = sanitize(validated_sql);
    info!("Executing SQL: {}...", sql.chars().take(200).collect::<String>());

    match ctx.store.fetch(&sql, ctx.config.row_cap).await {
        Ok(output) if output.is_empty() => {
            warn!("Safe Executor Node: Query executed but returned no results");
            NO_RESULTS_MESSAGE.to_string()
        }
        Ok(output) => {
            info!(
                "Safe Executor Node: Successfully retrieved {} rows{}",
                output.rows.len(),
                if output.truncated { " (truncated)" } else { "" }
            );
            output.to_markdown()
        }
        Err(e) => {
            error!("[ERROR] Safe Executor Node failed during SQL execution: {}", e);
            let message = match e {
                PipelineError::Database(message) => message,
                other => other.to_string(),
            };
            format!("Error during execution: {}", message)
        }
    }
}
