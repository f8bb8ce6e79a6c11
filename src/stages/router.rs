use crate::error::Result;
use crate::knowledge_base::DomainCatalog;
use crate::literal::{extract_list, Literal};
use crate::pipeline::StageContext;
use crate::prompts;
use tracing::{error, info, warn};

/// Ask the model which domains the question touches.
pub async fn route(ctx: &StageContext, query: &str) -> Result<Vec<String>> {
    info!("User Query: '{}'", query);
    let request = prompts::router(query, &ctx.catalog.labels());
    let response = ctx.call_model(&request).await?;
    let domains = parse_domains(&response, &ctx.catalog);
    info!("Router Node: Routed to {:?}", domains);
    Ok(domains)
}

/// Keep the known domain labels from the first list in `response`, in order.
/// An unparseable answer selects nothing.
pub fn parse_domains(response: &str, catalog: &DomainCatalog) -> Vec<String> {
    let items = match extract_list(response) {
        Ok(items) => items,
        Err(e) => {
            error!("Failed to parse router output: {}. Error: {}", response, e);
            return Vec::new();
        }
    };

    let mut domains: Vec<String> = Vec::new();
    for item in items {
        match item {
            Literal::Str(label) if catalog.contains(label.trim()) => {
                let label = label.trim().to_string();
                if !domains.contains(&label) {
                    domains.push(label);
                }
            }
            other => warn!("Router Node: ignoring unknown domain {}", other),
        }
    }
    domains
}
