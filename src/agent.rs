//! Tool wrapper exposed to a calling agent framework.
//!
//! The wrapper counts consecutive unusable answers and refuses to call the
//! pipeline again once the limit is reached, so a looping agent cannot keep
//! spending model calls.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

pub const TOOL_NAME: &str = "Ask_Company_Database";

pub const TOOL_DESCRIPTION: &str = "Useful for when you need to answer questions about spending, budgets or subscriptions from the finance database. \
Input should be a specific natural language question like 'How much did I spend on food last month?'";

/// Anything that answers a natural-language question with display text.
#[async_trait]
pub trait QueryRunner: Send + Sync {
    async fn run(&self, query: &str) -> String;
}

pub struct SqlTool {
    runner: Arc<dyn QueryRunner>,
    failures: AtomicU32,
}

impl SqlTool {
    pub fn new(runner: Arc<dyn QueryRunner>) -> Self {
        Self {
            runner,
            failures: AtomicU32::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        TOOL_NAME
    }

    pub fn description(&self) -> &'static str {
        TOOL_DESCRIPTION
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.failures.store(0, Ordering::SeqCst);
    }

    pub async fn run(&self, query: &str) -> String {
        if self.consecutive_failures() >= MAX_CONSECUTIVE_FAILURES {
            warn!("SQL tool disabled after {} consecutive failures", MAX_CONSECUTIVE_FAILURES);
            return format!(
                "STOP: The SQL Agent has failed {} consecutive times. Aborting to save API credits. Please check logs.",
                MAX_CONSECUTIVE_FAILURES
            );
        }

        info!("[Tool] Activating Safe SQL Executor for query: '{}'", query);
        let data_result = self.runner.run(query).await;

        if is_failure(&data_result) {
            let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
            warn!("SQL tool failure {}/{}", failures, MAX_CONSECUTIVE_FAILURES);
            if failures >= MAX_CONSECUTIVE_FAILURES {
                return format!(
                    "Database Results:\n\n{}\n\n[SYSTEM]: Critical Failure Limit Reached ({}/{}). Stopping.",
                    data_result, failures, MAX_CONSECUTIVE_FAILURES
                );
            }
        } else {
            self.reset();
        }

        format!("Database Results:\n\n{}", data_result)
    }
}

fn is_failure(result: &str) -> bool {
    result.contains("Error") || result.contains("Failed") || result.contains("No results")
}
