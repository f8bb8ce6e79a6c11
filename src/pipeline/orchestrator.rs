//! Finite-state driver for one pipeline run.
//!
//! ```text
//! Start -> [Routing ->] DomainExtraction -> FilterCheck -> (FuzzyMatching ->) QueryGeneration
//!       -> QueryValidation -> Execution -> End
//! ```
//!
//! [`transition`] is pure; [`SqlPipeline`] owns the loop that executes each
//! stage and writes its output into the matching state field.

use super::context::StageContext;
use super::state::PipelineState;
use crate::agent::QueryRunner;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::stages::{columns, domain, execution, filters, generation, router};
use async_trait::async_trait;
use std::time::Instant;
use tracing::{error, info};

pub const FAILED_TO_RETRIEVE: &str = "Failed to retrieve data.";

const BANNER: &str = "======================================================================";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Start,
    Routing,
    DomainExtraction,
    FilterCheck,
    FuzzyMatching,
    QueryGeneration,
    QueryValidation,
    Execution,
    End,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Start => "Start",
            Stage::Routing => "Router",
            Stage::DomainExtraction => "Domain Extraction",
            Stage::FilterCheck => "Filter Check",
            Stage::FuzzyMatching => "Fuzz Match",
            Stage::QueryGeneration => "Query Generation",
            Stage::QueryValidation => "Query Validation",
            Stage::Execution => "Safe Executor",
            Stage::End => "End",
        }
    }
}

/// Next stage after `stage` has completed.
pub fn transition(stage: Stage, state: &PipelineState, config: &PipelineConfig) -> Stage {
    match stage {
        Stage::Start if config.use_router => Stage::Routing,
        Stage::Start => Stage::DomainExtraction,
        Stage::Routing => Stage::DomainExtraction,
        Stage::DomainExtraction => Stage::FilterCheck,
        Stage::FilterCheck if filters::needs_fuzzy_matching(&state.filter_directives) => {
            Stage::FuzzyMatching
        }
        Stage::FilterCheck => Stage::QueryGeneration,
        Stage::FuzzyMatching => Stage::QueryGeneration,
        Stage::QueryGeneration => Stage::QueryValidation,
        Stage::QueryValidation => Stage::Execution,
        Stage::Execution | Stage::End => Stage::End,
    }
}

#[derive(Clone)]
pub struct SqlPipeline {
    ctx: StageContext,
}

impl SqlPipeline {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &StageContext {
        &self.ctx
    }

    /// Answer `query`, returning only the result text.
    pub async fn run(&self, query: &str) -> String {
        self.run_with_state(query).await.result_text
    }

    /// Answer `query`, returning the final state. `result_text` always holds
    /// the caller-facing answer, including failures.
    pub async fn run_with_state(&self, query: &str) -> PipelineState {
        let started = Instant::now();
        info!("{}", BANNER);
        info!("SQL PIPELINE STARTED (run {})", uuid::Uuid::new_v4());
        info!("{}", BANNER);
        info!("User Query: '{}'", query);

        let pipeline = self.clone();
        let state = PipelineState::new(query);
        let handle = tokio::spawn(async move { pipeline.drive(state).await });

        let (mut state, outcome) = match handle.await {
            Ok(done) => done,
            Err(join_error) => {
                let message = if join_error.is_panic() {
                    panic_message(join_error.into_panic())
                } else {
                    join_error.to_string()
                };
                (
                    PipelineState::new(query),
                    Err(PipelineError::Stage {
                        stage: "pipeline",
                        message,
                    }),
                )
            }
        };

        let elapsed = started.elapsed().as_secs_f64();
        match outcome {
            Ok(()) => {
                if state.result_text.is_empty() {
                    state.result_text = FAILED_TO_RETRIEVE.to_string();
                }
                info!("{}", BANNER);
                info!("[SUCCESS] PIPELINE COMPLETED in {:.2}s", elapsed);
                info!("{}", BANNER);
            }
            Err(e) => {
                error!("{}", BANNER);
                error!("[FAILURE] PIPELINE FAILED after {:.2}s", elapsed);
                error!("{}", BANNER);
                error!("Error: {}", e);
                state.result_text = format!("Error in SQL pipeline: {}", e);
            }
        }
        state
    }

    async fn drive(self, mut state: PipelineState) -> (PipelineState, Result<()>) {
        if !self.ctx.config.use_router {
            state.router_out = self.ctx.catalog.labels();
            info!("Router disabled, using domains {:?}", state.router_out);
        }

        let mut stage = Stage::Start;
        loop {
            stage = transition(stage, &state, &self.ctx.config);
            if stage == Stage::End {
                break;
            }
            if let Err(e) = self.run_stage(stage, &mut state).await {
                return (state, Err(e));
            }
        }
        (state, Ok(()))
    }

    async fn run_stage(&self, stage: Stage, state: &mut PipelineState) -> Result<()> {
        let started = Instant::now();
        info!("{} Node: Starting execution", stage.name());

        let outcome = self.apply_stage(stage, state).await;

        match outcome {
            Ok(()) => {
                info!(
                    "[SUCCESS] {} Node: Completed in {:.2}s",
                    stage.name(),
                    started.elapsed().as_secs_f64()
                );
                Ok(())
            }
            Err(e) => {
                error!("[ERROR] {} Node failed: {}", stage.name(), e);
                Err(PipelineError::Stage {
                    stage: stage.name(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Run one stage and store its output in the state field it owns.
    async fn apply_stage(&self, stage: Stage, state: &mut PipelineState) -> Result<()> {
        let ctx = &self.ctx;
        match stage {
            Stage::Start | Stage::End => {}
            Stage::Routing => {
                state.router_out = router::route(ctx, &state.user_query).await?;
            }
            Stage::DomainExtraction => {
                let mut results = std::collections::HashMap::new();
                for label in &state.router_out {
                    let extract = domain::extract_domain(ctx, &state.user_query, label).await?;
                    results.insert(label.clone(), extract);
                }
                state.domain_results = results;
            }
            Stage::FilterCheck => {
                let merged = columns::aggregate_columns(&state.domain_results, &state.router_out);
                state.filter_directives =
                    filters::classify(ctx, &merged, &state.user_query).await?;
                state.filtered_columns = merged;
            }
            Stage::FuzzyMatching => {
                state.resolved_filters =
                    filters::resolve_filters(ctx, &state.filter_directives).await?;
            }
            Stage::QueryGeneration => {
                state.draft_sql = generation::generate_sql(
                    ctx,
                    &state.filtered_columns,
                    &state.user_query,
                    &state.resolved_filters,
                )
                .await?;
            }
            Stage::QueryValidation => {
                state.validated_sql = generation::validate_sql(
                    ctx,
                    &state.filtered_columns,
                    &state.user_query,
                    &state.resolved_filters,
                    &state.draft_sql,
                )
                .await?;
            }
            Stage::Execution => {
                state.result_text = execution::execute(ctx, &state.validated_sql).await;
            }
        }
        Ok(())
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "stage panicked".to_string()
    }
}

#[async_trait]
impl QueryRunner for SqlPipeline {
    async fn run(&self, query: &str) -> String {
        SqlPipeline::run(self, query).await
    }
}
