use crate::config::PipelineConfig;
use crate::db::{DataStore, SqliteStore};
use crate::error::{PipelineError, Result};
use crate::knowledge_base::{DomainCatalog, SchemaKnowledgeBase};
use crate::llm::{CompletionRequest, LanguageModel, LlmClient};
use crate::rate_limiter::RateLimiter;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared, read-only resources handed to every stage.
///
/// Cloning is cheap; all heavy members sit behind `Arc`, and one limiter is
/// shared by every run created from the same context.
#[derive(Clone)]
pub struct StageContext {
    pub llm: Arc<dyn LanguageModel>,
    pub limiter: Arc<RateLimiter>,
    pub kb: Arc<SchemaKnowledgeBase>,
    pub catalog: Arc<DomainCatalog>,
    pub store: Arc<dyn DataStore>,
    pub config: PipelineConfig,
}

impl StageContext {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        limiter: Arc<RateLimiter>,
        kb: Arc<SchemaKnowledgeBase>,
        catalog: Arc<DomainCatalog>,
        store: Arc<dyn DataStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            llm,
            limiter,
            kb,
            catalog,
            store,
            config,
        }
    }

    /// Wire the production components: OpenAI-compatible client, SQLite
    /// store, knowledge base and catalog files named by `config`.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            PipelineError::Config("OPENAI_API_KEY is not set".to_string())
        })?;
        let llm = LlmClient::new(api_key, config.model.clone(), config.base_url.clone());

        let kb = SchemaKnowledgeBase::load(&config.kb_path)?;
        if kb.is_empty() {
            warn!("Knowledge base {} has no tables", config.kb_path.display());
        }

        let catalog = match &config.domains_path {
            Some(path) => DomainCatalog::load(path)?,
            None => DomainCatalog::default(),
        };
        info!("Domains: {:?}", catalog.labels());

        let limiter = RateLimiter::new(config.rate_limit_threshold, config.rate_limit_pause)?;
        let store = SqliteStore::new(config.database_path.clone());

        Ok(Self::new(
            Arc::new(llm),
            Arc::new(limiter),
            Arc::new(kb),
            Arc::new(catalog),
            Arc::new(store),
            config,
        ))
    }

    /// Every model call goes through here so the limiter sees it first.
    pub async fn call_model(&self, request: &CompletionRequest) -> Result<String> {
        self.limiter.check_and_wait().await;
        self.llm.complete(request).await
    }
}
