use async_trait::async_trait;
use rusqlite::Connection;
use sql_crew::db::SqliteStore;
use sql_crew::knowledge_base::{DomainCatalog, SchemaKnowledgeBase};
use sql_crew::llm::{CompletionRequest, LanguageModel, ModelTask};
use sql_crew::rate_limiter::RateLimiter;
use sql_crew::stages::execution::NO_RESULTS_MESSAGE;
use sql_crew::{PipelineConfig, PipelineError, Result, SqlPipeline, StageContext};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const KB_JSON: &str = r#"{
    "transactions": ["All financial transactions, expenses and income", [
        ["date: day of the transaction, TEXT, '2024-05-02'"],
        ["merchant: payee name, TEXT, 'Zomato'"],
        ["amount: transaction value, REAL, 450.5"],
        ["category: spending category, TEXT, 'Food'"]
    ]],
    "budgets": ["Monthly spending limits per category", [
        ["category: spending category, TEXT, 'Food'"],
        ["monthly_limit: limit in rupees, REAL, 5000.0"]
    ]]
}"#;

/// Language model fake answering each task from a script.
struct ScriptedModel {
    replies: HashMap<ModelTask, String>,
    failing: Option<ModelTask>,
    panicking: Option<ModelTask>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    fn new() -> Self {
        Self {
            replies: HashMap::new(),
            failing: None,
            panicking: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn reply(mut self, task: ModelTask, text: &str) -> Self {
        self.replies.insert(task, text.to_string());
        self
    }

    fn fail_on(mut self, task: ModelTask) -> Self {
        self.failing = Some(task);
        self
    }

    fn panic_on(mut self, task: ModelTask) -> Self {
        self.panicking = Some(task);
        self
    }

    fn requests_for(&self, task: ModelTask) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.task == task)
            .cloned()
            .collect()
    }

    fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        if self.panicking == Some(request.task) {
            panic!("scripted panic in {}", request.task.as_str());
        }
        if self.failing == Some(request.task) {
            return Err(PipelineError::Llm("scripted failure".to_string()));
        }
        Ok(self
            .replies
            .get(&request.task)
            .cloned()
            .unwrap_or_else(|| "[]".to_string()))
    }
}

fn create_finance_db() -> PathBuf {
    let path = std::env::temp_dir().join(format!("sql-crew-it-{}.db", uuid::Uuid::new_v4()));
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE transactions (id INTEGER PRIMARY KEY, date TEXT, merchant TEXT, amount REAL, category TEXT);
         INSERT INTO transactions (date, merchant, amount, category) VALUES
            ('2024-05-02', 'Zomato', 450.5, 'Food'),
            ('2024-05-03', 'Uber', 220.0, 'Transport'),
            ('2024-05-09', 'Zomato', 310.0, 'Food'),
            ('2024-05-11', 'Big Bazaar', 1200.0, 'Shopping');
         CREATE TABLE budgets (category TEXT, monthly_limit REAL);
         INSERT INTO budgets VALUES ('Food', 5000.0), ('Transport', 2000.0);",
    )
    .unwrap();
    path
}

fn build_pipeline(
    model: Arc<ScriptedModel>,
    kb: SchemaKnowledgeBase,
    catalog: DomainCatalog,
    db_path: &PathBuf,
    use_router: bool,
) -> SqlPipeline {
    let config = PipelineConfig {
        database_path: db_path.clone(),
        rate_limit_threshold: 100,
        use_router,
        ..PipelineConfig::default()
    };
    let ctx = StageContext::new(
        model,
        Arc::new(RateLimiter::new(100, Duration::from_secs(60)).unwrap()),
        Arc::new(kb),
        Arc::new(catalog),
        Arc::new(SqliteStore::new(db_path.clone())),
        config,
    );
    SqlPipeline::new(ctx)
}

fn finance_kb() -> SchemaKnowledgeBase {
    SchemaKnowledgeBase::from_json_str(KB_JSON).unwrap()
}

fn food_spend_model() -> ScriptedModel {
    ScriptedModel::new()
        .reply(
            ModelTask::SubQuestion,
            "```json\n[['Total amount spent on food', 'transactions']]\n```",
        )
        .reply(
            ModelTask::ColumnSelection,
            "[['amount', 'transaction value'], ['category', 'spending category']]",
        )
        .reply(ModelTask::FilterCheck, "[\"no\"]")
        .reply(
            ModelTask::QueryGeneration,
            "SELECT SUM(amount) AS total FROM transactions WHERE category = 'Food'",
        )
        .reply(
            ModelTask::QueryValidation,
            "```sql\nSELECT SUM(amount) AS total FROM transactions WHERE category = 'Food'\n```",
        )
}

#[tokio::test]
async fn test_empty_knowledge_base_still_answers() {
    let db = create_finance_db();
    let model = Arc::new(
        ScriptedModel::new()
            .reply(ModelTask::FilterCheck, "[\"no\"]")
            .reply(
                ModelTask::QueryGeneration,
                "SELECT * FROM transactions WHERE date >= date('now', 'start of month', '-1 month') AND date < date('now', 'start of month')",
            )
            .reply(
                ModelTask::QueryValidation,
                "```sql\nSELECT * FROM transactions WHERE date >= date('now', 'start of month', '-1 month') AND date < date('now', 'start of month')\n```",
            ),
    );
    let pipeline = build_pipeline(
        model.clone(),
        SchemaKnowledgeBase::default(),
        DomainCatalog::default(),
        &db,
        false,
    );

    let state = pipeline
        .run_with_state("Show me all transactions from last month")
        .await;
    std::fs::remove_file(&db).ok();

    assert!(
        state.result_text.starts_with("| ") || state.result_text == NO_RESULTS_MESSAGE,
        "unexpected result: {}",
        state.result_text
    );
    assert!(state.filtered_columns.is_empty());
    assert!(model.requests_for(ModelTask::SubQuestion).is_empty());
    assert!(model.requests_for(ModelTask::ColumnSelection).is_empty());
}

#[tokio::test]
async fn test_no_filter_skips_fuzzy_matching() {
    let db = create_finance_db();
    let model = Arc::new(food_spend_model());
    let pipeline = build_pipeline(model.clone(), finance_kb(), DomainCatalog::default(), &db, false);

    let state = pipeline.run_with_state("How much did I spend on food?").await;
    std::fs::remove_file(&db).ok();

    assert_eq!(state.router_out, vec!["finance"]);
    assert_eq!(state.filtered_columns.len(), 2);
    assert!(state.resolved_filters.is_empty());

    let generation = model.requests_for(ModelTask::QueryGeneration);
    assert_eq!(generation.len(), 1);
    assert_eq!(generation[0].input("filters"), Some(""));

    assert_eq!(state.result_text, "| total |\n| --- |\n| 760.5 |");
    assert_eq!(model.call_count(), 5);
    assert_eq!(pipeline.context().limiter.count().await, 5);
}

#[tokio::test]
async fn test_filter_values_are_fuzzy_matched() {
    let db = create_finance_db();
    let model = Arc::new(
        food_spend_model()
            .reply(
                ModelTask::FilterCheck,
                "['yes', ['transactions', 'merchant', 'zomatto'], ['transactions', 'merchant', 'netflix']]",
            )
            .reply(
                ModelTask::QueryGeneration,
                "SELECT COUNT(*) AS orders FROM transactions WHERE merchant = 'Zomato'",
            )
            .reply(
                ModelTask::QueryValidation,
                "SELECT COUNT(*) AS orders FROM transactions WHERE merchant = 'Zomato'",
            ),
    );
    let pipeline = build_pipeline(model.clone(), finance_kb(), DomainCatalog::default(), &db, false);

    let state = pipeline.run_with_state("How many times did I order from zomatto?").await;
    std::fs::remove_file(&db).ok();

    assert_eq!(state.resolved_filters.len(), 1);
    let filter = &state.resolved_filters[0];
    assert_eq!(filter.column, "merchant");
    assert_eq!(filter.requested, "zomatto");
    assert_eq!(filter.matched, "Zomato");
    assert!(filter.similarity >= 0.80);

    let generation = model.requests_for(ModelTask::QueryGeneration);
    assert!(generation[0].input("filters").unwrap().contains("'Zomato'"));
    assert_eq!(state.result_text, "| orders |\n| --- |\n| 2 |");
}

#[tokio::test]
async fn test_filter_on_unknown_table_is_dropped() {
    let db = create_finance_db();
    let model = Arc::new(
        food_spend_model().reply(ModelTask::FilterCheck, "['yes', ['ghost', 'merchant', 'x']]"),
    );
    let pipeline = build_pipeline(model.clone(), finance_kb(), DomainCatalog::default(), &db, false);

    let state = pipeline.run_with_state("How much did I spend at x on food?").await;
    std::fs::remove_file(&db).ok();

    assert_eq!(state.filter_directives.len(), 2);
    assert!(state.resolved_filters.is_empty());
    let generation = model.requests_for(ModelTask::QueryGeneration);
    assert_eq!(generation.len(), 1);
    assert_eq!(generation[0].input("filters"), Some(""));
    assert_eq!(state.result_text, "| total |\n| --- |\n| 760.5 |");
}

#[tokio::test]
async fn test_validation_output_is_unfenced() {
    let db = create_finance_db();
    let model = Arc::new(
        food_spend_model()
            .reply(ModelTask::QueryGeneration, "SELECT 1")
            .reply(ModelTask::QueryValidation, "```sql\nSELECT 1\n```"),
    );
    let pipeline = build_pipeline(model, finance_kb(), DomainCatalog::default(), &db, false);

    let state = pipeline.run_with_state("Is the database up?").await;
    std::fs::remove_file(&db).ok();

    assert_eq!(state.validated_sql, "SELECT 1");
    assert_eq!(state.result_text, "| 1 |\n| --- |\n| 1 |");
}

#[tokio::test]
async fn test_stage_error_becomes_pipeline_error_text() {
    let db = create_finance_db();
    let model = Arc::new(food_spend_model().fail_on(ModelTask::QueryGeneration));
    let pipeline = build_pipeline(model.clone(), finance_kb(), DomainCatalog::default(), &db, false);

    let result = pipeline.run("How much did I spend on food?").await;
    std::fs::remove_file(&db).ok();

    assert!(result.starts_with("Error in SQL pipeline: "), "{}", result);
    assert!(result.contains("Query Generation"));
    assert!(result.contains("scripted failure"));
    assert!(model.requests_for(ModelTask::QueryValidation).is_empty());
}

#[tokio::test]
async fn test_panicking_stage_becomes_pipeline_error_text() {
    let db = create_finance_db();
    let model = Arc::new(food_spend_model().panic_on(ModelTask::FilterCheck));
    let pipeline = build_pipeline(model, finance_kb(), DomainCatalog::default(), &db, false);

    let result = pipeline.run("How much did I spend on food?").await;
    std::fs::remove_file(&db).ok();

    assert!(result.starts_with("Error in SQL pipeline: "), "{}", result);
    assert!(result.contains("scripted panic in filter_check"));
}

#[tokio::test]
async fn test_execution_failure_is_reported_not_raised() {
    let db = create_finance_db();
    let model = Arc::new(
        food_spend_model().reply(ModelTask::QueryValidation, "SELECT * FROM missing_table"),
    );
    let pipeline = build_pipeline(model, finance_kb(), DomainCatalog::default(), &db, false);

    let result = pipeline.run("Show the missing table").await;
    std::fs::remove_file(&db).ok();

    assert!(result.starts_with("Error during execution: "), "{}", result);
    assert!(result.contains("missing_table"));
}

#[tokio::test]
async fn test_empty_result_message() {
    let db = create_finance_db();
    let model = Arc::new(food_spend_model().reply(
        ModelTask::QueryValidation,
        "SELECT * FROM transactions WHERE merchant = 'Nobody'",
    ));
    let pipeline = build_pipeline(model, finance_kb(), DomainCatalog::default(), &db, false);

    let result = pipeline.run("Show spending at Nobody").await;
    std::fs::remove_file(&db).ok();

    assert_eq!(result, NO_RESULTS_MESSAGE);
}

#[tokio::test]
async fn test_router_selects_known_domains() {
    let db = create_finance_db();
    let mut domains = BTreeMap::new();
    domains.insert(
        "finance".to_string(),
        vec!["transactions".to_string(), "budgets".to_string()],
    );
    domains.insert("orders".to_string(), vec!["orders".to_string()]);

    let model = Arc::new(food_spend_model().reply(ModelTask::Router, "['finance', 'weather']"));
    let pipeline = build_pipeline(model.clone(), finance_kb(), DomainCatalog::new(domains), &db, true);

    let state = pipeline.run_with_state("How much did I spend on food?").await;
    std::fs::remove_file(&db).ok();

    assert_eq!(state.router_out, vec!["finance"]);
    assert!(state.domain_results.contains_key("finance"));
    assert!(!state.domain_results.contains_key("orders"));
    assert_eq!(model.requests_for(ModelTask::Router).len(), 1);
    assert_eq!(state.result_text, "| total |\n| --- |\n| 760.5 |");
}
