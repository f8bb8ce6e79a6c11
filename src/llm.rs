use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

/// Which pipeline step a model call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelTask {
    Router,
    SubQuestion,
    ColumnSelection,
    FilterCheck,
    QueryGeneration,
    QueryValidation,
    KbAnnotation,
}

impl ModelTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTask::Router => "router",
            ModelTask::SubQuestion => "sub_question",
            ModelTask::ColumnSelection => "column_selection",
            ModelTask::FilterCheck => "filter_check",
            ModelTask::QueryGeneration => "query_generation",
            ModelTask::QueryValidation => "query_validation",
            ModelTask::KbAnnotation => "kb_annotation",
        }
    }
}

/// A fully rendered prompt plus the named values it was rendered from.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub task: ModelTask,
    pub system: String,
    pub prompt: String,
    pub inputs: Vec<(&'static str, String)>,
}

impl CompletionRequest {
    pub fn input(&self, name: &str) -> Option<&str> {
        self.inputs
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Return the raw text of the model's answer.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// OpenAI-compatible chat completions client.
#[derive(Clone)]
pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
    temperature: f64,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url,
            model,
            temperature: 0.1,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.prompt}
            ],
            "temperature": self.temperature,
        });

        // Reasoning models spend part of the budget before answering
        if self.model.starts_with("gpt-5") || self.model.contains("o1") {
            body["max_completion_tokens"] = serde_json::json!(4000);
        } else if self.model.starts_with("gpt-4") {
            body["max_completion_tokens"] = serde_json::json!(1500);
        } else {
            body["max_tokens"] = serde_json::json!(1500);
        }
        body
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        debug!("LLM call [{}] prompt length {}", request.task.as_str(), request.prompt.len());

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| PipelineError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PipelineError::Llm(format!(
                "LLM API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PipelineError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        if let Some(error) = response_json.get("error") {
            return Err(PipelineError::Llm(format!("LLM API error: {}", error)));
        }

        let choice = response_json
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .ok_or_else(|| {
                PipelineError::Llm(format!("No choices in LLM response: {}", response_json))
            })?;

        match choice.get("finish_reason").and_then(|r| r.as_str()) {
            Some("length") => warn!(
                "LLM response for {} was truncated due to length limit",
                request.task.as_str()
            ),
            Some("content_filter") => {
                return Err(PipelineError::Llm(
                    "LLM response was filtered by content policy".to_string(),
                ))
            }
            _ => {}
        }

        let content = choice["message"]["content"]
            .as_str()
            .ok_or_else(|| PipelineError::Llm("No content in LLM response".to_string()))?;

        if content.is_empty() {
            return Err(PipelineError::Llm("Empty content in LLM response".to_string()));
        }

        Ok(content.to_string())
    }
}
