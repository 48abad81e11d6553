use regex::Regex;
use serde_json::{self, Value};
use chrono::Utc;
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, Role, CreateChatCompletionRequest,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent,
    },
    Client,
};
use serde::Deserialize;
use crate::config::Config;
use crate::error::AppError;
use crate::models::{ChartConfig, PriorFinding, StepResult, StepSpec};
use crate::services::context::DataContext;

const MAX_CHARTS_PER_STEP: usize = 4;
const RETRY_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_SHIFT: usize = 6;

static JSON_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{[\s\S]*\}").expect("json block pattern is valid")
});

/// Everything one step needs to be analyzed.
#[derive(Debug, Clone, Copy)]
pub struct StepRequest<'a> {
    pub step: &'a StepSpec,
    pub context: &'a DataContext,
    pub prior: &'a [PriorFinding],
    pub goal: Option<&'a str>,
}

/// Runs a single analysis step against a model.
pub trait StepAnalyzer: Send + Sync {
    fn analyze_step<'a>(&'a self, request: StepRequest<'a>) -> BoxFuture<'a, Result<StepResult, AppError>>;
}

pub struct LlmAgent {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    timeout: Duration,
    retries: usize,
}

#[derive(Debug, Default, Deserialize)]
struct RawStepResponse {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    insights: Vec<Value>,
    #[serde(default)]
    charts: Vec<Value>,
}

impl LlmAgent {
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new().with_api_key(&config.openai_key);

        Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout: Duration::from_secs(config.llm_timeout_secs),
            retries: config.llm_retries,
        }
    }

    pub async fn analyze_single_step(&self, request: StepRequest<'_>) -> Result<StepResult, AppError> {
        let start = std::time::Instant::now();
        tracing::info!("Analyzing step '{}' with {}", request.step.title, self.model);

        let user_prompt = build_step_prompt(&request)?;
        let content = self.complete(step_system_prompt(), user_prompt).await?;
        let raw = parse_step_response(&content)?;
        let result = sanitize_result(raw, &request.context.column_names());

        tracing::info!(
            "Step '{}' analyzed in {:?}: {} insights, {} charts",
            request.step.title,
            start.elapsed(),
            result.insights.len(),
            result.charts.len()
        );
        Ok(result)
    }

    async fn complete(&self, system_prompt: String, user_prompt: String) -> Result<String, AppError> {
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessage {
                    content: system_prompt,
                    name: None,
                    role: Role::System,
                }
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessage {
                    content: ChatCompletionRequestUserMessageContent::Text(user_prompt),
                    name: None,
                    role: Role::User,
                }
            ),
        ];

        let request = CreateChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(self.temperature),
            ..Default::default()
        };

        let mut last_error = AppError::LlmError("No attempt made".to_string());
        for attempt in 0..=self.retries {
            if attempt > 0 {
                let backoff = retry_backoff(attempt);
                tracing::warn!("Retrying model call (attempt {}) after {:?}", attempt + 1, backoff);
                tokio::time::sleep(backoff).await;
            }

            match tokio::time::timeout(self.timeout, self.client.chat().create(request.clone())).await {
                Ok(Ok(response)) => {
                    let content = response.choices
                        .first()
                        .and_then(|choice| choice.message.content.clone())
                        .ok_or_else(|| AppError::LlmError("Model returned no content".to_string()))?;
                    tracing::debug!("Raw model response: {}", content);
                    return Ok(content);
                }
                Ok(Err(e)) => {
                    tracing::error!("Model call failed: {}", e);
                    last_error = AppError::LlmError(e.to_string());
                }
                Err(_) => {
                    tracing::error!("Model call timed out after {:?}", self.timeout);
                    last_error = AppError::LlmError(format!("Request timed out after {:?}", self.timeout));
                }
            }
        }

        Err(last_error)
    }
}

/// Doubling delay before retry `attempt` (1-based), capped at 32s.
fn retry_backoff(attempt: usize) -> Duration {
    let shift = attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
    Duration::from_millis(RETRY_BACKOFF_MS << shift)
}

impl StepAnalyzer for LlmAgent {
    fn analyze_step<'a>(&'a self, request: StepRequest<'a>) -> BoxFuture<'a, Result<StepResult, AppError>> {
        Box::pin(self.analyze_single_step(request))
    }
}

fn step_system_prompt() -> String {
    let current_time = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();

    format!(
        r#"You are a data analyst working through a spreadsheet analysis one step at a time.
            The current date is {}.

            You receive the overall analysis goal, the step you must perform now, the findings of the
            earlier steps, and a description of the selected sheets: every column with its semantic
            bucket (id, content, category, time, numeric, other), a statistical profile of each column
            and a sample of rows.

            **TASK**:
            - Perform ONLY the current step. Use earlier findings as context, do not repeat them.
            - Base every statement on the data provided. Do not invent values that cannot be derived from it.
            - When the sample is not the whole sheet (see row_count), say so when it matters.
            - Answer in the language of the goal or, if there is no goal, of the step title.

            **CHART SUGGESTIONS**:
            - Suggest at most {} charts that support the step's findings.
            - chart_type is one of: bar, line, pie, scatter, area.
            - x_field, y_field and series_field MUST be column names copied exactly from the data description.
            - aggregation is one of: sum, avg, count, min, max, or null.
            - Prefer line or area charts over time columns, bar or pie charts over category columns.

            **RESPONSE FORMAT**:
            YOU MUST ALWAYS return your response in this exact JSON format, and nothing else:
            {{
              "summary": "Two or three sentences answering the step",
              "insights": ["One concrete finding", "Another concrete finding"],
              "charts": [
                {{
                  "chart_type": "bar",
                  "title": "Chart title",
                  "x_field": "column name",
                  "y_field": "column name or null",
                  "aggregation": "sum",
                  "series_field": null
                }}
              ]
            }}"#,
        current_time,
        MAX_CHARTS_PER_STEP
    )
}

pub fn build_step_prompt(request: &StepRequest<'_>) -> Result<String, AppError> {
    let mut prompt = String::new();

    if let Some(goal) = request.goal.map(str::trim).filter(|g| !g.is_empty()) {
        prompt.push_str("## Analysis goal\n");
        prompt.push_str(goal);
        prompt.push_str("\n\n");
    }

    prompt.push_str("## Current step\n");
    prompt.push_str(&format!("Title: {}\n", request.step.title));
    if !request.step.description.trim().is_empty() {
        prompt.push_str(&format!("Description: {}\n", request.step.description));
    }
    prompt.push('\n');

    if !request.prior.is_empty() {
        prompt.push_str("## Findings from earlier steps\n");
        for finding in request.prior {
            prompt.push_str(&format!("- {}: {}\n", finding.title, finding.summary));
            for insight in &finding.insights {
                prompt.push_str(&format!("  * {}\n", insight));
            }
        }
        prompt.push('\n');
    }

    prompt.push_str("## Data\n");
    prompt.push_str(&request.context.to_prompt_json()?);
    Ok(prompt)
}

fn parse_step_response(response: &str) -> Result<RawStepResponse, AppError> {
    let json_str = JSON_BLOCK.find(response)
        .ok_or_else(|| {
            AppError::ParseError(format!("No JSON found in model response. Raw response: {}", response))
        })?
        .as_str();

    let raw: RawStepResponse = serde_json::from_str(json_str).map_err(|e| {
        AppError::ParseError(format!("Failed to parse model JSON '{}': {}", json_str, e))
    })?;

    if raw.summary.trim().is_empty() && raw.insights.is_empty() {
        return Err(AppError::ParseError("Model response has neither summary nor insights".to_string()));
    }
    Ok(raw)
}

fn clean_text(text: &str) -> String {
    text.replace('\u{0}', "")
        .replace('\u{1F}', "")
        .trim()
        .to_string()
}

fn insight_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => ["insight", "text", "description", "summary"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(String::from),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Strip control characters and drop chart suggestions that do not refer
/// to real columns.
fn sanitize_result(raw: RawStepResponse, columns: &HashSet<&str>) -> StepResult {
    let insights = raw.insights
        .iter()
        .filter_map(insight_text)
        .map(|s| clean_text(&s))
        .filter(|s| !s.is_empty())
        .collect();

    let known = |field: &Option<String>| {
        field.as_deref().map_or(true, |f| columns.contains(f))
    };

    let charts = raw.charts
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<ChartConfig>(value) {
            Ok(chart) => Some(chart),
            Err(e) => {
                tracing::debug!("Dropping malformed chart suggestion: {}", e);
                None
            }
        })
        .map(|mut chart| {
            chart.title = clean_text(&chart.title);
            chart.y_field = chart.y_field.filter(|f| !f.trim().is_empty() && f != "null");
            chart.series_field = chart.series_field.filter(|f| !f.trim().is_empty() && f != "null");
            chart
        })
        .filter(|chart| {
            let valid = columns.contains(chart.x_field.as_str())
                && known(&chart.y_field)
                && known(&chart.series_field);
            if !valid {
                tracing::debug!("Dropping chart '{}' with unknown fields", chart.title);
            }
            valid
        })
        .take(MAX_CHARTS_PER_STEP)
        .collect();

    StepResult {
        summary: clean_text(&raw.summary),
        insights,
        charts,
    }
}
