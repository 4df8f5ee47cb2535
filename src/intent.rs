//! Natural-language intent extraction over an OpenAI-compatible
//! chat-completions endpoint with function calling.
//!
//! The model is offered a single function, `get_stock_graph(companyName, days)`.
//! Whatever it decides is returned as a [`StockIntent`]; declining to call the
//! function is `Ok(None)`.

use crate::api::{self, RetryPolicy};
use crate::error::ApiError;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

const SERVICE: &str = "openai";

pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4";

/// Window used when the prompt names no timeframe.
pub const DEFAULT_DAYS: u32 = 365;

pub const FUNCTION_NAME: &str = "get_stock_graph";

const SYSTEM_PROMPT: &str = "You are an assistant that helps retrieve stock market data for S&P 500 companies. \
When asked about a company's stock, use the get_stock_graph function to fetch the data. \
Convert the timeframe to number of days. \
If no timeframe is specified, use the last year (365 days) as the default.";

/// What the model extracted from a prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct StockIntent {
    pub company_name: String,
    /// Raw day count as the model sent it, see [`normalize_days`]
    pub days: Option<f64>,
}

impl StockIntent {
    pub fn days(&self) -> u32 {
        normalize_days(self.days)
    }
}

/// Absent, non-finite, or non-positive → 365; otherwise the nearest whole day.
pub fn normalize_days(days: Option<f64>) -> u32 {
    match days {
        Some(d) if d.is_finite() && d > 0.0 => d.round().clamp(1.0, u32::MAX as f64) as u32,
        _ => DEFAULT_DAYS,
    }
}

/// Anything that can turn a prompt into a stock intent.
pub trait IntentResolver {
    /// `catalog_names` are the canonical company names the answer should echo.
    async fn extract(
        &self,
        prompt: &str,
        catalog_names: &[&str],
    ) -> Result<Option<StockIntent>, ApiError>;
}

/// Chat-completions client.
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
    include_catalog: bool,
    retry: RetryPolicy,
}

impl OpenAiClient {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        api_key_env: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            api_key_env: api_key_env.into(),
            include_catalog: true,
            retry,
        }
    }

    /// Whether the catalog's company names are listed in the system prompt.
    pub fn include_catalog(mut self, include: bool) -> Self {
        self.include_catalog = include;
        self
    }

    fn request_body(&self, prompt: &str, catalog_names: &[&str]) -> Value {
        let mut system = SYSTEM_PROMPT.to_string();
        if self.include_catalog && !catalog_names.is_empty() {
            system.push_str(
                "\nUse the companyName exactly as it appears in this list of known companies: ",
            );
            system.push_str(&catalog_names.join("; "));
        }

        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt }
            ],
            "tools": [function_schema()],
            "tool_choice": "auto"
        })
    }
}

/// The `get_stock_graph` tool definition.
pub fn function_schema() -> Value {
    json!({
        "type": "function",
        "function": {
            "name": FUNCTION_NAME,
            "description": "Get stock market data for a company",
            "parameters": {
                "type": "object",
                "properties": {
                    "companyName": {
                        "type": "string",
                        "description": "The name of the company"
                    },
                    "days": {
                        "type": "number",
                        "description": "Number of days of data to retrieve"
                    }
                },
                "required": ["companyName"]
            }
        }
    })
}

impl IntentResolver for OpenAiClient {
    async fn extract(
        &self,
        prompt: &str,
        catalog_names: &[&str],
    ) -> Result<Option<StockIntent>, ApiError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| ApiError::MissingApiKey {
            env: self.api_key_env.clone(),
        })?;
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(prompt, catalog_names);

        tracing::info!(model = %self.model, "resolving prompt intent");

        let text = api::with_retry(SERVICE, self.retry, || async {
            let response = self
                .client
                .post(&url)
                .bearer_auth(api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| ApiError::transport(SERVICE, e))?;
            let response = api::check_status(SERVICE, response).await?;
            response
                .text()
                .await
                .map_err(|e| ApiError::transport(SERVICE, e))
        })
        .await?;

        parse_completion(&text)
    }
}

// Chat-completions response structures

#[derive(Debug, Deserialize)]
struct Completion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
    #[serde(default)]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StockGraphArgs {
    company_name: String,
    #[serde(default)]
    days: Option<Value>,
}

/// Parse a completion body. `Ok(None)` when the model did not call
/// `get_stock_graph`.
pub fn parse_completion(body: &str) -> Result<Option<StockIntent>, ApiError> {
    let completion: Completion = serde_json::from_str(body)
        .map_err(|e| ApiError::malformed(SERVICE, format!("unexpected completion payload: {}", e)))?;

    let message = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::malformed(SERVICE, "completion has no choices"))?
        .message;

    let call = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|c| c.function)
        .next()
        .or(message.function_call);

    let call = match call {
        Some(call) if call.name == FUNCTION_NAME => call,
        Some(call) => {
            tracing::debug!(name = %call.name, "model called an unknown function");
            return Ok(None);
        }
        None => return Ok(None),
    };

    let args: StockGraphArgs = serde_json::from_str(&call.arguments)
        .map_err(|e| ApiError::malformed(SERVICE, format!("bad {} arguments: {}", FUNCTION_NAME, e)))?;

    Ok(Some(StockIntent {
        company_name: args.company_name,
        days: args.days.as_ref().and_then(days_value),
    }))
}

/// Models sometimes send the day count as a string.
fn days_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
