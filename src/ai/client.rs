use crate::ai::schema::FUNCTION_NAME;
use crate::config::AiConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// One way of asking the model for structured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Response constrained to the JSON schema.
    StructuredOutput,
    /// A forced call of a single function whose parameters are the schema.
    FunctionCall,
    /// Any valid JSON object; the schema is only described in the prompt.
    JsonMode,
}

impl Strategy {
    /// Priority order, tried front to back for each model.
    pub const ORDER: [Strategy; 3] = [
        Strategy::StructuredOutput,
        Strategy::FunctionCall,
        Strategy::JsonMode,
    ];
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::StructuredOutput => "structured-output",
            Strategy::FunctionCall => "function-call",
            Strategy::JsonMode => "json-mode",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("model service returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("response carried no content")]
    EmptyResponse,

    #[error("model did not call return_analysis")]
    MissingToolCall,
}

/// Everything needed for one model call.
#[derive(Debug, Clone)]
pub struct ModelRequest<'a> {
    pub model: &'a str,
    pub strategy: Strategy,
    pub system: &'a str,
    pub user: &'a str,
    pub schema: &'a Value,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// The model-service seam. Implementations return the raw JSON text the
/// model produced (message content, or the forced call's arguments).
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: &ModelRequest<'_>) -> Result<String, ClientError>;
}

/// Chat-completions body for a request.
pub fn request_body(request: &ModelRequest<'_>) -> Value {
    let mut body = json!({
        "model": request.model,
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
        "messages": [
            {"role": "system", "content": request.system},
            {"role": "user", "content": request.user},
        ],
    });

    match request.strategy {
        Strategy::StructuredOutput => {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "analysis",
                    "strict": true,
                    "schema": request.schema,
                },
            });
        }
        Strategy::FunctionCall => {
            body["tools"] = json!([{
                "type": "function",
                "function": {
                    "name": FUNCTION_NAME,
                    "description": "Return structured market analysis fields",
                    "parameters": request.schema,
                },
            }]);
            body["tool_choice"] = json!({
                "type": "function",
                "function": {"name": FUNCTION_NAME},
            });
        }
        Strategy::JsonMode => {
            body["response_format"] = json!({"type": "json_object"});
        }
    }
    body
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
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

fn extract_payload(response: ChatResponse, strategy: Strategy) -> Result<String, ClientError> {
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or(ClientError::EmptyResponse)?;

    match strategy {
        Strategy::FunctionCall => message
            .tool_calls
            .into_iter()
            .next()
            .filter(|call| call.function.name == FUNCTION_NAME)
            .map(|call| call.function.arguments)
            .ok_or(ClientError::MissingToolCall),
        _ => message
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or(ClientError::EmptyResponse),
    }
}

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl OpenAiClient {
    pub fn new(cfg: &AiConfig) -> Result<Self, ClientError> {
        let api_key = std::env::var(&cfg.api_key_env).ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            warn!("{} is not set; model calls will be unauthenticated", cfg.api_key_env);
        }
        Self::with_key(cfg, api_key)
    }

    pub fn with_key(cfg: &AiConfig, api_key: Option<String>) -> Result<Self, ClientError> {
        let client = Client::builder()
            .user_agent(concat!("market-analyst/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", cfg.base_url.trim_end_matches('/')),
            api_key,
        })
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn complete(&self, request: &ModelRequest<'_>) -> Result<String, ClientError> {
        let body = request_body(request);
        debug!("POST {} model={} strategy={}", self.endpoint, request.model, request.strategy);

        let mut builder = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "unknown".into());
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        extract_payload(parsed, request.strategy)
    }
}
