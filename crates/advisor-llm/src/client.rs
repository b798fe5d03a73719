// OpenAI chat-completions client in JSON mode.
//
// Every call asks for `response_format: json_object` and expects the first
// choice's message content to be a JSON object. `LlmClient` wraps the HTTP
// client so a deployment without an API key still starts and serves the
// parts of the pipeline that need no model.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use advisor_core::config::{Config, ModelSettings};
use advisor_core::prompt::ChatPrompt;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM not configured")]
    NotConfigured,

    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed completion response: {0}")]
    MalformedResponse(String),

    #[error("model did not return a JSON object: {0}")]
    InvalidJson(String),
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// One JSON-mode completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub temperature: f64,
}

impl ChatRequest {
    pub fn new(settings: &ModelSettings, prompt: ChatPrompt) -> Self {
        ChatRequest {
            model: settings.model.clone(),
            system: prompt.system,
            user: prompt.user,
            temperature: settings.temperature,
        }
    }

    fn body(&self) -> Value {
        json!({
            "model": self.model,
            "temperature": self.temperature,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": self.system },
                { "role": "user", "content": self.user }
            ]
        })
    }
}

/// Anything that can answer a `ChatRequest` with a JSON object.
#[async_trait]
pub trait JsonModel: Send + Sync {
    async fn complete_json(&self, request: &ChatRequest) -> Result<Value, LlmError>;

    /// False when calls are guaranteed to fail with `NotConfigured`.
    fn is_enabled(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// OpenAiClient
// ---------------------------------------------------------------------------

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(
        api_key: String,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl JsonModel for OpenAiClient {
    async fn complete_json(&self, request: &ChatRequest) -> Result<Value, LlmError> {
        debug!(model = %request.model, "sending chat completion");
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request.body())
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "chat completion failed");
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: extract_error_message(&text),
            });
        }

        let content = parse_message_content(&text)?;
        parse_json_object(&content)
    }
}

// ---------------------------------------------------------------------------
// LlmClient wrapper
// ---------------------------------------------------------------------------

/// Either a live OpenAI client or disabled because no API key is configured.
pub enum LlmClient {
    Active(OpenAiClient),
    Disabled,
}

impl LlmClient {
    /// `Active` when the credentials carry a non-empty key, otherwise `Disabled`.
    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        match &config.credentials.openai_api_key {
            Some(key) if !key.trim().is_empty() => {
                let timeout = Duration::from_secs(config.llm.request_timeout_secs);
                let client = OpenAiClient::new(key.clone(), &config.llm.base_url, timeout)?;
                Ok(LlmClient::Active(client))
            }
            _ => Ok(LlmClient::Disabled),
        }
    }
}

#[async_trait]
impl JsonModel for LlmClient {
    async fn complete_json(&self, request: &ChatRequest) -> Result<Value, LlmError> {
        match self {
            LlmClient::Active(client) => client.complete_json(request).await,
            LlmClient::Disabled => Err(LlmError::NotConfigured),
        }
    }

    fn is_enabled(&self) -> bool {
        matches!(self, LlmClient::Active(_))
    }
}

// ---------------------------------------------------------------------------
// Response parsing helpers
// ---------------------------------------------------------------------------

/// Extract `choices[0].message.content` from a completion response body.
pub(crate) fn parse_message_content(body: &str) -> Result<String, LlmError> {
    let v: Value =
        serde_json::from_str(body).map_err(|e| LlmError::MalformedResponse(e.to_string()))?;
    v.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| LlmError::MalformedResponse("no message content in response".into()))
}

/// Parse the model's reply, which must be a JSON object.
pub(crate) fn parse_json_object(content: &str) -> Result<Value, LlmError> {
    match serde_json::from_str::<Value>(content.trim()) {
        Ok(v @ Value::Object(_)) => Ok(v),
        Ok(other) => Err(LlmError::InvalidJson(format!(
            "expected an object, got {}",
            kind(&other)
        ))),
        Err(e) => Err(LlmError::InvalidJson(e.to_string())),
    }
}

/// `error.message` from an OpenAI error body, or the raw body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")?
                .get("message")?
                .as_str()
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
