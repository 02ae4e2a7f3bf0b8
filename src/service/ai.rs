//! AI qualification port and its HTTP clients.
//!
//! Two providers share the [`AiClient`] contract:
//! - `GeminiClient`: Google Generative Language `generateContent`
//! - `OpenAiClient`: any OpenAI-compatible `chat/completions` endpoint

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GEMINI_DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

const AI_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AiError {
    /// No API key configured; nothing was sent
    #[error("no API key configured")]
    NoApiKey,

    /// Non-2xx response from the provider
    #[error("AI provider returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Response did not carry the expected content
    #[error("invalid AI response: {0}")]
    InvalidResponse(String),

    /// Connection failed or timed out
    #[error("AI network error: {0}")]
    Network(String),
}

impl AiError {
    /// Stable machine-readable code for run summaries.
    pub fn code(&self) -> String {
        match self {
            AiError::NoApiKey => "no_api_key".to_string(),
            AiError::Http { status, .. } => format!("http_{}", status),
            AiError::InvalidResponse(_) => "invalid_response".to_string(),
            AiError::Network(_) => "network".to_string(),
        }
    }

    /// Network failures, rate limiting and provider-side errors.
    pub fn is_transient(&self) -> bool {
        match self {
            AiError::Network(_) => true,
            AiError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[async_trait]
pub trait AiClient: Send + Sync {
    /// Send one system + user prompt pair and return the model's text.
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, AiError>;

    fn name(&self) -> &'static str;
}

fn build_client() -> anyhow::Result<Client> {
    use anyhow::Context;
    Client::builder()
        .timeout(AI_TIMEOUT)
        .build()
        .context("Failed to build AI HTTP client")
}

fn usable_key(api_key: &Option<String>) -> Result<&str, AiError> {
    match api_key.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() => Ok(key),
        _ => Err(AiError::NoApiKey),
    }
}

async fn post_json(request: reqwest::RequestBuilder, body: &Value) -> Result<Value, AiError> {
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| AiError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(AiError::Http {
            status: status.as_u16(),
            message,
        });
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| AiError::InvalidResponse(format!("body is not JSON: {}", e)))
}

/// Google Gemini client.
pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, model: Option<String>) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client()?,
            api_key,
            model: model.unwrap_or_else(|| GEMINI_DEFAULT_MODEL.to_string()),
            base_url: GEMINI_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl AiClient for GeminiClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, AiError> {
        let api_key = usable_key(&self.api_key)?;

        let api_url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = json!({
            "systemInstruction": { "parts": [{ "text": system_prompt }] },
            "contents": [{
                "role": "user",
                "parts": [{ "text": user_prompt }]
            }],
            "generationConfig": { "responseMimeType": "application/json" }
        });

        tracing::debug!("[AI] Gemini request to model {}", self.model);
        let response_json = post_json(
            self.client.post(&api_url).query(&[("key", api_key)]),
            &body,
        )
        .await?;

        response_json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AiError::InvalidResponse("missing candidates[0] text".into()))
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

/// OpenAI-compatible chat completions client.
pub struct OpenAiClient {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: Option<String>, model: Option<String>) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client()?,
            api_key,
            model: model.unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string()),
            base_url: OPENAI_BASE_URL.to_string(),
        })
    }

    /// Set a custom base URL (Azure, local gateways, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl AiClient for OpenAiClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, AiError> {
        let api_key = usable_key(&self.api_key)?;

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt }
            ],
            "response_format": { "type": "json_object" }
        });

        tracing::debug!("[AI] Chat completion request to model {}", self.model);
        let response_json = post_json(
            self.client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(api_key),
            &body,
        )
        .await?;

        response_json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AiError::InvalidResponse("missing choices[0].message.content".into()))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
