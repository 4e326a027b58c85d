//! Vision Language Model (VLM) client for OpenAI-compatible endpoints.
//!
//! Both the proposal model and the grounding model are called through
//! [`chat_completion`]: one request carrying a text prompt and a PNG
//! screenshot, one answer string back. There are no retries; a failed call
//! is reported to the caller as a [`VlmError`].
//!
//! # Configuration
//!
//! VLM settings can be configured via environment variables:
//! - `MOBILE_VISION_PROPOSAL_ENDPOINT` / `MOBILE_VISION_GROUNDING_ENDPOINT`: API endpoint URLs
//! - `MOBILE_VISION_PROPOSAL_MODEL` / `MOBILE_VISION_GROUNDING_MODEL`: Model names
//! - `OPENAI_API_KEY` / `HUGGINGFACE_API_KEY`: Bearer tokens
//! - `MOBILE_VISION_HTTP_TIMEOUT`: Request timeout (seconds)

use base64::Engine;
use reqwest::blocking::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::{self, VlmSettings};

/// Result type for VLM operations
pub type VlmResult<T> = Result<T, VlmError>;

/// Errors that can occur during VLM operations
#[derive(Debug, Error)]
pub enum VlmError {
    /// Failed to reach the VLM endpoint
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The endpoint answered with a non-success status
    #[error("Request failed with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Invalid response from the VLM
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for VlmError {
    fn from(e: reqwest::Error) -> Self {
        VlmError::ConnectionFailed(e.to_string())
    }
}

/// Configuration for VLM client
#[derive(Debug, Clone)]
pub struct VlmConfig {
    /// API endpoint URL
    pub endpoint: String,
    /// Model name to use
    pub model: String,
    /// Bearer token
    pub api_key: Option<String>,
    /// Maximum tokens in response
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Request timeout (seconds)
    pub timeout: u64,
}

impl From<&VlmSettings> for VlmConfig {
    fn from(settings: &VlmSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            timeout: settings.timeout,
        }
    }
}

impl VlmConfig {
    /// Proposal model configuration from the environment
    pub fn proposal() -> Self {
        (&config::get().proposal).into()
    }

    /// Grounding model configuration from the environment
    pub fn grounding() -> Self {
        (&config::get().grounding).into()
    }

    /// A configuration for `endpoint` with proposal defaults
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..(&VlmSettings::proposal_defaults()).into()
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }
}

/// Send one chat-completion request with a screenshot and return the answer
pub fn chat_completion(
    config: &VlmConfig,
    system_prompt: Option<&str>,
    text: &str,
    image_png: &[u8],
) -> VlmResult<String> {
    let request = build_request(config, system_prompt, text, image_png);

    let client = Client::builder()
        .timeout(Duration::from_secs(config.timeout))
        .build()?;
    let mut builder = client.post(&config.endpoint).json(&request);
    if let Some(key) = &config.api_key {
        builder = builder.bearer_auth(key);
    }

    debug!("[vlm] POST {} (model {})", config.endpoint, config.model);
    let response = builder.send()?;
    let status = response.status();
    let body = response.text()?;

    if !status.is_success() {
        return Err(VlmError::Status {
            status: status.as_u16(),
            body: truncate(&body, 500),
        });
    }

    let response: Value =
        serde_json::from_str(&body).map_err(|e| VlmError::InvalidResponse(e.to_string()))?;
    extract_content(&response)
}

/// Build the request body: optional system message, then text and image parts
fn build_request(
    config: &VlmConfig,
    system_prompt: Option<&str>,
    text: &str,
    image_png: &[u8],
) -> Value {
    let img_base64 = base64::engine::general_purpose::STANDARD.encode(image_png);

    let mut messages = Vec::new();
    if let Some(system) = system_prompt {
        messages.push(serde_json::json!({ "role": "system", "content": system }));
    }
    messages.push(serde_json::json!({
        "role": "user",
        "content": [
            {
                "type": "text",
                "text": text
            },
            {
                "type": "image_url",
                "image_url": {
                    "url": format!("data:image/png;base64,{}", img_base64)
                }
            }
        ]
    }));

    serde_json::json!({
        "model": config.model,
        "messages": messages,
        "max_tokens": config.max_tokens,
        "temperature": config.temperature
    })
}

/// Extract the answer, falling back to `reasoning_content` for thinking models
fn extract_content(response: &Value) -> VlmResult<String> {
    let message = &response["choices"][0]["message"];
    ["content", "reasoning_content"]
        .iter()
        .filter_map(|key| message[*key].as_str())
        .find(|content| !content.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| VlmError::InvalidResponse("response has no message content".to_string()))
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
