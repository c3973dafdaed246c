//! Completion backend abstraction and implementations.
//!
//! Defines the [`CompletionClient`] trait and concrete backends:
//! - **[`DisabledClient`]** — returns errors; used when no AI provider is
//!   configured. Planning then always falls back to the default plan and
//!   responses to the apology message, so the rest of the pipeline keeps
//!   working.
//! - **[`OpenAiClient`]** — calls the OpenAI chat completions API.
//! - **[`AnthropicClient`]** — calls the Anthropic messages API.
//!
//! Use [`create_client`] to instantiate the backend selected by
//! configuration. No retries: callers get exactly one attempt per turn
//! and handle failure as data, not as a propagated error.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::config::AiConfig;

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// One completion request: an optional system instruction, the user
/// prompt, and a token budget.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
}

/// An opaque text-completion backend.
///
/// Failure kinds (auth, rate limit, network) are collapsed into one
/// error; callers substitute fallbacks rather than distinguishing them.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-4o"`).
    fn model_name(&self) -> &str;

    /// Generates text for the request.
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

/// Instantiates the completion backend selected by `[ai].provider`.
///
/// API keys are read from the environment (`OPENAI_API_KEY` /
/// `ANTHROPIC_API_KEY`), never from the config file.
pub fn create_client(config: &AiConfig) -> Result<Arc<dyn CompletionClient>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledClient)),
        "openai" => {
            let api_key = std::env::var("OPENAI_API_KEY")
                .context("OPENAI_API_KEY must be set for the openai provider")?;
            Ok(Arc::new(OpenAiClient::new(config, api_key)?))
        }
        "anthropic" => {
            let api_key = std::env::var("ANTHROPIC_API_KEY")
                .context("ANTHROPIC_API_KEY must be set for the anthropic provider")?;
            Ok(Arc::new(AnthropicClient::new(config, api_key)?))
        }
        other => bail!("unknown AI provider: '{other}'"),
    }
}

// ============ Disabled backend ============

/// A no-op backend that always errors.
pub struct DisabledClient;

#[async_trait]
impl CompletionClient for DisabledClient {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<String> {
        bail!("AI provider is disabled")
    }
}

// ============ OpenAI backend ============

/// Backend for the OpenAI chat completions API.
pub struct OpenAiClient {
    http: reqwest::Client,
    model: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(config: &AiConfig, api_key: String) -> Result<Self> {
        let model = config
            .model
            .clone()
            .context("ai.model is required for the openai provider")?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, model, api_key })
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));

        let body = json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "messages": messages,
        });

        let response = self
            .http
            .post(OPENAI_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("OpenAI request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {status}: {detail}");
        }

        let payload: Value = response
            .json()
            .await
            .context("invalid JSON from OpenAI")?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .context("OpenAI response missing message content")
    }
}

// ============ Anthropic backend ============

/// Backend for the Anthropic messages API.
pub struct AnthropicClient {
    http: reqwest::Client,
    model: String,
    api_key: String,
}

impl AnthropicClient {
    pub fn new(config: &AiConfig, api_key: String) -> Result<Self> {
        let model = config
            .model
            .clone()
            .context("ai.model is required for the anthropic provider")?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, model, api_key })
    }
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let mut body = json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "messages": [{"role": "user", "content": request.prompt}],
        });
        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }

        let response = self
            .http
            .post(ANTHROPIC_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("Anthropic API error {status}: {detail}");
        }

        let payload: Value = response
            .json()
            .await
            .context("invalid JSON from Anthropic")?;
        payload["content"][0]["text"]
            .as_str()
            .map(str::to_string)
            .context("Anthropic response missing text content")
    }
}
