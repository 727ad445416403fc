// ABOUTME: OpenAI-compatible chat completion provider used for Groq and OpenRouter
// ABOUTME: Streams chat/completions over SSE and serves non-streaming prompt-rewrite calls
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Study Chat Server Contributors

//! # `OpenAI`-Compatible Provider
//!
//! Groq and `OpenRouter` both expose the `OpenAI` chat completions API, so one
//! implementation serves both; they differ only in base URL, default model and
//! the attribution headers `OpenRouter` accepts.
//!
//! ## Example
//!
//! ```rust,no_run
//! use study_chat_server::llm::{
//!     ChatMessage, ChatRequest, CompletionProvider, OpenAiCompatibleConfig,
//!     OpenAiCompatibleProvider,
//! };
//! use study_chat_server::errors::AppError;
//!
//! async fn example(client: reqwest::Client) -> Result<(), AppError> {
//!     let config = OpenAiCompatibleConfig::groq("https://api.groq.com/openai/v1", "gsk_...");
//!     let provider = OpenAiCompatibleProvider::new(config, client);
//!     let request = ChatRequest::new(vec![ChatMessage::user("What is osmosis?")]);
//!     let response = provider.complete(&request).await?;
//!     println!("{}", response.content);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, instrument};

use super::sse_parser::create_sse_stream;
use super::{
    ChatMessage, ChatRequest, ChatResponse, ChatStream, CompletionProvider, LlmProvider, Provider,
    StreamChunk,
};
use crate::constants::models;
use crate::errors::AppError;

// ============================================================================
// API Request/Response Types (OpenAI-compatible format)
// ============================================================================

/// OpenAI-compatible API request structure
#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// Message structure for OpenAI-compatible API
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

impl From<&ChatMessage> for OpenAiMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role.as_str().to_owned(),
            content: msg.content.clone(),
        }
    }
}

/// OpenAI-compatible API response structure
#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    model: Option<String>,
}

/// Choice in response
#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

/// Message in response
#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

/// Error response structure
#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiErrorDetail,
}

/// Error detail structure
#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

/// Extract the text increment from one streaming payload
///
/// Returns `choices[0].delta.content` when it is a non-empty string. Payloads
/// that are not JSON, or carry no content (role-only first deltas, usage
/// trailers), yield `None`.
#[must_use]
pub fn extract_delta(payload: &str) -> Option<String> {
    let value: Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "Skipping unparseable stream payload");
            return None;
        }
    };

    value
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .filter(|content| !content.is_empty())
        .map(ToOwned::to_owned)
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// Configuration for an `OpenAI`-compatible provider
#[derive(Clone)]
pub struct OpenAiCompatibleConfig {
    /// Provider family this configuration targets
    pub provider: Provider,
    /// Base URL for the API (e.g., <https://api.groq.com/openai/v1>)
    pub base_url: String,
    /// Bearer API key
    pub api_key: String,
    /// Default model to use
    pub default_model: String,
    /// Extra headers sent with every request (attribution)
    pub extra_headers: Vec<(&'static str, String)>,
}

impl OpenAiCompatibleConfig {
    /// Configuration for Groq
    #[must_use]
    pub fn groq(base_url: &str, api_key: &str) -> Self {
        Self {
            provider: Provider::Groq,
            base_url: base_url.to_owned(),
            api_key: api_key.to_owned(),
            default_model: models::GROQ_DEFAULT.to_owned(),
            extra_headers: Vec::new(),
        }
    }

    /// Configuration for `OpenRouter`, with optional attribution headers
    #[must_use]
    pub fn openrouter(
        base_url: &str,
        api_key: &str,
        site_url: Option<&str>,
        app_name: Option<&str>,
    ) -> Self {
        let mut extra_headers = Vec::new();
        if let Some(site_url) = site_url {
            extra_headers.push(("HTTP-Referer", site_url.to_owned()));
        }
        if let Some(app_name) = app_name {
            extra_headers.push(("X-Title", app_name.to_owned()));
        }

        Self {
            provider: Provider::OpenRouter,
            base_url: base_url.to_owned(),
            api_key: api_key.to_owned(),
            default_model: models::OPENROUTER_DEFAULT.to_owned(),
            extra_headers,
        }
    }
}

impl std::fmt::Debug for OpenAiCompatibleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("default_model", &self.default_model)
            .field("extra_headers", &self.extra_headers)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Provider Implementation
// ============================================================================

/// `OpenAI`-compatible LLM provider
pub struct OpenAiCompatibleProvider {
    client: Client,
    config: OpenAiCompatibleConfig,
}

impl OpenAiCompatibleProvider {
    /// Create a provider sharing an existing HTTP client
    #[must_use]
    pub const fn new(config: OpenAiCompatibleConfig, client: Client) -> Self {
        Self { client, config }
    }

    /// Build the API URL for a given endpoint
    fn api_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint
        )
    }

    /// Build the JSON body for a request
    fn build_request(&self, request: &ChatRequest, stream: bool) -> OpenAiRequest {
        OpenAiRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.config.default_model.clone()),
            messages: request.messages.iter().map(OpenAiMessage::from).collect(),
            stream,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }

    /// Bearer auth plus any attribution headers
    fn add_headers(&self, request: RequestBuilder) -> RequestBuilder {
        self.config.extra_headers.iter().fold(
            request.bearer_auth(&self.config.api_key),
            |request, (name, value)| request.header(*name, value),
        )
    }

    /// POST to chat/completions and fail on non-2xx
    async fn send(&self, body: &OpenAiRequest) -> Result<reqwest::Response, AppError> {
        let service = self.config.provider.display_name();
        let http_request = self
            .client
            .post(self.api_url("chat/completions"))
            .header("Content-Type", "application/json")
            .json(body);

        let response = self.add_headers(http_request).send().await.map_err(|e| {
            error!(provider = service, error = %e, "Failed to send chat completion request");
            AppError::external_service(service, format!("Failed to connect: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::parse_error_response(service, status, &body));
        }
        Ok(response)
    }

    /// Map a non-2xx upstream answer to an error carrying its status text and body
    fn parse_error_response(service: &str, status: StatusCode, body: &str) -> AppError {
        let status_text = status
            .canonical_reason()
            .map_or_else(|| status.as_str().to_owned(), ToOwned::to_owned);

        error!(
            provider = service,
            status = status.as_u16(),
            body = %body.chars().take(500).collect::<String>(),
            "Upstream chat completion failed"
        );

        let error = if status == StatusCode::UNAUTHORIZED {
            let message = serde_json::from_str::<OpenAiErrorResponse>(body)
                .map_or_else(|_| status_text.clone(), |r| r.error.message);
            AppError::external_auth(service, message)
        } else {
            AppError::external_service(service, status_text)
        };

        if body.is_empty() {
            error
        } else {
            error.with_details(body)
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &'static str {
        self.config.provider.as_str()
    }

    #[instrument(skip(self, request), fields(provider = %self.config.provider, model = %request.model.as_deref().unwrap_or(&self.config.default_model)))]
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, AppError> {
        let service = self.config.provider.display_name();
        let body = self.build_request(request, false);
        let response = self.send(&body).await?;

        let text = response.text().await.map_err(|e| {
            AppError::external_service(service, format!("Failed to read response: {e}"))
        })?;
        let parsed: OpenAiResponse = serde_json::from_str(&text).map_err(|e| {
            AppError::external_service(service, format!("Failed to parse response: {e}"))
        })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::external_service(service, "API returned no choices"))?;

        let content = choice.message.content.unwrap_or_default();
        debug!(
            chars = content.len(),
            finish_reason = ?choice.finish_reason,
            "Received chat completion"
        );

        Ok(ChatResponse {
            content,
            model: parsed.model.unwrap_or(body.model),
            finish_reason: choice.finish_reason,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &'static str {
        self.config.provider.as_str()
    }

    fn supports_system_messages(&self) -> bool {
        true
    }

    #[instrument(skip(self, request), fields(provider = %self.config.provider, model = %request.model.as_deref().unwrap_or(&self.config.default_model)))]
    async fn complete_stream(&self, request: &ChatRequest) -> Result<ChatStream, AppError> {
        let body = self.build_request(request, true);
        let response = self.send(&body).await?;
        debug!("Upstream stream opened");

        Ok(create_sse_stream(
            response.bytes_stream(),
            |payload| extract_delta(payload).map(|delta| Ok(StreamChunk::text(delta))),
            self.config.provider.display_name(),
        ))
    }
}
