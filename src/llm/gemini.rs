// ABOUTME: Google Gemini provider with SSE streaming via streamGenerateContent
// ABOUTME: Shares the SSE frame parser with the OpenAI-compatible providers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Study Chat Server Contributors

//! # Gemini Provider
//!
//! Implementation of the `LlmProvider` trait for Google's Gemini models.
//! Streaming uses `streamGenerateContent?alt=sse`, whose body is ordinary SSE
//! with one `GenerateContentResponse` JSON object per frame. System prompts
//! are not sent separately; callers fold them into the user turn.

use std::fmt::{Debug, Formatter, Result as FmtResult};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use super::sse_parser::create_sse_stream;
use super::{ChatMessage, ChatRequest, ChatStream, LlmProvider, MessageRole, StreamChunk};
use crate::constants::models;
use crate::errors::AppError;

/// Provider name used in error messages
const SERVICE_NAME: &str = "Gemini";

// ============================================================================
// API Request/Response Types
// ============================================================================

/// Gemini API request structure
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

/// Content block (one conversational turn)
#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    role: Option<String>,
    parts: Vec<ContentPart>,
}

/// A text part
#[derive(Debug, Serialize, Deserialize)]
struct ContentPart {
    #[serde(default)]
    text: Option<String>,
}

/// Generation configuration
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

/// Gemini API response structure (also one streaming frame)
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<GeminiError>,
}

/// Response candidate
#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<GeminiContent>,
}

/// API error response from Gemini
#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

impl GeminiResponse {
    /// Concatenated text of the first candidate's parts
    fn text(&self) -> Option<String> {
        let parts = &self.candidates.as_ref()?.first()?.content.as_ref()?.parts;
        let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        (!text.is_empty()).then_some(text)
    }
}

/// Extract the text increment from one Gemini streaming payload
#[must_use]
pub fn extract_gemini_text(payload: &str) -> Option<String> {
    match serde_json::from_str::<GeminiResponse>(payload) {
        Ok(frame) => frame.text(),
        Err(e) => {
            debug!(error = %e, "Skipping unparseable Gemini stream payload");
            None
        }
    }
}

// ============================================================================
// Provider Implementation
// ============================================================================

/// Google Gemini LLM provider
pub struct GeminiProvider {
    api_key: String,
    base_url: String,
    client: Client,
    default_model: String,
}

impl GeminiProvider {
    /// Create a provider sharing an existing HTTP client
    #[must_use]
    pub fn new(base_url: &str, api_key: &str, client: Client) -> Self {
        Self {
            api_key: api_key.to_owned(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            client,
            default_model: models::GEMINI_DEFAULT.to_owned(),
        }
    }

    /// Convert our role to Gemini's role
    const fn convert_role(role: MessageRole) -> &'static str {
        match role {
            MessageRole::System | MessageRole::User => "user",
            MessageRole::Assistant => "model",
        }
    }

    /// Build the API URL for a model and method
    fn build_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{model}:{method}", self.base_url)
    }

    /// Convert chat messages to Gemini turns
    fn convert_messages(messages: &[ChatMessage]) -> Vec<GeminiContent> {
        messages
            .iter()
            .map(|message| GeminiContent {
                role: Some(Self::convert_role(message.role).to_owned()),
                parts: vec![ContentPart {
                    text: Some(message.content.clone()),
                }],
            })
            .collect()
    }

    /// Build a Gemini API request from a `ChatRequest`
    fn build_gemini_request(request: &ChatRequest) -> GeminiRequest {
        let contents = Self::convert_messages(&request.messages);

        let generation_config = (request.temperature.is_some() || request.max_tokens.is_some())
            .then(|| GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            });

        GeminiRequest {
            contents,
            generation_config,
        }
    }

    /// POST a request and fail on non-2xx
    async fn send(
        &self,
        url: &str,
        query: &[(&str, &str)],
        request: &ChatRequest,
    ) -> Result<reqwest::Response, AppError> {
        let response = self
            .client
            .post(url)
            .query(query)
            .query(&[("key", self.api_key.as_str())])
            .json(&Self::build_gemini_request(request))
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to send request to Gemini");
                AppError::external_service(SERVICE_NAME, format!("Failed to connect: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_api_error(status, &body));
        }
        Ok(response)
    }

    /// Map a non-2xx answer to an error carrying the status text and body
    fn map_api_error(status: reqwest::StatusCode, body: &str) -> AppError {
        let message = serde_json::from_str::<GeminiResponse>(body)
            .ok()
            .and_then(|r| r.error)
            .map_or_else(
                || {
                    status
                        .canonical_reason()
                        .unwrap_or("Upstream error")
                        .to_owned()
                },
                |e| e.message,
            );

        error!(status = status.as_u16(), error = %message, "Gemini API error");

        let error = AppError::external_service(SERVICE_NAME, message);
        if body.is_empty() {
            error
        } else {
            error.with_details(body)
        }
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn supports_system_messages(&self) -> bool {
        false
    }

    #[instrument(skip(self, request), fields(model = %request.model.as_deref().unwrap_or(&self.default_model)))]
    async fn complete_stream(&self, request: &ChatRequest) -> Result<ChatStream, AppError> {
        let model = request.model.as_deref().unwrap_or(&self.default_model);
        let url = self.build_url(model, "streamGenerateContent");
        let response = self.send(&url, &[("alt", "sse")], request).await?;
        debug!("Gemini stream opened");

        Ok(create_sse_stream(
            response.bytes_stream(),
            |payload| extract_gemini_text(payload).map(|text| Ok(StreamChunk::text(text))),
            SERVICE_NAME,
        ))
    }
}

impl Debug for GeminiProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("GeminiProvider")
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_gemini_text_joins_parts() {
        let payload = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Cells "},{"text":"divide"}]}}]}"#;
        assert_eq!(extract_gemini_text(payload).as_deref(), Some("Cells divide"));
    }

    #[test]
    fn test_extract_gemini_text_skips_metadata_frames() {
        let payload = r#"{"candidates":[{"finishReason":"STOP"}],"usageMetadata":{"totalTokenCount":12}}"#;
        assert_eq!(extract_gemini_text(payload), None);
        assert_eq!(extract_gemini_text("{oops"), None);
    }

    #[test]
    fn test_request_maps_roles_to_turns() {
        let request = ChatRequest::new(vec![
            ChatMessage::user("What is a cell?"),
            ChatMessage::assistant("The basic unit of life."),
        ]);
        let body = serde_json::to_value(GeminiProvider::build_gemini_request(&request))
            .unwrap_or_default();
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][1]["parts"][0]["text"], "The basic unit of life.");
        assert!(body.get("systemInstruction").is_none());
        assert!(body.get("generationConfig").is_none());
    }
}
