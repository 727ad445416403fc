// ABOUTME: LLM provider abstraction layer for the study chat pipeline
// ABOUTME: Defines providers, message types, the streaming contract and provider selection
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Study Chat Server Contributors

//! # LLM Provider Interface
//!
//! This module defines the contract text providers implement to feed the chat
//! pipeline, plus the pure stages that decide which provider serves a request.
//!
//! ## Key Concepts
//!
//! - **`Provider`**: closed set of upstream provider families
//! - **`ProviderRequest`**: resolved `(provider, model_id)` pair
//! - **`LlmProvider`**: async trait for streaming chat completion
//! - **`CompletionProvider`**: async trait for one-shot completions
//! - **`ImageProvider`**: async trait for single-shot image generation
//!
//! ## Example: Resolving a Model Selector
//!
//! ```rust
//! use study_chat_server::llm::{classifier, resolver, Provider};
//!
//! let request = resolver::resolve(Some("auto"));
//! assert_eq!(request.provider, Provider::Groq);
//!
//! let request = classifier::apply_image_override(request, "image: a red apple");
//! assert_eq!(request.provider, Provider::Qwen);
//! ```

pub mod classifier;
mod gemini;
mod image;
mod openai_compatible;
pub mod prompts;
pub mod resolver;
pub mod sse_parser;

pub use gemini::GeminiProvider;
pub use image::{GeneratedImage, ImageProvider, NvidiaImageProvider, QwenImageProvider};
pub use openai_compatible::{extract_delta, OpenAiCompatibleConfig, OpenAiCompatibleProvider};

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_stream::Stream;

use crate::errors::AppError;

// ============================================================================
// Providers
// ============================================================================

/// Upstream provider families the pipeline can dispatch to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Google Gemini (text, native SSE)
    Gemini,
    /// Groq (text, `OpenAI`-compatible SSE)
    Groq,
    /// `OpenRouter` (text, `OpenAI`-compatible SSE)
    #[serde(rename = "openrouter")]
    OpenRouter,
    /// NVIDIA NIM Stable Diffusion (image)
    Nvidia,
    /// Alibaba `DashScope` Qwen-Image (image)
    Qwen,
}

impl Provider {
    /// Every provider, in resolution order of their defaults
    pub const ALL: [Self; 5] = [
        Self::Gemini,
        Self::Groq,
        Self::OpenRouter,
        Self::Nvidia,
        Self::Qwen,
    ];

    /// Lower-case wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Groq => "groq",
            Self::OpenRouter => "openrouter",
            Self::Nvidia => "nvidia",
            Self::Qwen => "qwen",
        }
    }

    /// Human-readable name used in upstream error messages
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Gemini => "Gemini",
            Self::Groq => "Groq",
            Self::OpenRouter => "OpenRouter",
            Self::Nvidia => "NVIDIA",
            Self::Qwen => "Qwen",
        }
    }

    /// Whether this provider produces a single image instead of a text stream
    #[must_use]
    pub const fn is_image(&self) -> bool {
        matches!(self, Self::Nvidia | Self::Qwen)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved provider and model pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRequest {
    /// Provider family
    pub provider: Provider,
    /// Provider-specific model identifier, never empty
    pub model_id: String,
}

impl ProviderRequest {
    /// Create a provider request
    #[must_use]
    pub fn new(provider: Provider, model_id: impl Into<String>) -> Self {
        Self {
            provider,
            model_id: model_id.into(),
        }
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instruction message
    System,
    /// User input message
    User,
    /// Assistant response message
    Assistant,
}

impl MessageRole {
    /// Convert to string representation for API calls
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single message in a chat conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender
    pub role: MessageRole,
    /// Content of the message
    pub content: String,
}

impl ChatMessage {
    /// Create a new chat message
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Configuration for a chat completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Conversation messages
    pub messages: Vec<ChatMessage>,
    /// Model identifier (provider-specific)
    pub model: Option<String>,
    /// Temperature for response randomness (0.0 - 2.0)
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    /// Create a new chat request with messages
    #[must_use]
    pub const fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            model: None,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set the model to use
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the temperature
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the maximum tokens
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Response from a non-streaming chat completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Generated message content
    pub content: String,
    /// Model used for generation
    pub model: String,
    /// Finish reason (stop, length, etc.)
    pub finish_reason: Option<String>,
}

/// A chunk of a streaming response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Content delta for this chunk
    pub delta: String,
    /// Whether this is the final chunk
    pub is_final: bool,
    /// Finish reason if final
    pub finish_reason: Option<String>,
}

impl StreamChunk {
    /// A content-bearing chunk
    #[must_use]
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            delta: delta.into(),
            is_final: false,
            finish_reason: None,
        }
    }

    /// The terminal chunk emitted on `[DONE]`
    #[must_use]
    pub fn done() -> Self {
        Self {
            delta: String::new(),
            is_final: true,
            finish_reason: Some("stop".to_owned()),
        }
    }
}

/// Stream type for chat completion responses
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, AppError>> + Send>>;

// ============================================================================
// Provider Trait
// ============================================================================

/// Streaming chat provider feeding the pipeline
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Unique provider identifier (e.g., "gemini", "groq")
    fn name(&self) -> &'static str;

    /// Whether a separate system turn is honoured
    ///
    /// Providers that answer `false` receive the system prompt folded into
    /// the user turn.
    fn supports_system_messages(&self) -> bool;

    /// Perform a streaming chat completion
    ///
    /// The upstream request is sent and its status checked before this
    /// returns, so a non-2xx answer surfaces here rather than mid-stream.
    async fn complete_stream(&self, request: &ChatRequest) -> Result<ChatStream, AppError>;
}

/// Non-streaming completion, used for auxiliary prompt rewrites
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Unique provider identifier (e.g., "groq")
    fn name(&self) -> &'static str;

    /// Perform a chat completion (non-streaming)
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, AppError>;
}
