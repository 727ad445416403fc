// ABOUTME: Builds the prompt sent to image providers from a raw student request
// ABOUTME: Auxiliary LLM rewrite with deterministic fallbacks when the rewrite fails
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Study Chat Server Contributors

//! Image prompt preparation
//!
//! Failures here are never surfaced to the student: every path ends with
//! some usable prompt.
//!
//! - NVIDIA: one rewrite call on Groq. Fallback strips command phrasing from
//!   the message, then the latest prior student message, then the raw message.
//! - Qwen: the same rewrite on Groq and `OpenRouter` concurrently, Groq
//!   preferred. Fallback is the opening of the latest tutor answer, then a
//!   long enough student message, then a generic prompt.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::constants::{limits, models};
use crate::llm::prompts::{build_rewrite_request, NVIDIA_PROMPT_REWRITE, QWEN_PROMPT_REWRITE};
use crate::llm::{ChatMessage, ChatRequest, CompletionProvider, MessageRole};

/// Used when nothing in the conversation can serve as a prompt
pub const GENERIC_IMAGE_PROMPT: &str =
    "A clear, well-labeled educational illustration on a plain white background";

/// Explicit command prefixes (`image:`, `/image`, ...)
static COMMAND_PREFIX: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:generate\s+image\s*:|image\s*:|img\s*:|/image\b)\s*").ok()
});

/// Conversational command phrasing ("can you draw me a picture of")
static COMMAND_PHRASE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:please\s+)?(?:(?:can|could|would)\s+you\s+)?(?:generate|genearte|create|make|draw|show|provide|give)(?:\s+me)?\s+(?:an?\s+|the\s+|some\s+)?(?:image|picture|photo|diagram|illustration|img)s?(?:\s+(?:of|showing|about|for|that\s+shows))?\b",
    )
    .ok()
});

/// Sentences ending in terminal punctuation
static SENTENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[^.!?]+[.!?]+").ok());

/// Strip command phrasing from an image request
#[must_use]
pub fn strip_command_phrasing(message: &str) -> String {
    let mut cleaned = message.to_owned();
    for pattern in [&COMMAND_PREFIX, &COMMAND_PHRASE]
        .into_iter()
        .filter_map(|p| p.as_ref())
    {
        cleaned = pattern.replace_all(&cleaned, " ").into_owned();
    }
    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ':' | '?' | '!'))
        .to_owned()
}

/// Tidy a rewrite result: trim, drop a `Prompt:` label and wrapping quotes
#[must_use]
pub fn clean_rewrite_output(raw: &str) -> String {
    let trimmed = raw.trim();
    let unlabeled = ["Prompt:", "prompt:", "PROMPT:"]
        .iter()
        .find_map(|label| trimmed.strip_prefix(label))
        .unwrap_or(trimmed)
        .trim();
    unlabeled
        .trim_matches(|c| matches!(c, '"' | '\'' | '`'))
        .trim()
        .to_owned()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect::<String>().trim().to_owned()
}

/// Up to two leading sentences of a text, capped in length
#[must_use]
pub fn leading_sentences(text: &str) -> String {
    let text = text.trim();
    let excerpt = SENTENCE
        .as_ref()
        .map(|re| {
            re.find_iter(text)
                .take(2)
                .map(|m| m.as_str().trim())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| text.to_owned());
    truncate_chars(&excerpt, limits::MAX_ASSISTANT_EXCERPT_CHARS)
}

fn last_with_role(history: &[ChatMessage], role: MessageRole) -> Option<&str> {
    history
        .iter()
        .rev()
        .find(|m| m.role == role && !m.content.trim().is_empty())
        .map(|m| m.content.trim())
}

/// Deterministic NVIDIA fallback
#[must_use]
pub fn nvidia_fallback(message: &str, history: &[ChatMessage]) -> String {
    let cleaned = strip_command_phrasing(message);
    if cleaned.chars().count() >= limits::MIN_FALLBACK_PROMPT_CHARS {
        return cleaned;
    }
    last_with_role(history, MessageRole::User)
        .map_or_else(|| message.trim().to_owned(), ToOwned::to_owned)
}

/// Deterministic Qwen fallback
#[must_use]
pub fn qwen_fallback(message: &str, history: &[ChatMessage]) -> String {
    if let Some(answer) = last_with_role(history, MessageRole::Assistant) {
        let excerpt = leading_sentences(answer);
        if !excerpt.is_empty() {
            return excerpt;
        }
    }

    let long_enough =
        |text: &str| text.chars().count() >= limits::MIN_REUSABLE_USER_MESSAGE_CHARS;

    let current = strip_command_phrasing(message);
    if long_enough(&current) {
        return current;
    }

    history
        .iter()
        .rev()
        .filter(|m| m.role == MessageRole::User)
        .map(|m| m.content.trim())
        .find(|content| long_enough(content))
        .map_or_else(|| GENERIC_IMAGE_PROMPT.to_owned(), ToOwned::to_owned)
}

/// Auxiliary prompt-rewrite clients
///
/// A client is `None` when its provider has no API key; that leg then counts
/// as failed and the fallbacks apply.
pub struct PromptRewriter {
    groq: Option<Box<dyn CompletionProvider>>,
    openrouter: Option<Box<dyn CompletionProvider>>,
}

impl PromptRewriter {
    /// Create a rewriter from the available auxiliary providers
    #[must_use]
    pub fn new(
        groq: Option<Box<dyn CompletionProvider>>,
        openrouter: Option<Box<dyn CompletionProvider>>,
    ) -> Self {
        Self { groq, openrouter }
    }

    /// One rewrite call; `None` on failure or output shorter than `min_chars`
    async fn rewrite(
        provider: Option<&dyn CompletionProvider>,
        model: &str,
        instructions: &str,
        history: &[ChatMessage],
        message: &str,
        min_chars: usize,
    ) -> Option<String> {
        let provider = provider?;
        let request = ChatRequest::new(vec![
            ChatMessage::system(instructions),
            ChatMessage::user(build_rewrite_request(history, message)),
        ])
        .with_model(model)
        .with_temperature(0.7)
        .with_max_tokens(300);

        match provider.complete(&request).await {
            Ok(response) => {
                let prompt = clean_rewrite_output(&response.content);
                if prompt.chars().count() >= min_chars {
                    Some(prompt)
                } else {
                    warn!(
                        provider = provider.name(),
                        chars = prompt.chars().count(),
                        "Prompt rewrite too short"
                    );
                    None
                }
            }
            Err(e) => {
                warn!(provider = provider.name(), error = %e, "Prompt rewrite failed");
                None
            }
        }
    }

    /// Prompt for NVIDIA Stable Diffusion
    pub async fn prompt_for_nvidia(&self, message: &str, history: &[ChatMessage]) -> String {
        let rewritten = Self::rewrite(
            self.groq.as_deref(),
            models::PROMPT_REWRITE_GROQ,
            NVIDIA_PROMPT_REWRITE,
            history,
            message,
            limits::MIN_FALLBACK_PROMPT_CHARS,
        )
        .await;

        rewritten.unwrap_or_else(|| {
            let fallback = nvidia_fallback(message, history);
            debug!(prompt = %fallback, "Using fallback NVIDIA prompt");
            fallback
        })
    }

    /// Prompt for Qwen-Image
    pub async fn prompt_for_qwen(&self, message: &str, history: &[ChatMessage]) -> String {
        let (groq, openrouter) = tokio::join!(
            Self::rewrite(
                self.groq.as_deref(),
                models::PROMPT_REWRITE_GROQ,
                QWEN_PROMPT_REWRITE,
                history,
                message,
                limits::MIN_OPTIMIZED_PROMPT_CHARS,
            ),
            Self::rewrite(
                self.openrouter.as_deref(),
                models::PROMPT_REWRITE_OPENROUTER,
                QWEN_PROMPT_REWRITE,
                history,
                message,
                limits::MIN_OPTIMIZED_PROMPT_CHARS,
            ),
        );

        groq.or(openrouter).unwrap_or_else(|| {
            let fallback = qwen_fallback(message, history);
            debug!(prompt = %fallback, "Using fallback Qwen prompt");
            fallback
        })
    }
}
