// ABOUTME: Maps a free-form model selector string to a provider and model id
// ABOUTME: Prefix rules, aliases and heuristics; never fails, unknown input degrades to Gemini
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Study Chat Server Contributors

//! Model/provider resolution
//!
//! Rules are evaluated in order and the first match wins:
//!
//! | Selector | Provider | Model |
//! |---|---|---|
//! | empty / absent | gemini | `gemini-1.5-flash` |
//! | `auto`, `best` | groq | `llama-3.3-70b-versatile` |
//! | `fast` | groq | `llama-3.1-8b-instant` |
//! | `groq:<m>` | groq | `<m>` |
//! | `openrouter:<m>`, `or:<m>` | openrouter | `<m>` |
//! | `nvidia:<m>`, `*stabilityai/stable-diffusion*` | nvidia | `<m>` |
//! | `qwen-image*` | qwen | value |
//! | `openai:<m>` | openrouter | `<m>` |
//! | `gemini:<m>` | gemini | `<m>` |
//! | `llama-3*`, `qwen*`, `*meta-llama/*` | groq | value |
//! | `*/*` | openrouter | value |
//! | anything else | gemini | value |

use super::{Provider, ProviderRequest};
use crate::constants::models;

/// Substring that routes a selector to NVIDIA NIM without a prefix
const STABLE_DIFFUSION_MARKER: &str = "stabilityai/stable-diffusion";

/// Use `remainder` unless it is empty
fn or_default(remainder: &str, default: &str) -> String {
    let remainder = remainder.trim();
    if remainder.is_empty() {
        default.to_owned()
    } else {
        remainder.to_owned()
    }
}

/// Resolve a model selector into a provider and model id
#[must_use]
pub fn resolve(selector: Option<&str>) -> ProviderRequest {
    let value = selector.map(str::trim).unwrap_or_default();

    if value.is_empty() {
        return ProviderRequest::new(Provider::Gemini, models::GEMINI_DEFAULT);
    }

    match value {
        "auto" | "best" => return ProviderRequest::new(Provider::Groq, models::GROQ_DEFAULT),
        "fast" => return ProviderRequest::new(Provider::Groq, models::GROQ_FAST),
        _ => {}
    }

    if let Some(rest) = value.strip_prefix("groq:") {
        return ProviderRequest::new(Provider::Groq, or_default(rest, models::GROQ_DEFAULT));
    }

    if let Some(rest) = value
        .strip_prefix("openrouter:")
        .or_else(|| value.strip_prefix("or:"))
    {
        return ProviderRequest::new(
            Provider::OpenRouter,
            or_default(rest, models::OPENROUTER_DEFAULT),
        );
    }

    if value.starts_with("nvidia:") || value.contains(STABLE_DIFFUSION_MARKER) {
        let rest = value.strip_prefix("nvidia:").unwrap_or(value);
        return ProviderRequest::new(
            Provider::Nvidia,
            or_default(rest, models::NVIDIA_IMAGE_DEFAULT),
        );
    }

    if value.starts_with("qwen-image") {
        return ProviderRequest::new(Provider::Qwen, value);
    }

    if let Some(rest) = value.strip_prefix("openai:") {
        return ProviderRequest::new(
            Provider::OpenRouter,
            or_default(rest, models::OPENAI_VIA_OPENROUTER_DEFAULT),
        );
    }

    if let Some(rest) = value.strip_prefix("gemini:") {
        return ProviderRequest::new(Provider::Gemini, or_default(rest, models::GEMINI_DEFAULT));
    }

    if value.starts_with("llama-3") || value.starts_with("qwen") || value.contains("meta-llama/")
    {
        return ProviderRequest::new(Provider::Groq, value);
    }

    // Generic "vendor/model" shape, e.g. moonshotai/kimi-k2
    if value.contains('/') {
        return ProviderRequest::new(Provider::OpenRouter, value);
    }

    ProviderRequest::new(Provider::Gemini, value)
}
