// ABOUTME: Constants module with domain-separated organization
// ABOUTME: Provider defaults, environment variable names, endpoints and limits
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Study Chat Server Contributors

//! Constants module
//!
//! Constants are grouped into logical domains rather than being in a single
//! flat namespace.

/// Environment variable names read at startup
pub mod env_vars {
    /// Groq API key
    pub const GROQ_API_KEY: &str = "GROQ_API_KEY";
    /// `OpenRouter` API key
    pub const OPENROUTER_API_KEY: &str = "OPENROUTER_API_KEY";
    /// `OpenRouter` attribution: site URL sent as `HTTP-Referer`
    pub const OPENROUTER_SITE_URL: &str = "OPENROUTER_SITE_URL";
    /// `OpenRouter` attribution: application name sent as `X-Title`
    pub const OPENROUTER_APP_NAME: &str = "OPENROUTER_APP_NAME";
    /// Google Gemini API key
    pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";
    /// NVIDIA NIM API key
    pub const NVIDIA_API_KEY: &str = "NVIDIA_API_KEY";
    /// Alibaba `DashScope` API key (Qwen-Image)
    pub const ALIBABA_MODEL_API_KEY: &str = "ALIBABA_MODEL_API_KEY";

    /// Base URL override for Groq
    pub const GROQ_BASE_URL: &str = "GROQ_BASE_URL";
    /// Base URL override for `OpenRouter`
    pub const OPENROUTER_BASE_URL: &str = "OPENROUTER_BASE_URL";
    /// Base URL override for Gemini
    pub const GEMINI_BASE_URL: &str = "GEMINI_BASE_URL";
    /// Base URL override for NVIDIA NIM image generation
    pub const NVIDIA_BASE_URL: &str = "NVIDIA_BASE_URL";
    /// Base URL override for `DashScope`
    pub const DASHSCOPE_BASE_URL: &str = "DASHSCOPE_BASE_URL";

    /// HTTP listen port
    pub const HTTP_PORT: &str = "HTTP_PORT";
    /// Database connection string
    pub const DATABASE_URL: &str = "DATABASE_URL";
    /// Shared secret used to verify identity-provider bearer tokens
    pub const AUTH_JWT_SECRET: &str = "AUTH_JWT_SECRET";
}

/// Default model identifiers per provider
pub mod models {
    /// Gemini default (also the resolver's fallback)
    pub const GEMINI_DEFAULT: &str = "gemini-1.5-flash";
    /// Groq default, target of the `auto` and `best` aliases
    pub const GROQ_DEFAULT: &str = "llama-3.3-70b-versatile";
    /// Groq fast model, target of the `fast` alias
    pub const GROQ_FAST: &str = "llama-3.1-8b-instant";
    /// `OpenRouter` default
    pub const OPENROUTER_DEFAULT: &str = "openai/gpt-oss-20b:free";
    /// Default for `openai:` selectors, routed through `OpenRouter`
    pub const OPENAI_VIA_OPENROUTER_DEFAULT: &str = "openai/gpt-4o";
    /// NVIDIA NIM image model
    pub const NVIDIA_IMAGE_DEFAULT: &str = "stabilityai/stable-diffusion-3.5-large";
    /// `DashScope` image model
    pub const QWEN_IMAGE_DEFAULT: &str = "qwen-image-plus";
    /// Auxiliary prompt-rewrite model on Groq
    pub const PROMPT_REWRITE_GROQ: &str = "llama-3.3-70b-versatile";
    /// Auxiliary prompt-rewrite model on `OpenRouter` (same family as the Groq one)
    pub const PROMPT_REWRITE_OPENROUTER: &str = "meta-llama/llama-3.3-70b-instruct:free";
}

/// Default upstream base URLs
pub mod endpoints {
    /// Groq `OpenAI`-compatible API
    pub const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";
    /// `OpenRouter` `OpenAI`-compatible API
    pub const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
    /// Gemini generative language API
    pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
    /// NVIDIA NIM hosted image generation
    pub const NVIDIA_GENAI_BASE: &str = "https://ai.api.nvidia.com/v1/genai";
    /// Alibaba `DashScope` (international)
    pub const DASHSCOPE_API_BASE: &str = "https://dashscope-intl.aliyuncs.com/api/v1";

    /// Health check endpoint
    pub const HEALTH_CHECK: &str = "/health";
    /// API base path
    pub const API_BASE: &str = "/api";
}

/// Chat pipeline limits
pub mod limits {
    /// Number of stored messages used as conversational context
    pub const HISTORY_CONTEXT_MESSAGES: i64 = 10;
    /// Maximum accepted request body size in bytes
    pub const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;
    /// Connect timeout for upstream providers
    pub const UPSTREAM_CONNECT_TIMEOUT_SECS: u64 = 30;
    /// Cleaned fallback prompts shorter than this are considered degenerate
    pub const MIN_FALLBACK_PROMPT_CHARS: usize = 3;
    /// Rewritten image prompts shorter than this are considered unusable
    pub const MIN_OPTIMIZED_PROMPT_CHARS: usize = 12;
    /// Prior user messages at least this long are reused as image prompts
    pub const MIN_REUSABLE_USER_MESSAGE_CHARS: usize = 20;
    /// Cap on the assistant excerpt reused as an image prompt
    pub const MAX_ASSISTANT_EXCERPT_CHARS: usize = 300;
}

/// Network ports
pub mod ports {
    /// Default HTTP port
    pub const DEFAULT_HTTP_PORT: u16 = 8081;
}

/// Service names used in logs and the health endpoint
pub mod service_names {
    /// This service
    pub const STUDY_CHAT_SERVER: &str = "study-chat-server";
}
