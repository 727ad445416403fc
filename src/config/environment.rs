// ABOUTME: Environment-based configuration for the study chat server
// ABOUTME: Loads ports, database URL, auth secret, provider credentials and endpoint overrides
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Study Chat Server Contributors

//! Environment configuration
//!
//! Provider credentials are optional at startup: a missing key only fails the
//! requests that resolve to that provider, with a 500 naming the variable.

use std::env;
use std::fmt;

use crate::constants::{endpoints, env_vars, ports};
use crate::errors::{AppError, AppResult};
use crate::llm::Provider;

/// Default `SQLite` database location
const DEFAULT_DATABASE_URL: &str = "sqlite:./data/study_chat.db";

/// Read an environment variable, treating empty values as unset
fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Read an environment variable with a default
fn env_var_or(key: &str, default: &str) -> String {
    non_empty_env(key).unwrap_or_else(|| default.to_owned())
}

/// API keys for the hosted providers, one per provider family
#[derive(Clone, Default)]
pub struct ProviderCredentials {
    /// `GROQ_API_KEY`
    pub groq_api_key: Option<String>,
    /// `OPENROUTER_API_KEY`
    pub openrouter_api_key: Option<String>,
    /// `OPENROUTER_SITE_URL`, sent as `HTTP-Referer` for attribution
    pub openrouter_site_url: Option<String>,
    /// `OPENROUTER_APP_NAME`, sent as `X-Title` for attribution
    pub openrouter_app_name: Option<String>,
    /// `GEMINI_API_KEY`
    pub gemini_api_key: Option<String>,
    /// `NVIDIA_API_KEY`
    pub nvidia_api_key: Option<String>,
    /// `ALIBABA_MODEL_API_KEY` (`DashScope`)
    pub alibaba_api_key: Option<String>,
}

impl ProviderCredentials {
    /// Load every provider key from the environment
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            groq_api_key: non_empty_env(env_vars::GROQ_API_KEY),
            openrouter_api_key: non_empty_env(env_vars::OPENROUTER_API_KEY),
            openrouter_site_url: non_empty_env(env_vars::OPENROUTER_SITE_URL),
            openrouter_app_name: non_empty_env(env_vars::OPENROUTER_APP_NAME),
            gemini_api_key: non_empty_env(env_vars::GEMINI_API_KEY),
            nvidia_api_key: non_empty_env(env_vars::NVIDIA_API_KEY),
            alibaba_api_key: non_empty_env(env_vars::ALIBABA_MODEL_API_KEY),
        }
    }

    /// Environment variable holding the key for a provider
    #[must_use]
    pub const fn env_var_for(provider: Provider) -> &'static str {
        match provider {
            Provider::Gemini => env_vars::GEMINI_API_KEY,
            Provider::Groq => env_vars::GROQ_API_KEY,
            Provider::OpenRouter => env_vars::OPENROUTER_API_KEY,
            Provider::Nvidia => env_vars::NVIDIA_API_KEY,
            Provider::Qwen => env_vars::ALIBABA_MODEL_API_KEY,
        }
    }

    /// Key for a provider, if configured
    #[must_use]
    pub fn key_for(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Gemini => self.gemini_api_key.as_deref(),
            Provider::Groq => self.groq_api_key.as_deref(),
            Provider::OpenRouter => self.openrouter_api_key.as_deref(),
            Provider::Nvidia => self.nvidia_api_key.as_deref(),
            Provider::Qwen => self.alibaba_api_key.as_deref(),
        }
    }

    /// Key for a provider, or a configuration error naming the variable
    ///
    /// # Errors
    ///
    /// Returns `ConfigMissing` when the provider's key is not configured
    pub fn require(&self, provider: Provider) -> AppResult<&str> {
        self.key_for(provider)
            .ok_or_else(|| AppError::missing_credentials(Self::env_var_for(provider)))
    }

    /// Configured providers, for the startup summary
    #[must_use]
    pub fn configured(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|p| self.key_for(*p).is_some())
            .collect()
    }
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("configured", &self.configured())
            .field("openrouter_site_url", &self.openrouter_site_url)
            .field("openrouter_app_name", &self.openrouter_app_name)
            .finish_non_exhaustive()
    }
}

/// Upstream base URLs; overridable for self-hosted gateways and tests
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    /// Groq `OpenAI`-compatible base URL
    pub groq: String,
    /// `OpenRouter` `OpenAI`-compatible base URL
    pub openrouter: String,
    /// Gemini base URL
    pub gemini: String,
    /// NVIDIA NIM image generation base URL
    pub nvidia: String,
    /// `DashScope` base URL
    pub dashscope: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            groq: endpoints::GROQ_API_BASE.to_owned(),
            openrouter: endpoints::OPENROUTER_API_BASE.to_owned(),
            gemini: endpoints::GEMINI_API_BASE.to_owned(),
            nvidia: endpoints::NVIDIA_GENAI_BASE.to_owned(),
            dashscope: endpoints::DASHSCOPE_API_BASE.to_owned(),
        }
    }
}

impl ProviderEndpoints {
    /// Load endpoint overrides from the environment
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            groq: env_var_or(env_vars::GROQ_BASE_URL, endpoints::GROQ_API_BASE),
            openrouter: env_var_or(env_vars::OPENROUTER_BASE_URL, endpoints::OPENROUTER_API_BASE),
            gemini: env_var_or(env_vars::GEMINI_BASE_URL, endpoints::GEMINI_API_BASE),
            nvidia: env_var_or(env_vars::NVIDIA_BASE_URL, endpoints::NVIDIA_GENAI_BASE),
            dashscope: env_var_or(env_vars::DASHSCOPE_BASE_URL, endpoints::DASHSCOPE_API_BASE),
        }
    }

    /// Point every provider at one base URL (mock servers)
    #[must_use]
    pub fn all_at(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            groq: format!("{base}/groq"),
            openrouter: format!("{base}/openrouter"),
            gemini: format!("{base}/gemini"),
            nvidia: format!("{base}/nvidia"),
            dashscope: format!("{base}/dashscope"),
        }
    }
}

/// Top-level server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// HTTP listen port
    pub http_port: u16,
    /// Database connection string
    pub database_url: String,
    /// Secret used to verify identity-provider bearer tokens (HS256)
    pub jwt_secret: String,
    /// Provider API keys
    pub credentials: ProviderCredentials,
    /// Provider base URLs
    pub endpoints: ProviderEndpoints,
}

impl ServerConfig {
    /// Build a configuration with no provider keys and default endpoints
    #[must_use]
    pub fn new(database_url: impl Into<String>, jwt_secret: impl Into<String>) -> Self {
        Self {
            http_port: ports::DEFAULT_HTTP_PORT,
            database_url: database_url.into(),
            jwt_secret: jwt_secret.into(),
            credentials: ProviderCredentials::default(),
            endpoints: ProviderEndpoints::default(),
        }
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if `AUTH_JWT_SECRET` is missing or `HTTP_PORT` is not a valid port
    pub fn from_env() -> AppResult<Self> {
        let http_port = match non_empty_env(env_vars::HTTP_PORT) {
            Some(raw) => raw.parse::<u16>().map_err(|e| {
                AppError::config(format!("Invalid {}: {raw} ({e})", env_vars::HTTP_PORT))
            })?,
            None => ports::DEFAULT_HTTP_PORT,
        };

        let jwt_secret = non_empty_env(env_vars::AUTH_JWT_SECRET)
            .ok_or_else(|| AppError::missing_credentials(env_vars::AUTH_JWT_SECRET))?;

        Ok(Self {
            http_port,
            database_url: env_var_or(env_vars::DATABASE_URL, DEFAULT_DATABASE_URL),
            jwt_secret,
            credentials: ProviderCredentials::from_env(),
            endpoints: ProviderEndpoints::from_env(),
        })
    }

    /// Human-readable summary for startup logs (no secrets)
    #[must_use]
    pub fn summary(&self) -> String {
        let configured = self.credentials.configured();
        let providers = if configured.is_empty() {
            "none".to_owned()
        } else {
            configured
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };

        format!(
            "Study Chat Server Configuration:\n\
             - HTTP Port: {}\n\
             - Database: {}\n\
             - Providers with credentials: {providers}",
            self.http_port,
            if self.database_url.contains(":memory:") {
                "SQLite (in-memory)"
            } else {
                "SQLite"
            },
        )
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_port", &self.http_port)
            .field("database_url", &self.database_url)
            .field("jwt_secret", &"[REDACTED]")
            .field("credentials", &self.credentials)
            .field("endpoints", &self.endpoints)
            .finish()
    }
}
