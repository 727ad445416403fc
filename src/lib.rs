// ABOUTME: Main library entry point for the study chat server
// ABOUTME: Multi-provider LLM tutor backend that streams answers over Server-Sent Events
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Study Chat Server Contributors

#![deny(unsafe_code)]

//! # Study Chat Server
//!
//! Backend for a student study-aid dashboard. A student posts a question into a
//! conversation; the server picks an LLM provider from a free-form model
//! selector, streams the answer back over SSE one word at a time, and persists
//! both sides of the exchange once the answer is complete.
//!
//! ## Pipeline
//!
//! - **Resolver** (`llm::resolver`): model selector string to `(provider, model)`
//! - **Classifier** (`llm::classifier`): detects image requests and reroutes them
//! - **Orchestrator** (`chat::orchestrator`): dispatches to Gemini, Groq,
//!   `OpenRouter`, NVIDIA NIM or Qwen-Image and drives the response stream
//! - **SSE re-framer** (`llm::sse_parser`): upstream SSE bytes to text deltas
//! - **Word smoother** (`chat::smoothing`): paces deltas one word at a time
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use study_chat_server::config::environment::ServerConfig;
//! use study_chat_server::errors::AppResult;
//!
//! fn main() -> AppResult<()> {
//!     let config = ServerConfig::from_env()?;
//!     println!("Study chat server configured with port {}", config.http_port);
//!     Ok(())
//! }
//! ```

/// Bearer-token authentication for API routes
pub mod auth;

/// Chat pipeline: orchestration, image prompt preparation and word pacing
pub mod chat;

/// Environment-driven configuration
pub mod config;

/// Conversation and message persistence
pub mod database;

/// Unified error handling (re-exported from `study-core`)
pub mod errors;

/// LLM provider abstraction, model resolution and SSE parsing
pub mod llm;

/// Structured logging setup
pub mod logging;

/// Shared server resources handed to every route
pub mod resources;

/// HTTP route handlers
pub mod routes;

/// Application constants (re-exported from `study-core`)
pub mod constants {
    pub use study_core::constants::*;
}
