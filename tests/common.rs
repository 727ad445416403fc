// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Builds in-memory server resources, tokens and provider credentials
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Study Chat Server Contributors
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]
//! Shared test utilities for `study_chat_server`

use std::sync::{Arc, Once};

use study_chat_server::config::environment::{
    ProviderCredentials, ProviderEndpoints, ServerConfig,
};
use study_chat_server::database::{ConversationRecord, Database};
use study_chat_server::resources::ServerResources;

static INIT_LOGGER: Once = Once::new();

/// Shared secret for test tokens
pub const TEST_JWT_SECRET: &str = "test-jwt-secret-for-study-chat";

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        // Check for TEST_LOG environment variable to control test logging level
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Standard test database setup
pub async fn create_test_database() -> Database {
    init_test_logging();
    Database::new("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database")
}

/// Credentials with every provider key set to `test-<provider>-key`
pub fn all_test_credentials() -> ProviderCredentials {
    ProviderCredentials {
        groq_api_key: Some("test-groq-key".to_owned()),
        openrouter_api_key: Some("test-openrouter-key".to_owned()),
        openrouter_site_url: Some("https://study.example".to_owned()),
        openrouter_app_name: Some("Study Buddy".to_owned()),
        gemini_api_key: Some("test-gemini-key".to_owned()),
        nvidia_api_key: Some("test-nvidia-key".to_owned()),
        alibaba_api_key: Some("test-alibaba-key".to_owned()),
    }
}

/// Server resources with upstreams pointed at `mock_base_url`
pub async fn create_test_server_resources(
    mock_base_url: &str,
    credentials: ProviderCredentials,
) -> Arc<ServerResources> {
    let database = create_test_database().await;

    let mut config = ServerConfig::new("sqlite::memory:", TEST_JWT_SECRET);
    config.credentials = credentials;
    config.endpoints = ProviderEndpoints::all_at(mock_base_url);

    Arc::new(
        ServerResources::new(database, Arc::new(config))
            .expect("Failed to create server resources"),
    )
}

/// A valid bearer token for `user_id`
pub fn token_for(resources: &ServerResources, user_id: &str) -> String {
    resources
        .auth_manager
        .generate_token(user_id, 1)
        .expect("Failed to generate token")
}

/// Create a conversation directly in the database
pub async fn create_test_conversation(
    resources: &ServerResources,
    user_id: &str,
    subject: Option<&str>,
) -> ConversationRecord {
    resources
        .database
        .chat()
        .create_conversation(user_id, subject, "chat")
        .await
        .expect("Failed to create conversation")
}
