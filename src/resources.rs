// ABOUTME: Centralized resource container shared by every HTTP handler
// ABOUTME: Holds configuration, the database, the token verifier and the upstream HTTP client
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Study Chat Server Contributors

//! # Server Resources
//!
//! Expensive objects are built once at startup and handed to handlers as
//! `Arc<ServerResources>` router state.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::auth::AuthManager;
use crate::config::environment::ServerConfig;
use crate::constants::limits;
use crate::database::Database;
use crate::errors::{AppError, AppResult};

/// Centralized resource container for dependency injection
#[derive(Clone)]
pub struct ServerResources {
    /// Server configuration, including provider credentials and endpoints
    pub config: Arc<ServerConfig>,
    /// Conversation and message store
    pub database: Arc<Database>,
    /// Bearer-token verifier
    pub auth_manager: Arc<AuthManager>,
    /// Shared upstream HTTP client (connection pooling)
    pub http_client: Client,
}

impl ServerResources {
    /// Create server resources around an opened database
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(database: Database, config: Arc<ServerConfig>) -> AppResult<Self> {
        let http_client = Client::builder()
            .connect_timeout(Duration::from_secs(limits::UPSTREAM_CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            auth_manager: Arc::new(AuthManager::new(&config.jwt_secret)),
            database: Arc::new(database),
            config,
            http_client,
        })
    }
}
