// ABOUTME: Configuration management module for centralized server settings
// ABOUTME: Environment-only configuration: ports, database, auth secret, provider keys and endpoints
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Study Chat Server Contributors

//! Configuration module for the study chat server
//!
//! All configuration comes from environment variables; there is no config file.

/// Environment and server configuration
pub mod environment;

pub use environment::{ProviderCredentials, ProviderEndpoints, ServerConfig};
