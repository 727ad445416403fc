// ABOUTME: Health check route handler for service monitoring
// ABOUTME: Unauthenticated liveness endpoint reporting service name and version
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Study Chat Server Contributors

use crate::constants::{endpoints, service_names};

/// Health routes implementation
pub struct HealthRoutes;

impl HealthRoutes {
    /// Create the health check route
    pub fn routes() -> axum::Router {
        use axum::{routing::get, Json, Router};

        async fn health_handler() -> Json<serde_json::Value> {
            Json(serde_json::json!({
                "status": "ok",
                "service": service_names::STUDY_CHAT_SERVER,
                "version": env!("CARGO_PKG_VERSION")
            }))
        }

        Router::new().route(endpoints::HEALTH_CHECK, get(health_handler))
    }
}
