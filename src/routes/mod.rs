// ABOUTME: Route module organization for the study chat server HTTP endpoints
// ABOUTME: Assembles domain routers and the shared middleware stack
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Study Chat Server Contributors

//! Route module for the study chat server

/// Chat conversation routes
pub mod chat;
/// Health check route
pub mod health;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub use chat::ChatRoutes;
pub use health::HealthRoutes;

use crate::constants::limits;
use crate::resources::ServerResources;

/// Build the full application router
pub fn build_router(resources: Arc<ServerResources>) -> Router {
    Router::new()
        .merge(HealthRoutes::routes())
        .merge(ChatRoutes::routes(resources))
        .layer(RequestBodyLimitLayer::new(limits::MAX_REQUEST_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
