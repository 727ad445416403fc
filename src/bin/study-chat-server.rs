// ABOUTME: Server binary for the study chat backend
// ABOUTME: Loads configuration, opens the database and serves the HTTP/SSE API
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Study Chat Server Contributors

//! # Study Chat Server Binary
//!
//! Starts the HTTP API that streams tutor answers over Server-Sent Events.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use study_chat_server::{
    config::environment::ServerConfig, database::Database, logging, resources::ServerResources,
    routes::build_router,
};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "study-chat-server")]
#[command(about = "Study Chat Server - multi-provider streaming LLM tutor backend")]
pub struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration from environment
    let mut config = ServerConfig::from_env()?;

    // Override port if specified
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }

    logging::init_from_env()?;

    info!("Starting Study Chat Server");
    info!("{}", config.summary());

    if config.credentials.configured().is_empty() {
        warn!("No provider API keys configured; every chat request will fail");
    }

    let database = Database::new(&config.database_url).await?;
    let resources = Arc::new(ServerResources::new(database, Arc::new(config))?);
    let app = build_router(Arc::clone(&resources));

    let addr = SocketAddr::from(([0, 0, 0, 0], resources.config.http_port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
