//! HTTP API Server
//!
//! Starts and manages the axum-based HTTP server.

use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use ao_core::{AgentRegistry, CapabilityRouter, Config, TaskQueue};

use crate::middleware::auth::auth_middleware;
use crate::routes::routes;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub queue: Arc<TaskQueue>,
    pub registry: Arc<AgentRegistry>,
    pub router: Arc<CapabilityRouter>,
}

/// Start the HTTP API server
pub async fn start_server(
    port: u16,
    config: Config,
    queue: Arc<TaskQueue>,
    registry: Arc<AgentRegistry>,
    router: Arc<CapabilityRouter>,
) -> anyhow::Result<()> {
    let state = AppState {
        config,
        queue,
        registry,
        router,
    };

    let app = Router::new()
        .merge(routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("HTTP API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
