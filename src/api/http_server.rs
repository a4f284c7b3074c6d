// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    extract::{DefaultBodyLimit, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::process::process_handler;
use crate::analysis::dispatcher::{BackendStatus, TaskDispatcher};
use crate::analysis::registry::TaskDescriptor;
use crate::config::NodeConfig;
use crate::version;

/// Shared, read-only state handed to every request
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<TaskDispatcher>,
    /// Fired on shutdown; in-flight tasks report "cancelled"
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(dispatcher: TaskDispatcher, shutdown: CancellationToken) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            shutdown,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub build_date: &'static str,
    pub features: &'static [&'static str],
    pub backends: Vec<BackendStatus>,
    pub debug_overlay: bool,
}

#[derive(Debug, Serialize)]
pub struct TasksResponse {
    pub tasks: Vec<TaskDescriptor>,
}

pub fn create_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_handler))
        // Task registry
        .route("/tasks", get(tasks_handler))
        // Multi-task analysis
        .route("/process", post(process_handler))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` fires, then drain in-flight requests
pub async fn start_server(
    config: &NodeConfig,
    dispatcher: TaskDispatcher,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let state = AppState::new(dispatcher, shutdown.clone());
    let app = create_router(state, config.max_body_bytes);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("API server listening on {}", listener.local_addr()?);
    if let Some(ref public_url) = config.public_url {
        info!("Public API endpoint: {}/process", public_url);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("API server stopped");
    Ok(())
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: version::VERSION_NUMBER,
        build_date: version::BUILD_DATE,
        features: version::FEATURES,
        backends: state.dispatcher.backends(),
        debug_overlay: state.dispatcher.overlay_enabled(),
    })
}

async fn tasks_handler(State(state): State<AppState>) -> Json<TasksResponse> {
    Json(TasksResponse {
        tasks: state.dispatcher.registry().descriptors().to_vec(),
    })
}
