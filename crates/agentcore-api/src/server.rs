//! Router construction for the dev-only HTTP surface.

use std::sync::Arc;

use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use agentcore_memory::MemoryStore;
use agentcore_orchestrator::Orchestrator;
use agentcore_store::Store;

use crate::routes;

pub struct AppState {
    pub store: Arc<Store>,
    pub memory: Arc<MemoryStore>,
    pub orchestrator: Arc<Orchestrator>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/sessions", post(routes::create_session))
        .route("/sessions/:session_id/message", post(routes::send_message))
        .route("/sessions/:session_id/history", get(routes::session_history))
        .route(
            "/memories",
            get(routes::list_memories).post(routes::create_memory),
        )
        .route("/memories/search", post(routes::search_memories))
        .route(
            "/memories/:memory_id",
            patch(routes::update_memory).delete(routes::delete_memory),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds and serves the router until the process is asked to shut down.
/// Not a product surface (spec.md §6) — a local loopback listener meant for
/// manual testing and the end-to-end scenarios.
pub async fn serve(state: Arc<AppState>, addr: std::net::SocketAddr) -> std::io::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "agentcore-api listening");
    axum::serve(listener, router).await
}
