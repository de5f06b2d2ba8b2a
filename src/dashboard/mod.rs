//! Dashboard: Axum JSON API for monitoring and controlling the loop.
//!
//! Read endpoints serve the coordinator's latest snapshot and a bounded log
//! of settled rounds. Control endpoints forward to the coordinator handle.
//! CORS enabled for local development.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

pub use routes::{AppState, DashboardState};

/// Start the dashboard web server and the round logger.
///
/// Spawns background tasks and returns immediately.
pub fn spawn_dashboard(state: AppState, port: u16) {
    routes::spawn_round_logger(state.clone(), state.handle.subscribe());
    let app = build_router(state);

    tokio::spawn(async move {
        if let Err(e) = serve(app, port).await {
            error!(error = %e, port, "Dashboard server stopped");
        }
    });
}

async fn serve(app: Router, port: u16) -> Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind dashboard port {port}"))?;
    info!(port, "Dashboard server listening on http://localhost:{port}");
    axum::serve(listener, app).await.context("Dashboard server error")
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/status", get(routes::get_status))
        .route("/api/rounds", get(routes::get_rounds))
        .route("/api/settings", get(routes::get_settings).post(routes::post_settings))
        .route("/api/region", post(routes::post_region))
        .route("/api/start", post(routes::post_start))
        .route("/api/stop", post(routes::post_stop))
        .route("/api/reset", post(routes::post_reset))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
