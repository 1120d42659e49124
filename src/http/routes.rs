use super::handlers;
use super::state::AppState;
use super::ws;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

/// Room for multipart boundaries and part headers on top of the audio itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let static_dir = state.static_dir.clone();
    let body_limit = state.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Sessions
        .route("/agent/session", post(handlers::create_session))
        .route(
            "/agent/chat/:session_id",
            post(handlers::chat).delete(handlers::delete_session),
        )
        .route("/agent/chat/:session_id/stream", post(handlers::chat_stream))
        .route("/agent/chat/:session_id/history", get(handlers::get_history))
        .route("/agent/chat/:session_id/clear", post(handlers::clear_session))
        // Admin
        .route(
            "/admin/simulate-error/:target",
            post(handlers::simulate_error),
        )
        .route("/admin/error-status", get(handlers::error_status))
        .route("/admin/service-status", get(handlers::service_status))
        // Live audio channel
        .route("/ws", get(ws::audio_channel))
        // Web client
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(DefaultBodyLimit::max(body_limit))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
