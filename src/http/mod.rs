//! HTTP API server for the voice agent
//!
//! This module provides the REST, streaming and WebSocket surface:
//! - POST /agent/chat/:id - Run the pipeline, single JSON response
//! - POST /agent/chat/:id/stream - Run the pipeline, server-sent events
//! - POST /agent/session - Create a session
//! - GET /agent/chat/:id/history - Session history
//! - POST /agent/chat/:id/clear, DELETE /agent/chat/:id - Session management
//! - POST /admin/simulate-error/:target - Disable or restore stage credentials
//! - GET /admin/error-status, GET /admin/service-status - Stage status
//! - GET /ws - Live audio recording channel
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;
mod ws;

pub use handlers::ErrorResponse;
pub use routes::create_router;
pub use state::AppState;
