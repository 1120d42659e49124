use super::state::AppState;
use crate::admin::{self, ErrorStatus, OutageAction, ServiceStatus, StageTarget};
use crate::error::PipelineError;
use crate::pipeline::{validate_session_id, EventStreamEncoder};
use crate::session::Turn;
use crate::stages::AudioClip;
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, Path, Query, State,
    },
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};

/// Buffered events between the pipeline task and the SSE body
const STREAM_BUFFER: usize = 32;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    /// Optional session ID (if not provided, generate UUID)
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub created: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub messages: Vec<Turn>,
    pub message_count: usize,
}

#[derive(Debug, Serialize)]
pub struct SessionActionResponse {
    pub session_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct OutageQuery {
    pub action: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: i64,
    pub services: ServiceStatus,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub(super) fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

pub(super) fn pipeline_error_response(err: PipelineError) -> Response {
    match err {
        PipelineError::InvalidSessionIdentifier(_) => {
            error_response(StatusCode::BAD_REQUEST, "Invalid session ID format")
        }
        PipelineError::UnreadableUpload(reason) => error_response(
            StatusCode::BAD_REQUEST,
            format!("Failed to process audio file: {}", reason),
        ),
        PipelineError::UploadTooLarge { limit_bytes } => error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!(
                "File too large. Maximum size is {}MB.",
                limit_bytes / (1024 * 1024)
            ),
        ),
        PipelineError::Cancelled => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Request cancelled before completion",
        ),
    }
}

/// Classify a multipart read error; a tripped body limit is reported as too large
fn upload_error(err: MultipartError, limit_bytes: usize) -> PipelineError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        PipelineError::UploadTooLarge { limit_bytes }
    } else {
        PipelineError::UnreadableUpload(err.body_text())
    }
}

/// Pull the `file` field out of a multipart upload
async fn read_clip(
    multipart: Result<Multipart, MultipartRejection>,
    limit_bytes: usize,
) -> Result<AudioClip, PipelineError> {
    let mut multipart =
        multipart.map_err(|e| PipelineError::UnreadableUpload(e.body_text()))?;

    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| upload_error(e, limit_bytes))?;

        let Some(field) = field else {
            return Err(PipelineError::UnreadableUpload(
                "missing 'file' field".to_string(),
            ));
        };

        if field.name() != Some("file") {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| upload_error(e, limit_bytes))?;

        if bytes.len() > limit_bytes {
            return Err(PipelineError::UploadTooLarge { limit_bytes });
        }

        if bytes.is_empty() {
            return Err(PipelineError::UnreadableUpload(
                "audio upload is empty".to_string(),
            ));
        }

        return Ok(AudioClip {
            bytes: bytes.to_vec(),
            content_type,
        });
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
/// Health check with per-stage status
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let now = Utc::now();
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: now,
        uptime_secs: (now - state.started_at).num_seconds(),
        services: ServiceStatus::collect(&state.orchestrator).await,
    })
}

/// POST /agent/session
/// Create a session, optionally with a caller-chosen ID
pub async fn create_session(
    State(state): State<AppState>,
    body: Option<Json<CreateSessionRequest>>,
) -> impl IntoResponse {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let session_id = match req.session_id {
        Some(id) => {
            if let Err(e) = validate_session_id(&id) {
                return pipeline_error_response(e);
            }
            id
        }
        None => uuid::Uuid::new_v4().to_string(),
    };

    let created = state.orchestrator.store().ensure(&session_id).await;
    let message = if created {
        format!("Session {} created", session_id)
    } else {
        format!("Session {} already exists", session_id)
    };

    (
        if created { StatusCode::CREATED } else { StatusCode::OK },
        Json(CreateSessionResponse {
            session_id,
            created,
            message,
        }),
    )
        .into_response()
}

/// POST /agent/chat/:session_id
/// Run the full pipeline on an uploaded clip and answer with one JSON body
pub async fn chat(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> impl IntoResponse {
    if let Err(e) = validate_session_id(&session_id) {
        return pipeline_error_response(e);
    }

    info!("Processing conversational chat for session: {}", session_id);

    let clip = match read_clip(multipart, state.max_upload_bytes).await {
        Ok(clip) => clip,
        Err(e) => {
            warn!("Rejected upload for session {}: {}", session_id, e);
            return pipeline_error_response(e);
        }
    };

    match state.orchestrator.run(&session_id, clip).await {
        Ok(outcome) => {
            info!("Conversational chat completed for session {}", session_id);
            (StatusCode::OK, Json(outcome.to_response())).into_response()
        }
        Err(e) => {
            error!("Chat failed for session {}: {}", session_id, e);
            pipeline_error_response(e)
        }
    }
}

/// POST /agent/chat/:session_id/stream
/// Same pipeline, delivered as server-sent events
pub async fn chat_stream(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> impl IntoResponse {
    if let Err(e) = validate_session_id(&session_id) {
        return pipeline_error_response(e);
    }

    info!("Processing streaming chat for session: {}", session_id);

    let clip = match read_clip(multipart, state.max_upload_bytes).await {
        Ok(clip) => clip,
        Err(e) => {
            warn!("Rejected upload for session {}: {}", session_id, e);
            return pipeline_error_response(e);
        }
    };

    let (encoder, rx) = EventStreamEncoder::channel(STREAM_BUFFER, state.word_delay);
    tokio::spawn(encoder.drive(state.orchestrator.clone(), session_id, clip));

    let stream = ReceiverStream::new(rx).map(|event| Event::default().json_data(event));
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// GET /agent/chat/:session_id/history
/// Turns recorded so far; unknown sessions have an empty history
pub async fn get_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    if let Err(e) = validate_session_id(&session_id) {
        return pipeline_error_response(e);
    }

    let messages = state
        .orchestrator
        .store()
        .get(&session_id)
        .await
        .map(|session| session.turns)
        .unwrap_or_default();

    (
        StatusCode::OK,
        Json(HistoryResponse {
            session_id,
            message_count: messages.len(),
            messages,
        }),
    )
        .into_response()
}

/// POST /agent/chat/:session_id/clear
pub async fn clear_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    if let Err(e) = validate_session_id(&session_id) {
        return pipeline_error_response(e);
    }

    if state.orchestrator.store().clear(&session_id).await {
        (
            StatusCode::OK,
            Json(SessionActionResponse {
                message: format!("Session {} cleared", session_id),
                session_id,
                status: "cleared".to_string(),
            }),
        )
            .into_response()
    } else {
        error_response(
            StatusCode::NOT_FOUND,
            format!("Session {} not found", session_id),
        )
    }
}

/// DELETE /agent/chat/:session_id
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    if let Err(e) = validate_session_id(&session_id) {
        return pipeline_error_response(e);
    }

    if state.orchestrator.store().delete(&session_id).await {
        (
            StatusCode::OK,
            Json(SessionActionResponse {
                message: format!("Session {} deleted", session_id),
                session_id,
                status: "deleted".to_string(),
            }),
        )
            .into_response()
    } else {
        error_response(
            StatusCode::NOT_FOUND,
            format!("Session {} not found", session_id),
        )
    }
}

/// POST /admin/simulate-error/:target?action=disable|enable
/// Disable or restore stage credentials to exercise fallback paths
pub async fn simulate_error(
    State(state): State<AppState>,
    Path(target): Path<String>,
    Query(query): Query<OutageQuery>,
) -> impl IntoResponse {
    let target = match target.parse::<StageTarget>() {
        Ok(target) => target,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    let action = match query.action.as_deref().unwrap_or("disable").parse::<OutageAction>() {
        Ok(action) => action,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    let report = admin::apply_outage(&state.orchestrator, &state.originals, target, action);
    (StatusCode::OK, Json(report)).into_response()
}

/// GET /admin/error-status
pub async fn error_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(ErrorStatus::collect(&state.orchestrator))
}

/// GET /admin/service-status
pub async fn service_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(ServiceStatus::collect(&state.orchestrator).await)
}
