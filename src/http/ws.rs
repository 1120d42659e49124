use super::handlers::pipeline_error_response;
use super::state::AppState;
use crate::pipeline::validate_session_id;
use crate::recording::{AudioChunkSession, Notice};
use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

#[derive(Debug, Deserialize)]
pub struct AudioChannelParams {
    pub session_id: Option<String>,
}

/// GET /ws?session_id=
/// Live binary audio channel
///
/// A provided `session_id` names the recording destination, so it is
/// validated before the upgrade is accepted.
pub async fn audio_channel(
    State(state): State<AppState>,
    Query(params): Query<AudioChannelParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let connection_id = match params.session_id.filter(|id| !id.trim().is_empty()) {
        Some(id) => {
            if let Err(e) = validate_session_id(&id) {
                warn!("Rejected audio channel with invalid session id {:?}", id);
                return pipeline_error_response(e);
            }
            id
        }
        None => uuid::Uuid::new_v4().to_string(),
    };

    match ws {
        Ok(ws) => ws
            .on_upgrade(move |socket| handle_socket(socket, state, connection_id))
            .into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

async fn send_notice(socket: &mut WebSocket, notice: &Notice) -> bool {
    let text = match serde_json::to_string(notice) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to encode notice: {}", e);
            return true;
        }
    };
    socket.send(Message::Text(text)).await.is_ok()
}

async fn handle_socket(mut socket: WebSocket, state: AppState, connection_id: String) {
    info!("Audio channel connected: {}", connection_id);

    let mut session =
        AudioChunkSession::new(connection_id.clone(), state.sinks.clone(), state.progress_every);

    if !send_notice(&mut socket, &session.welcome()).await {
        return;
    }

    while let Some(msg) = socket.recv().await {
        let notice = match msg {
            Ok(Message::Text(text)) => {
                debug!("Audio channel {} received text: {}", connection_id, text);
                session.handle_text(&text).await
            }
            Ok(Message::Binary(bytes)) => session.handle_audio(&bytes).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => None,
            Err(e) => {
                error!("Audio channel {} error: {}", connection_id, e);
                break;
            }
        };

        if let Some(notice) = notice {
            if !send_notice(&mut socket, &notice).await {
                break;
            }
        }
    }

    session.close().await;
    info!("Audio channel disconnected: {}", connection_id);
}
