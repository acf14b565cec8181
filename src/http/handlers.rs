use super::state::AppState;
use crate::error::SessionError;
use crate::session::{ConnectionStatus, SessionStats, TranscriptSegment};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_id: Option<String>,
    pub status: ConnectionStatus,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: ConnectionStatus,
    pub stats: SessionStats,
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /session/start
/// Acquire devices and connect to the guidance service
pub async fn start_session(State(state): State<AppState>) -> impl IntoResponse {
    info!("Session start requested over HTTP");

    match state.session.start().await {
        Ok(()) => {
            let stats = state.session.stats().await;
            (
                StatusCode::OK,
                Json(SessionResponse {
                    session_id: stats.session_id,
                    status: state.session.status().await,
                    message: "Session connecting".to_string(),
                }),
            )
                .into_response()
        }
        Err(e @ SessionError::AlreadyActive(_)) | Err(e @ SessionError::Cancelled) => {
            error_response(StatusCode::CONFLICT, e.to_string())
        }
        Err(e @ SessionError::ChannelConnect(_)) => {
            error!("Failed to start session: {}", e);
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
        Err(e) => {
            error!("Failed to start session: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// POST /session/stop
/// Tear the session down (no-op when nothing is running)
pub async fn stop_session(State(state): State<AppState>) -> impl IntoResponse {
    info!("Session stop requested over HTTP");

    state.session.stop().await;
    let stats = state.session.stats().await;

    (
        StatusCode::OK,
        Json(SessionResponse {
            session_id: stats.session_id,
            status: state.session.status().await,
            message: "Session stopped".to_string(),
        }),
    )
}

/// GET /session/status
/// Connection status, counters and the last error
pub async fn get_session_status(State(state): State<AppState>) -> impl IntoResponse {
    let response = StatusResponse {
        status: state.session.status().await,
        stats: state.session.stats().await,
        last_error: state.session.last_error().await,
    };

    (StatusCode::OK, Json(response))
}

/// GET /session/transcript
/// Transcript accumulated so far
pub async fn get_session_transcript(State(state): State<AppState>) -> impl IntoResponse {
    let transcript: Vec<TranscriptSegment> = state.transcript.segments();
    (StatusCode::OK, Json(transcript))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
