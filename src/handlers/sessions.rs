use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::{error, info};

use crate::models::{
    ErrorResponse, IssueSessionRequest, IssueSessionResponse, SessionStatusResponse, SCAN_TO_PDF_ACTION,
};
use crate::services::pairing_service;
use crate::AppState;

const DEFAULT_QR_WIDTH: u16 = 80;
const DEFAULT_QR_HEIGHT: u16 = 40;

#[derive(Deserialize, Debug, Default)]
pub struct QrQuery {
    width: Option<u16>,
    height: Option<u16>,
}

/// Issue a pairing session
pub async fn issue_session(
    State(app_state): State<Arc<AppState>>,
    body: Option<Json<IssueSessionRequest>>,
) -> Result<(StatusCode, Json<IssueSessionResponse>), (StatusCode, Json<ErrorResponse>)> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let action = request
        .action
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or(SCAN_TO_PDF_ACTION);

    let payload = app_state.hub.issue_session(&app_state.config.relay_url(), action);
    let qr_payload = payload.to_qr_string().map_err(|e| {
        error!("Failed to encode pairing payload: {}", e);
        ErrorResponse::reply(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode pairing payload")
    })?;

    Ok((
        StatusCode::CREATED,
        Json(IssueSessionResponse {
            session_id: payload.session_id.into_string(),
            action: payload.action,
            server_url: payload.server_url,
            timestamp: payload.timestamp,
            qr_payload,
        }),
    ))
}

/// Whether a session was issued and how many peers are in its room
pub async fn session_status(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<(StatusCode, Json<SessionStatusResponse>), (StatusCode, Json<ErrorResponse>)> {
    let issued = app_state.hub.issued_session(&session_id).is_some();
    let peer_count = app_state.hub.peer_count(&session_id);
    if !issued && peer_count == 0 {
        return Err(ErrorResponse::reply(
            StatusCode::NOT_FOUND,
            format!("Session '{}' not found", session_id),
        ));
    }
    Ok((
        StatusCode::OK,
        Json(SessionStatusResponse {
            session_id,
            issued,
            peer_count,
        }),
    ))
}

/// Pairing code of an issued session as half-block text
pub async fn session_qr(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(query): Query<QrQuery>,
) -> Result<(StatusCode, String), (StatusCode, Json<ErrorResponse>)> {
    let Some(payload) = app_state.hub.issued_session(&session_id) else {
        return Err(ErrorResponse::reply(
            StatusCode::NOT_FOUND,
            format!("Session '{}' was not issued or has expired", session_id),
        ));
    };

    let lines = pairing_service::pairing_qr_lines(
        &payload,
        query.width.unwrap_or(DEFAULT_QR_WIDTH),
        query.height.unwrap_or(DEFAULT_QR_HEIGHT),
    )
    .map_err(|e| {
        error!("Failed to encode pairing payload for {}: {}", session_id, e);
        ErrorResponse::reply(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode pairing payload")
    })?;

    Ok((StatusCode::OK, lines.join("\n")))
}

/// Revoke a session and disconnect its peers
pub async fn revoke_session(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    if !app_state.hub.revoke(&session_id) {
        return Err(ErrorResponse::reply(
            StatusCode::NOT_FOUND,
            format!("Session '{}' not found", session_id),
        ));
    }
    info!("Session {} revoked over REST", session_id);
    Ok(StatusCode::NO_CONTENT)
}
