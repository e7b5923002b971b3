use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/api/ready",
    responses(
        (status = 200, description = "Relay accepts connections", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Issue a pairing session
#[utoipa::path(
    post,
    path = "/api/v1/sessions",
    request_body(content = IssueSessionRequest, description = "Optional, the action defaults to scan-to-pdf"),
    responses(
        (status = 201, description = "Session issued", body = IssueSessionResponse),
        (status = 500, description = "Payload could not be encoded", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn issue_session_doc() {}

/// Session status
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{session_id}",
    params(("session_id" = String, Path, description = "Pairing session id")),
    responses(
        (status = 200, description = "Session is issued or has peers", body = SessionStatusResponse),
        (status = 404, description = "Unknown session", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn session_status_doc() {}

/// Pairing code as terminal text
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{session_id}/qr",
    params(
        ("session_id" = String, Path, description = "Pairing session id"),
        ("width" = Option<u16>, Query, description = "Maximum columns, default 80"),
        ("height" = Option<u16>, Query, description = "Maximum rows, default 40")
    ),
    responses(
        (status = 200, description = "Half-block QR code", body = String, content_type = "text/plain"),
        (status = 404, description = "Session not issued or expired", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn session_qr_doc() {}

/// Revoke a session
#[utoipa::path(
    delete,
    path = "/api/v1/sessions/{session_id}",
    params(("session_id" = String, Path, description = "Pairing session id")),
    responses(
        (status = 204, description = "Session revoked, peers disconnected"),
        (status = 404, description = "Unknown session", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn revoke_session_doc() {}

/// Relay diagnostics
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Relay and host figures", body = DiagnosticsResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        issue_session_doc,
        session_status_doc,
        session_qr_doc,
        revoke_session_doc,
        diagnostics_doc,
    ),
    components(
        schemas(
            HealthResponse,
            ErrorResponse,
            IssueSessionRequest,
            IssueSessionResponse,
            SessionStatusResponse,
            DiagnosticsResponse,
            DocumentEnvelope,
        )
    ),
    tags(
        (name = "relay", description = "Pairing relay endpoints")
    )
)]
pub struct ApiDoc;
