use crate::handlers::{diagnostics, health_check, issue_session, ready_check, revoke_session, session_qr, session_status};
use crate::AppState;
use axum::{routing::get, routing::post, Router};
use std::sync::Arc;

/// Create API routes
pub fn create_api_routes(app_state: Arc<AppState>) -> Router {
    Router::<Arc<AppState>>::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .route("/v1/sessions", post(issue_session))
        .route("/v1/sessions/:session_id", get(session_status).delete(revoke_session))
        .route("/v1/sessions/:session_id/qr", get(session_qr))
        .route("/v1/diagnostics", get(diagnostics))
        .with_state(app_state)
}
