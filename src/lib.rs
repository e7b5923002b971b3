//! Pairing relay for moving scanned documents from a phone to a desktop
//! session.
//!
//! The crate has two halves sharing one wire protocol:
//! - the relay server ([`create_app`]): session rooms, REST for issuing and
//!   revoking sessions, Swagger UI
//! - the client side: [`client::RelayTransport`] for the session channel and
//!   [`services::DocumentIngest`] for the document working set

pub mod client;
pub mod config;
pub mod docs;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;
pub mod websocket;
pub mod ws;

use std::sync::Arc;

use axum::{http::HeaderValue, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use config::Config;
use docs::ApiDoc;
use routes::create_api_routes;
use websocket::handler::websocket_handler;
use ws::RelayHub;

/// Shared server state
pub struct AppState {
    pub hub: Arc<RelayHub>,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let hub = RelayHub::new(config.session_ttl(), config.max_peers_per_session, config.strict_sessions);
        Self {
            hub: Arc::new(hub),
            config,
        }
    }
}

/// Full relay router: `/ws`, `/api/...` and Swagger UI
pub fn create_app(app_state: Arc<AppState>) -> Router {
    let cors = cors_layer(&app_state.config);

    Router::new()
        .route("/ws", get(websocket_handler).with_state(app_state.clone()))
        .nest("/api", create_api_routes(app_state))
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origin_list()
        .into_iter()
        .filter_map(|origin| match HeaderValue::from_str(&origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid CORS origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(origins)
    }
}
