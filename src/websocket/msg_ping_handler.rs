use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::models::message_types::PONG;
use crate::models::{PongMessage, RelayFrame};
use crate::ws::hub::Outbound;

/// Handle a heartbeat - reply with pong
pub async fn handle_ping_message(session_id: &str, outbound: &mpsc::Sender<Outbound>) {
    debug!("Ping received for session {}", session_id);

    let pong = PongMessage { date: Utc::now().to_rfc3339() };
    let text = match RelayFrame::with_payload(PONG, &pong, session_id).and_then(|f| f.to_text()) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to encode pong for session {}: {}", session_id, e);
            return;
        }
    };
    if outbound.send(Outbound::Frame(text)).await.is_err() {
        error!("Failed to send pong for session {}", session_id);
    }
}
