use std::borrow::Cow;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::models::error_codes::{INVALID_SESSION, PARSE_ERROR, RESERVED_TYPE};
use crate::models::message_types::{self, JOIN, LEAVE, PING};
use crate::models::RelayFrame;
use crate::utils::scope_guard::ScopeGuard;
use crate::websocket::msg_forward_handler::handle_forward_message;
use crate::websocket::msg_join_handler::handle_join_message;
use crate::websocket::msg_ping_handler::handle_ping_message;
use crate::ws::hub::{error_frame, Outbound, RelayHub};
use crate::AppState;

/// Close code for connections that never completed the join
const CLOSE_POLICY: u16 = 1008;

/// WebSocket handler
pub async fn websocket_handler(ws: WebSocketUpgrade, State(app_state): State<Arc<AppState>>) -> Response {
    debug!("New WebSocket connection attempt");
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let join_timeout = Duration::from_millis(app_state.config.connect_timeout_ms);

    let first = match tokio::time::timeout(join_timeout, next_text(&mut receiver)).await {
        Ok(Some(text)) => text,
        Ok(None) => {
            debug!("Connection closed before joining");
            return;
        }
        Err(_) => {
            warn!("No join within {:?}, closing connection", join_timeout);
            close(&mut sender, CLOSE_POLICY, "join timeout").await;
            return;
        }
    };

    let (outbound, mut outbound_rx) = mpsc::channel::<Outbound>(app_state.config.outbound_buffer.max(1));
    let hub = app_state.hub.clone();
    let (session_id, membership) = match handle_join_message(&first, &hub, outbound.clone()) {
        Ok(joined) => joined,
        Err(failure) => {
            if let Some(text) = error_frame(failure.rejection.code, &failure.rejection.message, &failure.session_id) {
                let _ = sender.send(Message::Text(text)).await;
            }
            close(&mut sender, CLOSE_POLICY, failure.rejection.code).await;
            return;
        }
    };
    info!(
        "WebSocket connection {} established for session {} as peer {}",
        membership.conn_id, session_id, membership.peer_id
    );

    // Leave the room however this connection ends
    let _membership_guard = {
        let hub = hub.clone();
        let session_id = session_id.clone();
        let conn_id = membership.conn_id;
        ScopeGuard::new(move || hub.leave(&session_id, conn_id))
    };

    // Writer: drains the peer's queue, the only place that touches the sink
    let mut send_task = tokio::spawn(async move {
        while let Some(item) = outbound_rx.recv().await {
            match item {
                Outbound::Frame(text) => {
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Outbound::Close { code, reason } => {
                    close(&mut sender, code, &reason).await;
                    break;
                }
            }
        }
    });

    // Reader: routes inbound frames until the peer leaves or the socket ends
    let reader_session = session_id.clone();
    let conn_id = membership.conn_id;
    let mut recv_task = tokio::spawn(async move {
        while let Some(message) = receiver.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    if route_frame(&text, &hub, &reader_session, conn_id, &outbound).await.is_break() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!("WebSocket error in session {}: {}", reader_session, e);
                    break;
                }
            }
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };
    info!("WebSocket connection {} for session {} terminated", membership.conn_id, session_id);
}

/// Dispatch one frame from a joined peer
async fn route_frame(
    text: &str,
    hub: &RelayHub,
    session_id: &str,
    conn_id: u64,
    outbound: &mpsc::Sender<Outbound>,
) -> ControlFlow<()> {
    let frame = match RelayFrame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Malformed frame in session {}: {}", session_id, e);
            reply_error(outbound, PARSE_ERROR, &format!("Malformed frame: {}", e), session_id).await;
            return ControlFlow::Continue(());
        }
    };

    if !frame.session_id.is_empty() && frame.session_id != session_id {
        warn!("Frame for session {} on a connection joined to {}", frame.session_id, session_id);
        reply_error(outbound, INVALID_SESSION, "Frame does not belong to the joined session", session_id).await;
        return ControlFlow::Continue(());
    }

    match frame.kind.as_str() {
        LEAVE => {
            debug!("Connection {} left session {}", conn_id, session_id);
            return ControlFlow::Break(());
        }
        PING => handle_ping_message(session_id, outbound).await,
        JOIN => debug!("Ignoring repeated join on connection {}", conn_id),
        kind if message_types::is_server_only(kind) => {
            warn!("Connection {} sent reserved type {}", conn_id, kind);
            reply_error(outbound, RESERVED_TYPE, &format!("{} may only be sent by the relay", kind), session_id).await;
        }
        _ => handle_forward_message(frame, hub, session_id, conn_id, outbound).await,
    }
    ControlFlow::Continue(())
}

async fn reply_error(outbound: &mpsc::Sender<Outbound>, code: &str, message: &str, session_id: &str) {
    if let Some(text) = error_frame(code, message, session_id) {
        if outbound.send(Outbound::Frame(text)).await.is_err() {
            error!("Failed to send {} error for session {}", code, session_id);
        }
    }
}

/// Next text frame, skipping control frames; `None` once the socket is done
async fn next_text(receiver: &mut futures_util::stream::SplitStream<WebSocket>) -> Option<String> {
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => return Some(text),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
    None
}

async fn close(sender: &mut SplitSink<WebSocket, Message>, code: u16, reason: &str) {
    let frame = CloseFrame {
        code,
        reason: Cow::Owned(reason.to_string()),
    };
    if let Err(e) = sender.send(Message::Close(Some(frame))).await {
        debug!("Failed to send close frame: {}", e);
    }
}
