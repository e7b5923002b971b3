use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::models::message_types::{DELIVERED, DOCUMENT_RECEIVED, DOCUMENT_SCANNED};
use crate::models::{DeliveredMessage, RelayFrame};
use crate::ws::hub::{Outbound, RelayHub};

/// Relay an application frame to the other peers of the session and
/// acknowledge it to the sender with `delivered`.
///
/// `documentScanned` reaches the other side as `documentReceived`, any other
/// type is forwarded unchanged.
pub async fn handle_forward_message(
    frame: RelayFrame,
    hub: &RelayHub,
    session_id: &str,
    conn_id: u64,
    outbound: &mpsc::Sender<Outbound>,
) {
    let (kind, id) = if frame.kind == DOCUMENT_SCANNED {
        (DOCUMENT_RECEIVED.to_string(), document_id(&frame.payload))
    } else {
        (frame.kind, None)
    };

    let recipients = hub.forward(session_id, conn_id, &kind, frame.payload);
    match &id {
        Some(id) => info!("Document {} relayed in session {} to {} peer(s)", id, session_id, recipients),
        None => debug!("{} relayed in session {} to {} peer(s)", kind, session_id, recipients),
    }

    let ack = DeliveredMessage { id, recipients };
    let text = match RelayFrame::with_payload(DELIVERED, &ack, session_id).and_then(|f| f.to_text()) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to encode delivery ack for session {}: {}", session_id, e);
            return;
        }
    };
    if outbound.send(Outbound::Frame(text)).await.is_err() {
        error!("Failed to send delivery ack for session {}", session_id);
    }
}

fn document_id(payload: &Value) -> Option<String> {
    payload.get("id").and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PeerRole;
    use serde_json::json;
    use std::time::Duration;

    fn frames(rx: &mut mpsc::Receiver<Outbound>) -> Vec<RelayFrame> {
        let mut out = Vec::new();
        while let Ok(Outbound::Frame(text)) = rx.try_recv() {
            out.push(RelayFrame::parse(&text).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_document_scanned_becomes_document_received() {
        let hub = RelayHub::new(Duration::from_secs(60), 2, false);
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let a = hub.join("s1", Some("a".into()), PeerRole::Responder, tx_a.clone()).unwrap();
        hub.join("s1", Some("b".into()), PeerRole::Initiator, tx_b).unwrap();
        frames(&mut rx_a);
        frames(&mut rx_b);

        let frame = RelayFrame::new(DOCUMENT_SCANNED, json!({"id": "d1", "name": "x.pdf"}), "s1");
        handle_forward_message(frame, &hub, "s1", a.conn_id, &tx_a).await;

        let received = frames(&mut rx_b);
        assert_eq!(received[0].kind, DOCUMENT_RECEIVED);
        assert_eq!(received[0].payload["name"], "x.pdf");

        let acks = frames(&mut rx_a);
        assert_eq!(acks[0].kind, DELIVERED);
        assert_eq!(acks[0].payload, json!({"id": "d1", "recipients": 1}));
    }

    #[tokio::test]
    async fn test_other_types_pass_through_unchanged() {
        let hub = RelayHub::new(Duration::from_secs(60), 2, false);
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let a = hub.join("s1", Some("a".into()), PeerRole::Responder, tx_a.clone()).unwrap();
        frames(&mut rx_a);

        let frame = RelayFrame::new("annotation", json!({"page": 2}), "s1");
        handle_forward_message(frame, &hub, "s1", a.conn_id, &tx_a).await;

        let acks = frames(&mut rx_a);
        assert_eq!(acks[0].payload, json!({"id": null, "recipients": 0}));
    }
}
