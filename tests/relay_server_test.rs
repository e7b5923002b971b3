use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use docuninja_relay::client::{BackoffPolicy, ConnectionEvent, RelayTransport, TransportConfig};
use docuninja_relay::config::Config;
use docuninja_relay::models::{DocumentEnvelope, PairingPayload, PeerRole};
use docuninja_relay::services::{DeliveryState, DocumentIngest, IngestConfig, Notice};
use docuninja_relay::{create_app, AppState};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

async fn spawn_relay(config: Config) -> (SocketAddr, Arc<AppState>) {
    let app_state = Arc::new(AppState::new(config));
    let app = create_app(app_state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, app_state)
}

fn client_config(addr: SocketAddr, role: PeerRole) -> TransportConfig {
    TransportConfig {
        connect_timeout: Duration::from_secs(2),
        reconnect: BackoffPolicy {
            base: Duration::from_millis(20),
            factor: 1.5,
            max: Duration::from_millis(100),
            max_attempts: 3,
        },
        ..TransportConfig::new(format!("ws://{}/ws", addr), role)
    }
}

fn fast_ingest() -> IngestConfig {
    IngestConfig {
        retry: BackoffPolicy {
            base: Duration::from_millis(20),
            factor: 1.5,
            max: Duration::from_millis(100),
            max_attempts: 3,
        },
        ack_timeout: Duration::from_secs(1),
    }
}

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

fn record_events(transport: &RelayTransport) -> Arc<Mutex<Vec<ConnectionEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    transport.on_connection_change(Arc::new(move |event: &ConnectionEvent| sink.lock().unwrap().push(event.clone())));
    events
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_scanned_document_reaches_paired_desktop() {
    let (addr, _state) = spawn_relay(Config::default()).await;

    let desktop = RelayTransport::new(client_config(addr, PeerRole::Initiator));
    let phone = RelayTransport::new(client_config(addr, PeerRole::Responder));
    let desktop_docs = DocumentIngest::new(fast_ingest(), Some(desktop.clone()));
    let phone_docs = DocumentIngest::new(fast_ingest(), Some(phone.clone()));

    let notices = Arc::new(Mutex::new(Vec::new()));
    let sink = notices.clone();
    desktop_docs.on_notice(Arc::new(move |n: &Notice| sink.lock().unwrap().push(n.clone())));

    assert!(desktop.connect(Some("pair01")).await);
    assert!(phone.connect(Some("pair01")).await);
    assert_eq!(desktop.wait_for_peer(Duration::from_secs(2)).await.unwrap(), 1);
    assert_eq!(phone.peer_count(), 1);

    let envelope = phone_docs.process_captured_image(b"jpeg bytes".to_vec(), Some("Receipt"));

    assert!(eventually(|| desktop_docs.get_all().len() == 1).await);
    let received: DocumentEnvelope = desktop_docs.get_all().remove(0);
    assert_eq!(received, envelope);
    assert!(
        eventually(|| phone_docs.delivery_state(&envelope.id) == Some(DeliveryState::Delivered { recipients: 1 }))
            .await
    );
    assert_eq!(
        *notices.lock().unwrap(),
        vec![Notice::RemoteDocument { id: envelope.id.clone(), name: "Receipt".to_string() }]
    );

    desktop.disconnect();
    assert!(eventually(|| phone.peer_count() == 0).await);
}

#[tokio::test]
async fn test_third_peer_is_rejected() {
    let (addr, _state) = spawn_relay(Config::default()).await;
    let a = RelayTransport::new(client_config(addr, PeerRole::Initiator));
    let b = RelayTransport::new(client_config(addr, PeerRole::Responder));
    let c = RelayTransport::new(client_config(addr, PeerRole::Responder));
    let events = record_events(&c);

    assert!(a.connect(Some("full01")).await);
    assert!(b.connect(Some("full01")).await);
    assert!(!c.connect(Some("full01")).await);

    assert!(events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, ConnectionEvent::Rejected { code, .. } if code == "session_full")));
}

#[tokio::test]
async fn test_strict_mode_requires_issued_session() {
    let config = Config { strict_sessions: true, ..Config::default() };
    let (addr, state) = spawn_relay(config).await;

    let stranger = RelayTransport::new(client_config(addr, PeerRole::Responder));
    let events = record_events(&stranger);
    assert!(!stranger.connect(Some("guessed")).await);
    assert!(events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, ConnectionEvent::Rejected { code, .. } if code == "unknown_session")));

    let issued = state.hub.issue_session("ws://relay/ws", "scan-to-pdf");
    let invited = RelayTransport::new(client_config(addr, PeerRole::Responder));
    assert!(invited.connect(Some(issued.session_id.as_str())).await);
}

#[tokio::test]
async fn test_revoked_session_is_terminal_for_clients() {
    let (addr, state) = spawn_relay(Config::default()).await;
    let issued = state.hub.issue_session("ws://relay/ws", "scan-to-pdf");
    let session_id = issued.session_id.as_str().to_string();

    let desktop = RelayTransport::new(client_config(addr, PeerRole::Initiator));
    let events = record_events(&desktop);
    assert!(desktop.connect(Some(&session_id)).await);

    let app = create_app(state.clone());
    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/v1/sessions/{}", session_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert!(
        eventually(|| events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, ConnectionEvent::Rejected { code, .. } if code == "session_revoked")))
        .await
    );
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, ConnectionEvent::ReconnectExhausted { .. })));
}

#[tokio::test]
async fn test_issue_session_over_rest() {
    let config = Config { public_url: Some("wss://relay.example.com/ws".to_string()), ..Config::default() };
    let app = create_app(Arc::new(AppState::new(config)));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/sessions")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"action":"scan-to-pdf"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;

    let payload = PairingPayload::parse(body["qrPayload"].as_str().unwrap()).unwrap();
    assert_eq!(payload.server_url, "wss://relay.example.com/ws");
    assert_eq!(payload.action, "scan-to-pdf");
    assert_eq!(payload.session_id.as_str(), body["sessionId"].as_str().unwrap());

    let status = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/sessions/{}", payload.session_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(status.status(), StatusCode::OK);
    let status = body_json(status).await;
    assert_eq!(status["issued"], true);
    assert_eq!(status["peerCount"], 0);

    let qr = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/sessions/{}/qr?width=200&height=200", payload.session_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(qr.status(), StatusCode::OK);
    let text = String::from_utf8(to_bytes(qr.into_body(), usize::MAX).await.unwrap().to_vec()).unwrap();
    assert!(text.contains('█') || text.contains('▀') || text.contains('▄'));
}

#[tokio::test]
async fn test_issue_session_without_body_defaults_action() {
    let app = create_app(Arc::new(AppState::new(Config::default())));
    let response = app
        .oneshot(Request::builder().method("POST").uri("/api/v1/sessions").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["action"], "scan-to-pdf");
}

#[tokio::test]
async fn test_unknown_session_routes_return_404() {
    let app = create_app(Arc::new(AppState::new(Config::default())));

    for (method, uri) in [
        ("GET", "/api/v1/sessions/nope"),
        ("GET", "/api/v1/sessions/nope/qr"),
        ("DELETE", "/api/v1/sessions/nope"),
    ] {
        let response = app
            .clone()
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{} {}", method, uri);
        let body = body_json(response).await;
        assert_eq!(body["code"], 404);
    }
}

#[tokio::test]
async fn test_revoking_unknown_session_keeps_it_joinable() {
    let (addr, state) = spawn_relay(Config::default()).await;

    let response = create_app(state.clone())
        .oneshot(Request::builder().method("DELETE").uri("/api/v1/sessions/local02").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let desktop = RelayTransport::new(client_config(addr, PeerRole::Initiator));
    assert!(desktop.connect(Some("local02")).await);
    desktop.disconnect();
}

#[tokio::test]
async fn test_health_and_diagnostics() {
    let app = create_app(Arc::new(AppState::new(Config::default())));

    let health = app
        .clone()
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    let health = body_json(health).await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["service"], "docuninja-relay");

    let diagnostics = app
        .oneshot(Request::builder().uri("/api/v1/diagnostics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(diagnostics.status(), StatusCode::OK);
    let diagnostics = body_json(diagnostics).await;
    assert_eq!(diagnostics["n_rooms"], 0);
}

#[tokio::test]
async fn test_raw_protocol_errors() {
    let (addr, _state) = spawn_relay(Config::default()).await;
    let url = format!("ws://{}/ws", addr);

    // first frame must be a join
    let (mut socket, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let hello = json!({"type": "documentScanned", "payload": {}, "sessionId": "raw01"});
    socket.send(Message::text(hello.to_string())).await.unwrap();
    let reply = next_frame(&mut socket).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["payload"]["code"], "join_required");

    // server-only types are refused, the connection stays usable
    let (mut socket, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let join = json!({"type": "join", "payload": {"role": "responder"}, "sessionId": "raw01"});
    socket.send(Message::text(join.to_string())).await.unwrap();
    assert_eq!(next_frame(&mut socket).await["type"], "joined");

    let forged = json!({"type": "delivered", "payload": {"id": "x", "recipients": 9}, "sessionId": "raw01"});
    socket.send(Message::text(forged.to_string())).await.unwrap();
    let reply = next_frame(&mut socket).await;
    assert_eq!(reply["payload"]["code"], "reserved_type");

    socket.send(Message::text(json!({"type": "ping", "sessionId": "raw01"}).to_string())).await.unwrap();
    let pong = next_frame(&mut socket).await;
    assert_eq!(pong["type"], "pong");
    assert!(pong["payload"]["date"].is_string());
}

async fn next_frame<S>(socket: &mut S) -> Value
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}
