//! Relay transport.
//!
//! A session-scoped duplex message channel to the relay server. One
//! supervisor task per session owns the socket:
//!
//! ```text
//! connect() ──spawn──► run_session
//!                        ├── handshake (join → joined), bounded by connect_timeout
//!                        ├── pump: outbound queue, inbound dispatch, heartbeat
//!                        └── unexpected loss → backoff → handshake again
//! ```
//!
//! Status only ever moves `Disconnected → Connecting → Connected →
//! Disconnected`. A caller-requested [`RelayTransport::disconnect`] never
//! triggers the reconnect loop.

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::backoff::{Backoff, BackoffPolicy};
use super::error::TransportError;
use super::ws::{self, WsMessage, WsReader, WsWriter};
use crate::models::message_types::{
    CONNECTION_CHANGE, ERROR, JOIN, JOINED, LEAVE, PEER_JOINED, PEER_LEFT, PING, PONG,
};
use crate::models::{ErrorMessage, JoinMessage, JoinedMessage, PeerJoinedMessage, PeerLeftMessage, PeerRole, RelayFrame};
use crate::services::pairing_service;
use crate::utils::listeners::Listeners;

/// Callback for one inbound message type, receives the frame payload
pub type MessageListener = dyn Fn(&Value) + Send + Sync;

/// Callback for connection lifecycle events
pub type ConnectionListener = dyn Fn(&ConnectionEvent) + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Delivered to `connectionChange` listeners
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// `session_id` is set only when the status becomes `Connected`
    StatusChanged {
        status: ConnectionStatus,
        session_id: Option<String>,
    },
    PeerJoined { peer_count: usize },
    PeerLeft { peer_count: usize },
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// Terminal: no further automatic attempts for this session
    ReconnectExhausted { attempts: u32 },
    /// The relay refused the join, no automatic retry follows
    Rejected { code: String, message: String },
}

/// Smallest heartbeat period the pump runs with
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(10);
/// Smallest per-attempt connect timeout
pub const MIN_CONNECT_TIMEOUT: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Relay WebSocket URL, e.g. `ws://host:3000/ws`
    pub url: String,
    pub role: PeerRole,
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub reconnect: BackoffPolicy,
}

impl TransportConfig {
    pub fn new(url: impl Into<String>, role: PeerRole) -> Self {
        Self {
            url: ws::http_to_ws_scheme(&url.into()),
            role,
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(15),
            reconnect: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelEnd {
    /// Outbound queue closed by `disconnect`
    Requested,
    Lost,
}

struct OpenChannel {
    writer: WsWriter,
    reader: WsReader,
    peer_count: usize,
}

struct State {
    status: ConnectionStatus,
    session_id: Option<String>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    backoff: Backoff,
    /// Bumped by every connect/disconnect; supervisors of older generations exit
    generation: u64,
    supervisor: Option<JoinHandle<()>>,
}

struct Inner {
    config: TransportConfig,
    peer_id: String,
    state: Mutex<State>,
    handlers: Mutex<HashMap<String, Vec<Arc<MessageListener>>>>,
    connection_listeners: Listeners<ConnectionListener>,
    peers: watch::Sender<usize>,
}

/// Cloneable handle to one relay connection
#[derive(Clone)]
pub struct RelayTransport {
    inner: Arc<Inner>,
}

impl fmt::Debug for RelayTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayTransport")
            .field("url", &self.inner.config.url)
            .field("peer_id", &self.inner.peer_id)
            .field("status", &self.status())
            .field("session_id", &self.session_id())
            .finish()
    }
}

impl RelayTransport {
    pub fn new(config: TransportConfig) -> Self {
        let (peers, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                peer_id: Uuid::new_v4().to_string(),
                state: Mutex::new(State {
                    status: ConnectionStatus::Disconnected,
                    session_id: None,
                    outbound: None,
                    backoff: Backoff::new(config.reconnect),
                    generation: 0,
                    supervisor: None,
                }),
                handlers: Mutex::new(HashMap::new()),
                connection_listeners: Listeners::new(),
                peers,
                config,
            }),
        }
    }

    /// Open a channel for `session_id`, issuing a fresh id when absent.
    ///
    /// Resolves `true` once the relay acknowledged the join and `false` if
    /// the attempt failed, timed out or was cancelled. A failed first
    /// attempt does not start the reconnect loop.
    pub async fn connect(&self, session_id: Option<&str>) -> bool {
        let session_id = match session_id {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            _ => pairing_service::issue_session().into_string(),
        };

        let (generation, dropped_connection) = {
            let mut state = self.lock_state();
            state.generation += 1;
            if let Some(previous) = state.supervisor.take() {
                previous.abort();
            }
            state.outbound = None;
            state.session_id = Some(session_id.clone());
            state.backoff.reset();
            let was_up = state.status != ConnectionStatus::Disconnected;
            state.status = ConnectionStatus::Disconnected;
            (state.generation, was_up)
        };
        if dropped_connection {
            self.inner.peers.send_replace(0);
            self.emit(&ConnectionEvent::StatusChanged {
                status: ConnectionStatus::Disconnected,
                session_id: None,
            });
        }

        let (first_tx, first_rx) = oneshot::channel();
        {
            let mut state = self.lock_state();
            if state.generation != generation {
                return false;
            }
            let this = self.clone();
            state.supervisor = Some(tokio::spawn(this.run_session(session_id, generation, first_tx)));
        }

        first_rx.await.unwrap_or(false)
    }

    /// Write `{type, payload, sessionId}` to the channel.
    ///
    /// Returns `false` when not connected; callers decide whether to retry.
    pub fn send_message(&self, kind: &str, payload: Value) -> bool {
        if kind == CONNECTION_CHANGE {
            warn!("{} is a local event and is never sent to the relay", CONNECTION_CHANGE);
            return false;
        }

        let state = self.lock_state();
        if state.status != ConnectionStatus::Connected {
            debug!("Not sending {}: transport is {:?}", kind, state.status);
            return false;
        }
        let (Some(session_id), Some(outbound)) = (state.session_id.as_deref(), state.outbound.as_ref()) else {
            return false;
        };
        let text = match RelayFrame::new(kind, payload, session_id).to_text() {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode {} frame: {}", kind, e);
                return false;
            }
        };
        outbound.send(text).is_ok()
    }

    /// Register a listener for one inbound message type
    pub fn on(&self, kind: &str, listener: Arc<MessageListener>) {
        self.lock_handlers()
            .entry(kind.to_string())
            .or_default()
            .push(listener);
    }

    /// Remove a listener registered with [`RelayTransport::on`]
    pub fn off(&self, kind: &str, listener: &Arc<MessageListener>) -> bool {
        let mut handlers = self.lock_handlers();
        let Some(list) = handlers.get_mut(kind) else {
            return false;
        };
        let Some(index) = list
            .iter()
            .position(|l| crate::utils::listeners::same_listener(l, listener))
        else {
            return false;
        };
        list.remove(index);
        if list.is_empty() {
            handlers.remove(kind);
        }
        true
    }

    pub fn on_connection_change(&self, listener: Arc<ConnectionListener>) {
        self.inner.connection_listeners.add(listener);
    }

    pub fn off_connection_change(&self, listener: &Arc<ConnectionListener>) -> bool {
        self.inner.connection_listeners.remove(listener)
    }

    /// Close the channel, forget the session and stop any reconnect loop.
    /// Safe to call repeatedly.
    pub fn disconnect(&self) {
        let (changed, supervisor) = {
            let mut guard = self.lock_state();
            let state = &mut *guard;
            state.generation += 1;
            let was_connected = state.status == ConnectionStatus::Connected;
            if let (Some(outbound), Some(session_id)) = (state.outbound.take(), state.session_id.as_deref()) {
                match RelayFrame::new(LEAVE, json!({}), session_id).to_text() {
                    Ok(text) => {
                        let _ = outbound.send(text);
                    }
                    Err(e) => warn!("Failed to encode leave frame: {}", e),
                }
            }
            state.session_id = None;
            state.backoff.reset();
            let changed = state.status != ConnectionStatus::Disconnected;
            state.status = ConnectionStatus::Disconnected;

            (changed, state.supervisor.take().map(|handle| (handle, was_connected)))
        };

        match supervisor {
            // A live pump drains the leave frame and closes the socket; a
            // stalled socket is cut off after the grace period
            Some((handle, true)) => match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let grace = self.connect_timeout();
                    runtime.spawn(async move {
                        tokio::time::sleep(grace).await;
                        handle.abort();
                    });
                }
                Err(_) => handle.abort(),
            },
            Some((handle, false)) => handle.abort(),
            None => {}
        }
        if changed {
            info!("Disconnected from relay");
            self.inner.peers.send_replace(0);
            self.emit(&ConnectionEvent::StatusChanged {
                status: ConnectionStatus::Disconnected,
                session_id: None,
            });
        }
    }

    /// Wait until the other device has joined the session
    pub async fn wait_for_peer(&self, timeout: Duration) -> Result<usize, TransportError> {
        let mut peers = self.inner.peers.subscribe();
        let result = match tokio::time::timeout(timeout, peers.wait_for(|count| *count > 0)).await {
            Ok(Ok(count)) => Ok(*count),
            Ok(Err(_)) => Err(TransportError::NotConnected),
            Err(_) => Err(TransportError::PeerTimeout(timeout)),
        };
        result
    }

    pub fn status(&self) -> ConnectionStatus {
        self.lock_state().status
    }

    pub fn session_id(&self) -> Option<String> {
        self.lock_state().session_id.clone()
    }

    /// Other peers currently joined to the session
    pub fn peer_count(&self) -> usize {
        *self.inner.peers.borrow()
    }

    pub fn peer_id(&self) -> &str {
        &self.inner.peer_id
    }

    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }

    async fn run_session(self, session_id: String, generation: u64, first: oneshot::Sender<bool>) {
        let mut first = Some(first);

        loop {
            if !self.set_status(generation, ConnectionStatus::Connecting, None) {
                return;
            }

            match self.open(&session_id).await {
                Ok(channel) => {
                    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                    if !self.mark_connected(generation, &session_id, outbound_tx, channel.peer_count) {
                        return;
                    }
                    if let Some(tx) = first.take() {
                        let _ = tx.send(true);
                    }

                    let end = self
                        .pump(&session_id, channel.writer, channel.reader, outbound_rx)
                        .await;
                    if end == ChannelEnd::Requested {
                        return;
                    }
                    warn!("Relay channel for session {} lost", session_id);
                    if !self.set_status(generation, ConnectionStatus::Disconnected, None) {
                        return;
                    }
                }
                Err(e) => {
                    warn!("Relay connection for session {} failed: {}", session_id, e);
                    if !self.set_status(generation, ConnectionStatus::Disconnected, None) {
                        return;
                    }
                    if let Some(tx) = first.take() {
                        if let TransportError::Rejected { code, message } = e {
                            self.emit(&ConnectionEvent::Rejected { code, message });
                        }
                        let _ = tx.send(false);
                        return;
                    }
                    if let TransportError::Rejected { code, message } = e {
                        error!("Relay rejected session {} ({}), not retrying", session_id, code);
                        self.emit(&ConnectionEvent::Rejected { code, message });
                        return;
                    }
                }
            }

            let next = {
                let mut state = self.lock_state();
                if state.generation != generation {
                    return;
                }
                match state.backoff.next_delay() {
                    Some(delay) => Ok((state.backoff.attempts(), delay)),
                    None => Err(state.backoff.attempts()),
                }
            };
            match next {
                Ok((attempt, delay)) => {
                    info!(
                        "Reconnecting session {} in {:.1}s (attempt {})",
                        session_id,
                        delay.as_secs_f32(),
                        attempt
                    );
                    self.emit(&ConnectionEvent::ReconnectScheduled { attempt, delay });
                    tokio::time::sleep(delay).await;
                }
                Err(attempts) => {
                    error!(
                        "Giving up on session {} after {} reconnect attempts",
                        session_id, attempts
                    );
                    self.emit(&ConnectionEvent::ReconnectExhausted { attempts });
                    return;
                }
            }
        }
    }

    async fn open(&self, session_id: &str) -> Result<OpenChannel, TransportError> {
        let limit = self.connect_timeout();
        match tokio::time::timeout(limit, self.handshake(session_id)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(limit)),
        }
    }

    /// Connect and join; completes on the relay's `joined` acknowledgment
    async fn handshake(&self, session_id: &str) -> Result<OpenChannel, TransportError> {
        let (mut writer, mut reader) = ws::connect(&self.inner.config.url).await?;

        let join = JoinMessage {
            peer_id: Some(self.inner.peer_id.clone()),
            role: self.inner.config.role,
        };
        let frame = RelayFrame::with_payload(JOIN, &join, session_id)?;
        writer.send_text(&frame.to_text()?).await?;

        loop {
            match reader.recv().await {
                Some(Ok(WsMessage::Text(text))) => {
                    let frame = match RelayFrame::parse(&text) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!("Dropping malformed frame during join: {}", e);
                            continue;
                        }
                    };
                    match frame.kind.as_str() {
                        JOINED => {
                            let joined: JoinedMessage = serde_json::from_value(frame.payload)?;
                            info!(
                                "Joined session {} as {} ({} other peers)",
                                session_id, joined.peer_id, joined.peer_count
                            );
                            return Ok(OpenChannel {
                                writer,
                                reader,
                                peer_count: joined.peer_count,
                            });
                        }
                        ERROR => {
                            let rejection: ErrorMessage = serde_json::from_value(frame.payload)?;
                            return Err(TransportError::Rejected {
                                code: rejection.code,
                                message: rejection.message,
                            });
                        }
                        other => debug!("Ignoring {} frame before join acknowledgment", other),
                    }
                }
                Some(Ok(WsMessage::Ping(data))) => writer.send_pong(data).await?,
                Some(Ok(WsMessage::Close { .. })) | None => return Err(TransportError::HandshakeClosed),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    async fn pump(
        &self,
        session_id: &str,
        mut writer: WsWriter,
        mut reader: WsReader,
        mut outbound: mpsc::UnboundedReceiver<String>,
    ) -> ChannelEnd {
        let period = self.inner.config.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL);
        let mut heartbeat = interval_at(Instant::now() + period, period);
        let mut last_seen = Instant::now();

        loop {
            tokio::select! {
                queued = outbound.recv() => match queued {
                    Some(text) => {
                        if let Err(e) = writer.send_text(&text).await {
                            warn!("Relay write failed: {:#}", e);
                            return ChannelEnd::Lost;
                        }
                    }
                    None => {
                        match tokio::time::timeout(self.connect_timeout(), writer.close()).await {
                            Ok(Err(e)) => debug!("Close after disconnect failed: {:#}", e),
                            Err(_) => debug!("Close after disconnect timed out"),
                            Ok(Ok(())) => {}
                        }
                        return ChannelEnd::Requested;
                    }
                },
                inbound = reader.recv() => match inbound {
                    Some(Ok(WsMessage::Text(text))) => {
                        last_seen = Instant::now();
                        self.dispatch(&text);
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        last_seen = Instant::now();
                        if writer.send_pong(data).await.is_err() {
                            return ChannelEnd::Lost;
                        }
                    }
                    Some(Ok(WsMessage::Close { code, reason })) => {
                        info!("Relay closed the channel ({}): {}", code, reason);
                        return ChannelEnd::Lost;
                    }
                    Some(Ok(_)) => last_seen = Instant::now(),
                    Some(Err(e)) => {
                        warn!("{:#}", e);
                        return ChannelEnd::Lost;
                    }
                    None => return ChannelEnd::Lost,
                },
                _ = heartbeat.tick() => {
                    if last_seen.elapsed() >= period * 2 {
                        warn!("Relay silent for {:?}, treating channel as lost", last_seen.elapsed());
                        return ChannelEnd::Lost;
                    }
                    let ping = match RelayFrame::new(PING, json!({}), session_id).to_text() {
                        Ok(text) => text,
                        Err(e) => {
                            error!("Failed to encode ping: {}", e);
                            continue;
                        }
                    };
                    if writer.send_text(&ping).await.is_err() {
                        return ChannelEnd::Lost;
                    }
                }
            }
        }
    }

    /// Deliver one inbound frame to the listeners of its exact type
    fn dispatch(&self, text: &str) {
        let frame = match RelayFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping malformed relay frame: {}", e);
                return;
            }
        };

        match frame.kind.as_str() {
            PONG => debug!("Heartbeat acknowledged"),
            PEER_JOINED => match serde_json::from_value::<PeerJoinedMessage>(frame.payload.clone()) {
                Ok(joined) => {
                    info!("Peer {} joined as {:?}", joined.peer_id, joined.role);
                    self.inner.peers.send_replace(joined.peer_count);
                    self.emit(&ConnectionEvent::PeerJoined { peer_count: joined.peer_count });
                }
                Err(e) => warn!("Malformed {} payload: {}", PEER_JOINED, e),
            },
            PEER_LEFT => match serde_json::from_value::<PeerLeftMessage>(frame.payload.clone()) {
                Ok(left) => {
                    info!("Peer {} left", left.peer_id);
                    self.inner.peers.send_replace(left.peer_count);
                    self.emit(&ConnectionEvent::PeerLeft { peer_count: left.peer_count });
                }
                Err(e) => warn!("Malformed {} payload: {}", PEER_LEFT, e),
            },
            ERROR => warn!("Relay reported an error: {}", frame.payload),
            _ => {}
        }

        let listeners = self
            .lock_handlers()
            .get(&frame.kind)
            .cloned()
            .unwrap_or_default();
        for listener in listeners {
            listener(&frame.payload);
        }
    }

    fn mark_connected(
        &self,
        generation: u64,
        session_id: &str,
        outbound: mpsc::UnboundedSender<String>,
        peer_count: usize,
    ) -> bool {
        {
            let mut state = self.lock_state();
            if state.generation != generation {
                return false;
            }
            state.status = ConnectionStatus::Connected;
            state.outbound = Some(outbound);
            state.backoff.reset();
        }
        self.inner.peers.send_replace(peer_count);
        self.emit(&ConnectionEvent::StatusChanged {
            status: ConnectionStatus::Connected,
            session_id: Some(session_id.to_string()),
        });
        true
    }

    /// Apply a status change made by the supervisor of `generation`.
    /// Returns false when that supervisor has been superseded.
    fn set_status(&self, generation: u64, status: ConnectionStatus, session_id: Option<String>) -> bool {
        {
            let mut state = self.lock_state();
            if state.generation != generation {
                return false;
            }
            if state.status == status {
                return true;
            }
            state.status = status;
            if status != ConnectionStatus::Connected {
                state.outbound = None;
            }
        }
        if status == ConnectionStatus::Disconnected {
            self.inner.peers.send_replace(0);
        }
        self.emit(&ConnectionEvent::StatusChanged { status, session_id });
        true
    }

    fn connect_timeout(&self) -> Duration {
        self.inner.config.connect_timeout.max(MIN_CONNECT_TIMEOUT)
    }

    fn emit(&self, event: &ConnectionEvent) {
        for listener in self.inner.connection_listeners.snapshot() {
            listener(event);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_handlers(&self) -> MutexGuard<'_, HashMap<String, Vec<Arc<MessageListener>>>> {
        self.inner.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn transport() -> RelayTransport {
        RelayTransport::new(TransportConfig::new("ws://127.0.0.1:9/ws", PeerRole::Initiator))
    }

    #[test]
    fn test_starts_disconnected() {
        let t = transport();
        assert_eq!(t.status(), ConnectionStatus::Disconnected);
        assert_eq!(t.session_id(), None);
        assert_eq!(t.peer_count(), 0);
    }

    #[test]
    fn test_config_normalizes_http_scheme() {
        let config = TransportConfig::new("https://relay.example.com/ws", PeerRole::Responder);
        assert_eq!(config.url, "wss://relay.example.com/ws");
    }

    #[test]
    fn test_send_before_connect_returns_false() {
        let t = transport();
        assert!(!t.send_message("documentScanned", json!({"id": "d1"})));
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let t = transport();
        let events = Arc::new(StdMutex::new(Vec::new()));
        let sink = events.clone();
        t.on_connection_change(Arc::new(move |e: &ConnectionEvent| sink.lock().unwrap().push(e.clone())));

        t.disconnect();
        t.disconnect();

        assert_eq!(t.status(), ConnectionStatus::Disconnected);
        assert_eq!(t.session_id(), None);
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dispatch_invokes_listeners_in_registration_order() {
        let t = transport();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let seen = seen.clone();
            t.on("documentReceived", Arc::new(move |p: &Value| seen.lock().unwrap().push((tag, p.clone()))));
        }
        let other = seen.clone();
        t.on("somethingElse", Arc::new(move |_: &Value| other.lock().unwrap().push(("other", Value::Null))));

        t.dispatch(r#"{"type":"documentReceived","payload":{"id":"d1"},"sessionId":"s"}"#);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], ("first", json!({"id": "d1"})));
        assert_eq!(seen[1].0, "second");
    }

    #[test]
    fn test_malformed_frame_is_dropped() {
        let t = transport();
        let calls = Arc::new(StdMutex::new(0));
        let counter = calls.clone();
        t.on("documentReceived", Arc::new(move |_: &Value| *counter.lock().unwrap() += 1));

        t.dispatch("{not json");
        t.dispatch(r#"{"payload":{}}"#);

        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn test_off_removes_only_that_listener() {
        let t = transport();
        let calls = Arc::new(StdMutex::new(Vec::new()));
        let a_calls = calls.clone();
        let a: Arc<MessageListener> = Arc::new(move |_: &Value| a_calls.lock().unwrap().push("a"));
        let b_calls = calls.clone();
        let b: Arc<MessageListener> = Arc::new(move |_: &Value| b_calls.lock().unwrap().push("b"));
        t.on("x", a.clone());
        t.on("x", b);

        assert!(t.off("x", &a));
        assert!(!t.off("x", &a));
        t.dispatch(r#"{"type":"x","payload":null}"#);

        assert_eq!(*calls.lock().unwrap(), vec!["b"]);
    }

    #[test]
    fn test_peer_events_update_peer_count() {
        let t = transport();
        let events = Arc::new(StdMutex::new(Vec::new()));
        let sink = events.clone();
        t.on_connection_change(Arc::new(move |e: &ConnectionEvent| sink.lock().unwrap().push(e.clone())));

        t.dispatch(r#"{"type":"peerJoined","payload":{"peerId":"p2","role":"responder","peerCount":1},"sessionId":"s"}"#);
        assert_eq!(t.peer_count(), 1);
        t.dispatch(r#"{"type":"peerLeft","payload":{"peerId":"p2","peerCount":0},"sessionId":"s"}"#);
        assert_eq!(t.peer_count(), 0);

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                ConnectionEvent::PeerJoined { peer_count: 1 },
                ConnectionEvent::PeerLeft { peer_count: 0 },
            ]
        );
    }

    #[test]
    fn test_connection_change_is_never_sent() {
        let t = transport();
        assert!(!t.send_message(CONNECTION_CHANGE, json!({})));
    }

    #[tokio::test]
    async fn test_wait_for_peer_times_out() {
        let t = transport();
        let err = t.wait_for_peer(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, TransportError::PeerTimeout(_)));
    }
}
