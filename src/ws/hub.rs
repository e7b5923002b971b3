use chrono::Utc;
use moka::sync::Cache;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::models::error_codes::{INVALID_SESSION, SESSION_FULL, SESSION_REVOKED, UNKNOWN_SESSION};
use crate::models::message_types::{ERROR, JOINED, PEER_JOINED, PEER_LEFT};
use crate::models::{
    ErrorMessage, JoinedMessage, PairingPayload, PeerJoinedMessage, PeerLeftMessage, PeerRole, RelayFrame,
};
use crate::services::pairing_service;

/// Close code sent to peers of a revoked session
pub const CLOSE_SESSION_REVOKED: u16 = 4001;
/// Close code sent to a connection replaced by a newer one with the same peer id
pub const CLOSE_REPLACED: u16 = 4002;

const MAX_SESSION_ID_LEN: usize = 128;

/// Item queued for a peer's writer task
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Frame(String),
    Close { code: u16, reason: String },
}

/// Why a join was refused, sent back as an `error` frame
#[derive(Debug, Clone, PartialEq)]
pub struct JoinRejection {
    pub code: &'static str,
    pub message: String,
}

impl JoinRejection {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// Handle returned to the connection that joined
#[derive(Debug, Clone, PartialEq)]
pub struct Membership {
    pub conn_id: u64,
    pub peer_id: String,
    /// Other peers in the room at join time
    pub peer_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub connections: u32,
    pub rooms: u32,
    /// Rooms with at least two peers
    pub paired_rooms: u32,
    pub issued_sessions: u64,
}

struct Peer {
    conn_id: u64,
    peer_id: String,
    outbound: mpsc::Sender<Outbound>,
}

/// Rooms of connected peers keyed by session id, plus the registry of
/// sessions issued over REST.
pub struct RelayHub {
    rooms: Mutex<HashMap<String, Vec<Peer>>>,
    issued: Cache<String, PairingPayload>,
    revoked: Cache<String, ()>,
    strict_sessions: bool,
    max_peers: usize,
    next_conn_id: AtomicU64,
}

impl RelayHub {
    pub fn new(session_ttl: Duration, max_peers: usize, strict_sessions: bool) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            issued: Cache::builder()
                .max_capacity(100_000)
                .time_to_live(session_ttl)
                .build(),
            revoked: Cache::builder()
                .max_capacity(100_000)
                .time_to_live(session_ttl)
                .build(),
            strict_sessions,
            max_peers: max_peers.max(1),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Issue a session and remember it for the configured TTL
    pub fn issue_session(&self, relay_url: &str, action: &str) -> PairingPayload {
        let session_id = pairing_service::issue_session();
        let payload = pairing_service::encode_pairing_payload(&session_id, relay_url, action, Utc::now());
        self.issued.insert(session_id.into_string(), payload.clone());
        info!("Issued session {} for {}", payload.session_id, action);
        payload
    }

    pub fn issued_session(&self, session_id: &str) -> Option<PairingPayload> {
        self.issued.get(session_id)
    }

    pub fn peer_count(&self, session_id: &str) -> usize {
        self.lock_rooms().get(session_id).map_or(0, Vec::len)
    }

    /// Add a connection to the room of `session_id`.
    ///
    /// `joined` is queued on the new peer before anyone else can reach it,
    /// the other peers get `peerJoined`.
    pub fn join(
        &self,
        session_id: &str,
        peer_id: Option<String>,
        role: PeerRole,
        outbound: mpsc::Sender<Outbound>,
    ) -> Result<Membership, JoinRejection> {
        if !is_valid_session_id(session_id) {
            return Err(JoinRejection::new(INVALID_SESSION, "Session id is empty or malformed"));
        }
        if self.revoked.contains_key(session_id) {
            return Err(JoinRejection::new(SESSION_REVOKED, "Session was revoked"));
        }
        if self.strict_sessions && !self.issued.contains_key(session_id) {
            return Err(JoinRejection::new(UNKNOWN_SESSION, "Session was not issued or has expired"));
        }

        let peer_id = peer_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);

        let mut rooms = self.lock_rooms();
        let room = rooms.entry(session_id.to_string()).or_default();

        // Same peer reconnecting before its old socket was noticed as dead
        if let Some(index) = room.iter().position(|p| p.peer_id == peer_id) {
            let stale = room.remove(index);
            info!("Peer {} rejoined session {}, replacing connection {}", peer_id, session_id, stale.conn_id);
            let _ = stale.outbound.try_send(Outbound::Close {
                code: CLOSE_REPLACED,
                reason: "replaced by a newer connection".to_string(),
            });
        }

        if room.len() >= self.max_peers {
            return Err(JoinRejection::new(
                SESSION_FULL,
                format!("Session already has {} peers", room.len()),
            ));
        }

        let peer_count = room.len();
        let joined = JoinedMessage { peer_id: peer_id.clone(), peer_count };
        push(&outbound, JOINED, &joined, session_id);

        // Each existing peer sees the same number of others: everyone but itself
        let announce = PeerJoinedMessage {
            peer_id: peer_id.clone(),
            role,
            peer_count,
        };
        for other in room.iter() {
            push(&other.outbound, PEER_JOINED, &announce, session_id);
        }

        room.push(Peer {
            conn_id,
            peer_id: peer_id.clone(),
            outbound,
        });
        info!("Peer {} ({:?}) joined session {} ({} peers)", peer_id, role, session_id, room.len());

        Ok(Membership { conn_id, peer_id, peer_count })
    }

    /// Remove a connection. The remaining peers get `peerLeft`, empty rooms
    /// are dropped. Unknown connections are ignored.
    pub fn leave(&self, session_id: &str, conn_id: u64) {
        let mut rooms = self.lock_rooms();
        let Some(room) = rooms.get_mut(session_id) else {
            return;
        };
        let Some(index) = room.iter().position(|p| p.conn_id == conn_id) else {
            return;
        };
        let peer = room.remove(index);
        info!("Peer {} left session {} ({} peers)", peer.peer_id, session_id, room.len());

        let left = PeerLeftMessage {
            peer_id: peer.peer_id,
            peer_count: room.len().saturating_sub(1),
        };
        for other in room.iter() {
            push(&other.outbound, PEER_LEFT, &left, session_id);
        }
        if room.is_empty() {
            rooms.remove(session_id);
            debug!("Room {} dropped", session_id);
        }
    }

    /// Queue a frame on every other peer of the room and return how many
    /// accepted it
    pub fn forward(&self, session_id: &str, from_conn: u64, kind: &str, payload: Value) -> usize {
        let text = match RelayFrame::new(kind, payload, session_id).to_text() {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode {} frame: {}", kind, e);
                return 0;
            }
        };

        let rooms = self.lock_rooms();
        let Some(room) = rooms.get(session_id) else {
            return 0;
        };
        room.iter()
            .filter(|p| p.conn_id != from_conn)
            .filter(|p| match p.outbound.try_send(Outbound::Frame(text.clone())) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Dropping {} for peer {}: {}", kind, p.peer_id, e);
                    false
                }
            })
            .count()
    }

    /// Forget an issued session and disconnect its peers. Later joins are
    /// refused with `session_revoked` until the TTL passes.
    pub fn revoke(&self, session_id: &str) -> bool {
        let was_issued = self.issued.contains_key(session_id);
        let peers = self.lock_rooms().remove(session_id).unwrap_or_default();
        if !was_issued && peers.is_empty() {
            debug!("Nothing to revoke for session {}", session_id);
            return false;
        }
        self.issued.invalidate(session_id);
        self.revoked.insert(session_id.to_string(), ());

        let error = ErrorMessage {
            code: SESSION_REVOKED.to_string(),
            message: "Session was revoked".to_string(),
        };
        for peer in &peers {
            push(&peer.outbound, ERROR, &error, session_id);
            let _ = peer.outbound.try_send(Outbound::Close {
                code: CLOSE_SESSION_REVOKED,
                reason: SESSION_REVOKED.to_string(),
            });
        }
        info!("Revoked session {} ({} peers disconnected)", session_id, peers.len());
        true
    }

    pub fn stats(&self) -> HubStats {
        self.issued.run_pending_tasks();
        let rooms = self.lock_rooms();
        HubStats {
            connections: rooms.values().map(|r| r.len() as u32).sum(),
            rooms: rooms.len() as u32,
            paired_rooms: rooms.values().filter(|r| r.len() >= 2).count() as u32,
            issued_sessions: self.issued.entry_count(),
        }
    }

    fn lock_rooms(&self) -> MutexGuard<'_, HashMap<String, Vec<Peer>>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn is_valid_session_id(session_id: &str) -> bool {
    !session_id.is_empty()
        && session_id.len() <= MAX_SESSION_ID_LEN
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn push<T: Serialize>(outbound: &mpsc::Sender<Outbound>, kind: &str, payload: &T, session_id: &str) {
    let text = match RelayFrame::with_payload(kind, payload, session_id).and_then(|f| f.to_text()) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode {} frame: {}", kind, e);
            return;
        }
    };
    if let Err(e) = outbound.try_send(Outbound::Frame(text)) {
        warn!("Dropping {} frame: {}", kind, e);
    }
}

/// `error` frame text for replies written outside of a room
pub fn error_frame(code: &str, message: &str, session_id: &str) -> Option<String> {
    RelayFrame::new(ERROR, json!({ "code": code, "message": message }), session_id)
        .to_text()
        .ok()
}
