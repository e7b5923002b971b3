use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frame type names used on the relay
pub mod message_types {
    pub const JOIN: &str = "join";
    pub const LEAVE: &str = "leave";
    pub const PING: &str = "ping";

    pub const JOINED: &str = "joined";
    pub const PEER_JOINED: &str = "peerJoined";
    pub const PEER_LEFT: &str = "peerLeft";
    pub const PONG: &str = "pong";
    pub const DELIVERED: &str = "delivered";
    pub const ERROR: &str = "error";

    /// Capture side to relay
    pub const DOCUMENT_SCANNED: &str = "documentScanned";
    /// Relay to the receiving side, carries the scanned envelope
    pub const DOCUMENT_RECEIVED: &str = "documentReceived";
    /// Local-only status event, never written to the wire
    pub const CONNECTION_CHANGE: &str = "connectionChange";

    /// Types only the server may emit
    pub const SERVER_ONLY: [&str; 6] = [JOINED, PEER_JOINED, PEER_LEFT, PONG, DELIVERED, ERROR];

    pub fn is_server_only(kind: &str) -> bool {
        SERVER_ONLY.contains(&kind)
    }
}

/// Error codes carried by `error` frames
pub mod error_codes {
    pub const JOIN_REQUIRED: &str = "join_required";
    pub const INVALID_SESSION: &str = "invalid_session";
    pub const UNKNOWN_SESSION: &str = "unknown_session";
    pub const SESSION_FULL: &str = "session_full";
    pub const SESSION_REVOKED: &str = "session_revoked";
    pub const RESERVED_TYPE: &str = "reserved_type";
    pub const PARSE_ERROR: &str = "parse_error";
}

/// Every frame on the relay has this shape
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RelayFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub session_id: String,
}

impl RelayFrame {
    pub fn new(kind: impl Into<String>, payload: Value, session_id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload,
            session_id: session_id.into(),
        }
    }

    /// Build a frame from any serializable payload
    pub fn with_payload<T: Serialize>(
        kind: &str,
        payload: &T,
        session_id: &str,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(kind, serde_json::to_value(payload)?, session_id))
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PeerRole {
    /// Browser showing the pairing code
    Initiator,
    /// Device that scanned the code
    Responder,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct JoinMessage {
    #[serde(default)]
    pub peer_id: Option<String>,
    pub role: PeerRole,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct JoinedMessage {
    pub peer_id: String,
    pub peer_count: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PeerJoinedMessage {
    pub peer_id: String,
    pub role: PeerRole,
    pub peer_count: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PeerLeftMessage {
    pub peer_id: String,
    pub peer_count: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveredMessage {
    pub id: Option<String>,
    pub recipients: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PongMessage {
    pub date: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    pub code: String,
    pub message: String,
}
