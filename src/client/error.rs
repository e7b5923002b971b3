use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("relay connection failed: {0}")]
    Connect(String),

    #[error("relay rejected join ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("relay closed the channel during the join handshake")]
    HandshakeClosed,

    #[error("no join acknowledgment within {0:?}")]
    Timeout(Duration),

    #[error("paired device did not join within {0:?}")]
    PeerTimeout(Duration),

    #[error("transport is not connected")]
    NotConnected,

    #[error("frame codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl From<anyhow::Error> for TransportError {
    fn from(e: anyhow::Error) -> Self {
        TransportError::Connect(format!("{e:#}"))
    }
}
