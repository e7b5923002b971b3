//! Client side of the relay: WebSocket wrapper, backoff and the
//! session-scoped transport used by the ingest pipeline.

pub mod backoff;
pub mod error;
pub mod transport;
pub mod ws;

pub use backoff::{Backoff, BackoffPolicy};
pub use error::TransportError;
pub use transport::{ConnectionEvent, ConnectionListener, ConnectionStatus, MessageListener, RelayTransport, TransportConfig};
