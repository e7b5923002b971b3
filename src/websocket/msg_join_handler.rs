use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::models::error_codes::{INVALID_SESSION, JOIN_REQUIRED, PARSE_ERROR};
use crate::models::message_types::JOIN;
use crate::models::{JoinMessage, RelayFrame};
use crate::ws::hub::{JoinRejection, Membership, Outbound, RelayHub};

/// Outcome of a failed first frame; `session_id` is echoed in the error frame
#[derive(Debug)]
pub struct JoinFailure {
    pub session_id: String,
    pub rejection: JoinRejection,
}

/// Handle the first frame of a connection, which must be a `join`
pub fn handle_join_message(
    text: &str,
    hub: &RelayHub,
    outbound: mpsc::Sender<Outbound>,
) -> Result<(String, Membership), JoinFailure> {
    let frame = RelayFrame::parse(text).map_err(|e| JoinFailure {
        session_id: String::new(),
        rejection: JoinRejection {
            code: PARSE_ERROR,
            message: format!("Malformed frame: {}", e),
        },
    })?;

    if frame.kind != JOIN {
        warn!("First frame was {} instead of {}", frame.kind, JOIN);
        return Err(JoinFailure {
            session_id: frame.session_id,
            rejection: JoinRejection {
                code: JOIN_REQUIRED,
                message: format!("Expected {} as first frame", JOIN),
            },
        });
    }

    let join: JoinMessage = match serde_json::from_value(frame.payload) {
        Ok(join) => join,
        Err(e) => {
            return Err(JoinFailure {
                session_id: frame.session_id,
                rejection: JoinRejection {
                    code: INVALID_SESSION,
                    message: format!("Malformed join payload: {}", e),
                },
            })
        }
    };

    match hub.join(&frame.session_id, join.peer_id, join.role, outbound) {
        Ok(membership) => {
            info!("Connection {} joined session {}", membership.conn_id, frame.session_id);
            Ok((frame.session_id, membership))
        }
        Err(rejection) => {
            warn!("Join to session {} refused: {}", frame.session_id, rejection.code);
            Err(JoinFailure {
                session_id: frame.session_id,
                rejection,
            })
        }
    }
}
