use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Map;
use uuid::Uuid;

use crate::models::{PairingPayload, SessionId};
use crate::utils::qr;

/// New opaque session token (122 random bits, 32 hex chars)
pub fn issue_session() -> SessionId {
    SessionId::new(Uuid::new_v4().simple().to_string())
}

/// Everything the responder needs to join `session_id` on the relay
pub fn encode_pairing_payload(
    session_id: &SessionId,
    server_url: &str,
    action: &str,
    timestamp: DateTime<Utc>,
) -> PairingPayload {
    PairingPayload {
        session_id: session_id.clone(),
        action: action.to_string(),
        server_url: server_url.to_string(),
        timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        extra: Map::new(),
    }
}

/// Payload rendered as terminal QR lines
pub fn pairing_qr_lines(
    payload: &PairingPayload,
    max_width: u16,
    max_height: u16,
) -> Result<Vec<String>, serde_json::Error> {
    Ok(qr::render_qr_lines(&payload.to_qr_string()?, max_width, max_height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SCAN_TO_PDF_ACTION;
    use std::collections::HashSet;

    #[test]
    fn test_issue_session_has_no_collisions() {
        let ids: HashSet<SessionId> = (0..10_000).map(|_| issue_session()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_session_id_format() {
        let id = issue_session();
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_payload_round_trips_exactly() {
        let payload = encode_pairing_payload(
            &issue_session(),
            "ws://relay.local:3000/ws",
            SCAN_TO_PDF_ACTION,
            Utc::now(),
        );
        let text = payload.to_qr_string().unwrap();
        let parsed = PairingPayload::parse(&text).unwrap();

        assert_eq!(parsed, payload);
        assert_eq!(parsed.to_qr_string().unwrap(), text);
    }

    #[test]
    fn test_unknown_fields_survive_reserialization() {
        let text = r#"{"sessionId":"abc123","action":"scan-to-pdf","serverUrl":"ws://x/ws","timestamp":"2025-03-01T10:00:00Z","deviceHint":"pixel"}"#;
        let parsed = PairingPayload::parse(text).unwrap();
        assert_eq!(parsed.session_id.as_str(), "abc123");
        assert_eq!(parsed.extra["deviceHint"], "pixel");

        let again = PairingPayload::parse(&parsed.to_qr_string().unwrap()).unwrap();
        assert_eq!(again, parsed);
    }

    #[test]
    fn test_millisecond_timestamp_is_kept_verbatim() {
        let text = r#"{"sessionId":"abc123","action":"scan-to-pdf","serverUrl":"ws://x/ws","timestamp":"2025-03-01T10:00:00.000Z"}"#;
        let parsed = PairingPayload::parse(text).unwrap();

        assert_eq!(parsed.to_qr_string().unwrap(), text);
        let issued_at = parsed.issued_at().unwrap();
        assert_eq!(issued_at.to_rfc3339_opts(SecondsFormat::Secs, true), "2025-03-01T10:00:00Z");
    }

    #[test]
    fn test_issued_timestamp_has_millisecond_precision() {
        let at = DateTime::parse_from_rfc3339("2025-03-01T10:00:00.123456Z").unwrap().with_timezone(&Utc);
        let payload = encode_pairing_payload(&SessionId::new("s1"), "ws://x/ws", "scan-to-pdf", at);

        assert_eq!(payload.timestamp, "2025-03-01T10:00:00.123Z");
        assert!(PairingPayload { timestamp: "yesterday".into(), ..payload }.issued_at().is_none());
    }

    #[test]
    fn test_wire_field_names() {
        let payload = encode_pairing_payload(&SessionId::new("s1"), "ws://x/ws", "scan-to-pdf", Utc::now());
        let json: serde_json::Value = serde_json::from_str(&payload.to_qr_string().unwrap()).unwrap();
        for key in ["sessionId", "action", "serverUrl", "timestamp"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn test_qr_lines_render() {
        let payload = encode_pairing_payload(&issue_session(), "ws://x/ws", "scan-to-pdf", Utc::now());
        let lines = pairing_qr_lines(&payload, 200, 200).unwrap();
        assert!(lines.len() > 10);
    }
}
