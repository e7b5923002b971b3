use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Default action carried by pairing codes shown on the scan screen
pub const SCAN_TO_PDF_ACTION: &str = "scan-to-pdf";

/// Opaque session token shared by both paired devices
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Content of the pairing QR code.
///
/// Fields this version does not know about are kept in `extra` so a payload
/// produced by a newer peer survives a parse/serialize cycle unchanged.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PairingPayload {
    pub session_id: SessionId,
    pub action: String,
    pub server_url: String,
    /// ISO-8601 issue time, kept as sent so the payload re-serializes verbatim
    pub timestamp: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PairingPayload {
    /// Text placed in the QR code
    pub fn to_qr_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a scanned QR code
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Issue time, `None` when the timestamp is not valid RFC 3339
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}
