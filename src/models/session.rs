use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Request body for issuing a pairing session
#[derive(Serialize, Deserialize, ToSchema, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct IssueSessionRequest {
    /// Defaults to `scan-to-pdf`
    #[serde(default)]
    pub action: Option<String>,
}

/// Issued session together with the text to encode in the QR code
#[derive(Serialize, Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct IssueSessionResponse {
    pub session_id: String,
    pub action: String,
    pub server_url: String,
    /// ISO-8601, identical to the `timestamp` inside `qr_payload`
    pub timestamp: String,
    pub qr_payload: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusResponse {
    pub session_id: String,
    pub issued: bool,
    pub peer_count: usize,
}
