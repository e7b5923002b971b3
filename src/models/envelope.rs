use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, base64::Base64};
use utoipa::ToSchema;
use uuid::Uuid;

/// Classification tag given to camera captures
pub const SCAN_DOCUMENT_TYPE: &str = "scan";

/// Unit of document data exchanged between paired devices.
///
/// Envelopes are never mutated after construction. A replacement is a new
/// envelope carrying the same `id`.
#[serde_as]
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEnvelope {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Opaque payload, base64 on the wire
    #[serde_as(as = "Base64")]
    #[schema(value_type = String, format = Byte)]
    pub content: Vec<u8>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

impl DocumentEnvelope {
    /// Wrap a captured payload. The id is time-ordered with a random tail.
    pub fn new_scan(content: Vec<u8>, name: Option<&str>) -> Self {
        let timestamp = Utc::now();
        let name = match name {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => format!("Scan {}", timestamp.format("%Y-%m-%d %H:%M:%S")),
        };
        Self {
            id: Uuid::now_v7().to_string(),
            name,
            kind: SCAN_DOCUMENT_TYPE.to_string(),
            size: Some(content.len() as u64),
            content,
            timestamp,
            thumbnail_url: None,
            preview: None,
        }
    }

    pub fn with_thumbnail_url(mut self, url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(url.into());
        self
    }
}
