use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata of a file uploaded alongside a chat message.
///
/// Only the metadata travels through the hub; the bytes are consumed by
/// the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub size: usize,
}

/// One accepted chat message, as broadcast to every `/events` listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEvent {
    /// UUIDv7, so ids sort by arrival.
    pub id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    pub received_at: DateTime<Utc>,
}

impl ChatEvent {
    pub fn new(message: impl Into<String>, cid: Option<String>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            message: message.into(),
            cid,
            attachment: None,
            received_at: Utc::now(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// Serialize to the JSON string handed to the hub.
    pub fn to_payload(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
