pub mod chat;
pub mod events;
pub mod health;

use axum::{http::StatusCode, Json};
use chatcast_core::ChatcastError;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Serialize)]
pub struct ChatError {
    pub error: String,
    pub code: &'static str,
}

/// Map a domain error onto the status and JSON body handlers reply with.
pub fn reject(e: ChatcastError) -> (StatusCode, Json<ChatError>) {
    let status = match &e {
        ChatcastError::Validation(_) | ChatcastError::UnsupportedMedia { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ChatcastError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        ChatcastError::SubscriberLimit { .. } => StatusCode::SERVICE_UNAVAILABLE,
        ChatcastError::Config(_) | ChatcastError::Serialization(_) => {
            warn!(error = %e, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (
        status,
        Json(ChatError {
            error: e.to_string(),
            code: e.code(),
        }),
    )
}
