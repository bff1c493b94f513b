use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatcastError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Unsupported media type: {content_type}")]
    UnsupportedMedia { content_type: String },

    #[error("Payload too large (max {max} bytes)")]
    PayloadTooLarge { max: usize },

    #[error("Subscriber limit reached ({limit})")]
    SubscriberLimit { limit: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ChatcastError {
    /// Short error code string sent to HTTP clients alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            ChatcastError::Config(_) => "CONFIG_ERROR",
            ChatcastError::Validation(_) => "VALIDATION_ERROR",
            ChatcastError::UnsupportedMedia { .. } => "UNSUPPORTED_MEDIA",
            ChatcastError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            ChatcastError::SubscriberLimit { .. } => "SUBSCRIBER_LIMIT",
            ChatcastError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatcastError>;
