use chatcast_core::ChatcastError;
use thiserror::Error;

/// Errors surfaced to the caller of a hub operation.
///
/// Unsubscribing an unknown handle is deliberately not represented here:
/// it is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    /// The configured subscriber ceiling is reached.
    #[error("subscriber limit reached: max {limit}")]
    ResourceExhausted { limit: usize },
}

/// Why one subscriber did not get one message.
///
/// Recorded in [`crate::PublishReport`]; never raised to the publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Bounded queue full under `drop-newest`, or still full when a
    /// `block` publish timed out.
    #[error("queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// The queue was unsubscribed after the publish took its snapshot.
    #[error("subscriber detached")]
    Detached,
}

impl From<HubError> for ChatcastError {
    fn from(e: HubError) -> Self {
        match e {
            HubError::ResourceExhausted { limit } => ChatcastError::SubscriberLimit { limit },
        }
    }
}

pub type Result<T> = std::result::Result<T, HubError>;
