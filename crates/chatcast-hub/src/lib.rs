//! In-process broadcast hub.
//!
//! Every subscriber owns a FIFO queue; [`Hub::publish`] pushes one message
//! into each queue registered at the moment it is called. Dropping a
//! [`SubscriberHandle`] unsubscribes it, so a session that ends on any path
//! stops receiving without extra bookkeeping.

pub mod error;
pub mod hub;
pub mod message;
pub mod queue;
pub mod reaper;

pub use error::{DeliveryError, HubError};
pub use hub::{Hub, PublishReport, SubscriberHandle};
pub use message::Message;
pub use queue::{QueueState, SubscriberId};
pub use reaper::spawn_reaper;
