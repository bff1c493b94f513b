pub mod config;
pub mod error;
pub mod types;

pub use config::{BackpressurePolicy, ChatConfig, ChatcastConfig, GatewayConfig, HubConfig};
pub use error::{ChatcastError, Result};
pub use types::{Attachment, ChatEvent};
