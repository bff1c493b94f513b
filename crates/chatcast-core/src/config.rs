use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 18790;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_BLOCK_TIMEOUT_MS: u64 = 5_000; // publisher gives up on a full queue after 5s
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 15; // SSE comment cadence
pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 500;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024; // 10 MB request body cap

/// Top-level config (chatcast.toml + CHATCAST_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatcastConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Interval between SSE keep-alive comments on `/events`.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
        }
    }
}

/// What a subscriber queue does when a publish finds it full.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BackpressurePolicy {
    /// Never block, never drop. A subscriber that stops draining grows
    /// its queue without limit, so only use this for trusted, low-traffic
    /// deployments.
    Unbounded,
    /// Discard the oldest queued message to make room for the new one.
    #[default]
    DropOldest,
    /// Reject the new message for that subscriber.
    DropNewest,
    /// Suspend the publisher until the subscriber drains, up to
    /// `block_timeout_ms`.
    Block,
}

/// Broadcast hub tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Ceiling on concurrently registered subscribers. `None` = no limit.
    #[serde(default)]
    pub max_subscribers: Option<usize>,
    /// Per-subscriber queue capacity. Ignored by the `unbounded` policy.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub backpressure: BackpressurePolicy,
    /// How long a `block` publish waits for space before recording the
    /// subscriber as full.
    #[serde(default = "default_block_timeout_ms")]
    pub block_timeout_ms: u64,
    /// Subscribers untouched for this long are unsubscribed by the reaper.
    /// `None` disables the reaper.
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,
}

impl HubConfig {
    /// Unbounded queues, no subscriber ceiling, no reaper.
    pub fn unbounded() -> Self {
        Self {
            backpressure: BackpressurePolicy::Unbounded,
            ..Self::default()
        }
    }

    /// Bounded queues of `capacity` with the given overflow policy.
    pub fn bounded(capacity: usize, backpressure: BackpressurePolicy) -> Self {
        Self {
            queue_capacity: capacity,
            backpressure,
            ..Self::default()
        }
    }

    /// Effective queue capacity, `None` when queues are unbounded.
    pub fn capacity(&self) -> Option<usize> {
        match self.backpressure {
            BackpressurePolicy::Unbounded => None,
            // a zero-capacity queue could never accept anything
            _ => Some(self.queue_capacity.max(1)),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_subscribers: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            backpressure: BackpressurePolicy::default(),
            block_timeout_ms: DEFAULT_BLOCK_TIMEOUT_MS,
            idle_timeout_secs: None,
            reap_interval_secs: default_reap_interval_secs(),
        }
    }
}

/// Validation limits for `POST /chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// MIME types accepted for the optional `file` field.
    #[serde(default = "default_allowed_content_types")]
    pub allowed_content_types: Vec<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_content_types: default_allowed_content_types(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_keep_alive_secs() -> u64 {
    DEFAULT_KEEP_ALIVE_SECS
}
fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
fn default_block_timeout_ms() -> u64 {
    DEFAULT_BLOCK_TIMEOUT_MS
}
fn default_reap_interval_secs() -> u64 {
    30
}
fn default_max_message_chars() -> usize {
    DEFAULT_MAX_MESSAGE_CHARS
}
fn default_max_upload_bytes() -> usize {
    DEFAULT_MAX_UPLOAD_BYTES
}
fn default_allowed_content_types() -> Vec<String> {
    vec!["image/png".to_string(), "image/jpeg".to_string()]
}

impl ChatcastConfig {
    /// Load config from a TOML file with CHATCAST_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.chatcast/chatcast.toml
    ///
    /// Nested keys use a double underscore in env vars,
    /// e.g. `CHATCAST_HUB__MAX_SUBSCRIBERS=100`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: ChatcastConfig = Figment::from(Serialized::defaults(ChatcastConfig::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed("CHATCAST_").split("__"))
            .extract()
            .map_err(|e| crate::error::ChatcastError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.chatcast/chatcast.toml", home)
}
