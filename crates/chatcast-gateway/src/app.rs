use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use chatcast_core::config::ChatcastConfig;
use chatcast_hub::Hub;
use std::sync::Arc;

/// Central shared state: passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: ChatcastConfig,
    /// The one broadcast hub of the process: `/chat` publishes into it,
    /// every `/events` stream holds one subscription.
    pub hub: Hub,
}

impl AppState {
    pub fn new(config: ChatcastConfig) -> Self {
        let hub = Hub::new(config.hub.clone());
        Self { config, hub }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.chat.max_upload_bytes;

    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/chat", post(crate::http::chat::chat_handler))
        .route("/events", get(crate::http::events::events_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
