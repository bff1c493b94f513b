//! Live event stream: GET /events
//!
//! Each connection is one hub subscription. The subscriber handle lives
//! inside the response stream, so when the client disconnects and axum
//! drops the stream the subscription goes with it.

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use std::{convert::Infallible, sync::Arc, time::Duration};
use tracing::debug;

use super::{reject, ChatError};
use crate::app::AppState;

/// GET /events: Server-Sent Events, one `data:` frame per broadcast.
pub async fn events_handler(
    State(state): State<Arc<AppState>>,
) -> Result<
    Sse<impl futures_util::Stream<Item = Result<Event, Infallible>>>,
    (StatusCode, Json<ChatError>),
> {
    let handle = state.hub.subscribe().map_err(|e| reject(e.into()))?;
    let subscriber_id = handle.id();
    debug!(subscriber_id, "event stream opened");

    let stream = async_stream::stream! {
        while let Some(msg) = handle.recv().await {
            yield Ok(Event::default().data(msg.as_str()));
        }
        debug!(subscriber_id, "event stream finished");
    };

    let keep_alive = KeepAlive::new().interval(Duration::from_secs(state.config.gateway.keep_alive_secs));
    Ok(Sse::new(stream).keep_alive(keep_alive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use chatcast_core::{ChatcastConfig, HubConfig};
    use futures_util::StreamExt;
    use tower::ServiceExt;

    use crate::app::build_router;

    fn state(max_subscribers: Option<usize>) -> Arc<AppState> {
        let config = ChatcastConfig {
            hub: HubConfig {
                max_subscribers,
                ..HubConfig::unbounded()
            },
            ..ChatcastConfig::default()
        };
        Arc::new(AppState::new(config))
    }

    fn events_request() -> Request<Body> {
        Request::get("/events").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn stream_forwards_broadcasts_and_unsubscribes_on_drop() {
        let state = state(None);
        let resp = build_router(Arc::clone(&state))
            .oneshot(events_request())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(state.hub.subscriber_count(), 1);

        state.hub.publish(r#"{"message":"hi"}"#).await;

        let mut body = resp.into_body().into_data_stream();
        let frame = body.next().await.unwrap().unwrap();
        let text = String::from_utf8(frame.to_vec()).unwrap();
        assert_eq!(text, "data: {\"message\":\"hi\"}\n\n");

        // client goes away
        drop(body);
        assert_eq!(state.hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn full_hub_answers_503() {
        let state = state(Some(1));
        let _taken = state.hub.subscribe().unwrap();

        let resp = build_router(Arc::clone(&state))
            .oneshot(events_request())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
