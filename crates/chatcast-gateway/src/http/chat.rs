//! Chat submission endpoint: POST /chat
//!
//! Accepts a multipart form, validates it, broadcasts the resulting
//! [`ChatEvent`] to every `/events` listener and echoes what it accepted.
//!
//! Fields:
//!   - `message` (required): non-blank, at most `chat.max_message_chars`
//!   - `cid` (optional): conversation id, passed through untouched
//!   - `file` (optional): upload whose content type is in
//!     `chat.allowed_content_types`; only its metadata is broadcast
//!
//! Response: `{"message": "...", "cid": "...", "file_name"?, "content_type"?, "size"?}`
//! Error:    `{"error": "...", "code": "..."}`

use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    Json,
};
use chatcast_core::{config::ChatConfig, Attachment, ChatEvent, ChatcastError};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::{reject, ChatError};
use crate::app::AppState;

const NO_CID: &str = "no cid provided";

/// Raw form fields as they came off the wire.
#[derive(Debug, Default)]
pub struct ChatForm {
    pub message: Option<String>,
    pub cid: Option<String>,
    pub file: Option<Upload>,
}

#[derive(Debug)]
pub struct Upload {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub message: String,
    pub cid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
}

impl From<&ChatEvent> for ChatReply {
    fn from(ev: &ChatEvent) -> Self {
        let attachment = ev.attachment.as_ref();
        Self {
            message: ev.message.clone(),
            cid: ev.cid.clone().unwrap_or_else(|| NO_CID.to_string()),
            file_name: attachment.map(|a| a.file_name.clone()),
            content_type: attachment.map(|a| a.content_type.clone()),
            size: attachment.map(|a| a.size),
        }
    }
}

/// POST /chat: validate, broadcast, echo.
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ChatReply>, (StatusCode, Json<ChatError>)> {
    let mut multipart = multipart
        .map_err(|e| reject(ChatcastError::Validation(e.body_text())))?;
    let limits = &state.config.chat;
    let form = read_form(&mut multipart, limits).await.map_err(reject)?;
    let event = form.validate(limits).map_err(reject)?;

    let payload = event.to_payload().map_err(reject)?;
    let report = state.hub.publish(payload).await;
    info!(
        event_id = %event.id,
        cid = event.cid.as_deref().unwrap_or("-"),
        delivered = report.delivered,
        failed = report.failures.len(),
        "chat message broadcast"
    );

    Ok(Json(ChatReply::from(&event)))
}

/// Collect the known fields; anything else is rejected.
async fn read_form(multipart: &mut Multipart, limits: &ChatConfig) -> chatcast_core::Result<ChatForm> {
    let mut form = ChatForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limits))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "message" => {
                form.message = Some(field.text().await.map_err(|e| multipart_error(e, limits))?);
            }
            "cid" => {
                let cid = field.text().await.map_err(|e| multipart_error(e, limits))?;
                form.cid = Some(cid).filter(|c| !c.is_empty());
            }
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(|e| multipart_error(e, limits))?;

                // browsers send an empty, unnamed part when no file was picked
                if file_name.is_empty() && data.is_empty() {
                    debug!("empty file part ignored");
                    continue;
                }
                form.file = Some(Upload {
                    file_name,
                    content_type,
                    data,
                });
            }
            other => {
                return Err(ChatcastError::Validation(format!(
                    "unexpected field: {other:?}"
                )));
            }
        }
    }

    Ok(form)
}

fn multipart_error(e: MultipartError, limits: &ChatConfig) -> ChatcastError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ChatcastError::PayloadTooLarge {
            max: limits.max_upload_bytes,
        }
    } else {
        ChatcastError::Validation(e.body_text())
    }
}

impl ChatForm {
    /// Apply the chat limits and turn the form into the event to broadcast.
    pub fn validate(self, limits: &ChatConfig) -> chatcast_core::Result<ChatEvent> {
        let message = self
            .message
            .ok_or_else(|| ChatcastError::Validation("message is required".to_string()))?;

        if message.trim().is_empty() {
            return Err(ChatcastError::Validation(
                "message is required and must not be empty".to_string(),
            ));
        }

        let chars = message.chars().count();
        if chars > limits.max_message_chars {
            return Err(ChatcastError::Validation(format!(
                "message is {chars} characters long (max {})",
                limits.max_message_chars
            )));
        }

        let mut event = ChatEvent::new(message, self.cid);

        if let Some(upload) = self.file {
            let accepted = limits
                .allowed_content_types
                .iter()
                .any(|t| t.eq_ignore_ascii_case(&upload.content_type));
            if !accepted {
                return Err(ChatcastError::UnsupportedMedia {
                    content_type: upload.content_type,
                });
            }

            event = event.with_attachment(Attachment {
                file_name: upload.file_name,
                content_type: upload.content_type,
                size: upload.data.len(),
            });
        }

        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use chatcast_core::{ChatcastConfig, HubConfig};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::app::{build_router, AppState};

    const BOUNDARY: &str = "chatcast-test-boundary";

    enum Part<'a> {
        Text(&'a str, &'a str),
        File(&'a str, &'a str, &'a [u8]),
    }

    fn multipart_request(parts: &[Part<'_>]) -> Request<Body> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                            .as_bytes(),
                    );
                }
                Part::File(file_name, content_type, data) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
                             Content-Type: {content_type}\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                    body.extend_from_slice(b"\r\n");
                }
            }
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::post("/chat")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn state() -> Arc<AppState> {
        state_with(ChatConfig::default())
    }

    fn state_with(chat: ChatConfig) -> Arc<AppState> {
        let config = ChatcastConfig {
            hub: HubConfig::unbounded(),
            chat,
            ..ChatcastConfig::default()
        };
        Arc::new(AppState::new(config))
    }

    async fn send(state: &Arc<AppState>, req: Request<Body>) -> (StatusCode, Value) {
        let resp = build_router(Arc::clone(state)).oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn form(message: &str) -> ChatForm {
        ChatForm {
            message: Some(message.to_string()),
            ..ChatForm::default()
        }
    }

    #[test]
    fn blank_message_is_rejected() {
        let err = form("   \n").validate(&ChatConfig::default()).unwrap_err();
        assert!(matches!(err, ChatcastError::Validation(_)));

        let err = ChatForm::default().validate(&ChatConfig::default()).unwrap_err();
        assert!(matches!(err, ChatcastError::Validation(_)));
    }

    #[test]
    fn length_limit_counts_characters() {
        let limits = ChatConfig::default();
        assert!(form(&"é".repeat(500)).validate(&limits).is_ok());
        assert!(form(&"é".repeat(501)).validate(&limits).is_err());
    }

    #[test]
    fn only_allowed_content_types_pass() {
        let upload = |content_type: &str| ChatForm {
            message: Some("pic".to_string()),
            cid: None,
            file: Some(Upload {
                file_name: "x".to_string(),
                content_type: content_type.to_string(),
                data: Bytes::from_static(b"123"),
            }),
        };
        let limits = ChatConfig::default();

        let ev = upload("image/JPEG").validate(&limits).unwrap();
        assert_eq!(ev.attachment.unwrap().size, 3);

        let err = upload("application/pdf").validate(&limits).unwrap_err();
        assert!(matches!(err, ChatcastError::UnsupportedMedia { .. }));
    }

    #[tokio::test]
    async fn accepted_message_reaches_subscribers() {
        let state = state();
        let listener = state.hub.subscribe().unwrap();

        let (status, body) = send(
            &state,
            multipart_request(&[Part::Text("message", "hello"), Part::Text("cid", "c-42")]),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "hello");
        assert_eq!(body["cid"], "c-42");
        assert!(body.get("file_name").is_none());

        let delivered = listener.try_recv().expect("event broadcast");
        let event: ChatEvent = serde_json::from_str(&delivered).unwrap();
        assert_eq!(event.message, "hello");
        assert_eq!(event.cid.as_deref(), Some("c-42"));
    }

    #[tokio::test]
    async fn file_metadata_is_echoed_and_broadcast() {
        let state = state();
        let listener = state.hub.subscribe().unwrap();

        let (status, body) = send(
            &state,
            multipart_request(&[
                Part::Text("message", "look"),
                Part::File("cat.png", "image/png", b"\x89PNG fake"),
            ]),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cid"], NO_CID);
        assert_eq!(body["file_name"], "cat.png");
        assert_eq!(body["content_type"], "image/png");
        assert_eq!(body["size"], 9);

        let event: ChatEvent = serde_json::from_str(&listener.try_recv().unwrap()).unwrap();
        assert_eq!(event.attachment.unwrap().file_name, "cat.png");
    }

    #[tokio::test]
    async fn invalid_submissions_are_not_broadcast() {
        let state = state();
        let listener = state.hub.subscribe().unwrap();

        let (status, body) = send(&state, multipart_request(&[Part::Text("message", "  ")])).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let (status, _) = send(
            &state,
            multipart_request(&[Part::Text("message", "hi"), Part::Text("extra", "nope")]),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, body) = send(
            &state,
            multipart_request(&[
                Part::Text("message", "doc"),
                Part::File("a.pdf", "application/pdf", b"%PDF"),
            ]),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "UNSUPPORTED_MEDIA");

        assert!(listener.is_empty());
    }

    #[tokio::test]
    async fn blank_cid_is_echoed_as_sent() {
        let state = state();

        let (status, body) = send(
            &state,
            multipart_request(&[Part::Text("message", "hi"), Part::Text("cid", "  ")]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cid"], "  ");

        let (_, body) = send(
            &state,
            multipart_request(&[Part::Text("message", "hi"), Part::Text("cid", "")]),
        )
        .await;
        assert_eq!(body["cid"], NO_CID);
    }

    #[tokio::test]
    async fn oversized_body_answers_413() {
        let state = state_with(ChatConfig {
            max_upload_bytes: 64,
            ..ChatConfig::default()
        });
        let listener = state.hub.subscribe().unwrap();

        let (status, body) = send(
            &state,
            multipart_request(&[
                Part::Text("message", "big"),
                Part::File("big.png", "image/png", &[0u8; 200]),
            ]),
        )
        .await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["code"], "PAYLOAD_TOO_LARGE");
        assert!(listener.is_empty());
    }

    #[tokio::test]
    async fn non_multipart_request_gets_json_error() {
        let state = state();
        let req = Request::post("/chat")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"message":"hi"}"#))
            .unwrap();

        let (status, body) = send(&state, req).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }
}
