use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};

use crate::app::{RelayError, Result};
use crate::dispatch::{DeliveryPayload, Sink};

/// Bot API sink: `sendMessage` for text, `sendPhoto` for image payloads.
#[derive(Clone)]
pub struct TelegramSink {
    client: Client,
    api_base: String,
    token: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Serialize)]
struct SendPhoto<'a> {
    chat_id: &'a str,
    photo: &'a str,
    caption: &'a str,
    parse_mode: &'static str,
}

#[derive(Serialize)]
struct SendReply<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
struct GetUpdates {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: [&'static str; 1],
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

/// An incoming update. Only chat messages are requested.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

impl TelegramSink {
    pub fn new(api_base: &str, token: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// Long-poll for updates after `offset`, waiting up to `timeout_secs`.
    pub async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>> {
        let body = GetUpdates {
            offset,
            timeout: timeout_secs,
            allowed_updates: ["message"],
        };
        let wait = Duration::from_secs(timeout_secs + 10);
        self.call("getUpdates", &body, Some(wait)).await
    }

    /// Plain-text message, no markup parsing.
    pub async fn send_text(&self, chat_id: &str, text: &str) -> Result<()> {
        let body = SendReply { chat_id, text };
        self.call::<IgnoredAny, _>("sendMessage", &body, None)
            .await
            .map(|_| ())
    }

    async fn call<T, B>(&self, method: &str, body: &B, timeout: Option<Duration>) -> Result<T>
    where
        T: DeserializeOwned + Default,
        B: Serialize + ?Sized,
    {
        let mut request = self.client.post(self.method_url(method)).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        // Request errors carry the URL, and the URL carries the token.
        let response = request
            .send()
            .await
            .map_err(|e| RelayError::Http(e.without_url()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RelayError::Http(e.without_url()))?;

        match serde_json::from_str::<ApiResponse<T>>(&text) {
            Ok(api) if api.ok => Ok(api.result.unwrap_or_default()),
            Ok(api) => Err(RelayError::Delivery {
                code: api.error_code.or(Some(i64::from(status.as_u16()))),
                message: api
                    .description
                    .unwrap_or_else(|| format!("{} returned ok=false", method)),
            }),
            Err(_) => Err(RelayError::Delivery {
                code: Some(i64::from(status.as_u16())),
                message: format!("unexpected {} response from {}", status, method),
            }),
        }
    }
}

#[async_trait]
impl Sink for TelegramSink {
    async fn deliver(&self, payload: &DeliveryPayload) -> Result<()> {
        match payload.image_url {
            Some(ref photo) => {
                let body = SendPhoto {
                    chat_id: &payload.recipient,
                    photo,
                    caption: &payload.text,
                    parse_mode: payload.parse_mode.as_str(),
                };
                self.call::<IgnoredAny, _>("sendPhoto", &body, None)
                    .await
                    .map(|_| ())
            }
            None => {
                let body = SendMessage {
                    chat_id: &payload.recipient,
                    text: &payload.text,
                    parse_mode: payload.parse_mode.as_str(),
                    disable_web_page_preview: payload.disable_preview,
                };
                self.call::<IgnoredAny, _>("sendMessage", &body, None)
                    .await
                    .map(|_| ())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::*;
    use crate::dispatch::ParseMode;

    type Calls = Arc<Mutex<Vec<(String, Value)>>>;

    /// Local stand-in for the Bot API. Rejects photos, accepts messages.
    async fn mock_api() -> (String, Calls) {
        let calls: Calls = Arc::default();

        async fn handler(
            State(calls): State<Calls>,
            Path((_bot, method)): Path<(String, String)>,
            Json(body): Json<Value>,
        ) -> (StatusCode, Json<Value>) {
            calls.lock().unwrap().push((method.clone(), body));
            if method == "getUpdates" {
                return (
                    StatusCode::OK,
                    Json(json!({
                        "ok": true,
                        "result": [
                            {
                                "update_id": 7,
                                "message": {
                                    "message_id": 1,
                                    "chat": { "id": 555, "type": "private" },
                                    "text": "/send"
                                }
                            },
                            { "update_id": 8, "edited_message": { "message_id": 1 } }
                        ]
                    })),
                );
            }
            if method == "sendPhoto" {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "ok": false,
                        "error_code": 400,
                        "description": "Bad Request: wrong type of the web page content"
                    })),
                )
            } else {
                (StatusCode::OK, Json(json!({ "ok": true, "result": {} })))
            }
        }

        let app = Router::new()
            .route("/{bot}/{method}", post(handler))
            .with_state(calls.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}", addr), calls)
    }

    fn payload(image: Option<&str>) -> DeliveryPayload {
        DeliveryPayload {
            recipient: "-100123".into(),
            text: "🔸 <b>X</b>\n<a href=\"https://x/1\">A</a>".into(),
            image_url: image.map(String::from),
            parse_mode: ParseMode::Html,
            disable_preview: true,
            item_id: Some("x:https://x/1".into()),
        }
    }

    #[tokio::test]
    async fn test_send_message_body() {
        let (base, calls) = mock_api().await;
        let sink = TelegramSink::new(&base, "123:abc", Duration::from_secs(5)).unwrap();

        sink.deliver(&payload(None)).await.unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "sendMessage");
        assert_eq!(calls[0].1["chat_id"], "-100123");
        assert_eq!(calls[0].1["parse_mode"], "HTML");
        assert_eq!(calls[0].1["disable_web_page_preview"], true);
    }

    #[tokio::test]
    async fn test_send_photo_error_is_reported() {
        let (base, calls) = mock_api().await;
        let sink = TelegramSink::new(&base, "123:abc", Duration::from_secs(5)).unwrap();

        let err = sink
            .deliver(&payload(Some("https://x/a.jpg")))
            .await
            .unwrap_err();

        match err {
            RelayError::Delivery { code, message } => {
                assert_eq!(code, Some(400));
                assert!(message.contains("wrong type"));
            }
            other => panic!("unexpected error: {other}"),
        }
        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].0, "sendPhoto");
        assert_eq!(calls[0].1["photo"], "https://x/a.jpg");
        assert!(calls[0].1["caption"].as_str().unwrap().contains("<b>X</b>"));
    }

    #[tokio::test]
    async fn test_get_updates() {
        let (base, calls) = mock_api().await;
        let sink = TelegramSink::new(&base, "123:abc", Duration::from_secs(5)).unwrap();

        let updates = sink.get_updates(Some(7), 1).await.unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].update_id, 7);
        let message = updates[0].message.as_ref().unwrap();
        assert_eq!(message.chat.id, 555);
        assert_eq!(message.text.as_deref(), Some("/send"));
        assert!(updates[1].message.is_none());

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].0, "getUpdates");
        assert_eq!(calls[0].1["offset"], 7);
        assert_eq!(calls[0].1["timeout"], 1);
        assert_eq!(calls[0].1["allowed_updates"], json!(["message"]));
    }

    #[tokio::test]
    async fn test_send_text_has_no_parse_mode() {
        let (base, calls) = mock_api().await;
        let sink = TelegramSink::new(&base, "123:abc", Duration::from_secs(5)).unwrap();

        sink.send_text("555", "a < b").await.unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].0, "sendMessage");
        assert_eq!(calls[0].1["chat_id"], "555");
        assert_eq!(calls[0].1["text"], "a < b");
        assert!(calls[0].1.get("parse_mode").is_none());
    }

    #[tokio::test]
    async fn test_transport_error_hides_token() {
        // Nothing listens on port 9 locally
        let sink =
            TelegramSink::new("http://127.0.0.1:9", "123:secret", Duration::from_secs(2)).unwrap();
        let err = sink.deliver(&payload(None)).await.unwrap_err();
        assert!(!err.to_string().contains("secret"));
    }
}
