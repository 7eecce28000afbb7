//! Chat commands over Bot API long polling.
//!
//! `/start` answers with a readiness notice. `/send` triggers a run right
//! away; the digest goes to the configured chat as usual and the requesting
//! chat gets a short summary.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinError;

use crate::app::{RelayError, Result};
use crate::config::TelegramConfig;
use crate::dispatch::{TelegramSink, Update};
use crate::pipeline::{Pipeline, RunSummary};

const START_REPLY: &str = "✅ Bot đã sẵn sàng. Gõ /send để test gửi ngay.";
const BUSY_REPLY: &str = "⏳ Đang có lượt gửi khác, thử lại sau.";
const DENIED_REPLY: &str = "⛔ Chat này không được phép dùng /send.";
const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Send,
}

impl Command {
    /// Parse the leading `/command` or `/command@botname` of a message.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.split_whitespace().next()?;
        let name = word.strip_prefix('/')?;
        let name = name.split_once('@').map_or(name, |(n, _)| n);
        match name {
            "start" => Some(Command::Start),
            "send" => Some(Command::Send),
            _ => None,
        }
    }
}

pub struct CommandBot {
    telegram: Arc<TelegramSink>,
    pipeline: Arc<Pipeline>,
    poll_timeout_secs: u64,
    allowed_chats: Vec<String>,
}

impl CommandBot {
    pub fn new(telegram: Arc<TelegramSink>, pipeline: Arc<Pipeline>, config: &TelegramConfig) -> Self {
        Self {
            telegram,
            pipeline,
            poll_timeout_secs: config.poll_timeout_secs,
            allowed_chats: config.command_chats.clone(),
        }
    }

    /// Poll until `shutdown` resolves. Polling errors back off and retry.
    pub async fn run<F: Future<Output = ()>>(&self, shutdown: F) -> Result<()> {
        tokio::pin!(shutdown);
        tracing::info!("command polling started");

        let mut offset = None;
        let mut backoff = Duration::from_secs(1);
        loop {
            let polled = tokio::select! {
                r = self.telegram.get_updates(offset, self.poll_timeout_secs) => r,
                _ = &mut shutdown => break,
            };

            match polled {
                Ok(updates) => {
                    backoff = Duration::from_secs(1);
                    for update in updates {
                        offset = Some(update.update_id + 1);
                        self.handle(update).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, retry_in = ?backoff, "getUpdates failed");
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = &mut shutdown => break,
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }

        tracing::info!("command polling stopped");
        Ok(())
    }

    async fn handle(&self, update: Update) {
        let Some(message) = update.message else {
            return;
        };
        let Some(command) = message.text.as_deref().and_then(Command::parse) else {
            return;
        };
        let chat_id = message.chat.id.to_string();
        tracing::info!(chat_id = %chat_id, ?command, "command received");

        match command {
            Command::Start => reply(&self.telegram, &chat_id, START_REPLY).await,
            Command::Send if !self.is_allowed(&chat_id) => {
                reply(&self.telegram, &chat_id, DENIED_REPLY).await
            }
            Command::Send => {
                // Reply from its own task so polling continues during the run.
                let run = self.pipeline.spawn_run();
                let telegram = Arc::clone(&self.telegram);
                tokio::spawn(async move {
                    let text = send_reply(run.await);
                    reply(&telegram, &chat_id, &text).await;
                });
            }
        }
    }

    fn is_allowed(&self, chat_id: &str) -> bool {
        self.allowed_chats.is_empty() || self.allowed_chats.iter().any(|c| c == chat_id)
    }
}

async fn reply(telegram: &TelegramSink, chat_id: &str, text: &str) {
    if let Err(e) = telegram.send_text(chat_id, text).await {
        tracing::warn!(chat_id = %chat_id, error = %e, "command reply failed");
    }
}

/// Summary line for the chat that asked for `/send`.
pub fn send_reply(outcome: std::result::Result<Result<RunSummary>, JoinError>) -> String {
    match outcome {
        Ok(Ok(summary)) if summary.dispatch.fallback => "📭 Không có tin mới.".to_string(),
        Ok(Ok(summary)) => {
            let report = &summary.dispatch;
            let mut text = format!("✅ Đã gửi {} tin", report.delivered);
            if report.failed > 0 {
                text.push_str(&format!(", {} lỗi", report.failed));
            }
            if !summary.failures.is_empty() {
                text.push_str(&format!(", {} nguồn lỗi", summary.failures.len()));
            }
            text.push('.');
            text
        }
        Ok(Err(RelayError::RunInProgress)) => BUSY_REPLY.to_string(),
        Ok(Err(e)) => format!("❌ Lỗi: {}", e),
        Err(e) => format!("❌ Lỗi: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::extract::{Path, State};
    use axum::routing::post;
    use axum::{Json, Router};
    use chrono::Utc;
    use serde_json::{json, Value};

    use super::*;
    use crate::collector::tests::{item, StaticAdapter};
    use crate::dispatch::testing::FakeSink;
    use crate::dispatch::DispatchReport;
    use crate::pipeline::tests::pipeline_with;

    type Replies = Arc<Mutex<Vec<(String, String)>>>;

    /// Bot API stand-in: the first poll yields `/start` and `/send`, later
    /// polls are empty. Replies are recorded.
    async fn mock_api(chat: i64) -> (String, Replies) {
        let replies: Replies = Arc::default();

        async fn handler(
            State((chat, replies)): State<(i64, Replies)>,
            Path((_bot, method)): Path<(String, String)>,
            Json(body): Json<Value>,
        ) -> Json<Value> {
            match method.as_str() {
                "getUpdates" if body.get("offset").is_none() => Json(json!({
                    "ok": true,
                    "result": [
                        { "update_id": 1, "message": { "chat": { "id": chat }, "text": "/start" } },
                        { "update_id": 2, "message": { "chat": { "id": chat }, "text": "hello" } },
                        { "update_id": 3, "message": { "chat": { "id": chat }, "text": "/send@newsbot now" } }
                    ]
                })),
                "getUpdates" => {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Json(json!({ "ok": true, "result": [] }))
                }
                _ => {
                    let chat_id = body["chat_id"].as_str().unwrap_or_default().to_string();
                    let text = body["text"].as_str().unwrap_or_default().to_string();
                    replies.lock().unwrap().push((chat_id, text));
                    Json(json!({ "ok": true, "result": {} }))
                }
            }
        }

        let app = Router::new()
            .route("/{bot}/{method}", post(handler))
            .with_state((chat, replies.clone()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}", addr), replies)
    }

    fn config(allowed: &[&str]) -> TelegramConfig {
        TelegramConfig {
            poll_timeout_secs: 1,
            command_chats: allowed.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    async fn wait_for_replies(replies: &Replies, n: usize) {
        for _ in 0..100 {
            if replies.lock().unwrap().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    fn summary(delivered: usize, failed: usize, fallback: bool) -> RunSummary {
        RunSummary {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            sources: vec![],
            failures: vec![],
            dispatch: DispatchReport {
                delivered,
                failed,
                marked: delivered + failed,
                fallback,
            },
        }
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("  /send now"), Some(Command::Send));
        assert_eq!(Command::parse("/send@newsbot"), Some(Command::Send));
        assert_eq!(Command::parse("/stop"), None);
        assert_eq!(Command::parse("send"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[test]
    fn test_send_reply_texts() {
        assert_eq!(send_reply(Ok(Ok(summary(3, 0, false)))), "✅ Đã gửi 3 tin.");
        assert_eq!(send_reply(Ok(Ok(summary(2, 1, false)))), "✅ Đã gửi 2 tin, 1 lỗi.");
        assert_eq!(send_reply(Ok(Ok(summary(0, 0, true)))), "📭 Không có tin mới.");
        assert_eq!(send_reply(Ok(Err(RelayError::RunInProgress))), BUSY_REPLY);
        assert!(send_reply(Ok(Err(RelayError::Other("disk full".into())))).contains("disk full"));
    }

    #[tokio::test]
    async fn test_commands_are_answered_and_send_runs() {
        let (base, replies) = mock_api(555).await;
        let telegram = Arc::new(TelegramSink::new(&base, "1:x", Duration::from_secs(5)).unwrap());
        let sink = Arc::new(FakeSink::new());
        let pipeline = Arc::new(pipeline_with(
            vec![StaticAdapter::ok("X", vec![item("x", "X", "A", "https://x/1")])],
            sink.clone(),
        ));
        let bot = CommandBot::new(telegram, pipeline.clone(), &config(&[]));

        let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
        let task = tokio::spawn(async move { bot.run(crate::daemon::wait_for(stop_rx)).await });

        wait_for_replies(&replies, 2).await;
        stop_tx.send_replace(true);
        task.await.unwrap().unwrap();

        let replies = replies.lock().unwrap();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0], ("555".to_string(), START_REPLY.to_string()));
        assert_eq!(replies[1], ("555".to_string(), "✅ Đã gửi 1 tin.".to_string()));
        // The digest itself went through the pipeline's sink
        assert_eq!(sink.attempts().len(), 1);
        assert!(pipeline.store().is_sent("x:https://x/1").unwrap());
    }

    #[tokio::test]
    async fn test_send_from_unlisted_chat_is_refused() {
        let (base, replies) = mock_api(777).await;
        let telegram = Arc::new(TelegramSink::new(&base, "1:x", Duration::from_secs(5)).unwrap());
        let sink = Arc::new(FakeSink::new());
        let pipeline = Arc::new(pipeline_with(
            vec![StaticAdapter::ok("X", vec![item("x", "X", "A", "https://x/1")])],
            sink.clone(),
        ));
        let bot = CommandBot::new(telegram, pipeline.clone(), &config(&["555"]));

        let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
        let task = tokio::spawn(async move { bot.run(crate::daemon::wait_for(stop_rx)).await });

        wait_for_replies(&replies, 2).await;
        stop_tx.send_replace(true);
        task.await.unwrap().unwrap();

        let replies = replies.lock().unwrap();
        assert_eq!(replies[1].1, DENIED_REPLY);
        assert!(sink.attempts().is_empty());
        assert!(pipeline.last_run().is_none());
    }

    #[tokio::test]
    async fn test_poll_errors_do_not_stop_the_loop() {
        // Nothing listens on port 9 locally
        let telegram =
            Arc::new(TelegramSink::new("http://127.0.0.1:9", "1:x", Duration::from_secs(1)).unwrap());
        let pipeline = Arc::new(pipeline_with(vec![], Arc::new(FakeSink::new())));
        let bot = CommandBot::new(telegram, pipeline, &config(&[]));

        let stopped = tokio::time::timeout(
            Duration::from_secs(5),
            bot.run(tokio::time::sleep(Duration::from_millis(300))),
        )
        .await;
        assert!(matches!(stopped, Ok(Ok(()))));
    }
}
