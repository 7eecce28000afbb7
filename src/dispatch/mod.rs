//! Formatting and delivery of a run batch.
//!
//! Each selected item becomes one payload. An item id is committed to the
//! seen store only after its payload was delivered, or after the final
//! failed attempt when `mark_on_failure` is set.

mod format;
mod sink;
mod telegram;

pub use format::{
    escape_html, truncate_escaped, DeliveryPayload, Formatter, ParseMode, MAX_CAPTION_LEN,
    MAX_TEXT_LEN,
};
pub use sink::Sink;
pub use telegram::{TelegramSink, Update};

#[cfg(test)]
pub(crate) use sink::testing;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::app::Result;
use crate::config::DeliveryConfig;
use crate::domain::RunBatch;
use crate::store::SeenStore;

#[derive(Debug, Clone)]
pub struct DeliveryPolicy {
    pub max_attempts: u32,
    pub mark_on_failure: bool,
    pub retry_delay: Duration,
    /// Pause between consecutive payloads.
    pub send_interval: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            mark_on_failure: true,
            retry_delay: Duration::from_millis(1000),
            send_interval: Duration::from_millis(1000),
        }
    }
}

impl From<&DeliveryConfig> for DeliveryPolicy {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            mark_on_failure: config.mark_on_failure,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            send_interval: Duration::from_millis(config.send_interval_ms),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
    pub marked: usize,
    pub fallback: bool,
}

pub struct Dispatcher {
    formatter: Formatter,
    sink: Arc<dyn Sink>,
    policy: DeliveryPolicy,
}

impl Dispatcher {
    pub fn new(formatter: Formatter, sink: Arc<dyn Sink>, policy: DeliveryPolicy) -> Self {
        Self {
            formatter,
            sink,
            policy,
        }
    }

    pub fn formatter(&self) -> &Formatter {
        &self.formatter
    }

    /// Deliver `batch` and record delivered ids in `store`.
    ///
    /// Delivery failures are counted, never returned; only store errors
    /// abort the dispatch.
    pub async fn dispatch<S: SeenStore + ?Sized>(
        &self,
        batch: &RunBatch,
        store: &S,
    ) -> Result<DispatchReport> {
        let payloads = self.formatter.build_payloads(batch);
        let mut report = DispatchReport {
            fallback: batch.is_empty(),
            ..Default::default()
        };

        for (i, payload) in payloads.iter().enumerate() {
            if i > 0 && !self.policy.send_interval.is_zero() {
                tokio::time::sleep(self.policy.send_interval).await;
            }

            let delivered = self.deliver_with_retry(payload).await;
            if delivered {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }

            let Some(ref id) = payload.item_id else {
                continue;
            };
            if delivered || self.policy.mark_on_failure {
                if !delivered {
                    tracing::warn!(item_id = %id, "marking undelivered item as sent");
                }
                store.mark_sent(id)?;
                report.marked += 1;
            }
        }

        tracing::info!(
            delivered = report.delivered,
            failed = report.failed,
            marked = report.marked,
            fallback = report.fallback,
            "dispatch finished"
        );
        Ok(report)
    }

    async fn deliver_with_retry(&self, payload: &DeliveryPayload) -> bool {
        let mut current = payload.clone();

        for attempt in 1..=self.policy.max_attempts {
            match self.sink.deliver(&current).await {
                Ok(()) => return true,
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        item_id = current.item_id.as_deref().unwrap_or("-"),
                        error = %e,
                        "delivery failed"
                    );
                    // A rejected image is retried as plain text.
                    if current.image_url.is_some() {
                        current = current.without_image();
                    }
                    if attempt < self.policy.max_attempts && !self.policy.retry_delay.is_zero() {
                        tokio::time::sleep(self.policy.retry_delay).await;
                    }
                }
            }
        }

        false
    }
}
