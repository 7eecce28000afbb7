use async_trait::async_trait;

use crate::app::Result;
use crate::dispatch::DeliveryPayload;

/// Destination for formatted payloads.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn deliver(&self, payload: &DeliveryPayload) -> Result<()>;
}
