use async_trait::async_trait;

use crate::error::NotificationError;
use crate::models::NotificationIntent;

/// Durable queue of notification intents.
#[async_trait]
pub trait NotificationOutbox: Send + Sync {
    async fn enqueue(&self, intents: Vec<NotificationIntent>) -> Result<(), NotificationError>;

    /// Oldest pending intents first.
    async fn pending(&self, limit: usize) -> Result<Vec<NotificationIntent>, NotificationError>;

    /// Persists status, attempt count and last error of an intent.
    async fn update(&self, intent: &NotificationIntent) -> Result<(), NotificationError>;
}
