use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Outbox operation failed: {0}")]
    Outbox(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Delivery timeout: took longer than {timeout_seconds} seconds")]
    DeliveryTimeout { timeout_seconds: u64 },

    #[error("Notification channel not configured: {0}")]
    NotConfigured(String),
}
