use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    #[error("Invalid payment data: {0}")]
    InvalidPaymentData(String),

    #[error("Payment signature verification failed for order {order_id}")]
    VerificationFailed { order_id: String },

    #[error("Payment gateway secret is not configured")]
    SecretNotConfigured,

    #[error("Payment gateway error: {0}")]
    Gateway(String),
}
