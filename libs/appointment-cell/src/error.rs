use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use payment_cell::PaymentError;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("Invalid payment data: {0}")]
    InvalidPaymentData(String),

    #[error("Payment verification failed for order {order_id}")]
    PaymentVerificationFailed { order_id: String },

    #[error("Token allocation exhausted for doctor {doctor_id} on {date} after {attempts} attempts")]
    TokenAllocationExhausted { doctor_id: Uuid, date: NaiveDate, attempts: u32 },

    #[error("Booking persistence failed: {0}")]
    BookingPersistenceFailed(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Time slot no longer available: {message}")]
    SlotUnavailable { message: String, after_payment: bool },

    #[error("Order {order_id} was already settled by a different payment")]
    OrderAlreadySettled { order_id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Booking timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl BookingError {
    /// Money has moved but no consistent booking exists; an operator must look at it.
    pub fn requires_reconciliation(&self) -> bool {
        match self {
            BookingError::TokenAllocationExhausted { .. }
            | BookingError::BookingPersistenceFailed(_)
            | BookingError::OrderAlreadySettled { .. } => true,
            BookingError::SlotUnavailable { after_payment, .. } => *after_payment,
            _ => false,
        }
    }
}

impl From<PaymentError> for BookingError {
    fn from(e: PaymentError) -> Self {
        match e {
            PaymentError::InvalidPaymentData(msg) => BookingError::InvalidPaymentData(msg),
            PaymentError::VerificationFailed { order_id } => BookingError::PaymentVerificationFailed { order_id },
            PaymentError::SecretNotConfigured => {
                BookingError::Configuration("payment gateway secret is not configured".to_string())
            }
            PaymentError::Gateway(msg) => BookingError::Gateway(msg),
        }
    }
}
