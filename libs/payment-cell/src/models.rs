// libs/payment-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PaymentError;

// ==============================================================================
// PAYMENT RECORDS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Completed => write!(f, "completed"),
            PaymentStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One gateway order and, once captured, its settlement.
///
/// `amount` is in whole currency units; the gateway is sent minor units.
/// `booking_intent` is the intent the order was created for, stored as JSON so
/// the confirmation step can re-check it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub amount: i64,
    pub currency: String,
    #[serde(rename = "razorpay_order_id")]
    pub gateway_order_id: String,
    #[serde(rename = "razorpay_payment_id")]
    pub gateway_payment_id: Option<String>,
    #[serde(rename = "razorpay_signature")]
    pub gateway_signature: Option<String>,
    pub status: PaymentStatus,
    pub payment_method: String,
    pub booking_intent: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn pending(
        patient_id: Uuid,
        amount: i64,
        currency: &str,
        gateway_order_id: &str,
        booking_intent: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            patient_id,
            appointment_id: None,
            amount,
            currency: currency.to_string(),
            gateway_order_id: gateway_order_id.to_string(),
            gateway_payment_id: None,
            gateway_signature: None,
            status: PaymentStatus::Pending,
            payment_method: "razorpay".to_string(),
            booking_intent,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when this payment was already settled by the given gateway payment.
    pub fn is_settled_by(&self, gateway_payment_id: &str) -> bool {
        self.status == PaymentStatus::Completed
            && self.gateway_payment_id.as_deref() == Some(gateway_payment_id)
    }
}

/// Order returned by the gateway's orders API. Amount is in minor units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: Option<String>,
}

// ==============================================================================
// GATEWAY CONFIRMATION
// ==============================================================================

/// Confirmation fields exactly as the hosted checkout hands them to the client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfirmationPayload {
    pub razorpay_order_id: Option<String>,
    pub razorpay_payment_id: Option<String>,
    pub razorpay_signature: Option<String>,
}

/// A confirmation whose fields are present and well-formed. Not yet verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfirmation {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

impl TryFrom<ConfirmationPayload> for GatewayConfirmation {
    type Error = PaymentError;

    fn try_from(payload: ConfirmationPayload) -> Result<Self, Self::Error> {
        let order_id = required("razorpay_order_id", payload.razorpay_order_id)?;
        let payment_id = required("razorpay_payment_id", payload.razorpay_payment_id)?;
        let signature = required("razorpay_signature", payload.razorpay_signature)?;

        for (field, value) in [("razorpay_order_id", &order_id), ("razorpay_payment_id", &payment_id)] {
            if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(PaymentError::InvalidPaymentData(format!("{} has invalid characters", field)));
            }
        }

        if signature.len() != 64 || !signature.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PaymentError::InvalidPaymentData(
                "razorpay_signature must be 64 hex characters".to_string(),
            ));
        }

        Ok(Self { order_id, payment_id, signature })
    }
}

fn required(field: &str, value: Option<String>) -> Result<String, PaymentError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(PaymentError::InvalidPaymentData(format!("{} is required", field))),
    }
}
