use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{error, warn};

use shared_config::AppConfig;

use crate::error::PaymentError;
use crate::models::GatewayConfirmation;

type HmacSha256 = Hmac<Sha256>;

fn signed_message(order_id: &str, payment_id: &str) -> String {
    format!("{}|{}", order_id, payment_id)
}

/// Hex-encoded HMAC-SHA256 of `order_id|payment_id`, as the gateway signs it.
pub fn compute_signature(order_id: &str, payment_id: &str, secret: &str) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return String::new(),
    };
    mac.update(signed_message(order_id, payment_id).as_bytes());
    mac.finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Constant-time check of a gateway signature.
pub fn verify(order_id: &str, payment_id: &str, signature: &str, secret: &str) -> bool {
    let Some(expected) = decode_hex(signature) else {
        return false;
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(signed_message(order_id, payment_id).as_bytes());
    mac.verify_slice(&expected).is_ok()
}

fn decode_hex(input: &str) -> Option<Vec<u8>> {
    if input.len() % 2 != 0 {
        return None;
    }
    input
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            let s = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(s, 16).ok()
        })
        .collect()
}

pub struct PaymentVerifier {
    secret: Option<String>,
}

impl PaymentVerifier {
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.razorpay_key_secret.clone())
    }

    /// Gate for every state change driven by a gateway callback.
    pub fn verify_confirmation(&self, confirmation: &GatewayConfirmation) -> Result<(), PaymentError> {
        let secret = match self.secret.as_deref() {
            Some(s) if !s.is_empty() => s,
            _ => {
                error!("Payment verification attempted without a configured gateway secret");
                return Err(PaymentError::SecretNotConfigured);
            }
        };

        if verify(&confirmation.order_id, &confirmation.payment_id, &confirmation.signature, secret) {
            Ok(())
        } else {
            warn!(
                order_id = %confirmation.order_id,
                payment_id = %confirmation.payment_id,
                "Gateway signature mismatch"
            );
            Err(PaymentError::VerificationFailed { order_id: confirmation.order_id.clone() })
        }
    }
}
