use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, error, info, instrument};

use shared_config::AppConfig;

use crate::error::PaymentError;
use crate::models::GatewayOrder;

#[derive(Debug, Clone)]
pub struct OrderRequest {
    /// Whole currency units.
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub notes: serde_json::Value,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, request: OrderRequest) -> Result<GatewayOrder, PaymentError>;

    /// Public key id handed to the hosted checkout.
    fn key_id(&self) -> &str;
}

pub struct RazorpayClient {
    client: Client,
    base_url: String,
    key_id: String,
    key_secret: Option<String>,
}

impl RazorpayClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.razorpay_base_url.trim_end_matches('/').to_string(),
            key_id: config.razorpay_key_id.clone(),
            key_secret: config.razorpay_key_secret.clone(),
        }
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    #[instrument(skip(self, request), fields(receipt = %request.receipt))]
    async fn create_order(&self, request: OrderRequest) -> Result<GatewayOrder, PaymentError> {
        let secret = self.key_secret.as_deref().ok_or(PaymentError::SecretNotConfigured)?;

        if request.amount <= 0 {
            return Err(PaymentError::InvalidPaymentData("amount must be positive".to_string()));
        }
        let amount_minor = request.amount.checked_mul(100)
            .ok_or_else(|| PaymentError::InvalidPaymentData("amount out of range".to_string()))?;

        let url = format!("{}/orders", self.base_url);
        debug!("Creating gateway order at {}", url);

        let response = self.client
            .post(&url)
            .basic_auth(&self.key_id, Some(secret))
            .json(&json!({
                "amount": amount_minor,
                "currency": request.currency,
                "receipt": request.receipt,
                "notes": request.notes,
            }))
            .send()
            .await
            .map_err(|e| PaymentError::Gateway(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Gateway order creation failed ({}): {}", status, body);
            return Err(PaymentError::Gateway(format!("order creation failed with status {}", status)));
        }

        let order: GatewayOrder = response
            .json()
            .await
            .map_err(|e| PaymentError::Gateway(format!("unreadable order response: {}", e)))?;

        info!("Created gateway order {}", order.id);
        Ok(order)
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }
}
