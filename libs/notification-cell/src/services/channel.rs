use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{header::{HeaderMap, HeaderValue}, Method};
use serde_json::json;
use tracing::{debug, instrument};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::error::NotificationError;
use crate::models::NotificationIntent;

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn deliver(&self, intent: &NotificationIntent) -> Result<(), NotificationError>;
}

/// Delivers through the `send-notification` edge function, which owns
/// templates and fan-out to email and push.
pub struct EdgeFunctionChannel {
    supabase: Arc<SupabaseClient>,
    internal_secret: Option<String>,
}

impl EdgeFunctionChannel {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::service(config)),
            internal_secret: config.internal_service_secret.clone(),
        }
    }
}

#[async_trait]
impl NotificationChannel for EdgeFunctionChannel {
    #[instrument(skip(self, intent), fields(intent_id = %intent.id, kind = %intent.kind))]
    async fn deliver(&self, intent: &NotificationIntent) -> Result<(), NotificationError> {
        let secret = self.internal_secret.as_deref()
            .ok_or_else(|| NotificationError::NotConfigured("INTERNAL_SERVICE_SECRET".to_string()))?;

        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(secret)
            .map_err(|_| NotificationError::NotConfigured("internal secret is not a valid header".to_string()))?;
        headers.insert("X-Internal-Secret", value);

        let body = json!({
            "user_id": intent.user_id,
            "appointment_id": intent.appointment_id,
            "type": intent.kind,
            "title": intent.title,
            "message": intent.message,
            "channels": intent.channel_hints,
        });

        let _: serde_json::Value = self.supabase
            .request_with_headers(Method::POST, "/functions/v1/send-notification", None, Some(body), headers)
            .await
            .map_err(|e| NotificationError::Delivery(e.to_string()))?;

        debug!("Notification {} handed to edge function", intent.id);
        Ok(())
    }
}
