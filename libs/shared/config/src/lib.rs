use std::env;
use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Whether slot capacity from the schedule is checked when booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotCapacityPolicy {
    /// Availability is informational only; the token allocator is the sole arbiter.
    Advisory,
    /// Order creation and confirmation are rejected once a slot is full.
    Enforced,
}

impl FromStr for SlotCapacityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "advisory" => Ok(SlotCapacityPolicy::Advisory),
            "enforced" => Ok(SlotCapacityPolicy::Enforced),
            other => Err(format!("unknown slot capacity policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BookingSettings {
    pub currency: String,
    pub token_max_attempts: u32,
    pub token_backoff_base_ms: u64,
    pub token_backoff_max_ms: u64,
    pub queue_cache_ttl_secs: u64,
    pub confirm_timeout_secs: u64,
    pub slot_capacity_policy: SlotCapacityPolicy,
    pub notification_poll_secs: u64,
    pub notification_max_attempts: u32,
    pub special_instructions_max_len: usize,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            currency: "INR".to_string(),
            token_max_attempts: 8,
            token_backoff_base_ms: 20,
            token_backoff_max_ms: 500,
            queue_cache_ttl_secs: 3,
            confirm_timeout_secs: 15,
            slot_capacity_policy: SlotCapacityPolicy::Advisory,
            notification_poll_secs: 5,
            notification_max_attempts: 5,
            special_instructions_max_len: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub supabase_jwt_secret: String,
    pub razorpay_key_id: String,
    pub razorpay_key_secret: Option<String>,
    pub razorpay_base_url: String,
    pub internal_service_secret: Option<String>,
    pub booking: BookingSettings,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = BookingSettings::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            razorpay_key_id: env::var("RAZORPAY_KEY_ID")
                .unwrap_or_else(|_| {
                    warn!("RAZORPAY_KEY_ID not set, using empty value");
                    String::new()
                }),
            razorpay_key_secret: optional_secret("RAZORPAY_KEY_SECRET"),
            razorpay_base_url: env::var("RAZORPAY_BASE_URL")
                .unwrap_or_else(|_| {
                    warn!("RAZORPAY_BASE_URL not set, using default");
                    "https://api.razorpay.com/v1".to_string()
                }),
            internal_service_secret: optional_secret("INTERNAL_SERVICE_SECRET"),
            booking: BookingSettings {
                currency: env::var("BOOKING_CURRENCY").unwrap_or(defaults.currency),
                token_max_attempts: parsed_or("TOKEN_MAX_ATTEMPTS", defaults.token_max_attempts),
                token_backoff_base_ms: parsed_or("TOKEN_BACKOFF_BASE_MS", defaults.token_backoff_base_ms),
                token_backoff_max_ms: parsed_or("TOKEN_BACKOFF_MAX_MS", defaults.token_backoff_max_ms),
                queue_cache_ttl_secs: parsed_or("QUEUE_CACHE_TTL_SECS", defaults.queue_cache_ttl_secs),
                confirm_timeout_secs: parsed_or("CONFIRM_TIMEOUT_SECS", defaults.confirm_timeout_secs),
                slot_capacity_policy: parsed_or("SLOT_CAPACITY_POLICY", defaults.slot_capacity_policy),
                notification_poll_secs: parsed_or("NOTIFICATION_POLL_SECS", defaults.notification_poll_secs),
                notification_max_attempts: parsed_or("NOTIFICATION_MAX_ATTEMPTS", defaults.notification_max_attempts),
                special_instructions_max_len: parsed_or(
                    "SPECIAL_INSTRUCTIONS_MAX_LEN",
                    defaults.special_instructions_max_len,
                ),
            },
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        if !config.is_payment_configured() {
            warn!("Payment gateway not configured - booking confirmations will be rejected");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_service_role_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_payment_configured(&self) -> bool {
        !self.razorpay_key_id.is_empty()
            && self.razorpay_key_secret.as_deref().is_some_and(|s| !s.is_empty())
    }
}

fn optional_secret(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => {
            warn!("{} not set", key);
            None
        }
    }
}

fn parsed_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("{} has invalid value '{}' ({}), using default {}", key, raw, e, default);
            default
        }),
        Err(_) => default,
    }
}

impl Display for SlotCapacityPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotCapacityPolicy::Advisory => write!(f, "advisory"),
            SlotCapacityPolicy::Enforced => write!(f, "enforced"),
        }
    }
}
