#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;

use appointment_cell::{AppointmentType, BookingIntent, BookingOrchestrator, MemoryBookingStore, TokenType};
use notification_cell::DispatchHandle;
use payment_cell::{
    compute_signature, ConfirmationPayload, GatewayOrder, OrderRequest, PaymentError, PaymentGateway,
    PaymentVerifier,
};
use shared_config::BookingSettings;

pub const SECRET: &str = "test-razorpay-secret";

/// Gateway double that hands out sequential order ids.
#[derive(Default)]
pub struct StaticGateway {
    issued: AtomicUsize,
}

#[async_trait]
impl PaymentGateway for StaticGateway {
    async fn create_order(&self, request: OrderRequest) -> Result<GatewayOrder, PaymentError> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GatewayOrder {
            id: format!("order_test{}", n),
            amount: request.amount * 100,
            currency: request.currency,
            receipt: Some(request.receipt),
            status: Some("created".to_string()),
        })
    }

    fn key_id(&self) -> &str {
        "rzp_test_key"
    }
}

pub fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

pub fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

pub fn intent(doctor_id: Uuid) -> BookingIntent {
    BookingIntent {
        doctor_id,
        hospital_id: Uuid::new_v4(),
        appointment_date: date(),
        appointment_time: time(10, 0),
        appointment_type: AppointmentType::Consultation,
        token_type: TokenType::Normal,
        special_instructions: None,
        consultation_fee: 500,
        patient_name: Some("Test Patient".to_string()),
    }
}

pub fn signed(order_id: &str, payment_id: &str) -> ConfirmationPayload {
    ConfirmationPayload {
        razorpay_order_id: Some(order_id.to_string()),
        razorpay_payment_id: Some(payment_id.to_string()),
        razorpay_signature: Some(compute_signature(order_id, payment_id, SECRET)),
    }
}

pub fn fast_settings() -> BookingSettings {
    BookingSettings {
        token_max_attempts: 40,
        token_backoff_base_ms: 1,
        token_backoff_max_ms: 5,
        queue_cache_ttl_secs: 0,
        ..BookingSettings::default()
    }
}

pub fn orchestrator(store: Arc<MemoryBookingStore>, settings: BookingSettings) -> BookingOrchestrator {
    BookingOrchestrator::new(
        store,
        Arc::new(StaticGateway::default()),
        PaymentVerifier::new(Some(SECRET.to_string())),
        DispatchHandle::default(),
        settings,
    )
}
