use std::sync::Arc;

use anyhow::Error as AnyError;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error, warn};
use uuid::Uuid;

use notification_cell::{NotificationError, NotificationIntent, NotificationOutbox};
use payment_cell::Payment;
use shared_config::AppConfig;
use shared_database::supabase::{PostgrestError, SupabaseClient};

use crate::models::{
    Appointment, AppointmentStatus, AvailabilityWindow, ReconciliationTicket, StatusUpdate, TokenClaim,
};
use crate::store::{
    AppointmentRepository, ConflictKind, PaymentRepository, ReconciliationRepository, ScheduleRepository,
    StoreError, TokenLedger,
};

/// PostgREST-backed store. Uniqueness comes from these constraints:
///
/// - `token_ledger_partition_key` on (doctor_id, appointment_date, token_number)
/// - `token_ledger_claim_key` on (claim_key)
/// - `appointments_booking_reference_key` on (booking_reference)
/// - `appointments_gateway_order_key` on (gateway_order_id)
/// - `payments_gateway_payment_key` on (razorpay_payment_id)
pub struct SupabaseBookingStore {
    supabase: Arc<SupabaseClient>,
}

#[derive(Debug, Deserialize)]
struct TokenNumberRow {
    token_number: i32,
}

fn conflict_for(constraint: Option<&str>) -> Option<ConflictKind> {
    match constraint? {
        "token_ledger_partition_key" => Some(ConflictKind::Token),
        "token_ledger_claim_key" => Some(ConflictKind::Claim),
        "appointments_booking_reference_key" => Some(ConflictKind::BookingReference),
        "appointments_gateway_order_key" => Some(ConflictKind::GatewayOrder),
        "payments_gateway_payment_key" => Some(ConflictKind::GatewayPayment),
        _ => None,
    }
}

fn store_error(e: AnyError) -> StoreError {
    if let Some(pg) = e.downcast_ref::<PostgrestError>() {
        if pg.is_unique_violation() {
            if let Some(kind) = conflict_for(pg.constraint()) {
                return StoreError::Conflict(kind);
            }
            warn!("Unique violation on unexpected constraint: {}", pg.message);
        }
        if pg.is_auth_failure() {
            error!("Supabase rejected service credentials: {}", pg.message);
        }
    }
    StoreError::Unavailable(e.to_string())
}

fn to_body<T: serde::Serialize>(value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn outbox_error(e: StoreError) -> NotificationError {
    NotificationError::Outbox(e.to_string())
}

impl SupabaseBookingStore {
    pub fn new(config: &AppConfig) -> Self {
        Self { supabase: Arc::new(SupabaseClient::service(config)) }
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, StoreError> {
        debug!("GET {}", path);
        self.supabase
            .request::<Vec<T>>(Method::GET, path, None, None)
            .await
            .map_err(store_error)
    }

    async fn write<T: DeserializeOwned>(&self, method: Method, path: &str, body: Value) -> Result<Vec<T>, StoreError> {
        debug!("{} {}", method, path);
        self.supabase
            .request::<Option<Vec<T>>>(method, path, None, Some(body))
            .await
            .map(Option::unwrap_or_default)
            .map_err(store_error)
    }

    async fn enqueue_intents(&self, intents: Vec<NotificationIntent>) -> Result<(), StoreError> {
        if intents.is_empty() {
            return Ok(());
        }
        let _: Vec<Value> = self.write(Method::POST, "/rest/v1/notification_outbox", to_body(&intents)?).await?;
        Ok(())
    }

    /// Outbox rows follow the appointment write; a failure here is logged, not surfaced.
    async fn enqueue_after_write(&self, appointment_id: Uuid, intents: Vec<NotificationIntent>) {
        if let Err(e) = self.enqueue_intents(intents).await {
            error!(appointment_id = %appointment_id, "Failed to enqueue notifications: {}", e);
        }
    }
}

#[async_trait]
impl TokenLedger for SupabaseBookingStore {
    async fn highest_token(&self, doctor_id: Uuid, date: NaiveDate) -> Result<i32, StoreError> {
        let path = format!(
            "/rest/v1/token_ledger?doctor_id=eq.{}&appointment_date=eq.{}&select=token_number&order=token_number.desc&limit=1",
            doctor_id, date
        );
        let rows: Vec<TokenNumberRow> = self.fetch(&path).await?;
        Ok(rows.first().map(|r| r.token_number).unwrap_or(0))
    }

    async fn claim_token(&self, claim: &TokenClaim) -> Result<(), StoreError> {
        let _: Vec<TokenClaim> = self.write(Method::POST, "/rest/v1/token_ledger", to_body(claim)?).await?;
        Ok(())
    }

    async fn find_claim(&self, claim_key: &str) -> Result<Option<TokenClaim>, StoreError> {
        let path = format!("/rest/v1/token_ledger?claim_key=eq.{}", urlencoding::encode(claim_key));
        Ok(self.fetch::<TokenClaim>(&path).await?.into_iter().next())
    }
}

#[async_trait]
impl AppointmentRepository for SupabaseBookingStore {
    async fn insert_confirmed(
        &self,
        appointment: &Appointment,
        notifications: Vec<NotificationIntent>,
    ) -> Result<Appointment, StoreError> {
        let rows: Vec<Appointment> = self.write(Method::POST, "/rest/v1/appointments", to_body(appointment)?).await?;
        let created = rows.into_iter().next()
            .ok_or_else(|| StoreError::Corrupt("insert returned no appointment".to_string()))?;

        self.enqueue_after_write(created.id, notifications).await;
        Ok(created)
    }

    async fn find_appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", id);
        Ok(self.fetch::<Appointment>(&path).await?.into_iter().next())
    }

    async fn find_by_reference(&self, booking_reference: &str) -> Result<Option<Appointment>, StoreError> {
        let path = format!(
            "/rest/v1/appointments?booking_reference=eq.{}",
            urlencoding::encode(booking_reference)
        );
        Ok(self.fetch::<Appointment>(&path).await?.into_iter().next())
    }

    async fn find_by_gateway_order(&self, order_id: &str) -> Result<Option<Appointment>, StoreError> {
        let path = format!("/rest/v1/appointments?gateway_order_id=eq.{}", urlencoding::encode(order_id));
        Ok(self.fetch::<Appointment>(&path).await?.into_iter().next())
    }

    async fn list_for_day(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<Appointment>, StoreError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&appointment_date=eq.{}&order=token_number.asc",
            doctor_id, date
        );
        self.fetch(&path).await
    }

    async fn list_on_date(&self, date: NaiveDate) -> Result<Vec<Appointment>, StoreError> {
        let path = format!("/rest/v1/appointments?appointment_date=eq.{}", date);
        self.fetch(&path).await
    }

    async fn list_follow_ups(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Appointment>, StoreError> {
        let path = format!(
            "/rest/v1/appointments?status=eq.completed&follow_up_date=gte.{}&follow_up_date=lte.{}&order=follow_up_date.asc",
            from, to
        );
        self.fetch(&path).await
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        update: StatusUpdate,
        notifications: Vec<NotificationIntent>,
    ) -> Result<Option<Appointment>, StoreError> {
        let path = format!("/rest/v1/appointments?id=eq.{}&status=eq.{}", id, expected);

        let mut body = json!({
            "status": update.status,
            "updated_at": Utc::now(),
        });
        if let Some(date) = update.follow_up_date {
            body["follow_up_date"] = json!(date);
        }
        if let Some(notes) = update.consultation_notes {
            body["consultation_notes"] = json!(notes);
        }

        let rows: Vec<Appointment> = self.write(Method::PATCH, &path, body).await?;
        match rows.into_iter().next() {
            Some(updated) => {
                self.enqueue_after_write(updated.id, notifications).await;
                Ok(Some(updated))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PaymentRepository for SupabaseBookingStore {
    async fn insert_pending(&self, payment: &Payment) -> Result<(), StoreError> {
        let _: Vec<Payment> = self.write(Method::POST, "/rest/v1/payments", to_body(payment)?).await?;
        Ok(())
    }

    async fn find_by_order(&self, order_id: &str) -> Result<Option<Payment>, StoreError> {
        let path = format!("/rest/v1/payments?razorpay_order_id=eq.{}", urlencoding::encode(order_id));
        Ok(self.fetch::<Payment>(&path).await?.into_iter().next())
    }

    async fn complete_payment(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
        appointment_id: Uuid,
    ) -> Result<Option<Payment>, StoreError> {
        let path = format!(
            "/rest/v1/payments?razorpay_order_id=eq.{}&status=eq.pending",
            urlencoding::encode(order_id)
        );
        let body = json!({
            "status": "completed",
            "razorpay_payment_id": payment_id,
            "razorpay_signature": signature,
            "appointment_id": appointment_id,
            "updated_at": Utc::now(),
        });
        let rows: Vec<Payment> = self.write(Method::PATCH, &path, body).await?;
        Ok(rows.into_iter().next())
    }

    async fn completed_for_appointments(&self, appointment_ids: &[Uuid]) -> Result<Vec<Payment>, StoreError> {
        if appointment_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = appointment_ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(",");
        let path = format!("/rest/v1/payments?status=eq.completed&appointment_id=in.({})", ids);
        self.fetch(&path).await
    }
}

#[async_trait]
impl ReconciliationRepository for SupabaseBookingStore {
    async fn open_ticket(&self, ticket: &ReconciliationTicket) -> Result<(), StoreError> {
        let _: Vec<ReconciliationTicket> =
            self.write(Method::POST, "/rest/v1/reconciliation_tickets", to_body(ticket)?).await?;
        Ok(())
    }

    async fn open_tickets(&self) -> Result<Vec<ReconciliationTicket>, StoreError> {
        self.fetch("/rest/v1/reconciliation_tickets?status=eq.open&order=created_at.asc").await
    }

    async fn resolve_tickets(&self, gateway_payment_id: &str) -> Result<usize, StoreError> {
        let path = format!(
            "/rest/v1/reconciliation_tickets?gateway_payment_id=eq.{}&status=eq.open",
            urlencoding::encode(gateway_payment_id)
        );
        let body = json!({ "status": "resolved", "resolved_at": Utc::now() });
        let rows: Vec<ReconciliationTicket> = self.write(Method::PATCH, &path, body).await?;
        Ok(rows.len())
    }
}

#[async_trait]
impl ScheduleRepository for SupabaseBookingStore {
    async fn windows_for(&self, doctor_id: Uuid, day_of_week: u32) -> Result<Vec<AvailabilityWindow>, StoreError> {
        let path = format!(
            "/rest/v1/time_slots?doctor_id=eq.{}&day_of_week=eq.{}&is_available=eq.true&order=start_time.asc",
            doctor_id, day_of_week
        );
        self.fetch(&path).await
    }
}

#[async_trait]
impl NotificationOutbox for SupabaseBookingStore {
    async fn enqueue(&self, intents: Vec<NotificationIntent>) -> Result<(), NotificationError> {
        self.enqueue_intents(intents).await.map_err(outbox_error)
    }

    async fn pending(&self, limit: usize) -> Result<Vec<NotificationIntent>, NotificationError> {
        let path = format!("/rest/v1/notification_outbox?status=eq.pending&order=created_at.asc&limit={}", limit);
        self.fetch(&path).await.map_err(outbox_error)
    }

    async fn update(&self, intent: &NotificationIntent) -> Result<(), NotificationError> {
        let path = format!("/rest/v1/notification_outbox?id=eq.{}", intent.id);
        let body = json!({
            "status": intent.status,
            "attempts": intent.attempts,
            "last_error": intent.last_error,
            "updated_at": intent.updated_at,
        });
        let _: Vec<Value> = self.write(Method::PATCH, &path, body).await.map_err(outbox_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_constraints_map_to_conflicts() {
        assert_eq!(conflict_for(Some("token_ledger_partition_key")), Some(ConflictKind::Token));
        assert_eq!(conflict_for(Some("payments_gateway_payment_key")), Some(ConflictKind::GatewayPayment));
        assert_eq!(conflict_for(Some("something_else")), None);
        assert_eq!(conflict_for(None), None);
    }

    #[test]
    fn unique_violation_on_claim_key_is_claim_conflict() {
        let pg = PostgrestError::from_response(
            409,
            r#"{"code":"23505","message":"duplicate key value violates unique constraint \"token_ledger_claim_key\"","details":null}"#,
        );
        assert_eq!(store_error(pg.into()), StoreError::Conflict(ConflictKind::Claim));
    }
}
