use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use notification_cell::{NotificationError, NotificationIntent, NotificationOutbox, OutboxStatus};
use payment_cell::{Payment, PaymentStatus};

use crate::models::{
    Appointment, AppointmentStatus, AvailabilityWindow, ReconciliationTicket, StatusUpdate, TicketStatus,
    TokenClaim,
};
use crate::store::{
    AppointmentRepository, ConflictKind, PaymentRepository, ReconciliationRepository, ScheduleRepository,
    StoreError, TokenLedger,
};

/// Store operations that can be made to fail once, for exercising recovery paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    InsertAppointment,
    CompletePayment,
}

#[derive(Default)]
struct MemoryState {
    claims: Vec<TokenClaim>,
    appointments: HashMap<Uuid, Appointment>,
    payments: HashMap<String, Payment>,
    outbox: Vec<NotificationIntent>,
    tickets: Vec<ReconciliationTicket>,
    windows: Vec<AvailabilityWindow>,
    failures: Vec<FailPoint>,
}

impl MemoryState {
    fn take_failure(&mut self, point: FailPoint) -> Result<(), StoreError> {
        match self.failures.iter().position(|f| *f == point) {
            Some(idx) => {
                self.failures.remove(idx);
                Err(StoreError::Unavailable(format!("injected failure at {:?}", point)))
            }
            None => Ok(()),
        }
    }
}

/// Process-local store used in development mode and tests. Every operation
/// takes the lock on its own, so read-then-write sequences across calls race
/// exactly like they would against a remote database.
#[derive(Default)]
pub struct MemoryBookingStore {
    state: RwLock<MemoryState>,
}

impl MemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_window(&self, window: AvailabilityWindow) {
        self.state.write().await.windows.push(window);
    }

    pub async fn fail_once(&self, point: FailPoint) {
        self.state.write().await.failures.push(point);
    }

    pub async fn appointments(&self) -> Vec<Appointment> {
        let mut all: Vec<_> = self.state.read().await.appointments.values().cloned().collect();
        all.sort_by_key(|a| (a.doctor_id, a.appointment_date, a.token_number));
        all
    }

    pub async fn payments(&self) -> Vec<Payment> {
        self.state.read().await.payments.values().cloned().collect()
    }

    pub async fn outbox(&self) -> Vec<NotificationIntent> {
        self.state.read().await.outbox.clone()
    }

    pub async fn claims(&self) -> Vec<TokenClaim> {
        self.state.read().await.claims.clone()
    }
}

#[async_trait]
impl TokenLedger for MemoryBookingStore {
    async fn highest_token(&self, doctor_id: Uuid, date: NaiveDate) -> Result<i32, StoreError> {
        let state = self.state.read().await;
        Ok(state.claims
            .iter()
            .filter(|c| c.doctor_id == doctor_id && c.appointment_date == date)
            .map(|c| c.token_number)
            .max()
            .unwrap_or(0))
    }

    async fn claim_token(&self, claim: &TokenClaim) -> Result<(), StoreError> {
        let mut state = self.state.write().await;

        if state.claims.iter().any(|c| c.claim_key == claim.claim_key) {
            return Err(StoreError::Conflict(ConflictKind::Claim));
        }
        if state.claims.iter().any(|c| {
            c.doctor_id == claim.doctor_id
                && c.appointment_date == claim.appointment_date
                && c.token_number == claim.token_number
        }) {
            return Err(StoreError::Conflict(ConflictKind::Token));
        }

        debug!("Claimed token {} for {}", claim.token_number, claim.claim_key);
        state.claims.push(claim.clone());
        Ok(())
    }

    async fn find_claim(&self, claim_key: &str) -> Result<Option<TokenClaim>, StoreError> {
        let state = self.state.read().await;
        Ok(state.claims.iter().find(|c| c.claim_key == claim_key).cloned())
    }
}

#[async_trait]
impl AppointmentRepository for MemoryBookingStore {
    async fn insert_confirmed(
        &self,
        appointment: &Appointment,
        notifications: Vec<NotificationIntent>,
    ) -> Result<Appointment, StoreError> {
        let mut state = self.state.write().await;
        state.take_failure(FailPoint::InsertAppointment)?;

        if state.appointments.values().any(|a| a.booking_reference == appointment.booking_reference) {
            return Err(StoreError::Conflict(ConflictKind::BookingReference));
        }
        if state.appointments.values().any(|a| a.gateway_order_id == appointment.gateway_order_id) {
            return Err(StoreError::Conflict(ConflictKind::GatewayOrder));
        }

        state.appointments.insert(appointment.id, appointment.clone());
        state.outbox.extend(notifications);
        Ok(appointment.clone())
    }

    async fn find_appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.state.read().await.appointments.get(&id).cloned())
    }

    async fn find_by_reference(&self, booking_reference: &str) -> Result<Option<Appointment>, StoreError> {
        let state = self.state.read().await;
        Ok(state.appointments.values().find(|a| a.booking_reference == booking_reference).cloned())
    }

    async fn find_by_gateway_order(&self, order_id: &str) -> Result<Option<Appointment>, StoreError> {
        let state = self.state.read().await;
        Ok(state.appointments.values().find(|a| a.gateway_order_id == order_id).cloned())
    }

    async fn list_for_day(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<Appointment>, StoreError> {
        let state = self.state.read().await;
        let mut day: Vec<_> = state.appointments
            .values()
            .filter(|a| a.doctor_id == doctor_id && a.appointment_date == date)
            .cloned()
            .collect();
        day.sort_by_key(|a| a.token_number);
        Ok(day)
    }

    async fn list_on_date(&self, date: NaiveDate) -> Result<Vec<Appointment>, StoreError> {
        let state = self.state.read().await;
        Ok(state.appointments.values().filter(|a| a.appointment_date == date).cloned().collect())
    }

    async fn list_follow_ups(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Appointment>, StoreError> {
        let state = self.state.read().await;
        let mut due: Vec<_> = state.appointments
            .values()
            .filter(|a| a.status == AppointmentStatus::Completed)
            .filter(|a| a.follow_up_date.is_some_and(|d| d >= from && d <= to))
            .cloned()
            .collect();
        due.sort_by_key(|a| a.follow_up_date);
        Ok(due)
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        update: StatusUpdate,
        notifications: Vec<NotificationIntent>,
    ) -> Result<Option<Appointment>, StoreError> {
        let mut state = self.state.write().await;

        let updated = match state.appointments.get_mut(&id) {
            Some(appointment) if appointment.status == expected => {
                appointment.status = update.status;
                if update.follow_up_date.is_some() {
                    appointment.follow_up_date = update.follow_up_date;
                }
                if update.consultation_notes.is_some() {
                    appointment.consultation_notes = update.consultation_notes;
                }
                appointment.updated_at = Utc::now();
                appointment.clone()
            }
            _ => return Ok(None),
        };

        state.outbox.extend(notifications);
        Ok(Some(updated))
    }
}

#[async_trait]
impl PaymentRepository for MemoryBookingStore {
    async fn insert_pending(&self, payment: &Payment) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.payments.contains_key(&payment.gateway_order_id) {
            return Err(StoreError::Corrupt(format!("order {} recorded twice", payment.gateway_order_id)));
        }
        state.payments.insert(payment.gateway_order_id.clone(), payment.clone());
        Ok(())
    }

    async fn find_by_order(&self, order_id: &str) -> Result<Option<Payment>, StoreError> {
        Ok(self.state.read().await.payments.get(order_id).cloned())
    }

    async fn complete_payment(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
        appointment_id: Uuid,
    ) -> Result<Option<Payment>, StoreError> {
        let mut state = self.state.write().await;
        state.take_failure(FailPoint::CompletePayment)?;

        let reused = state.payments.values().any(|p| {
            p.gateway_order_id != order_id && p.gateway_payment_id.as_deref() == Some(payment_id)
        });
        if reused {
            return Err(StoreError::Conflict(ConflictKind::GatewayPayment));
        }

        match state.payments.get_mut(order_id) {
            Some(payment) if payment.status == PaymentStatus::Pending => {
                payment.status = PaymentStatus::Completed;
                payment.gateway_payment_id = Some(payment_id.to_string());
                payment.gateway_signature = Some(signature.to_string());
                payment.appointment_id = Some(appointment_id);
                payment.updated_at = Utc::now();
                Ok(Some(payment.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn completed_for_appointments(&self, appointment_ids: &[Uuid]) -> Result<Vec<Payment>, StoreError> {
        let state = self.state.read().await;
        Ok(state.payments
            .values()
            .filter(|p| p.status == PaymentStatus::Completed)
            .filter(|p| p.appointment_id.is_some_and(|id| appointment_ids.contains(&id)))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReconciliationRepository for MemoryBookingStore {
    async fn open_ticket(&self, ticket: &ReconciliationTicket) -> Result<(), StoreError> {
        self.state.write().await.tickets.push(ticket.clone());
        Ok(())
    }

    async fn open_tickets(&self) -> Result<Vec<ReconciliationTicket>, StoreError> {
        let state = self.state.read().await;
        Ok(state.tickets.iter().filter(|t| t.status == TicketStatus::Open).cloned().collect())
    }

    async fn resolve_tickets(&self, gateway_payment_id: &str) -> Result<usize, StoreError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut resolved = 0;
        for ticket in state.tickets.iter_mut() {
            if ticket.gateway_payment_id == gateway_payment_id && ticket.status == TicketStatus::Open {
                ticket.status = TicketStatus::Resolved;
                ticket.resolved_at = Some(now);
                resolved += 1;
            }
        }
        Ok(resolved)
    }
}

#[async_trait]
impl ScheduleRepository for MemoryBookingStore {
    async fn windows_for(&self, doctor_id: Uuid, day_of_week: u32) -> Result<Vec<AvailabilityWindow>, StoreError> {
        let state = self.state.read().await;
        Ok(state.windows
            .iter()
            .filter(|w| w.doctor_id == doctor_id && w.day_of_week == day_of_week && w.is_available)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl NotificationOutbox for MemoryBookingStore {
    async fn enqueue(&self, intents: Vec<NotificationIntent>) -> Result<(), NotificationError> {
        self.state.write().await.outbox.extend(intents);
        Ok(())
    }

    async fn pending(&self, limit: usize) -> Result<Vec<NotificationIntent>, NotificationError> {
        let state = self.state.read().await;
        Ok(state.outbox
            .iter()
            .filter(|i| i.status == OutboxStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update(&self, intent: &NotificationIntent) -> Result<(), NotificationError> {
        let mut state = self.state.write().await;
        match state.outbox.iter_mut().find(|i| i.id == intent.id) {
            Some(existing) => {
                *existing = intent.clone();
                Ok(())
            }
            None => Err(NotificationError::Outbox(format!("intent {} not in outbox", intent.id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 1, 15).unwrap()
    }

    #[tokio::test]
    async fn claims_are_unique_per_partition_and_key() {
        let store = MemoryBookingStore::new();
        let doctor = Uuid::new_v4();

        store.claim_token(&TokenClaim::new(doctor, date(), 1, "pay_a")).await.unwrap();
        assert_matches!(
            store.claim_token(&TokenClaim::new(doctor, date(), 1, "pay_b")).await,
            Err(StoreError::Conflict(ConflictKind::Token))
        );
        assert_matches!(
            store.claim_token(&TokenClaim::new(doctor, date(), 2, "pay_a")).await,
            Err(StoreError::Conflict(ConflictKind::Claim))
        );

        // same number in another partition is fine
        store.claim_token(&TokenClaim::new(Uuid::new_v4(), date(), 1, "pay_c")).await.unwrap();
        assert_eq!(store.highest_token(doctor, date()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let store = MemoryBookingStore::new();
        store.fail_once(FailPoint::CompletePayment).await;

        assert_matches!(
            store.complete_payment("order_x", "pay_x", "sig", Uuid::new_v4()).await,
            Err(StoreError::Unavailable(_))
        );
        assert_matches!(store.complete_payment("order_x", "pay_x", "sig", Uuid::new_v4()).await, Ok(None));
    }
}
