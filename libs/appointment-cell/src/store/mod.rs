use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use notification_cell::{NotificationIntent, NotificationOutbox};
use payment_cell::Payment;

use crate::models::{
    Appointment, AppointmentStatus, AvailabilityWindow, ReconciliationTicket, StatusUpdate, TokenClaim,
};

pub mod memory;
pub mod supabase;

pub use memory::{FailPoint, MemoryBookingStore};
pub use supabase::SupabaseBookingStore;

/// Which uniqueness rule a write collided with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// (doctor_id, appointment_date, token_number) already taken.
    Token,
    /// The claim key already holds a token.
    Claim,
    /// An appointment already exists for the booking reference.
    BookingReference,
    /// An appointment already settles the gateway order.
    GatewayOrder,
    /// The gateway payment id already settled a payment.
    GatewayPayment,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Unique constraint conflict: {0:?}")]
    Conflict(ConflictKind),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Durable per-(doctor, date) token grants.
#[async_trait]
pub trait TokenLedger: Send + Sync {
    /// Highest token granted in the partition, 0 when none.
    async fn highest_token(&self, doctor_id: Uuid, date: NaiveDate) -> Result<i32, StoreError>;

    /// Inserts the claim. Fails with `Conflict(Token)` or `Conflict(Claim)`.
    async fn claim_token(&self, claim: &TokenClaim) -> Result<(), StoreError>;

    async fn find_claim(&self, claim_key: &str) -> Result<Option<TokenClaim>, StoreError>;
}

#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    /// Writes a confirmed appointment with the notifications it causes.
    async fn insert_confirmed(
        &self,
        appointment: &Appointment,
        notifications: Vec<NotificationIntent>,
    ) -> Result<Appointment, StoreError>;

    async fn find_appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError>;

    async fn find_by_reference(&self, booking_reference: &str) -> Result<Option<Appointment>, StoreError>;

    async fn find_by_gateway_order(&self, order_id: &str) -> Result<Option<Appointment>, StoreError>;

    async fn list_for_day(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<Appointment>, StoreError>;

    async fn list_on_date(&self, date: NaiveDate) -> Result<Vec<Appointment>, StoreError>;

    /// Completed appointments with a follow-up date in `[from, to]`.
    async fn list_follow_ups(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Appointment>, StoreError>;

    /// Applies `update` only while the row is still in `expected`.
    /// `Ok(None)` means the row moved on or does not exist.
    async fn transition(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        update: StatusUpdate,
        notifications: Vec<NotificationIntent>,
    ) -> Result<Option<Appointment>, StoreError>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn insert_pending(&self, payment: &Payment) -> Result<(), StoreError>;

    async fn find_by_order(&self, order_id: &str) -> Result<Option<Payment>, StoreError>;

    /// Moves a pending payment to completed. `Ok(None)` when it was no longer pending.
    async fn complete_payment(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
        appointment_id: Uuid,
    ) -> Result<Option<Payment>, StoreError>;

    async fn completed_for_appointments(&self, appointment_ids: &[Uuid]) -> Result<Vec<Payment>, StoreError>;
}

#[async_trait]
pub trait ReconciliationRepository: Send + Sync {
    async fn open_ticket(&self, ticket: &ReconciliationTicket) -> Result<(), StoreError>;

    async fn open_tickets(&self) -> Result<Vec<ReconciliationTicket>, StoreError>;

    /// Returns how many tickets were resolved.
    async fn resolve_tickets(&self, gateway_payment_id: &str) -> Result<usize, StoreError>;
}

#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn windows_for(&self, doctor_id: Uuid, day_of_week: u32) -> Result<Vec<AvailabilityWindow>, StoreError>;
}

/// Everything the booking services need from durable storage.
pub trait BookingStore:
    TokenLedger + AppointmentRepository + PaymentRepository + ReconciliationRepository + ScheduleRepository + NotificationOutbox
{
}

impl<T> BookingStore for T where
    T: TokenLedger
        + AppointmentRepository
        + PaymentRepository
        + ReconciliationRepository
        + ScheduleRepository
        + NotificationOutbox
{
}
