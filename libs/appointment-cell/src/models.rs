// libs/appointment-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use payment_cell::ConfirmationPayload;

use crate::error::BookingError;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    InConsultation,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    /// Still waiting for or inside a consultation.
    pub fn is_waiting(&self) -> bool {
        matches!(self, AppointmentStatus::Confirmed | AppointmentStatus::InConsultation)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::InConsultation => write!(f, "in_consultation"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    Consultation,
    #[serde(rename = "follow-up", alias = "follow_up")]
    FollowUp,
    Emergency,
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentType::Consultation => write!(f, "consultation"),
            AppointmentType::FollowUp => write!(f, "follow-up"),
            AppointmentType::Emergency => write!(f, "emergency"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    #[default]
    Normal,
    Priority,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Normal => write!(f, "normal"),
            TokenType::Priority => write!(f, "priority"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub hospital_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub appointment_type: AppointmentType,
    pub token_number: i32,
    pub token_type: TokenType,
    pub status: AppointmentStatus,
    pub special_instructions: Option<String>,
    pub consultation_notes: Option<String>,
    pub follow_up_date: Option<NaiveDate>,
    pub patient_name: Option<String>,
    /// Gateway payment id that paid for this booking. Unique.
    pub booking_reference: String,
    /// Gateway order this booking settles. Unique.
    #[serde(default)]
    pub gateway_order_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// A confirmed appointment for an intent that was paid for and granted a token.
    pub fn confirmed(patient_id: Uuid, order_id: &str, intent: &BookingIntent, claim: &TokenClaim) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id: intent.doctor_id,
            hospital_id: intent.hospital_id,
            appointment_date: intent.appointment_date,
            appointment_time: intent.appointment_time,
            appointment_type: intent.appointment_type,
            token_number: claim.token_number,
            token_type: intent.token_type,
            status: AppointmentStatus::Confirmed,
            special_instructions: intent.special_instructions.clone(),
            consultation_notes: None,
            follow_up_date: None,
            patient_name: intent.patient_name.clone(),
            booking_reference: claim.claim_key.clone(),
            gateway_order_id: order_id.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, patient_id: Uuid) -> bool {
        self.patient_id == patient_id
    }
}

/// Fields applied by a compare-and-set status change.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: AppointmentStatus,
    pub follow_up_date: Option<NaiveDate>,
    pub consultation_notes: Option<String>,
}

impl StatusUpdate {
    pub fn to(status: AppointmentStatus) -> Self {
        Self { status, follow_up_date: None, consultation_notes: None }
    }
}

// ==============================================================================
// BOOKING FLOW MODELS
// ==============================================================================

/// What the patient asked for when the order was created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BookingIntent {
    pub doctor_id: Uuid,
    pub hospital_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub appointment_type: AppointmentType,
    #[serde(default)]
    pub token_type: TokenType,
    #[serde(default)]
    pub special_instructions: Option<String>,
    /// Quoted fee in whole currency units.
    pub consultation_fee: i64,
    /// Overwritten from the caller's profile when the order is created.
    #[serde(default)]
    pub patient_name: Option<String>,
}

impl BookingIntent {
    pub fn validate(&self, special_instructions_max_len: usize) -> Result<(), BookingError> {
        if self.consultation_fee <= 0 {
            return Err(BookingError::Validation("consultation_fee must be greater than zero".to_string()));
        }

        if let Some(text) = &self.special_instructions {
            if text.chars().count() > special_instructions_max_len {
                return Err(BookingError::Validation(format!(
                    "special_instructions must be at most {} characters",
                    special_instructions_max_len
                )));
            }
        }

        Ok(())
    }

    /// The parts of an intent that a confirmation must repeat exactly.
    pub fn matches_binding(&self, other: &BookingIntent) -> bool {
        self.doctor_id == other.doctor_id
            && self.hospital_id == other.hospital_id
            && self.appointment_date == other.appointment_date
            && self.appointment_time == other.appointment_time
            && self.appointment_type == other.appointment_type
            && self.token_type == other.token_type
            && self.consultation_fee == other.consultation_fee
    }
}

/// A granted token. `claim_key` is the booking reference it was granted for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaim {
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDate,
    pub token_number: i32,
    pub claim_key: String,
    pub created_at: DateTime<Utc>,
}

impl TokenClaim {
    pub fn new(doctor_id: Uuid, appointment_date: NaiveDate, token_number: i32, claim_key: &str) -> Self {
        Self {
            doctor_id,
            appointment_date,
            token_number,
            claim_key: claim_key.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Progress of one confirmation. Recorded on reconciliation tickets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum BookingStage {
    PendingPayment,
    Verified,
    TokenAllocated,
    AppointmentPersisted,
    PaymentRecorded,
    Notified,
}

impl BookingStage {
    pub fn can_advance_to(&self, target: &BookingStage) -> bool {
        use BookingStage::*;
        matches!(
            (self, target),
            (PendingPayment, Verified)
                | (Verified, TokenAllocated)
                | (TokenAllocated, AppointmentPersisted)
                | (AppointmentPersisted, PaymentRecorded)
                | (PaymentRecorded, Notified)
        )
    }
}

impl fmt::Display for BookingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingStage::PendingPayment => write!(f, "pending_payment"),
            BookingStage::Verified => write!(f, "verified"),
            BookingStage::TokenAllocated => write!(f, "token_allocated"),
            BookingStage::AppointmentPersisted => write!(f, "appointment_persisted"),
            BookingStage::PaymentRecorded => write!(f, "payment_recorded"),
            BookingStage::Notified => write!(f, "notified"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    /// Token allocated and both rows written by this call.
    Created,
    /// Everything was already committed by an earlier call.
    Replayed,
    /// The appointment existed; this call wrote the missing payment completion.
    Repaired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub appointment: Appointment,
    pub outcome: ConfirmationOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: String,
    /// Minor units, as the hosted checkout expects.
    pub amount: i64,
    pub currency: String,
    pub key_id: String,
    pub receipt: String,
}

// ==============================================================================
// QUEUE, SLOTS AND ADMIN VIEWS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEntry {
    pub appointment_id: Uuid,
    pub token_number: i32,
    pub token_type: TokenType,
    pub patient_display_name: String,
    pub status: AppointmentStatus,
    pub queue_position: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentView {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub queue_position: Option<u32>,
}

/// Recurring availability of a doctor, as stored in `time_slots`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailabilityWindow {
    pub id: Uuid,
    pub doctor_id: Uuid,
    /// 0 = Sunday.
    pub day_of_week: u32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    /// Minutes.
    pub slot_duration: i32,
    pub max_appointments: u32,
    pub is_available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlotAvailability {
    pub time: NaiveTime,
    pub is_booked: bool,
    pub booked: u32,
    pub capacity: u32,
}

impl SlotAvailability {
    pub fn is_full(&self) -> bool {
        self.booked >= self.capacity
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    Resolved,
}

/// Paid-for booking that could not be completed automatically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconciliationTicket {
    pub id: Uuid,
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub stage: BookingStage,
    pub reason: String,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ReconciliationTicket {
    pub fn open(order_id: &str, payment_id: &str, stage: BookingStage, reason: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            gateway_order_id: order_id.to_string(),
            gateway_payment_id: payment_id.to_string(),
            stage,
            reason,
            status: TicketStatus::Open,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevenueSummary {
    pub date: NaiveDate,
    pub total_patients: u32,
    pub normal_tokens: u32,
    pub priority_tokens: u32,
    pub total_consultation_income: i64,
    pub total_priority_income: i64,
    pub overall_revenue: i64,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfirmBookingRequest {
    pub payment: ConfirmationPayload,
    pub intent: BookingIntent,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompleteConsultationRequest {
    pub follow_up_date: Option<NaiveDate>,
    pub consultation_notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent() -> BookingIntent {
        BookingIntent {
            doctor_id: Uuid::new_v4(),
            hospital_id: Uuid::new_v4(),
            appointment_date: NaiveDate::from_ymd_opt(2030, 1, 15).unwrap(),
            appointment_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            appointment_type: AppointmentType::Consultation,
            token_type: TokenType::Normal,
            special_instructions: None,
            consultation_fee: 500,
            patient_name: None,
        }
    }

    #[test]
    fn appointment_type_uses_hyphenated_follow_up() {
        assert_eq!(serde_json::to_value(AppointmentType::FollowUp).unwrap(), "follow-up");
        let parsed: AppointmentType = serde_json::from_str("\"follow_up\"").unwrap();
        assert_eq!(parsed, AppointmentType::FollowUp);
    }

    #[test]
    fn intent_validation_bounds_fee_and_instructions() {
        let mut i = intent();
        assert!(i.validate(1000).is_ok());

        i.special_instructions = Some("x".repeat(1001));
        assert!(i.validate(1000).is_err());

        i.special_instructions = None;
        i.consultation_fee = 0;
        assert!(i.validate(1000).is_err());
    }

    #[test]
    fn binding_ignores_free_text() {
        let bound = intent();
        let mut submitted = bound.clone();
        submitted.special_instructions = Some("wheelchair".to_string());
        assert!(bound.matches_binding(&submitted));

        submitted.token_type = TokenType::Priority;
        assert!(!bound.matches_binding(&submitted));
    }

    #[test]
    fn optional_fields_default() {
        let raw = serde_json::json!({
            "doctor_id": Uuid::new_v4(),
            "hospital_id": Uuid::new_v4(),
            "appointment_date": "2030-01-15",
            "appointment_time": "10:00:00",
            "appointment_type": "consultation",
            "consultation_fee": 500
        });
        let parsed: BookingIntent = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.patient_name, None);
        assert_eq!(parsed.token_type, TokenType::Normal);
    }

    #[test]
    fn stages_advance_one_step_at_a_time() {
        assert!(BookingStage::Verified.can_advance_to(&BookingStage::TokenAllocated));
        assert!(!BookingStage::Verified.can_advance_to(&BookingStage::PaymentRecorded));
        assert!(!BookingStage::Notified.can_advance_to(&BookingStage::PendingPayment));
    }
}
