// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::{timeout, Duration};
use tracing::error;
use uuid::Uuid;

use shared_models::auth::{Caller, User};
use shared_models::error::AppError;

use crate::error::BookingError;
use crate::models::{BookingIntent, CompleteConsultationRequest, ConfirmBookingRequest, ConfirmationOutcome};
use crate::state::BookingState;

const RECONCILIATION_MESSAGE: &str = "Booking could not be completed, please contact support";

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct RevenueQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct FollowUpQuery {
    pub days: Option<i64>,
}

/// Maps booking failures to HTTP. Reconciliation-class failures only expose a
/// generic message and the payment reference support needs.
pub fn to_app_error(e: BookingError, reference: Option<&str>) -> AppError {
    if e.requires_reconciliation() {
        error!("Booking failure held for reconciliation (reference {:?}): {}", reference, e);
        return AppError::Reconciliation {
            message: RECONCILIATION_MESSAGE.to_string(),
            reference: reference.unwrap_or_default().to_string(),
        };
    }

    match e {
        BookingError::InvalidPaymentData(msg) => AppError::BadRequest(msg),
        BookingError::PaymentVerificationFailed { .. } => {
            AppError::BadRequest("Payment verification failed".to_string())
        }
        BookingError::InvalidStateTransition { from, to } => {
            AppError::Conflict(format!("Cannot change appointment from {} to {}", from, to))
        }
        BookingError::NotFound(msg) => AppError::NotFound(msg),
        BookingError::Unauthorized(msg) => AppError::Forbidden(msg),
        BookingError::SlotUnavailable { .. } => AppError::Conflict("Time slot no longer available".to_string()),
        BookingError::Validation(msg) => AppError::ValidationError(msg),
        BookingError::Gateway(msg) => AppError::ExternalService(msg),
        BookingError::Configuration(msg) => {
            error!("Booking configuration error: {}", msg);
            AppError::Internal("Payment processing is not configured".to_string())
        }
        BookingError::Timeout { seconds } => AppError::Timeout(format!(
            "Booking did not finish within {} seconds; retry with the same payment confirmation",
            seconds
        )),
        BookingError::Store(e) => AppError::Database(e.to_string()),
        other => AppError::Internal(other.to_string()),
    }
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_order(
    State(state): State<Arc<BookingState>>,
    Extension(user): Extension<User>,
    Json(mut intent): Json<BookingIntent>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    intent.patient_name = user.display_name();

    let order = state.orchestrator.create_order(&caller, intent).await
        .map_err(|e| to_app_error(e, None))?;

    Ok(Json(json!({
        "success": true,
        "order": order
    })))
}

#[axum::debug_handler]
pub async fn confirm_booking(
    State(state): State<Arc<BookingState>>,
    Extension(user): Extension<User>,
    Json(request): Json<ConfirmBookingRequest>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    let reference = request.payment.razorpay_payment_id.clone().unwrap_or_default();
    let seconds = state.orchestrator.settings().confirm_timeout_secs;

    let confirmation = timeout(
        Duration::from_secs(seconds),
        state.orchestrator.confirm_booking(&caller, request.payment, &request.intent),
    )
    .await
    .unwrap_or_else(|_| Err(BookingError::Timeout { seconds }))
    .map_err(|e| to_app_error(e, Some(reference.as_str())))?;

    let message = match confirmation.outcome {
        ConfirmationOutcome::Created => "Appointment confirmed",
        ConfirmationOutcome::Replayed => "Appointment already confirmed",
        ConfirmationOutcome::Repaired => "Appointment confirmed after recovery",
    };

    Ok(Json(json!({
        "success": true,
        "appointment": confirmation.appointment,
        "outcome": confirmation.outcome,
        "message": message
    })))
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<BookingState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    let view = state.orchestrator.get_appointment(&caller, appointment_id).await
        .map_err(|e| to_app_error(e, None))?;
    Ok(Json(json!(view)))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<BookingState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    let appointment = state.orchestrator.cancel_appointment(&caller, appointment_id).await
        .map_err(|e| to_app_error(e, None))?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment cancelled"
    })))
}

#[axum::debug_handler]
pub async fn start_consultation(
    State(state): State<Arc<BookingState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    let appointment = state.orchestrator.start_consultation(&caller, appointment_id).await
        .map_err(|e| to_app_error(e, None))?;
    Ok(Json(json!({ "success": true, "appointment": appointment })))
}

#[axum::debug_handler]
pub async fn complete_consultation(
    State(state): State<Arc<BookingState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<CompleteConsultationRequest>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    let appointment = state.orchestrator.complete_consultation(&caller, appointment_id, request).await
        .map_err(|e| to_app_error(e, None))?;
    Ok(Json(json!({ "success": true, "appointment": appointment })))
}

// ==============================================================================
// QUEUE AND SLOT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_doctor_queue(
    State(state): State<Arc<BookingState>>,
    Extension(user): Extension<User>,
    Path((doctor_id, date)): Path<(Uuid, NaiveDate)>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    let queue = state.orchestrator.doctor_queue(&caller, doctor_id, date).await
        .map_err(|e| to_app_error(e, None))?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "date": date,
        "queue": queue.as_slice()
    })))
}

#[axum::debug_handler]
pub async fn get_slots(
    State(state): State<Arc<BookingState>>,
    Path((doctor_id, date)): Path<(Uuid, NaiveDate)>,
) -> Result<Json<Value>, AppError> {
    let slots = state.orchestrator.list_slots(doctor_id, date).await
        .map_err(|e| to_app_error(e, None))?;
    Ok(Json(json!({ "doctor_id": doctor_id, "date": date, "slots": slots })))
}

// ==============================================================================
// ADMIN HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_revenue_summary(
    State(state): State<Arc<BookingState>>,
    Extension(user): Extension<User>,
    Query(query): Query<RevenueQuery>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    let date = query.date.unwrap_or_else(|| Utc::now().date_naive());
    let summary = state.admin.revenue_summary(&caller, date).await
        .map_err(|e| to_app_error(e, None))?;
    Ok(Json(json!(summary)))
}

#[axum::debug_handler]
pub async fn get_upcoming_follow_ups(
    State(state): State<Arc<BookingState>>,
    Extension(user): Extension<User>,
    Query(query): Query<FollowUpQuery>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    let follow_ups = state.admin
        .upcoming_follow_ups(&caller, Utc::now().date_naive(), query.days.unwrap_or(7))
        .await
        .map_err(|e| to_app_error(e, None))?;
    Ok(Json(json!({ "follow_ups": follow_ups })))
}

#[axum::debug_handler]
pub async fn get_reconciliation_tickets(
    State(state): State<Arc<BookingState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    let tickets = state.admin.open_reconciliation_tickets(&caller).await
        .map_err(|e| to_app_error(e, None))?;
    Ok(Json(json!({ "tickets": tickets })))
}
