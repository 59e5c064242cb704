// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use serde_json::json;
use chrono::NaiveDate;
use tokio::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use notification_cell::{DispatchHandle, NotificationIntent, NotificationKind};
use payment_cell::{
    ConfirmationPayload, GatewayConfirmation, OrderRequest, Payment, PaymentGateway, PaymentStatus,
    PaymentVerifier,
};
use shared_config::{BookingSettings, SlotCapacityPolicy};
use shared_models::auth::Caller;

use crate::error::BookingError;
use crate::models::{
    Appointment, AppointmentStatus, AppointmentView, BookingConfirmation, BookingIntent, BookingStage,
    CompleteConsultationRequest, ConfirmationOutcome, OrderCreated, QueueEntry, ReconciliationTicket,
    SlotAvailability, StatusUpdate,
};
use crate::services::allocator::{AllocatorConfig, TokenAllocator};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::queue::{position_of, QueueProjector};
use crate::services::slots::SlotCatalog;
use crate::store::{
    AppointmentRepository, BookingStore, ConflictKind, PaymentRepository, ReconciliationRepository, StoreError,
    TokenLedger,
};

/// Turns verified gateway payments into confirmed, queued appointments and
/// drives the appointment lifecycle afterwards.
///
/// Every entry point takes the authenticated `Caller` explicitly. Failures that
/// happen after a payment was verified open a reconciliation ticket keyed by the
/// gateway payment id; re-submitting the same confirmation resumes the booking
/// without allocating a second token.
pub struct BookingOrchestrator {
    store: Arc<dyn BookingStore>,
    allocator: TokenAllocator,
    verifier: PaymentVerifier,
    gateway: Arc<dyn PaymentGateway>,
    slots: SlotCatalog,
    queue: QueueProjector,
    lifecycle: AppointmentLifecycleService,
    dispatcher: DispatchHandle,
    settings: BookingSettings,
}

impl BookingOrchestrator {
    pub fn new<S>(
        store: Arc<S>,
        gateway: Arc<dyn PaymentGateway>,
        verifier: PaymentVerifier,
        dispatcher: DispatchHandle,
        settings: BookingSettings,
    ) -> Self
    where
        S: BookingStore + 'static,
    {
        let ledger: Arc<dyn TokenLedger> = store.clone();
        let store: Arc<dyn BookingStore> = store;

        Self {
            allocator: TokenAllocator::new(ledger, AllocatorConfig::from(&settings)),
            slots: SlotCatalog::new(store.clone()),
            queue: QueueProjector::new(store.clone(), Duration::from_secs(settings.queue_cache_ttl_secs)),
            lifecycle: AppointmentLifecycleService::new(),
            store,
            verifier,
            gateway,
            dispatcher,
            settings,
        }
    }

    pub fn settings(&self) -> &BookingSettings {
        &self.settings
    }

    // ==========================================================================
    // ORDER CREATION
    // ==========================================================================

    /// Creates the gateway order and binds it to the caller and the intent.
    #[instrument(skip(self, caller, intent), fields(patient_id = %caller.user_id, doctor_id = %intent.doctor_id))]
    pub async fn create_order(&self, caller: &Caller, intent: BookingIntent) -> Result<OrderCreated, BookingError> {
        intent.validate(self.settings.special_instructions_max_len)?;

        if self.settings.slot_capacity_policy == SlotCapacityPolicy::Enforced {
            self.slots.ensure_capacity(&intent, false).await?;
        }

        let receipt = format!("bk_{}", Uuid::new_v4().simple());
        let order = self.gateway
            .create_order(OrderRequest {
                amount: intent.consultation_fee,
                currency: self.settings.currency.clone(),
                receipt: receipt.clone(),
                notes: json!({
                    "patient_id": caller.user_id,
                    "doctor_id": intent.doctor_id,
                    "appointment_date": intent.appointment_date,
                    "appointment_time": intent.appointment_time,
                }),
            })
            .await?;

        let bound = serde_json::to_value(&intent)
            .map_err(|e| BookingError::Store(StoreError::Corrupt(e.to_string())))?;
        let payment = Payment::pending(caller.user_id, intent.consultation_fee, &order.currency, &order.id, bound);
        self.store.insert_pending(&payment).await?;

        info!("Created order {} for patient {}", order.id, caller.user_id);

        Ok(OrderCreated {
            order_id: order.id,
            amount: order.amount,
            currency: order.currency,
            key_id: self.gateway.key_id().to_string(),
            receipt,
        })
    }

    // ==========================================================================
    // CONFIRMATION
    // ==========================================================================

    #[instrument(skip(self, caller, payload, intent), fields(patient_id = %caller.user_id))]
    pub async fn confirm_booking(
        &self,
        caller: &Caller,
        payload: ConfirmationPayload,
        intent: &BookingIntent,
    ) -> Result<BookingConfirmation, BookingError> {
        // Step 1: well-formed gateway fields
        let confirmation = GatewayConfirmation::try_from(payload)?;

        // Step 2: the order and who it was created for
        let payment = self.store
            .find_by_order(&confirmation.order_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("order {}", confirmation.order_id)))?;

        if payment.patient_id != caller.user_id {
            warn!(
                order_id = %confirmation.order_id,
                "Confirmation submitted by {} for an order bound to another patient", caller.user_id
            );
            return Err(BookingError::Unauthorized("order was created for a different patient".to_string()));
        }

        let bound: BookingIntent = serde_json::from_value(payment.booking_intent.clone()).map_err(|e| {
            BookingError::Store(StoreError::Corrupt(format!(
                "booking intent of order {}: {}",
                confirmation.order_id, e
            )))
        })?;

        if !bound.matches_binding(intent) {
            warn!(order_id = %confirmation.order_id, "Booking details differ from the order");
            return Err(BookingError::InvalidPaymentData("booking details do not match the order".to_string()));
        }

        // Step 3: gateway signature
        self.verifier.verify_confirmation(&confirmation)?;
        debug!(order_id = %confirmation.order_id, payment_id = %confirmation.payment_id, "Payment verified");

        // Step 4: what earlier attempts already did
        match payment.status {
            PaymentStatus::Completed if payment.is_settled_by(&confirmation.payment_id) => {
                return self.replay(&confirmation, &payment).await;
            }
            PaymentStatus::Completed => {
                let err = BookingError::OrderAlreadySettled { order_id: confirmation.order_id.clone() };
                return Err(self.escalate(&confirmation, BookingStage::Verified, err).await);
            }
            PaymentStatus::Failed => {
                return Err(BookingError::InvalidStateTransition {
                    from: PaymentStatus::Failed.to_string(),
                    to: PaymentStatus::Completed.to_string(),
                });
            }
            PaymentStatus::Pending => {}
        }

        // Step 5: appointment, then payment
        let (appointment, outcome) = match self.earlier_booking(&confirmation).await {
            Ok(Some(existing)) => (existing, ConfirmationOutcome::Repaired),
            Ok(None) => (self.persist_appointment(caller, &confirmation, &bound).await?, ConfirmationOutcome::Created),
            Err(e) => return Err(self.escalate(&confirmation, BookingStage::Verified, e).await),
        };

        self.record_payment(&confirmation, &appointment).await?;

        info!(
            appointment_id = %appointment.id,
            order_id = %confirmation.order_id,
            "Booking {:?}: token {} for doctor {} on {}",
            outcome, appointment.token_number, appointment.doctor_id, appointment.appointment_date
        );

        // Step 6: post-commit
        self.dispatcher.nudge();
        self.queue.invalidate(appointment.doctor_id, appointment.appointment_date).await;
        match self.store.resolve_tickets(&confirmation.payment_id).await {
            Ok(0) => {}
            Ok(n) => info!("Resolved {} reconciliation tickets for {}", n, confirmation.payment_id),
            Err(e) => warn!("Could not resolve reconciliation tickets for {}: {}", confirmation.payment_id, e),
        }

        Ok(BookingConfirmation { appointment, outcome })
    }

    async fn replay(
        &self,
        confirmation: &GatewayConfirmation,
        payment: &Payment,
    ) -> Result<BookingConfirmation, BookingError> {
        let existing = match payment.appointment_id {
            Some(id) => self.store.find_appointment(id).await?,
            None => None,
        };
        let existing = match existing {
            Some(a) => Some(a),
            None => self.store.find_by_reference(&confirmation.payment_id).await?,
        };

        match existing {
            Some(appointment) => {
                info!(appointment_id = %appointment.id, "Replayed confirmation for {}", confirmation.payment_id);
                Ok(BookingConfirmation { appointment, outcome: ConfirmationOutcome::Replayed })
            }
            None => {
                let err = BookingError::BookingPersistenceFailed("payment completed without an appointment".to_string());
                Err(self.escalate(confirmation, BookingStage::PaymentRecorded, err).await)
            }
        }
    }

    /// The appointment an earlier attempt persisted while the order stayed pending.
    /// One that was paid by another payment id means this one is a second payment.
    async fn earlier_booking(&self, confirmation: &GatewayConfirmation) -> Result<Option<Appointment>, BookingError> {
        if let Some(existing) = self.store.find_by_reference(&confirmation.payment_id).await? {
            return Ok(Some(existing));
        }

        match self.store.find_by_gateway_order(&confirmation.order_id).await? {
            Some(other) => {
                warn!(
                    order_id = %confirmation.order_id,
                    appointment_id = %other.id,
                    "Order already booked by payment {}", other.booking_reference
                );
                Err(BookingError::OrderAlreadySettled { order_id: confirmation.order_id.clone() })
            }
            None => Ok(None),
        }
    }

    async fn persist_appointment(
        &self,
        caller: &Caller,
        confirmation: &GatewayConfirmation,
        bound: &BookingIntent,
    ) -> Result<Appointment, BookingError> {
        let reference = confirmation.payment_id.as_str();

        if self.settings.slot_capacity_policy == SlotCapacityPolicy::Enforced {
            if let Err(e) = self.slots.ensure_capacity(bound, true).await {
                return Err(self.escalate(confirmation, BookingStage::Verified, e).await);
            }
        }

        let claim = match self.allocator.allocate(bound.doctor_id, bound.appointment_date, reference).await {
            Ok(claim) => claim,
            Err(e) => return Err(self.escalate(confirmation, BookingStage::Verified, e).await),
        };

        let appointment = Appointment::confirmed(caller.user_id, &confirmation.order_id, bound, &claim);
        let notices = self.confirmation_notices(&appointment);

        match self.store.insert_confirmed(&appointment, notices).await {
            Ok(created) => Ok(created),
            Err(StoreError::Conflict(ConflictKind::BookingReference)) => {
                // A concurrent confirmation of the same payment wrote it first
                match self.store.find_by_reference(reference).await {
                    Ok(Some(existing)) => Ok(existing),
                    Ok(None) => {
                        let err = BookingError::BookingPersistenceFailed(
                            "booking reference conflict without a matching appointment".to_string(),
                        );
                        Err(self.escalate(confirmation, BookingStage::TokenAllocated, err).await)
                    }
                    Err(e) => Err(self.escalate(confirmation, BookingStage::TokenAllocated, e.into()).await),
                }
            }
            Err(StoreError::Conflict(ConflictKind::GatewayOrder)) => {
                let err = BookingError::OrderAlreadySettled { order_id: confirmation.order_id.clone() };
                Err(self.escalate(confirmation, BookingStage::TokenAllocated, err).await)
            }
            Err(e) => Err(self.escalate(confirmation, BookingStage::TokenAllocated, e.into()).await),
        }
    }

    async fn record_payment(
        &self,
        confirmation: &GatewayConfirmation,
        appointment: &Appointment,
    ) -> Result<(), BookingError> {
        let completed = self.store
            .complete_payment(
                &confirmation.order_id,
                &confirmation.payment_id,
                &confirmation.signature,
                appointment.id,
            )
            .await;

        match completed {
            Ok(Some(_)) => Ok(()),
            Ok(None) => match self.store.find_by_order(&confirmation.order_id).await {
                Ok(Some(p)) if p.is_settled_by(&confirmation.payment_id) => Ok(()),
                Ok(_) => {
                    let err = BookingError::OrderAlreadySettled { order_id: confirmation.order_id.clone() };
                    Err(self.escalate(confirmation, BookingStage::AppointmentPersisted, err).await)
                }
                Err(e) => Err(self.escalate(confirmation, BookingStage::AppointmentPersisted, e.into()).await),
            },
            Err(e) => Err(self.escalate(confirmation, BookingStage::AppointmentPersisted, e.into()).await),
        }
    }

    /// Store failures past verification become persistence failures; anything
    /// reconciliation-class gets a ticket.
    async fn escalate(&self, confirmation: &GatewayConfirmation, stage: BookingStage, err: BookingError) -> BookingError {
        let err = match err {
            BookingError::Store(e) => BookingError::BookingPersistenceFailed(e.to_string()),
            other => other,
        };

        if err.requires_reconciliation() {
            error!(
                order_id = %confirmation.order_id,
                payment_id = %confirmation.payment_id,
                stage = %stage,
                "Paid booking needs reconciliation: {}", err
            );
            let ticket = ReconciliationTicket::open(
                &confirmation.order_id,
                &confirmation.payment_id,
                stage,
                err.to_string(),
            );
            if let Err(e) = self.store.open_ticket(&ticket).await {
                error!(payment_id = %confirmation.payment_id, "Failed to record reconciliation ticket: {}", e);
            }
        }

        err
    }

    fn confirmation_notices(&self, appointment: &Appointment) -> Vec<NotificationIntent> {
        let when = format!("{} at {}", appointment.appointment_date, appointment.appointment_time.format("%H:%M"));
        vec![
            NotificationIntent::new(
                appointment.patient_id,
                appointment.id,
                NotificationKind::AppointmentConfirmation,
                "Appointment Confirmed",
                format!("Your appointment on {} is confirmed. Token number: {}", when, appointment.token_number),
            )
            .with_max_attempts(self.settings.notification_max_attempts),
            NotificationIntent::new(
                appointment.doctor_id,
                appointment.id,
                NotificationKind::NewAppointment,
                "New Appointment",
                format!("Token {} booked for {}", appointment.token_number, when),
            )
            .with_max_attempts(self.settings.notification_max_attempts),
        ]
    }

    // ==========================================================================
    // LIFECYCLE
    // ==========================================================================

    /// Idempotent: an already-cancelled appointment is returned unchanged.
    /// The token stays issued.
    #[instrument(skip(self, caller), fields(caller_id = %caller.user_id))]
    pub async fn cancel_appointment(&self, caller: &Caller, appointment_id: Uuid) -> Result<Appointment, BookingError> {
        let appointment = self.load(appointment_id).await?;

        if !appointment.is_owned_by(caller.user_id) && !caller.is_admin() {
            return Err(BookingError::Unauthorized("only the patient or an admin can cancel".to_string()));
        }

        if appointment.status == AppointmentStatus::Cancelled {
            debug!("Appointment {} already cancelled", appointment_id);
            return Ok(appointment);
        }

        let notice = NotificationIntent::new(
            appointment.patient_id,
            appointment.id,
            NotificationKind::AppointmentCancelled,
            "Appointment Cancelled",
            format!(
                "Your appointment on {} (token {}) has been cancelled",
                appointment.appointment_date, appointment.token_number
            ),
        )
        .with_max_attempts(self.settings.notification_max_attempts);

        match self.move_status(&appointment, StatusUpdate::to(AppointmentStatus::Cancelled), vec![notice]).await {
            Err(BookingError::InvalidStateTransition { .. }) if self.is_cancelled(appointment_id).await => {
                self.load(appointment_id).await
            }
            result => result,
        }
    }

    #[instrument(skip(self, caller), fields(caller_id = %caller.user_id))]
    pub async fn start_consultation(&self, caller: &Caller, appointment_id: Uuid) -> Result<Appointment, BookingError> {
        let appointment = self.load(appointment_id).await?;
        require_treating_doctor(caller, &appointment)?;
        self.move_status(&appointment, StatusUpdate::to(AppointmentStatus::InConsultation), Vec::new()).await
    }

    #[instrument(skip(self, caller, request), fields(caller_id = %caller.user_id))]
    pub async fn complete_consultation(
        &self,
        caller: &Caller,
        appointment_id: Uuid,
        request: CompleteConsultationRequest,
    ) -> Result<Appointment, BookingError> {
        let appointment = self.load(appointment_id).await?;
        require_treating_doctor(caller, &appointment)?;

        if let Some(follow_up) = request.follow_up_date {
            if follow_up < appointment.appointment_date {
                return Err(BookingError::Validation("follow_up_date cannot precede the appointment".to_string()));
            }
        }
        if let Some(notes) = &request.consultation_notes {
            if notes.chars().count() > self.settings.special_instructions_max_len {
                return Err(BookingError::Validation("consultation_notes too long".to_string()));
            }
        }

        let update = StatusUpdate {
            status: AppointmentStatus::Completed,
            follow_up_date: request.follow_up_date,
            consultation_notes: request.consultation_notes,
        };
        self.move_status(&appointment, update, Vec::new()).await
    }

    /// Validated compare-and-set from the appointment's current status.
    async fn move_status(
        &self,
        appointment: &Appointment,
        update: StatusUpdate,
        notices: Vec<NotificationIntent>,
    ) -> Result<Appointment, BookingError> {
        let target = update.status;
        self.lifecycle.validate_status_transition(&appointment.status, &target)?;
        let has_notices = !notices.is_empty();

        match self.store.transition(appointment.id, appointment.status, update, notices).await? {
            Some(updated) => {
                info!("Appointment {} moved {} -> {}", updated.id, appointment.status, updated.status);
                self.queue.invalidate(updated.doctor_id, updated.appointment_date).await;
                if has_notices {
                    self.dispatcher.nudge();
                }
                Ok(updated)
            }
            None => {
                let current = self.load(appointment.id).await?;
                warn!("Appointment {} changed concurrently to {}", current.id, current.status);
                Err(BookingError::InvalidStateTransition {
                    from: current.status.to_string(),
                    to: target.to_string(),
                })
            }
        }
    }

    async fn is_cancelled(&self, appointment_id: Uuid) -> bool {
        matches!(
            self.store.find_appointment(appointment_id).await,
            Ok(Some(a)) if a.status == AppointmentStatus::Cancelled
        )
    }

    async fn load(&self, appointment_id: Uuid) -> Result<Appointment, BookingError> {
        self.store
            .find_appointment(appointment_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("appointment {}", appointment_id)))
    }

    // ==========================================================================
    // READS
    // ==========================================================================

    pub async fn get_appointment(&self, caller: &Caller, appointment_id: Uuid) -> Result<AppointmentView, BookingError> {
        let appointment = self.load(appointment_id).await?;

        if !appointment.is_owned_by(caller.user_id)
            && !caller.is_doctor_for(appointment.doctor_id)
            && !caller.is_admin()
        {
            return Err(BookingError::Unauthorized("not allowed to view this appointment".to_string()));
        }

        let queue = self.queue.queue_for(appointment.doctor_id, appointment.appointment_date).await?;
        let queue_position = position_of(&queue, appointment.id);

        Ok(AppointmentView { appointment, queue_position })
    }

    pub async fn doctor_queue(
        &self,
        caller: &Caller,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Arc<Vec<QueueEntry>>, BookingError> {
        if !caller.is_doctor_for(doctor_id) && !caller.is_admin() {
            return Err(BookingError::Unauthorized("queue is visible to its doctor and admins".to_string()));
        }
        self.queue.queue_for(doctor_id, date).await
    }

    pub async fn list_slots(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<SlotAvailability>, BookingError> {
        self.slots.list_slots(doctor_id, date).await
    }
}

fn require_treating_doctor(caller: &Caller, appointment: &Appointment) -> Result<(), BookingError> {
    if caller.is_doctor_for(appointment.doctor_id) {
        Ok(())
    } else {
        Err(BookingError::Unauthorized("only the appointment's doctor can change consultation status".to_string()))
    }
}
