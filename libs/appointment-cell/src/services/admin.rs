use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tracing::{info, instrument};
use uuid::Uuid;

use shared_models::auth::Caller;

use crate::error::BookingError;
use crate::models::{Appointment, AppointmentStatus, ReconciliationTicket, RevenueSummary, TokenType};
use crate::store::{AppointmentRepository, BookingStore, PaymentRepository, ReconciliationRepository};

const MAX_FOLLOW_UP_WINDOW_DAYS: i64 = 90;

pub struct AdminService {
    store: Arc<dyn BookingStore>,
}

fn require_admin(caller: &Caller) -> Result<(), BookingError> {
    if caller.is_admin() {
        Ok(())
    } else {
        Err(BookingError::Unauthorized("admin access required".to_string()))
    }
}

impl AdminService {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    /// Token counts exclude cancelled appointments. Income counts every completed
    /// payment for the date, since cancellation does not refund automatically.
    #[instrument(skip(self, caller))]
    pub async fn revenue_summary(&self, caller: &Caller, date: NaiveDate) -> Result<RevenueSummary, BookingError> {
        require_admin(caller)?;

        let appointments = self.store.list_on_date(date).await?;
        let token_types: HashMap<Uuid, TokenType> =
            appointments.iter().map(|a| (a.id, a.token_type)).collect();

        let live: Vec<&Appointment> = appointments
            .iter()
            .filter(|a| a.status != AppointmentStatus::Cancelled)
            .collect();
        let priority_tokens = live.iter().filter(|a| a.token_type == TokenType::Priority).count() as u32;

        let ids: Vec<Uuid> = appointments.iter().map(|a| a.id).collect();
        let payments = self.store.completed_for_appointments(&ids).await?;

        let (mut consultation, mut priority) = (0i64, 0i64);
        for payment in &payments {
            match payment.appointment_id.and_then(|id| token_types.get(&id)) {
                Some(TokenType::Priority) => priority += payment.amount,
                Some(TokenType::Normal) => consultation += payment.amount,
                None => {}
            }
        }

        Ok(RevenueSummary {
            date,
            total_patients: live.len() as u32,
            normal_tokens: live.len() as u32 - priority_tokens,
            priority_tokens,
            total_consultation_income: consultation,
            total_priority_income: priority,
            overall_revenue: consultation + priority,
        })
    }

    pub async fn upcoming_follow_ups(
        &self,
        caller: &Caller,
        today: NaiveDate,
        days: i64,
    ) -> Result<Vec<Appointment>, BookingError> {
        require_admin(caller)?;
        let days = days.clamp(0, MAX_FOLLOW_UP_WINDOW_DAYS);
        Ok(self.store.list_follow_ups(today, today + Duration::days(days)).await?)
    }

    pub async fn open_reconciliation_tickets(&self, caller: &Caller) -> Result<Vec<ReconciliationTicket>, BookingError> {
        require_admin(caller)?;
        let tickets = self.store.open_tickets().await?;
        if !tickets.is_empty() {
            info!("{} reconciliation tickets open", tickets.len());
        }
        Ok(tickets)
    }
}
