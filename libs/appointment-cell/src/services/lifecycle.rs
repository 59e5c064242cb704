// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use crate::error::BookingError;
use crate::models::AppointmentStatus;

#[derive(Debug, Default, Clone, Copy)]
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: &AppointmentStatus,
        new_status: &AppointmentStatus,
    ) -> Result<(), BookingError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.get_valid_transitions(current_status).contains(new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(BookingError::InvalidStateTransition {
                from: current_status.to_string(),
                to: new_status.to_string(),
            });
        }

        Ok(())
    }

    /// Get all valid next statuses for a given current status
    pub fn get_valid_transitions(&self, current_status: &AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::InConsultation,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::InConsultation => vec![
                AppointmentStatus::Completed,
            ],
            // Terminal states - no transitions allowed
            AppointmentStatus::Completed => vec![],
            AppointmentStatus::Cancelled => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn consultation_moves_forward_only() {
        let lifecycle = AppointmentLifecycleService::new();
        assert!(lifecycle
            .validate_status_transition(&AppointmentStatus::Confirmed, &AppointmentStatus::InConsultation)
            .is_ok());
        assert!(lifecycle
            .validate_status_transition(&AppointmentStatus::InConsultation, &AppointmentStatus::Completed)
            .is_ok());
        assert_matches!(
            lifecycle.validate_status_transition(&AppointmentStatus::Confirmed, &AppointmentStatus::Completed),
            Err(BookingError::InvalidStateTransition { from, to }) if from == "confirmed" && to == "completed"
        );
        assert!(lifecycle
            .validate_status_transition(&AppointmentStatus::InConsultation, &AppointmentStatus::Confirmed)
            .is_err());
    }

    #[test]
    fn terminal_states_have_no_exits() {
        let lifecycle = AppointmentLifecycleService::new();
        assert!(lifecycle.get_valid_transitions(&AppointmentStatus::Completed).is_empty());
        assert!(lifecycle.get_valid_transitions(&AppointmentStatus::Cancelled).is_empty());
        assert!(lifecycle
            .validate_status_transition(&AppointmentStatus::InConsultation, &AppointmentStatus::Cancelled)
            .is_err());
    }
}
