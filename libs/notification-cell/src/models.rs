use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    AppointmentConfirmation,
    NewAppointment,
    AppointmentCancelled,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::AppointmentConfirmation => write!(f, "appointment_confirmation"),
            NotificationKind::NewAppointment => write!(f, "new_appointment"),
            NotificationKind::AppointmentCancelled => write!(f, "appointment_cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Push,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Delivered,
    Failed,
}

/// A notification waiting in the outbox. Written alongside the booking change
/// that caused it and delivered later by the worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationIntent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub appointment_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub channel_hints: Vec<Channel>,
    pub status: OutboxStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationIntent {
    pub fn new(
        user_id: Uuid,
        appointment_id: Uuid,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            appointment_id,
            kind,
            title: title.into(),
            message: message.into(),
            channel_hints: vec![Channel::Email, Channel::Push],
            status: OutboxStatus::Pending,
            attempts: 0,
            max_attempts: 5,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn record_delivery(&mut self) {
        self.attempts += 1;
        self.status = OutboxStatus::Delivered;
        self.last_error = None;
        self.updated_at = Utc::now();
    }

    /// Stays pending until the attempt budget is spent, then becomes failed.
    pub fn record_failure(&mut self, error: &str) {
        self.attempts += 1;
        self.last_error = Some(error.to_string());
        self.status = if self.attempts >= self.max_attempts {
            OutboxStatus::Failed
        } else {
            OutboxStatus::Pending
        };
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub batch_size: usize,
    pub poll_interval_seconds: u64,
    pub delivery_timeout_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("outbox-{}", Uuid::new_v4()),
            batch_size: 20,
            poll_interval_seconds: 5,
            delivery_timeout_seconds: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_keeps_intent_pending_until_budget_spent() {
        let mut intent = NotificationIntent::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            NotificationKind::AppointmentConfirmation,
            "Appointment Confirmed",
            "Token 1",
        )
        .with_max_attempts(2);

        intent.record_failure("channel down");
        assert_eq!(intent.status, OutboxStatus::Pending);
        assert_eq!(intent.attempts, 1);

        intent.record_failure("channel down");
        assert_eq!(intent.status, OutboxStatus::Failed);
        assert_eq!(intent.last_error.as_deref(), Some("channel down"));
    }

    #[test]
    fn kind_serializes_as_snake_case() {
        let value = serde_json::to_value(NotificationKind::NewAppointment).unwrap();
        assert_eq!(value, serde_json::json!("new_appointment"));
        assert_eq!(NotificationKind::AppointmentCancelled.to_string(), "appointment_cancelled");
    }
}
