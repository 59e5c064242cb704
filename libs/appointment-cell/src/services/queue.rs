use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::BookingError;
use crate::models::{Appointment, AppointmentStatus, QueueEntry, TokenType};
use crate::store::{AppointmentRepository, BookingStore};

/// Orders one doctor's day: cancelled rows dropped, priority tokens first,
/// then ascending token number. Only confirmed and in-consultation entries get
/// a position; completed ones stay listed without one.
pub fn project(appointments: &[Appointment]) -> Vec<QueueEntry> {
    let mut live: Vec<&Appointment> = appointments
        .iter()
        .filter(|a| a.status != AppointmentStatus::Cancelled)
        .collect();

    live.sort_by_key(|a| (a.token_type != TokenType::Priority, a.token_number));

    let mut position = 0;
    live.into_iter()
        .map(|a| {
            let queue_position = if a.status.is_waiting() {
                position += 1;
                Some(position)
            } else {
                None
            };

            QueueEntry {
                appointment_id: a.id,
                token_number: a.token_number,
                token_type: a.token_type,
                patient_display_name: a.patient_name
                    .clone()
                    .unwrap_or_else(|| format!("Patient #{}", a.token_number)),
                status: a.status,
                queue_position,
            }
        })
        .collect()
}

pub fn position_of(queue: &[QueueEntry], appointment_id: Uuid) -> Option<u32> {
    queue.iter()
        .find(|e| e.appointment_id == appointment_id)
        .and_then(|e| e.queue_position)
}

struct CachedQueue {
    entries: Arc<Vec<QueueEntry>>,
    fetched_at: Instant,
}

/// Serves projected queues with a short TTL so dashboard polling stays cheap.
/// Writers call `invalidate` after changing a partition.
pub struct QueueProjector {
    store: Arc<dyn BookingStore>,
    ttl: Duration,
    cache: RwLock<HashMap<(Uuid, NaiveDate), CachedQueue>>,
}

impl QueueProjector {
    pub fn new(store: Arc<dyn BookingStore>, ttl: Duration) -> Self {
        Self { store, ttl, cache: RwLock::new(HashMap::new()) }
    }

    pub async fn queue_for(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Arc<Vec<QueueEntry>>, BookingError> {
        if !self.ttl.is_zero() {
            let cache = self.cache.read().await;
            if let Some(hit) = cache.get(&(doctor_id, date)) {
                if hit.fetched_at.elapsed() < self.ttl {
                    return Ok(hit.entries.clone());
                }
            }
        }

        let appointments = self.store.list_for_day(doctor_id, date).await?;
        let entries = Arc::new(project(&appointments));
        debug!("Projected queue for doctor {} on {}: {} entries", doctor_id, date, entries.len());

        if !self.ttl.is_zero() {
            self.cache.write().await.insert(
                (doctor_id, date),
                CachedQueue { entries: entries.clone(), fetched_at: Instant::now() },
            );
        }

        Ok(entries)
    }

    pub async fn invalidate(&self, doctor_id: Uuid, date: NaiveDate) {
        self.cache.write().await.remove(&(doctor_id, date));
    }
}
