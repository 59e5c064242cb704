use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::BookingError;
use crate::models::{Appointment, AppointmentStatus, AvailabilityWindow, BookingIntent, SlotAvailability};
use crate::store::{AppointmentRepository, BookingStore, ScheduleRepository};

/// Expands recurring windows into slot start times with their capacity.
/// A window yields a slot every `slot_duration` minutes that fits fully
/// before `end_time`. Overlapping windows keep the larger capacity.
pub fn expand_windows(windows: &[AvailabilityWindow]) -> BTreeMap<NaiveTime, u32> {
    let mut slots = BTreeMap::new();

    for window in windows.iter().filter(|w| w.is_available) {
        let step = u32::try_from(window.slot_duration)
            .ok()
            .filter(|minutes| *minutes > 0)
            .and_then(|minutes| minutes.checked_mul(60));
        let step = match step {
            Some(step) => step,
            None => {
                warn!("Ignoring window {} with slot duration {}", window.id, window.slot_duration);
                continue;
            }
        };
        let end = window.end_time.num_seconds_from_midnight();
        let mut start = window.start_time.num_seconds_from_midnight();

        while let Some(next) = start.checked_add(step).filter(|next| *next <= end) {
            if let Some(time) = NaiveTime::from_num_seconds_from_midnight_opt(start, 0) {
                let capacity = slots.entry(time).or_insert(0);
                *capacity = (*capacity).max(window.max_appointments);
            }
            start = next;
        }
    }

    slots
}

pub fn availability(windows: &[AvailabilityWindow], appointments: &[Appointment]) -> Vec<SlotAvailability> {
    expand_windows(windows)
        .into_iter()
        .map(|(time, capacity)| {
            let booked = appointments
                .iter()
                .filter(|a| a.status != AppointmentStatus::Cancelled && a.appointment_time == time)
                .count() as u32;
            SlotAvailability { time, is_booked: booked > 0, booked, capacity }
        })
        .collect()
}

pub struct SlotCatalog {
    store: Arc<dyn BookingStore>,
}

impl SlotCatalog {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    pub async fn list_slots(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<SlotAvailability>, BookingError> {
        let windows = self.store.windows_for(doctor_id, date.weekday().num_days_from_sunday()).await?;
        let appointments = self.store.list_for_day(doctor_id, date).await?;
        let slots = availability(&windows, &appointments);
        debug!("{} slots for doctor {} on {}", slots.len(), doctor_id, date);
        Ok(slots)
    }

    /// Fails when the intent's slot is not offered or already at capacity.
    pub async fn ensure_capacity(&self, intent: &BookingIntent, after_payment: bool) -> Result<(), BookingError> {
        let slots = self.list_slots(intent.doctor_id, intent.appointment_date).await?;

        match slots.iter().find(|s| s.time == intent.appointment_time) {
            Some(slot) if !slot.is_full() => Ok(()),
            Some(slot) => Err(BookingError::SlotUnavailable {
                message: format!("{} is full ({} of {})", slot.time, slot.booked, slot.capacity),
                after_payment,
            }),
            None => Err(BookingError::SlotUnavailable {
                message: format!("{} is not offered on {}", intent.appointment_time, intent.appointment_date),
                after_payment,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(start: (u32, u32), end: (u32, u32), duration: i32, capacity: u32) -> AvailabilityWindow {
        AvailabilityWindow {
            id: Uuid::new_v4(),
            doctor_id: Uuid::nil(),
            day_of_week: 1,
            start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            slot_duration: duration,
            max_appointments: capacity,
            is_available: true,
        }
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn windows_expand_to_whole_slots_only() {
        let slots = expand_windows(&[window((9, 0), (10, 15), 30, 2)]);
        assert_eq!(slots.keys().copied().collect::<Vec<_>>(), vec![t(9, 0), t(9, 30)]);
        assert_eq!(slots[&t(9, 0)], 2);
    }

    #[test]
    fn unavailable_and_degenerate_windows_are_skipped() {
        let mut closed = window((9, 0), (10, 0), 30, 2);
        closed.is_available = false;
        let zero = window((11, 0), (12, 0), 0, 2);
        assert!(expand_windows(&[closed, zero]).is_empty());
    }

    #[test]
    fn oversized_durations_yield_no_slots() {
        let huge = window((9, 0), (17, 0), i32::MAX, 2);
        let start_overflows = window((9, 0), (17, 0), 71_582_788, 2);
        let negative = window((9, 0), (17, 0), -30, 2);
        assert!(expand_windows(&[huge, start_overflows, negative]).is_empty());
    }

    #[test]
    fn overlapping_windows_keep_larger_capacity() {
        let slots = expand_windows(&[window((9, 0), (10, 0), 30, 1), window((9, 0), (9, 30), 30, 3)]);
        assert_eq!(slots[&t(9, 0)], 3);
        assert_eq!(slots[&t(9, 30)], 1);
    }
}
