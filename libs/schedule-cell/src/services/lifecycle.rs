// libs/schedule-cell/src/services/lifecycle.rs
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::ScheduleError;
use crate::models::{AppointmentStatus, Occurrence};

pub struct OccurrenceLifecycle;

impl OccurrenceLifecycle {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), ScheduleError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(ScheduleError::InvalidStatusTransition {
                from: current_status,
                to: new_status,
            });
        }

        Ok(())
    }

    /// Statuses change exactly once and never revert.
    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Scheduled => vec![AppointmentStatus::Completed, AppointmentStatus::Cancelled],
            // Terminal states
            AppointmentStatus::Completed => vec![],
            AppointmentStatus::Cancelled => vec![],
        }
    }

    /// Only scheduled occurrences strictly in the future can be cancelled.
    pub fn validate_cancellation(&self, occurrence: &Occurrence, now: DateTime<Utc>) -> Result<(), ScheduleError> {
        if occurrence.status != AppointmentStatus::Scheduled {
            return Err(ScheduleError::NotCancellable(format!(
                "occurrence {} is already {}",
                occurrence.id, occurrence.status
            )));
        }

        if occurrence.start <= now {
            return Err(ScheduleError::NotCancellable(format!(
                "occurrence {} started at {} and is no longer in the future",
                occurrence.id,
                occurrence.start.to_rfc3339()
            )));
        }

        Ok(())
    }

    pub fn can_cancel(&self, occurrence: &Occurrence, now: DateTime<Utc>) -> bool {
        self.validate_cancellation(occurrence, now).is_ok()
    }
}

impl Default for OccurrenceLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OccurrenceRef;
    use assert_matches::assert_matches;
    use chrono::Duration;

    fn occurrence(status: AppointmentStatus, start: DateTime<Utc>) -> Occurrence {
        Occurrence {
            id: "appt-1".to_string(),
            reference: OccurrenceRef::Real {
                appointment_id: "appt-1".to_string(),
            },
            patient_id: "pat-1".to_string(),
            professional_id: "prof-1".to_string(),
            start,
            date_key: start.format("%Y-%m-%d").to_string(),
            status,
            session_type: "ABA".to_string(),
            program_id: None,
            program_name: None,
            patient_name: String::new(),
            professional_name: String::new(),
            session_result: None,
        }
    }

    #[test]
    fn terminal_statuses_never_transition() {
        let lifecycle = OccurrenceLifecycle::new();
        assert!(lifecycle
            .validate_status_transition(AppointmentStatus::Scheduled, AppointmentStatus::Cancelled)
            .is_ok());
        assert_matches!(
            lifecycle.validate_status_transition(AppointmentStatus::Cancelled, AppointmentStatus::Scheduled),
            Err(ScheduleError::InvalidStatusTransition { .. })
        );
        assert_matches!(
            lifecycle.validate_status_transition(AppointmentStatus::Completed, AppointmentStatus::Cancelled),
            Err(ScheduleError::InvalidStatusTransition { .. })
        );
    }

    #[test]
    fn only_future_scheduled_occurrences_are_cancellable() {
        let lifecycle = OccurrenceLifecycle::new();
        let now = Utc::now();

        assert!(lifecycle.can_cancel(&occurrence(AppointmentStatus::Scheduled, now + Duration::hours(1)), now));
        assert!(!lifecycle.can_cancel(&occurrence(AppointmentStatus::Scheduled, now), now));
        assert!(!lifecycle.can_cancel(&occurrence(AppointmentStatus::Scheduled, now - Duration::hours(1)), now));
        assert!(!lifecycle.can_cancel(&occurrence(AppointmentStatus::Completed, now + Duration::hours(1)), now));
        assert!(!lifecycle.can_cancel(&occurrence(AppointmentStatus::Cancelled, now + Duration::hours(1)), now));
    }
}
