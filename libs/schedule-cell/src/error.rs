use thiserror::Error;

use shared_database::StoreError;
use shared_models::error::AppError;

use crate::models::AppointmentStatus;

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Invalid calendar month: {year}-{month}")]
    InvalidMonth { year: i32, month: u32 },

    #[error("Invalid schedule rule: {0}")]
    InvalidRule(String),

    #[error("Occurrence cannot be cancelled: {0}")]
    NotCancellable(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Appointment not found: {0}")]
    AppointmentNotFound(String),

    #[error("Schedule rule not found: {0}")]
    RuleNotFound(String),

    #[error("Appointment conflicts with existing booking at {0}")]
    ConflictDetected(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<ScheduleError> for AppError {
    fn from(error: ScheduleError) -> Self {
        match error {
            ScheduleError::InvalidMonth { .. }
            | ScheduleError::InvalidRule(_)
            | ScheduleError::ValidationError(_) => AppError::ValidationError(error.to_string()),
            ScheduleError::NotCancellable(_)
            | ScheduleError::InvalidStatusTransition { .. }
            | ScheduleError::ConflictDetected(_) => AppError::Conflict(error.to_string()),
            ScheduleError::AppointmentNotFound(_) | ScheduleError::RuleNotFound(_) => {
                AppError::NotFound(error.to_string())
            }
            ScheduleError::Store(StoreError::NotConfigured) => {
                AppError::ServiceUnavailable("Realtime database is not configured".to_string())
            }
            ScheduleError::Store(StoreError::Unauthorized { body, .. }) => AppError::Auth(body),
            ScheduleError::Store(StoreError::InvalidKey(key)) => {
                AppError::BadRequest(format!("Invalid identifier: {}", key))
            }
            ScheduleError::Store(e) => AppError::Database(e.to_string()),
        }
    }
}
