// libs/schedule-cell/src/services/booking.rs
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde_json::json;
use tracing::{debug, info};

use crate::error::ScheduleError;
use crate::models::{AppointmentStatus, NewAppointment, NewScheduleRule, ScheduleFilter};
use crate::services::expander::OccurrenceExpander;
use crate::services::store::ScheduleStore;

fn time_of_day_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([01]\d|2[0-3]):[0-5]\d$").expect("static pattern compiles"))
}

/// Creation of recurring rules and one-off appointments.
pub struct ScheduleBookingService {
    store: Arc<dyn ScheduleStore>,
    expander: OccurrenceExpander,
}

impl ScheduleBookingService {
    pub fn new(store: Arc<dyn ScheduleStore>, expander: OccurrenceExpander) -> Self {
        Self { store, expander }
    }

    pub async fn create_rule(&self, request: NewScheduleRule, auth_token: &str) -> Result<String, ScheduleError> {
        debug!(
            "Creating schedule rule for patient {} with professional {}",
            request.patient_id, request.professional_id
        );

        validate_new_rule(&request)?;

        let record = json!({
            "patientId": request.patient_id,
            "professionalId": request.professional_id,
            "startDate": request.start_date.format("%Y-%m-%d").to_string(),
            "endDate": request.end_date.format("%Y-%m-%d").to_string(),
            "weeklyTimetable": request.weekly_timetable,
            "sessionType": request.session_type,
            "programId": request.program_id,
            "programName": request.program_name,
            "exceptions": { "cancelled": {}, "completed": {} },
            "createdAt": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        });

        let rule_id = self.store.push_rule(record, auth_token).await?;
        info!("Schedule rule {} created", rule_id);
        Ok(rule_id)
    }

    pub async fn book_appointment(&self, request: NewAppointment, auth_token: &str) -> Result<String, ScheduleError> {
        self.book_appointment_at(request, Utc::now(), auth_token).await
    }

    pub async fn book_appointment_at(
        &self,
        request: NewAppointment,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<String, ScheduleError> {
        debug!(
            "Booking one-off appointment for patient {} at {}",
            request.patient_id, request.date_time_start
        );

        if request.patient_id.trim().is_empty() || request.professional_id.trim().is_empty() {
            return Err(ScheduleError::ValidationError(
                "patientId and professionalId are required".to_string(),
            ));
        }
        if request.date_time_start <= now {
            return Err(ScheduleError::ValidationError(
                "Appointment time must be in the future".to_string(),
            ));
        }

        // A professional cannot hold two sessions at one instant, whether the
        // other one is stored or generated by a recurring rule.
        let professional = ScheduleFilter::Professional(request.professional_id.clone());
        let (existing, rules) = tokio::try_join!(
            self.store.appointments_for(&professional, auth_token),
            self.store.rules_for(&professional, auth_token),
        )?;
        if existing.iter().any(|appointment| {
            appointment.status == AppointmentStatus::Scheduled
                && appointment.date_time_start == request.date_time_start
        }) {
            return Err(ScheduleError::ConflictDetected(request.date_time_start.to_rfc3339()));
        }
        if let Some(rule) = rules.iter().find(|rule| {
            rule.professional_id == request.professional_id
                && self.expander.occurs_at(rule, request.date_time_start)
        }) {
            debug!("Requested slot is taken by schedule rule {}", rule.id);
            return Err(ScheduleError::ConflictDetected(request.date_time_start.to_rfc3339()));
        }

        let record = json!({
            "patientId": request.patient_id,
            "professionalId": request.professional_id,
            "dateTimeStart": request.date_time_start.to_rfc3339_opts(SecondsFormat::Millis, true),
            "status": AppointmentStatus::Scheduled,
            "type": request.appointment_type,
            "programId": request.program_id,
            "programName": request.program_name,
            "createdAt": now.to_rfc3339_opts(SecondsFormat::Millis, true),
        });

        let appointment_id = self.store.push_appointment(record, auth_token).await?;
        info!("Appointment {} booked", appointment_id);
        Ok(appointment_id)
    }
}

pub fn validate_new_rule(request: &NewScheduleRule) -> Result<(), ScheduleError> {
    if request.patient_id.trim().is_empty() || request.professional_id.trim().is_empty() {
        return Err(ScheduleError::InvalidRule(
            "patientId and professionalId are required".to_string(),
        ));
    }

    if request.start_date > request.end_date {
        return Err(ScheduleError::InvalidRule(format!(
            "startDate {} is after endDate {}",
            request.start_date, request.end_date
        )));
    }

    let mut has_times = false;
    for (weekday, times) in &request.weekly_timetable {
        match weekday.parse::<u8>() {
            Ok(day) if day <= 6 => {}
            _ => {
                return Err(ScheduleError::InvalidRule(format!(
                    "weekday '{}' must be between 0 (Sunday) and 6 (Saturday)",
                    weekday
                )))
            }
        }

        if let Some(bad) = times.iter().find(|t| !time_of_day_pattern().is_match(t)) {
            return Err(ScheduleError::InvalidRule(format!(
                "time '{}' on weekday {} is not zero-padded HH:MM",
                bad, weekday
            )));
        }
        has_times |= !times.is_empty();
    }

    if !has_times {
        return Err(ScheduleError::InvalidRule(
            "weeklyTimetable must list at least one session time".to_string(),
        ));
    }

    Ok(())
}
