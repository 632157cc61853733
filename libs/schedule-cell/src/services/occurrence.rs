// libs/schedule-cell/src/services/occurrence.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use shared_config::AppConfig;
use shared_database::RetryPolicy;

use crate::error::ScheduleError;
use crate::models::{
    AppointmentStatus, ExceptionKind, Occurrence, OccurrenceRef, ScheduleFilter, ScheduleRule,
};
use crate::services::exception_key::{self, canonical_key};
use crate::services::lifecycle::OccurrenceLifecycle;
use crate::services::store::ScheduleStore;

/// Write-side operations on single occurrences.
///
/// Every operation is one single-key write (completion of a virtual
/// occurrence adds a push first). The stored rule or appointment is re-read
/// before writing; the caller's snapshot only has to agree with it.
pub struct OccurrenceService {
    store: Arc<dyn ScheduleStore>,
    lifecycle: OccurrenceLifecycle,
    retry: RetryPolicy,
    timezone: Tz,
}

impl OccurrenceService {
    pub fn new(store: Arc<dyn ScheduleStore>, config: &AppConfig) -> Self {
        Self::with_retry(store, config.clinic_timezone, RetryPolicy::from_config(config))
    }

    pub fn with_retry(store: Arc<dyn ScheduleStore>, timezone: Tz, retry: RetryPolicy) -> Self {
        Self {
            store,
            lifecycle: OccurrenceLifecycle::new(),
            retry,
            timezone,
        }
    }

    pub async fn cancel_occurrence(&self, occurrence: &Occurrence, auth_token: &str) -> Result<(), ScheduleError> {
        self.cancel_occurrence_at(occurrence, Utc::now(), auth_token).await
    }

    /// Cancel one occurrence without touching any other occurrence of its rule.
    pub async fn cancel_occurrence_at(
        &self,
        occurrence: &Occurrence,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<(), ScheduleError> {
        debug!("Cancelling occurrence {}", occurrence.id);
        self.lifecycle.validate_cancellation(occurrence, now)?;

        match &occurrence.reference {
            OccurrenceRef::Virtual { rule_id, instant } => {
                ensure_consistent(occurrence, *instant)?;
                let rule = self.stored_rule(rule_id, auth_token).await?;

                match self.recorded_outcome(&rule, *instant) {
                    Some(ExceptionKind::Completed) => {
                        return Err(ScheduleError::NotCancellable(format!(
                            "occurrence {} was already completed",
                            occurrence.id
                        )));
                    }
                    Some(ExceptionKind::Cancelled) => {
                        debug!("Occurrence {} already cancelled", occurrence.id);
                        return Ok(());
                    }
                    None => {}
                }

                let key = canonical_key(*instant);
                self.retry
                    .run("cancel exception write", || {
                        self.store.set_exception(rule_id, ExceptionKind::Cancelled, &key, auth_token)
                    })
                    .await?;

                info!("Cancelled occurrence of rule {} at {}", rule_id, key);
            }
            OccurrenceRef::Real { appointment_id } => {
                let stored = self
                    .store
                    .appointment(appointment_id, auth_token)
                    .await?
                    .ok_or_else(|| ScheduleError::AppointmentNotFound(appointment_id.clone()))?;

                self.lifecycle
                    .validate_status_transition(stored.status, AppointmentStatus::Cancelled)?;
                if stored.date_time_start <= now {
                    return Err(ScheduleError::NotCancellable(format!(
                        "appointment {} is no longer in the future",
                        appointment_id
                    )));
                }

                let fields = json!({ "status": AppointmentStatus::Cancelled });
                self.retry
                    .run("cancel status update", || {
                        self.store.update_appointment(appointment_id, fields.clone(), auth_token)
                    })
                    .await?;

                info!("Cancelled appointment {}", appointment_id);
            }
        }

        Ok(())
    }

    /// Record a finished session. Returns the id of the stored appointment.
    pub async fn complete_occurrence(
        &self,
        occurrence: &Occurrence,
        session_result: Option<Value>,
        auth_token: &str,
    ) -> Result<String, ScheduleError> {
        debug!("Completing occurrence {}", occurrence.id);

        match &occurrence.reference {
            OccurrenceRef::Virtual { rule_id, instant } => {
                self.lifecycle
                    .validate_status_transition(occurrence.status, AppointmentStatus::Completed)?;
                ensure_consistent(occurrence, *instant)?;
                let rule = self.stored_rule(rule_id, auth_token).await?;

                if let Some(kind) = self.recorded_outcome(&rule, *instant) {
                    return Err(ScheduleError::InvalidStatusTransition {
                        from: kind.status(),
                        to: AppointmentStatus::Completed,
                    });
                }

                // A stored record at this instant already replaces the rule's occurrence.
                let stored = self
                    .store
                    .appointments_for(&ScheduleFilter::Patient(rule.patient_id.clone()), auth_token)
                    .await?;
                if let Some(existing) = stored.iter().find(|a| a.date_time_start == *instant) {
                    return Err(match existing.status {
                        AppointmentStatus::Scheduled => {
                            ScheduleError::ConflictDetected(instant.to_rfc3339())
                        }
                        status => ScheduleError::InvalidStatusTransition {
                            from: status,
                            to: AppointmentStatus::Completed,
                        },
                    });
                }

                let record = json!({
                    "patientId": occurrence.patient_id,
                    "professionalId": occurrence.professional_id,
                    "dateTimeStart": instant.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                    "status": AppointmentStatus::Completed,
                    "type": occurrence.session_type,
                    "ruleId": rule_id,
                    "programId": occurrence.program_id,
                    "programName": occurrence.program_name,
                    "sessionResult": session_result,
                    "completedAt": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                });

                // Pushes are not idempotent, so they are attempted once.
                let appointment_id = self.store.push_appointment(record, auth_token).await?;

                // The pushed record already hides the occurrence from the calendar.
                let key = canonical_key(*instant);
                if let Err(e) = self
                    .retry
                    .run("completed exception write", || {
                        self.store.set_exception(rule_id, ExceptionKind::Completed, &key, auth_token)
                    })
                    .await
                {
                    warn!(
                        "Appointment {} stored but completed marker for rule {} at {} was not written: {}",
                        appointment_id, rule_id, key, e
                    );
                }

                info!("Completed occurrence of rule {} as appointment {}", rule_id, appointment_id);
                Ok(appointment_id)
            }
            OccurrenceRef::Real { appointment_id } => {
                let stored = self
                    .store
                    .appointment(appointment_id, auth_token)
                    .await?
                    .ok_or_else(|| ScheduleError::AppointmentNotFound(appointment_id.clone()))?;

                self.lifecycle
                    .validate_status_transition(stored.status, AppointmentStatus::Completed)?;

                let fields = json!({
                    "status": AppointmentStatus::Completed,
                    "sessionResult": session_result,
                    "completedAt": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                });
                self.retry
                    .run("complete status update", || {
                        self.store.update_appointment(appointment_id, fields.clone(), auth_token)
                    })
                    .await?;

                info!("Completed appointment {}", appointment_id);
                Ok(appointment_id.clone())
            }
        }
    }

    async fn stored_rule(&self, rule_id: &str, auth_token: &str) -> Result<ScheduleRule, ScheduleError> {
        self.store
            .rule(rule_id, auth_token)
            .await?
            .ok_or_else(|| ScheduleError::RuleNotFound(rule_id.to_string()))
    }

    /// Exception already stored on the rule for `instant`, if any.
    fn recorded_outcome(&self, rule: &ScheduleRule, instant: DateTime<Utc>) -> Option<ExceptionKind> {
        [ExceptionKind::Completed, ExceptionKind::Cancelled]
            .into_iter()
            .find(|kind| exception_key::is_excepted(rule.exceptions.set(*kind), instant, self.timezone))
    }
}

fn ensure_consistent(occurrence: &Occurrence, instant: DateTime<Utc>) -> Result<(), ScheduleError> {
    if occurrence.start != instant {
        return Err(ScheduleError::ValidationError(format!(
            "occurrence {} starts at {} but references {}",
            occurrence.id,
            occurrence.start.to_rfc3339(),
            instant.to_rfc3339()
        )));
    }
    Ok(())
}
