use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use shared_config::AppConfig;

pub const TEST_TOKEN: &str = "test-id-token";

pub struct TestConfig {
    pub realtime_database_url: String,
    pub clinic_timezone: chrono_tz::Tz,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            realtime_database_url: "http://localhost:9000".to_string(),
            clinic_timezone: chrono_tz::America::Sao_Paulo,
        }
    }
}

impl TestConfig {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            realtime_database_url: url.into(),
            ..Self::default()
        }
    }

    /// Fast retries and lookups so failing paths do not slow the suite down.
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            realtime_database_url: self.realtime_database_url.clone(),
            clinic_timezone: self.clinic_timezone,
            name_lookup_timeout: Duration::from_millis(500),
            write_retry_attempts: 2,
            write_retry_base_delay: Duration::ZERO,
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct MockRealtimeResponses;

impl MockRealtimeResponses {
    pub fn schedule_rule(
        patient_id: &str,
        professional_id: &str,
        start_date: &str,
        end_date: &str,
        weekly_timetable: Value,
    ) -> Value {
        json!({
            "patientId": patient_id,
            "professionalId": professional_id,
            "startDate": start_date,
            "endDate": end_date,
            "weeklyTimetable": weekly_timetable,
            "sessionType": "ABA",
            "programId": "prog-1",
            "programName": "Comunicação funcional",
            "createdAt": "2024-02-20T14:00:00.000Z"
        })
    }

    pub fn appointment(patient_id: &str, professional_id: &str, date_time_start: &str, status: &str) -> Value {
        json!({
            "patientId": patient_id,
            "professionalId": professional_id,
            "dateTimeStart": date_time_start,
            "status": status,
            "type": "ABA"
        })
    }
}
