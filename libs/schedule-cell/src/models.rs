// libs/schedule-cell/src/models.rs
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub const DEFAULT_SESSION_TYPE: &str = "ABA";

fn default_session_type() -> String {
    DEFAULT_SESSION_TYPE.to_string()
}

// ==============================================================================
// APPOINTMENT STATUS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ==============================================================================
// SCHEDULE RULES
// ==============================================================================

/// Weekday index (0 = Sunday .. 6 = Saturday) to "HH:MM" start times.
///
/// The database hands back integer-keyed objects either as objects or as
/// sparse arrays with `null` holes, so both shapes are accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeeklyTimetable(BTreeMap<u8, Vec<String>>);

impl WeeklyTimetable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_day(mut self, weekday: u8, times: &[&str]) -> Self {
        self.0.insert(weekday, times.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn times_for(&self, weekday: u8) -> &[String] {
        self.0.get(&weekday).map(Vec::as_slice).unwrap_or(&[])
    }

}

impl Serialize for WeeklyTimetable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(day, times)| (day.to_string(), times)))
    }
}

impl<'de> Deserialize<'de> for WeeklyTimetable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawTimetable {
            Object(BTreeMap<String, Option<Vec<String>>>),
            Array(Vec<Option<Vec<String>>>),
        }

        let mut days = BTreeMap::new();
        match Option::<RawTimetable>::deserialize(deserializer)? {
            None => {}
            Some(RawTimetable::Object(entries)) => {
                for (key, times) in entries {
                    match (key.trim().parse::<u8>(), times) {
                        (Ok(day), Some(times)) if day <= 6 => {
                            days.insert(day, times);
                        }
                        (Ok(_), None) => {}
                        _ => tracing::warn!("Ignoring timetable entry with invalid weekday '{}'", key),
                    }
                }
            }
            Some(RawTimetable::Array(entries)) => {
                for (index, times) in entries.into_iter().enumerate() {
                    match times {
                        Some(times) if index <= 6 => {
                            days.insert(index as u8, times);
                        }
                        Some(_) => tracing::warn!("Ignoring timetable entry with invalid weekday {}", index),
                        None => {}
                    }
                }
            }
        }

        Ok(Self(days))
    }
}

/// Exception markers keyed by an encoded occurrence instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExceptionSet(HashMap<String, Value>);

impl ExceptionSet {
    /// `false` and `null` markers do not count.
    pub fn contains(&self, key: &str) -> bool {
        matches!(self.0.get(key), Some(value) if !value.is_null() && *value != Value::Bool(false))
    }

    pub fn insert(&mut self, key: impl Into<String>) {
        self.0.insert(key.into(), Value::Bool(true));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    Cancelled,
    Completed,
}

impl ExceptionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExceptionKind::Cancelled => "cancelled",
            ExceptionKind::Completed => "completed",
        }
    }

    /// Status the marked occurrence ended in.
    pub fn status(&self) -> AppointmentStatus {
        match self {
            ExceptionKind::Cancelled => AppointmentStatus::Cancelled,
            ExceptionKind::Completed => AppointmentStatus::Completed,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleExceptions {
    #[serde(default)]
    pub cancelled: ExceptionSet,
    #[serde(default)]
    pub completed: ExceptionSet,
}

impl RuleExceptions {
    pub fn set(&self, kind: ExceptionKind) -> &ExceptionSet {
        match kind {
            ExceptionKind::Cancelled => &self.cancelled,
            ExceptionKind::Completed => &self.completed,
        }
    }
}

/// Recurring weekly prescription for one patient/professional pairing.
///
/// Dates stay as stored strings; they are parsed during expansion so a
/// malformed rule can be skipped on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRule {
    #[serde(default)]
    pub id: String,
    pub patient_id: String,
    pub professional_id: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub weekly_timetable: WeeklyTimetable,
    #[serde(default = "default_session_type", alias = "type")]
    pub session_type: String,
    #[serde(default)]
    pub program_id: Option<String>,
    #[serde(default)]
    pub program_name: Option<String>,
    #[serde(default)]
    pub exceptions: RuleExceptions,
}

// ==============================================================================
// APPOINTMENTS
// ==============================================================================

/// Persisted calendar event: a one-off booking or a completed/cancelled session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    #[serde(default)]
    pub id: String,
    pub patient_id: String,
    pub professional_id: String,
    pub date_time_start: DateTime<Utc>,
    pub status: AppointmentStatus,
    #[serde(rename = "type", alias = "sessionType", default = "default_session_type")]
    pub appointment_type: String,
    #[serde(default)]
    pub rule_id: Option<String>,
    #[serde(default)]
    pub program_id: Option<String>,
    #[serde(default)]
    pub program_name: Option<String>,
    #[serde(default)]
    pub session_result: Option<Value>,
}

// ==============================================================================
// OCCURRENCES
// ==============================================================================

/// Where an occurrence comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OccurrenceRef {
    /// Generated from a rule; exists only until a real record replaces it.
    Virtual {
        rule_id: String,
        instant: DateTime<Utc>,
    },
    Real {
        appointment_id: String,
    },
}

impl OccurrenceRef {
    /// Identifier in the historical string form (`{ruleId}_{epochMillis}` for
    /// virtual occurrences, the push key otherwise).
    pub fn legacy_id(&self) -> String {
        match self {
            OccurrenceRef::Virtual { rule_id, instant } => {
                format!("{}_{}", rule_id, instant.timestamp_millis())
            }
            OccurrenceRef::Real { appointment_id } => appointment_id.clone(),
        }
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, OccurrenceRef::Virtual { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    #[serde(default)]
    pub id: String,
    pub reference: OccurrenceRef,
    pub patient_id: String,
    pub professional_id: String,
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub date_key: String,
    pub status: AppointmentStatus,
    #[serde(default = "default_session_type")]
    pub session_type: String,
    #[serde(default)]
    pub program_id: Option<String>,
    #[serde(default)]
    pub program_name: Option<String>,
    #[serde(default)]
    pub patient_name: String,
    #[serde(default)]
    pub professional_name: String,
    #[serde(default)]
    pub session_result: Option<Value>,
}

/// Which side of the pairing a calendar is built for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScheduleFilter {
    Professional(String),
    Patient(String),
}

impl ScheduleFilter {
    /// Field name the store is queried by.
    pub fn field(&self) -> &'static str {
        match self {
            ScheduleFilter::Professional(_) => "professionalId",
            ScheduleFilter::Patient(_) => "patientId",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ScheduleFilter::Professional(id) | ScheduleFilter::Patient(id) => id,
        }
    }

    pub fn matches(&self, patient_id: &str, professional_id: &str) -> bool {
        match self {
            ScheduleFilter::Professional(id) => id == professional_id,
            ScheduleFilter::Patient(id) => id == patient_id,
        }
    }
}

/// Expansion output for one month.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthCalendar {
    pub year: i32,
    pub month: u32,
    /// `YYYY-MM-DD` to the occurrences on that day, unordered.
    pub occurrences: BTreeMap<String, Vec<Occurrence>>,
    /// Days with at least one `scheduled` occurrence.
    pub marked_dates: BTreeSet<String>,
}

impl MonthCalendar {
    pub fn occurrences_on(&self, date_key: &str) -> &[Occurrence] {
        self.occurrences.get(date_key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn total_occurrences(&self) -> usize {
        self.occurrences.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.occurrences.values().all(Vec::is_empty)
    }

    /// Orders every day's list by start time, for presentation.
    pub fn sort_by_start(&mut self) {
        for day in self.occurrences.values_mut() {
            day.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        }
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAppointment {
    pub patient_id: String,
    pub professional_id: String,
    pub date_time_start: DateTime<Utc>,
    #[serde(rename = "type", default = "default_session_type")]
    pub appointment_type: String,
    #[serde(default)]
    pub program_id: Option<String>,
    #[serde(default)]
    pub program_name: Option<String>,
}

/// Rule as submitted by a professional. The timetable keeps raw keys so
/// out-of-range weekdays are reported instead of dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewScheduleRule {
    pub patient_id: String,
    pub professional_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub weekly_timetable: BTreeMap<String, Vec<String>>,
    #[serde(default = "default_session_type")]
    pub session_type: String,
    #[serde(default)]
    pub program_id: Option<String>,
    #[serde(default)]
    pub program_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelOccurrenceRequest {
    pub occurrence: Occurrence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteOccurrenceRequest {
    pub occurrence: Occurrence,
    #[serde(default)]
    pub session_result: Option<Value>,
}
