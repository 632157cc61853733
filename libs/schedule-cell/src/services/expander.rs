// libs/schedule-cell/src/services/expander.rs
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::error::ScheduleError;
use crate::models::{
    Appointment, AppointmentStatus, MonthCalendar, Occurrence, OccurrenceRef, ScheduleRule,
};
use crate::services::exception_key;
use crate::services::names::NameDirectory;

/// Turns recurring rules plus stored appointments into a month of occurrences.
///
/// Pure: the same rules, appointments and names always give the same calendar.
#[derive(Debug, Clone, Copy)]
pub struct OccurrenceExpander {
    timezone: Tz,
}

impl OccurrenceExpander {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn expand_month(
        &self,
        rules: &[ScheduleRule],
        appointments: &[Appointment],
        year: i32,
        month: u32,
        names: &NameDirectory,
    ) -> Result<MonthCalendar, ScheduleError> {
        let days = month_days(year, month)?;
        let mut occurrences: BTreeMap<String, Vec<Occurrence>> = BTreeMap::new();

        for rule in rules {
            if let Err(e) = self.expand_rule(rule, &days, names, &mut occurrences) {
                warn!("Skipping schedule rule {}: {}", rule.id, e);
            }
        }

        let mut real_count = 0;
        for appointment in appointments {
            let occurrence = self.real_occurrence(appointment, names);
            if !self.in_month(occurrence.start, year, month) {
                continue;
            }

            let day = occurrences.entry(occurrence.date_key.clone()).or_default();
            // Stored records win over the rule-generated occurrence at the same instant.
            day.retain(|existing| !(existing.reference.is_virtual() && existing.start == occurrence.start));
            day.push(occurrence);
            real_count += 1;
        }

        occurrences.retain(|_, day| !day.is_empty());

        let marked_dates: BTreeSet<String> = occurrences
            .iter()
            .filter(|(_, day)| day.iter().any(|o| o.status == AppointmentStatus::Scheduled))
            .map(|(date_key, _)| date_key.clone())
            .collect();

        debug!(
            "Expanded {}-{:02}: {} rules, {} stored appointments, {} marked days",
            year,
            month,
            rules.len(),
            real_count,
            marked_dates.len()
        );

        Ok(MonthCalendar {
            year,
            month,
            occurrences,
            marked_dates,
        })
    }

    fn expand_rule(
        &self,
        rule: &ScheduleRule,
        days: &[NaiveDate],
        names: &NameDirectory,
        out: &mut BTreeMap<String, Vec<Occurrence>>,
    ) -> Result<(), ScheduleError> {
        let (start_date, end_date) = self.rule_window(rule)?;

        for date in days.iter().copied().filter(|d| *d >= start_date && *d <= end_date) {
            let weekday = date.weekday().num_days_from_sunday() as u8;
            let mut seen: Vec<DateTime<Utc>> = Vec::new();

            for raw_time in rule.weekly_timetable.times_for(weekday) {
                let Some(time) = parse_time_of_day(raw_time) else {
                    warn!("Rule {} has invalid time '{}' on weekday {}", rule.id, raw_time, weekday);
                    continue;
                };
                let Some(instant) = self.local_instant(date, time) else {
                    warn!("Rule {}: {} {} does not exist in {}", rule.id, date, raw_time, self.timezone);
                    continue;
                };
                if seen.contains(&instant) {
                    continue;
                }
                seen.push(instant);

                if exception_key::is_excepted(&rule.exceptions.cancelled, instant, self.timezone)
                    || exception_key::is_excepted(&rule.exceptions.completed, instant, self.timezone)
                {
                    continue;
                }

                let occurrence = self.virtual_occurrence(rule, instant, names);
                out.entry(occurrence.date_key.clone()).or_default().push(occurrence);
            }
        }

        Ok(())
    }

    fn rule_window(&self, rule: &ScheduleRule) -> Result<(NaiveDate, NaiveDate), ScheduleError> {
        let start = rule
            .start_date
            .as_deref()
            .and_then(|raw| parse_rule_date(raw, self.timezone))
            .ok_or_else(|| ScheduleError::InvalidRule(format!("unreadable startDate {:?}", rule.start_date)))?;
        let end = rule
            .end_date
            .as_deref()
            .and_then(|raw| parse_rule_date(raw, self.timezone))
            .ok_or_else(|| ScheduleError::InvalidRule(format!("unreadable endDate {:?}", rule.end_date)))?;

        if start > end {
            return Err(ScheduleError::InvalidRule(format!(
                "startDate {} is after endDate {}",
                start, end
            )));
        }

        Ok((start, end))
    }

    fn virtual_occurrence(&self, rule: &ScheduleRule, instant: DateTime<Utc>, names: &NameDirectory) -> Occurrence {
        let reference = OccurrenceRef::Virtual {
            rule_id: rule.id.clone(),
            instant,
        };

        Occurrence {
            id: reference.legacy_id(),
            reference,
            patient_id: rule.patient_id.clone(),
            professional_id: rule.professional_id.clone(),
            start: instant,
            date_key: self.date_key(instant),
            status: AppointmentStatus::Scheduled,
            session_type: rule.session_type.clone(),
            program_id: rule.program_id.clone(),
            program_name: rule.program_name.clone(),
            patient_name: names.display_name(&rule.patient_id),
            professional_name: names.display_name(&rule.professional_id),
            session_result: None,
        }
    }

    fn real_occurrence(&self, appointment: &Appointment, names: &NameDirectory) -> Occurrence {
        Occurrence {
            id: appointment.id.clone(),
            reference: OccurrenceRef::Real {
                appointment_id: appointment.id.clone(),
            },
            patient_id: appointment.patient_id.clone(),
            professional_id: appointment.professional_id.clone(),
            start: appointment.date_time_start,
            date_key: self.date_key(appointment.date_time_start),
            status: appointment.status,
            session_type: appointment.appointment_type.clone(),
            program_id: appointment.program_id.clone(),
            program_name: appointment.program_name.clone(),
            patient_name: names.display_name(&appointment.patient_id),
            professional_name: names.display_name(&appointment.professional_id),
            session_result: appointment.session_result.clone(),
        }
    }

    /// Whether `rule` generates an occurrence at `instant` that no exception hides.
    pub fn occurs_at(&self, rule: &ScheduleRule, instant: DateTime<Utc>) -> bool {
        let Ok((start_date, end_date)) = self.rule_window(rule) else {
            return false;
        };
        let date = self.local_date(instant);
        if date < start_date || date > end_date {
            return false;
        }

        let weekday = date.weekday().num_days_from_sunday() as u8;
        let generated = rule
            .weekly_timetable
            .times_for(weekday)
            .iter()
            .filter_map(|raw| parse_time_of_day(raw))
            .filter_map(|time| self.local_instant(date, time))
            .any(|candidate| candidate == instant);

        generated
            && !exception_key::is_excepted(&rule.exceptions.cancelled, instant, self.timezone)
            && !exception_key::is_excepted(&rule.exceptions.completed, instant, self.timezone)
    }

    /// Wall-clock `date time` in the clinic zone. `None` inside a DST gap;
    /// the earlier instant on a DST fold.
    pub fn local_instant(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
        self.timezone
            .from_local_datetime(&date.and_time(time))
            .earliest()
            .map(|instant| instant.with_timezone(&Utc))
    }

    /// `YYYY-MM-DD` of the instant in the clinic zone.
    pub fn date_key(&self, instant: DateTime<Utc>) -> String {
        self.local_date(instant).format("%Y-%m-%d").to_string()
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.timezone).date_naive()
    }

    pub fn in_month(&self, instant: DateTime<Utc>, year: i32, month: u32) -> bool {
        let date = self.local_date(instant);
        date.year() == year && date.month() == month
    }
}

/// Every calendar day of the month, in order.
pub fn month_days(year: i32, month: u32) -> Result<Vec<NaiveDate>, ScheduleError> {
    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or(ScheduleError::InvalidMonth { year, month })?;
    Ok(first.iter_days().take_while(|d| d.month() == month).collect())
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp (read as a clinic-local date).
pub fn parse_rule_date(raw: &str, timezone: Tz) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|instant| instant.with_timezone(&timezone).date_naive())
}

/// "HH:MM", 24-hour.
pub fn parse_time_of_day(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").ok()
}
