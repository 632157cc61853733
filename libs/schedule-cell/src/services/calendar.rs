// libs/schedule-cell/src/services/calendar.rs
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use tracing::debug;

use crate::error::ScheduleError;
use crate::models::{MonthCalendar, Occurrence, ScheduleFilter};
use crate::services::expander::{month_days, OccurrenceExpander};
use crate::services::names::DisplayNameCache;
use crate::services::store::ScheduleStore;

/// Read side shared by the patient calendar, professional calendar and
/// today's agenda.
pub struct CalendarService {
    store: Arc<dyn ScheduleStore>,
    names: Arc<DisplayNameCache>,
    expander: OccurrenceExpander,
}

impl CalendarService {
    pub fn new(store: Arc<dyn ScheduleStore>, names: Arc<DisplayNameCache>, expander: OccurrenceExpander) -> Self {
        Self { store, names, expander }
    }

    pub async fn month_calendar(
        &self,
        filter: &ScheduleFilter,
        year: i32,
        month: u32,
        auth_token: &str,
    ) -> Result<MonthCalendar, ScheduleError> {
        debug!("Building {}-{:02} calendar for {:?}", year, month, filter);
        month_days(year, month)?;

        let (rules, appointments) = tokio::try_join!(
            self.store.rules_for(filter, auth_token),
            self.store.appointments_for(filter, auth_token),
        )?;

        let rules: Vec<_> = rules
            .into_iter()
            .filter(|rule| filter.matches(&rule.patient_id, &rule.professional_id))
            .collect();
        let appointments: Vec<_> = appointments
            .into_iter()
            .filter(|appointment| filter.matches(&appointment.patient_id, &appointment.professional_id))
            .filter(|appointment| self.expander.in_month(appointment.date_time_start, year, month))
            .collect();

        let user_ids = rules
            .iter()
            .flat_map(|rule| [rule.patient_id.as_str(), rule.professional_id.as_str()])
            .chain(
                appointments
                    .iter()
                    .flat_map(|a| [a.patient_id.as_str(), a.professional_id.as_str()]),
            );
        let names = self.names.resolve_all(user_ids, auth_token).await;

        self.expander.expand_month(&rules, &appointments, year, month, &names)
    }

    /// One day's occurrences ordered by start time.
    pub async fn agenda_for_day(
        &self,
        filter: &ScheduleFilter,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Occurrence>, ScheduleError> {
        let mut calendar = self
            .month_calendar(filter, date.year(), date.month(), auth_token)
            .await?;

        let date_key = date.format("%Y-%m-%d").to_string();
        let mut agenda = calendar.occurrences.remove(&date_key).unwrap_or_default();
        agenda.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        Ok(agenda)
    }

    /// Current date in the clinic's timezone.
    pub fn today(&self) -> NaiveDate {
        self.expander.local_date(Utc::now())
    }

    pub fn expander(&self) -> &OccurrenceExpander {
        &self.expander
    }
}
