// libs/schedule-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::{
    CalendarService, DisplayNameCache, NameSource, OccurrenceExpander, OccurrenceService,
    RealtimeScheduleStore, ScheduleBookingService, ScheduleStore,
};

/// Services shared by every request, so the name cache outlives a single call.
pub struct ScheduleState {
    pub calendar: CalendarService,
    pub occurrences: OccurrenceService,
    pub booking: ScheduleBookingService,
}

impl ScheduleState {
    pub fn new(config: Arc<AppConfig>) -> Self {
        let store = Arc::new(RealtimeScheduleStore::new(&config));
        Self::with_backends(&config, store.clone(), store)
    }

    pub fn with_backends(
        config: &AppConfig,
        store: Arc<dyn ScheduleStore>,
        names: Arc<dyn NameSource>,
    ) -> Self {
        let cache = Arc::new(DisplayNameCache::from_config(names, config));
        let expander = OccurrenceExpander::new(config.clinic_timezone);

        Self {
            calendar: CalendarService::new(store.clone(), cache, expander),
            occurrences: OccurrenceService::new(store.clone(), config),
            booking: ScheduleBookingService::new(store, expander),
        }
    }
}

pub fn schedule_routes(config: Arc<AppConfig>) -> Router {
    schedule_routes_with_state(Arc::new(ScheduleState::new(config)))
}

pub fn schedule_routes_with_state(state: Arc<ScheduleState>) -> Router {
    // Every route forwards the caller's token to the database
    let protected_routes = Router::new()
        .route("/calendar/professionals/{professional_id}", get(handlers::get_professional_calendar))
        .route("/calendar/patients/{patient_id}", get(handlers::get_patient_calendar))
        .route("/agenda/professionals/{professional_id}", get(handlers::get_professional_agenda))
        .route("/agenda/patients/{patient_id}", get(handlers::get_patient_agenda))
        .route("/occurrences/cancel", post(handlers::cancel_occurrence))
        .route("/occurrences/complete", post(handlers::complete_occurrence))
        .route("/appointments", post(handlers::book_appointment))
        .route("/rules", post(handlers::create_rule))
        .layer(middleware::from_fn(auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
