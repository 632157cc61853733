// libs/schedule-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use serde_json::{json, Value};

use shared_models::auth::AuthToken;
use shared_models::error::AppError;

use crate::models::{
    CancelOccurrenceRequest, CompleteOccurrenceRequest, NewAppointment, NewScheduleRule, ScheduleFilter,
};
use crate::router::ScheduleState;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct AgendaQuery {
    pub date: Option<NaiveDate>,
}

// ==============================================================================
// CALENDAR HANDLERS
// ==============================================================================

pub async fn get_professional_calendar(
    State(state): State<Arc<ScheduleState>>,
    Extension(token): Extension<AuthToken>,
    Path(professional_id): Path<String>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<Value>, AppError> {
    month_calendar(&state, ScheduleFilter::Professional(professional_id), query, &token).await
}

pub async fn get_patient_calendar(
    State(state): State<Arc<ScheduleState>>,
    Extension(token): Extension<AuthToken>,
    Path(patient_id): Path<String>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<Value>, AppError> {
    month_calendar(&state, ScheduleFilter::Patient(patient_id), query, &token).await
}

async fn month_calendar(
    state: &ScheduleState,
    filter: ScheduleFilter,
    query: CalendarQuery,
    token: &AuthToken,
) -> Result<Json<Value>, AppError> {
    let today = state.calendar.today();
    let year = query.year.unwrap_or(today.year());
    let month = query.month.unwrap_or(today.month());

    let mut calendar = state
        .calendar
        .month_calendar(&filter, year, month, token.as_str())
        .await?;
    calendar.sort_by_start();

    Ok(Json(json!({
        "calendar": calendar,
        "total": calendar.total_occurrences(),
    })))
}

// ==============================================================================
// TODAY'S AGENDA HANDLERS
// ==============================================================================

pub async fn get_professional_agenda(
    State(state): State<Arc<ScheduleState>>,
    Extension(token): Extension<AuthToken>,
    Path(professional_id): Path<String>,
    Query(query): Query<AgendaQuery>,
) -> Result<Json<Value>, AppError> {
    agenda(&state, ScheduleFilter::Professional(professional_id), query, &token).await
}

pub async fn get_patient_agenda(
    State(state): State<Arc<ScheduleState>>,
    Extension(token): Extension<AuthToken>,
    Path(patient_id): Path<String>,
    Query(query): Query<AgendaQuery>,
) -> Result<Json<Value>, AppError> {
    agenda(&state, ScheduleFilter::Patient(patient_id), query, &token).await
}

async fn agenda(
    state: &ScheduleState,
    filter: ScheduleFilter,
    query: AgendaQuery,
    token: &AuthToken,
) -> Result<Json<Value>, AppError> {
    let date = query.date.unwrap_or_else(|| state.calendar.today());
    let occurrences = state.calendar.agenda_for_day(&filter, date, token.as_str()).await?;

    Ok(Json(json!({
        "date": date.format("%Y-%m-%d").to_string(),
        "occurrences": occurrences,
        "total": occurrences.len(),
    })))
}

// ==============================================================================
// OCCURRENCE HANDLERS
// ==============================================================================

pub async fn cancel_occurrence(
    State(state): State<Arc<ScheduleState>>,
    Extension(token): Extension<AuthToken>,
    Json(request): Json<CancelOccurrenceRequest>,
) -> Result<Json<Value>, AppError> {
    state
        .occurrences
        .cancel_occurrence(&request.occurrence, token.as_str())
        .await?;

    Ok(Json(json!({
        "success": true,
        "occurrence_id": request.occurrence.reference.legacy_id(),
        "message": "Occurrence cancelled"
    })))
}

pub async fn complete_occurrence(
    State(state): State<Arc<ScheduleState>>,
    Extension(token): Extension<AuthToken>,
    Json(request): Json<CompleteOccurrenceRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment_id = state
        .occurrences
        .complete_occurrence(&request.occurrence, request.session_result, token.as_str())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment_id": appointment_id,
        "message": "Session recorded"
    })))
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

pub async fn book_appointment(
    State(state): State<Arc<ScheduleState>>,
    Extension(token): Extension<AuthToken>,
    Json(request): Json<NewAppointment>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let appointment_id = state.booking.book_appointment(request, token.as_str()).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "appointment_id": appointment_id
        })),
    ))
}

pub async fn create_rule(
    State(state): State<Arc<ScheduleState>>,
    Extension(token): Extension<AuthToken>,
    Json(request): Json<NewScheduleRule>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let rule_id = state.booking.create_rule(request, token.as_str()).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "rule_id": rule_id
        })),
    ))
}
