use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries::{self, AppointmentFilter};
use crate::errors::AppError;
use crate::handlers::require_role;
use crate::models::{
    parse_date_input, parse_datetime_input, Appointment, AppointmentDetail, AppointmentStatus,
    Role, User,
};
use crate::services::audit::log_audit;
use crate::services::availability::{self, Slot, SlotError};
use crate::services::booking::{self, BookingRequest};
use crate::state::AppState;

// GET /api/client/dashboard
#[derive(Serialize)]
pub struct DashboardResponse {
    user: User,
    upcoming: Vec<AppointmentDetail>,
    past: Vec<AppointmentDetail>,
}

pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<DashboardResponse>, AppError> {
    let caller = require_role(&state, &headers, Role::Client)?;
    let conn = state.conn()?;

    let upcoming = queries::list_appointment_details(
        &conn,
        &AppointmentFilter {
            client_id: Some(caller.user.id),
            status: Some(AppointmentStatus::Scheduled),
            from: Some(caller.now),
            ..Default::default()
        },
    )?;
    let past = queries::list_appointment_details(
        &conn,
        &AppointmentFilter {
            client_id: Some(caller.user.id),
            until: Some(caller.now),
            newest_first: true,
            limit: Some(5),
            ..Default::default()
        },
    )?;

    Ok(Json(DashboardResponse {
        user: caller.user,
        upcoming,
        past,
    }))
}

// GET /api/client/appointments
pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<AppointmentDetail>>, AppError> {
    let caller = require_role(&state, &headers, Role::Client)?;
    let conn = state.conn()?;

    let appointments = queries::list_appointment_details(
        &conn,
        &AppointmentFilter {
            client_id: Some(caller.user.id),
            newest_first: true,
            ..Default::default()
        },
    )?;
    Ok(Json(appointments))
}

// POST /api/client/appointments
#[derive(Deserialize)]
pub struct BookRequest {
    pub stylist_id: i64,
    pub service_id: i64,
    pub start_time: String,
    pub notes: Option<String>,
}

pub async fn book(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<BookRequest>,
) -> Result<(StatusCode, Json<Appointment>), AppError> {
    let caller = require_role(&state, &headers, Role::Client)?;
    let start_time = parse_datetime_input(&req.start_time)
        .ok_or_else(|| AppError::invalid("Invalid date/time format. Use YYYY-MM-DD HH:MM."))?;

    let mut conn = state.conn()?;
    let appointment = booking::book_appointment(
        &mut conn,
        &BookingRequest {
            client_id: caller.user.id,
            stylist_id: req.stylist_id,
            service_id: req.service_id,
            start_time,
            notes: req.notes,
        },
        caller.now,
    )?;

    log_audit(
        &conn,
        &caller.audit,
        "create",
        "appointment",
        Some(appointment.id),
        serde_json::json!({
            "stylist_id": appointment.stylist_id,
            "service_id": appointment.service_id,
            "start_time": appointment.start_time,
        }),
    );

    Ok((StatusCode::CREATED, Json(appointment)))
}

// POST /api/client/appointments/:id/cancel
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Appointment>, AppError> {
    let caller = require_role(&state, &headers, Role::Client)?;
    let conn = state.conn()?;

    let appointment = booking::cancel_appointment(&conn, caller.user.id, id, caller.now)?;
    log_audit(
        &conn,
        &caller.audit,
        "cancel",
        "appointment",
        Some(id),
        serde_json::json!({ "start_time": appointment.start_time }),
    );
    tracing::info!(appointment_id = id, client_id = caller.user.id, "appointment cancelled");

    Ok(Json(appointment))
}

// POST /api/client/available-times
#[derive(Deserialize)]
pub struct AvailableTimesRequest {
    pub stylist_id: Option<serde_json::Value>,
    pub service_id: Option<serde_json::Value>,
    pub appointment_date: Option<String>,
}

#[derive(Serialize)]
pub struct AvailableTimesResponse {
    available_times: Vec<Slot>,
    error_message: Option<String>,
}

impl AvailableTimesResponse {
    fn error(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            available_times: vec![],
            error_message: Some(message.into()),
        })
    }
}

enum IdParam {
    Missing,
    Invalid,
    Valid(i64),
}

/// Ids arrive either as JSON numbers or as numeric strings from form fields.
fn id_param(value: &Option<serde_json::Value>) -> IdParam {
    match value {
        None | Some(serde_json::Value::Null) => IdParam::Missing,
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => IdParam::Missing,
        Some(serde_json::Value::String(s)) => match s.trim().parse() {
            Ok(id) => IdParam::Valid(id),
            Err(_) => IdParam::Invalid,
        },
        Some(serde_json::Value::Number(n)) => n.as_i64().map_or(IdParam::Invalid, IdParam::Valid),
        Some(_) => IdParam::Invalid,
    }
}

pub async fn available_times(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<AvailableTimesRequest>,
) -> Result<Json<AvailableTimesResponse>, AppError> {
    let caller = require_role(&state, &headers, Role::Client)?;

    let stylist = id_param(&req.stylist_id);
    let service = id_param(&req.service_id);
    let date = req.appointment_date.as_deref().map(str::trim).unwrap_or("");

    if matches!(stylist, IdParam::Missing) || matches!(service, IdParam::Missing) || date.is_empty() {
        return Err(AppError::invalid("Missing required parameters"));
    }
    let (IdParam::Valid(stylist_id), IdParam::Valid(service_id)) = (stylist, service) else {
        return Ok(AvailableTimesResponse::error("Invalid input"));
    };
    let Some(date) = parse_date_input(date) else {
        return Ok(AvailableTimesResponse::error("Invalid date format"));
    };

    let conn = state.conn()?;
    match availability::list_available_slots(&conn, stylist_id, service_id, date, caller.now) {
        Ok(slots) => Ok(Json(AvailableTimesResponse {
            available_times: slots,
            error_message: None,
        })),
        Err(SlotError::Internal(e)) => {
            tracing::error!(error = %e, stylist_id, service_id, %date, "slot listing failed");
            Ok(AvailableTimesResponse::error(
                SlotError::Internal(e).to_string(),
            ))
        }
        Err(e) => Ok(AvailableTimesResponse::error(e.to_string())),
    }
}
