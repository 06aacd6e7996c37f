use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::db::queries::{self, AppointmentFilter};
use crate::errors::AppError;
use crate::handlers::{non_empty, optional_text, require_role, required_text};
use crate::models::{
    parse_date_input, parse_datetime_input, Appointment, AppointmentDetail, AppointmentStatus,
    BlockedTime, ClientNote, NewBlockedTime, Role, User,
};
use crate::services::audit::log_audit;
use crate::services::booking;
use crate::state::AppState;

const MAX_REASON_LEN: usize = 255;
const MAX_NOTE_LEN: usize = 1000;

// GET /api/stylist/dashboard
#[derive(Serialize)]
pub struct DashboardResponse {
    today: Vec<AppointmentDetail>,
    upcoming: Vec<AppointmentDetail>,
}

pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<DashboardResponse>, AppError> {
    let caller = require_role(&state, &headers, Role::Stylist)?;
    let today_start = caller.now.date().and_time(NaiveTime::MIN);
    let tomorrow_start = today_start + Duration::days(1);
    let conn = state.conn()?;

    let today = queries::list_appointment_details(
        &conn,
        &AppointmentFilter {
            stylist_id: Some(caller.user.id),
            status: Some(AppointmentStatus::Scheduled),
            from: Some(today_start),
            until: Some(tomorrow_start),
            ..Default::default()
        },
    )?;
    let upcoming = queries::list_appointment_details(
        &conn,
        &AppointmentFilter {
            stylist_id: Some(caller.user.id),
            status: Some(AppointmentStatus::Scheduled),
            from: Some(tomorrow_start),
            limit: Some(10),
            ..Default::default()
        },
    )?;

    Ok(Json(DashboardResponse { today, upcoming }))
}

// GET /api/stylist/appointments
#[derive(Deserialize)]
pub struct AppointmentsQuery {
    pub status: Option<String>,
    pub date_from: Option<String>,
}

pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AppointmentsQuery>,
) -> Result<Json<Vec<AppointmentDetail>>, AppError> {
    let caller = require_role(&state, &headers, Role::Stylist)?;

    let status = match non_empty(&query.status).unwrap_or("scheduled") {
        "all" => None,
        s => Some(AppointmentStatus::parse(s).ok_or_else(|| AppError::invalid("Invalid status filter."))?),
    };
    let date_from = match non_empty(&query.date_from) {
        Some(s) => parse_date_input(s)
            .ok_or_else(|| AppError::invalid("Invalid date format. Use YYYY-MM-DD."))?,
        None => caller.now.date(),
    };

    let conn = state.conn()?;
    let appointments = queries::list_appointment_details(
        &conn,
        &AppointmentFilter {
            stylist_id: Some(caller.user.id),
            status,
            from: Some(date_from.and_time(NaiveTime::MIN)),
            ..Default::default()
        },
    )?;
    Ok(Json(appointments))
}

// POST /api/stylist/appointments/:id/status
#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<Appointment>, AppError> {
    let caller = require_role(&state, &headers, Role::Stylist)?;
    let status = AppointmentStatus::parse(req.status.trim())
        .ok_or_else(|| AppError::invalid("Invalid status."))?;

    let mut conn = state.conn()?;
    let (appointment, previous) =
        booking::set_appointment_status(&mut conn, caller.user.id, id, status)?;
    log_audit(
        &conn,
        &caller.audit,
        "update",
        "appointment",
        Some(id),
        serde_json::json!({ "status": { "from": previous.as_str(), "to": status.as_str() } }),
    );

    Ok(Json(appointment))
}

// GET /api/stylist/blocked-times
pub async fn list_blocked_times(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<BlockedTime>>, AppError> {
    let caller = require_role(&state, &headers, Role::Stylist)?;
    let conn = state.conn()?;
    Ok(Json(queries::list_upcoming_blocked_times(
        &conn,
        caller.user.id,
        &caller.now,
    )?))
}

// POST /api/stylist/blocked-times
#[derive(Deserialize)]
pub struct BlockedTimeRequest {
    pub start_time: String,
    pub end_time: String,
    pub reason: Option<String>,
}

pub async fn create_blocked_time(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<BlockedTimeRequest>,
) -> Result<(StatusCode, Json<BlockedTime>), AppError> {
    let caller = require_role(&state, &headers, Role::Stylist)?;

    let invalid_format = || AppError::invalid("Invalid date/time format. Use YYYY-MM-DD HH:MM.");
    let start_time = parse_datetime_input(&req.start_time).ok_or_else(invalid_format)?;
    let end_time = parse_datetime_input(&req.end_time).ok_or_else(invalid_format)?;
    if start_time <= caller.now {
        return Err(AppError::invalid("Start time must be in the future."));
    }
    if end_time <= start_time {
        return Err(AppError::invalid("End time must be after start time."));
    }
    let reason = optional_text("Reason", req.reason.as_deref(), MAX_REASON_LEN)?;

    let conn = state.conn()?;
    let id = queries::create_blocked_time(
        &conn,
        &NewBlockedTime {
            stylist_id: caller.user.id,
            start_time,
            end_time,
            reason: reason.clone(),
            is_holiday: false,
        },
    )?;
    log_audit(
        &conn,
        &caller.audit,
        "create",
        "blocked_time",
        Some(id),
        serde_json::json!({ "start_time": start_time, "end_time": end_time, "reason": reason }),
    );

    let blocked = queries::get_blocked_time(&conn, id)?
        .ok_or_else(|| AppError::not_found("Blocked time"))?;
    Ok((StatusCode::CREATED, Json(blocked)))
}

// DELETE /api/stylist/blocked-times/:id
pub async fn delete_blocked_time(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let caller = require_role(&state, &headers, Role::Stylist)?;
    let conn = state.conn()?;

    let blocked = queries::get_blocked_time(&conn, id)?
        .ok_or_else(|| AppError::not_found("Blocked time"))?;
    if blocked.stylist_id != caller.user.id {
        return Err(AppError::Forbidden(
            "You can only remove your own blocked times.".to_string(),
        ));
    }

    queries::delete_blocked_time(&conn, id)?;
    log_audit(
        &conn,
        &caller.audit,
        "delete",
        "blocked_time",
        Some(id),
        serde_json::json!({ "start_time": blocked.start_time, "end_time": blocked.end_time }),
    );

    Ok(Json(serde_json::json!({ "deleted": true })))
}

// GET /api/stylist/clients
pub async fn list_clients(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<User>>, AppError> {
    let caller = require_role(&state, &headers, Role::Stylist)?;
    let conn = state.conn()?;
    Ok(Json(queries::list_clients_of_stylist(&conn, caller.user.id)?))
}

fn load_client(conn: &rusqlite::Connection, client_id: i64) -> Result<User, AppError> {
    match queries::get_user(conn, client_id)? {
        Some(u) if u.role == Role::Client => Ok(u),
        _ => Err(AppError::not_found("Client")),
    }
}

// GET /api/stylist/clients/:id/notes
#[derive(Serialize)]
pub struct NotesResponse {
    client: User,
    notes: Vec<ClientNote>,
}

pub async fn list_notes(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(client_id): Path<i64>,
) -> Result<Json<NotesResponse>, AppError> {
    let caller = require_role(&state, &headers, Role::Stylist)?;
    let conn = state.conn()?;

    let client = load_client(&conn, client_id)?;
    let notes = queries::list_client_notes(&conn, client_id, caller.user.id)?;
    Ok(Json(NotesResponse { client, notes }))
}

// POST /api/stylist/clients/:id/notes
#[derive(Deserialize)]
pub struct NoteRequest {
    pub note: String,
}

pub async fn add_note(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(client_id): Path<i64>,
    Json(req): Json<NoteRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let caller = require_role(&state, &headers, Role::Stylist)?;
    let note = required_text("Note", &req.note, MAX_NOTE_LEN)?;

    let conn = state.conn()?;
    load_client(&conn, client_id)?;
    let id = queries::create_client_note(&conn, client_id, caller.user.id, &note)?;
    log_audit(
        &conn,
        &caller.audit,
        "create",
        "client_note",
        Some(id),
        serde_json::json!({ "client_id": client_id }),
    );

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id, "note": note }))))
}

// GET /api/stylist/profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<User>, AppError> {
    let caller = require_role(&state, &headers, Role::Stylist)?;
    Ok(Json(caller.user))
}

// POST /api/stylist/profile
#[derive(Deserialize)]
pub struct StylistProfileRequest {
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub specialties: Option<String>,
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<StylistProfileRequest>,
) -> Result<Json<User>, AppError> {
    let caller = require_role(&state, &headers, Role::Stylist)?;
    let first_name = required_text("First name", &req.first_name, 50)?;
    let last_name = required_text("Last name", &req.last_name, 50)?;
    let phone = optional_text("Phone", req.phone.as_deref(), 20)?;
    let bio = optional_text("Bio", req.bio.as_deref(), 500)?;
    let specialties = optional_text("Specialties", req.specialties.as_deref(), 255)?;

    let conn = state.conn()?;
    queries::update_stylist_profile(
        &conn,
        caller.user.id,
        &first_name,
        &last_name,
        phone.as_deref(),
        bio.as_deref(),
        specialties.as_deref(),
    )?;
    log_audit(
        &conn,
        &caller.audit,
        "update",
        "user",
        Some(caller.user.id),
        serde_json::json!({ "profile": "stylist" }),
    );

    let user = queries::get_user(&conn, caller.user.id)?.ok_or_else(|| AppError::not_found("User"))?;
    Ok(Json(user))
}
