use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::db::queries::{self, AppointmentFilter, AuditColumn, UserAdminUpdate};
use crate::errors::AppError;
use crate::handlers::{non_empty, optional_text, require_role, required_text, validate_email};
use crate::models::availability::{day_name, parse_time};
use crate::models::service::{format_cents, price_to_cents, MAX_PRICE_CENTS, MAX_SERVICE_MINUTES};
use crate::models::{
    parse_date_input, AppointmentDetail, AppointmentStatus, AuditFilter, AuditLog, BusinessHours,
    Holiday, NewBlockedTime, NewUser, Role, Service, ServiceFields, User,
};
use crate::services::analytics::{self, AnalyticsReport};
use crate::services::audit::log_audit;
use crate::services::auth::{hash_password, MIN_PASSWORD_LEN};
use crate::state::AppState;

pub const AUDIT_PAGE_SIZE: i64 = 50;
const DEFAULT_ANALYTICS_DAYS: i64 = 30;

fn invalid_date() -> AppError {
    AppError::invalid("Invalid date format. Use YYYY-MM-DD.")
}

// GET /api/admin/dashboard
#[derive(Serialize)]
pub struct DashboardResponse {
    total_clients: i64,
    total_stylists: i64,
    total_admins: i64,
    total_appointments: i64,
    upcoming_appointments: i64,
    total_services: i64,
    active_services: i64,
}

pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<DashboardResponse>, AppError> {
    let caller = require_role(&state, &headers, Role::Admin)?;
    let stats = {
        let conn = state.conn()?;
        queries::get_dashboard_stats(&conn, &caller.now)?
    };

    Ok(Json(DashboardResponse {
        total_clients: stats.total_clients,
        total_stylists: stats.total_stylists,
        total_admins: stats.total_admins,
        total_appointments: stats.total_appointments,
        upcoming_appointments: stats.upcoming_appointments,
        total_services: stats.total_services,
        active_services: stats.active_services,
    }))
}

// GET /api/admin/analytics
#[derive(Deserialize)]
pub struct AnalyticsQuery {
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

pub async fn analytics(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<AnalyticsReport>, AppError> {
    let caller = require_role(&state, &headers, Role::Admin)?;
    let today = caller.now.date();

    let date_to = match non_empty(&query.date_to) {
        Some(s) => parse_date_input(s).ok_or_else(invalid_date)?,
        None => today,
    };
    let date_from = match non_empty(&query.date_from) {
        Some(s) => parse_date_input(s).ok_or_else(invalid_date)?,
        None => date_to - Duration::days(DEFAULT_ANALYTICS_DAYS),
    };
    if date_from > date_to {
        return Err(AppError::invalid("Start date must be on or before end date."));
    }

    let conn = state.conn()?;
    Ok(Json(analytics::compute(&conn, date_from, date_to)?))
}

// GET /api/admin/users
#[derive(Deserialize)]
pub struct UsersQuery {
    pub role: Option<String>,
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<UsersQuery>,
) -> Result<Json<Vec<User>>, AppError> {
    require_role(&state, &headers, Role::Admin)?;
    let role = match non_empty(&query.role) {
        Some(r) => Some(Role::parse(r).ok_or_else(|| AppError::invalid("Invalid role."))?),
        None => None,
    };

    let conn = state.conn()?;
    Ok(Json(queries::list_users(&conn, role)?))
}

fn parse_role(role: &str) -> Result<Role, AppError> {
    Role::parse(role.trim()).ok_or_else(|| AppError::invalid("Invalid role."))
}

// POST /api/admin/users
#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: String,
    pub password: String,
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let caller = require_role(&state, &headers, Role::Admin)?;
    let email = validate_email(&req.email)?;
    let first_name = required_text("First name", &req.first_name, 50)?;
    let last_name = required_text("Last name", &req.last_name, 50)?;
    let phone = optional_text("Phone", req.phone.as_deref(), 20)?;
    let role = parse_role(&req.role)?;
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::invalid(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long."
        )));
    }

    let conn = state.conn()?;
    if queries::email_taken(&conn, &email, None)? {
        return Err(AppError::Conflict("Email already registered.".to_string()));
    }
    let id = queries::create_user(
        &conn,
        &NewUser {
            email: email.clone(),
            password_hash: hash_password(&req.password),
            first_name,
            last_name,
            phone,
            role,
        },
    )?;
    log_audit(
        &conn,
        &caller.audit,
        "create",
        "user",
        Some(id),
        serde_json::json!({ "email": email, "role": role.as_str() }),
    );

    let user = queries::get_user(&conn, id)?.ok_or_else(|| AppError::not_found("User"))?;
    Ok((StatusCode::CREATED, Json(user)))
}

// POST /api/admin/users/:id
#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: String,
    pub is_active: bool,
    /// Left blank to keep the current password.
    pub password: Option<String>,
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    let caller = require_role(&state, &headers, Role::Admin)?;
    let email = validate_email(&req.email)?;
    let first_name = required_text("First name", &req.first_name, 50)?;
    let last_name = required_text("Last name", &req.last_name, 50)?;
    let phone = optional_text("Phone", req.phone.as_deref(), 20)?;
    let role = parse_role(&req.role)?;
    let password = req.password.as_deref().filter(|p| !p.is_empty());
    if password.is_some_and(|p| p.len() < MIN_PASSWORD_LEN) {
        return Err(AppError::invalid(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long."
        )));
    }
    if id == caller.user.id && (!req.is_active || role != Role::Admin) {
        return Err(AppError::invalid(
            "You cannot deactivate or demote your own account.",
        ));
    }

    let conn = state.conn()?;
    let before = queries::get_user(&conn, id)?.ok_or_else(|| AppError::not_found("User"))?;
    if queries::email_taken(&conn, &email, Some(id))? {
        return Err(AppError::Conflict("Email already registered.".to_string()));
    }

    queries::update_user_admin(
        &conn,
        id,
        &UserAdminUpdate {
            email: &email,
            first_name: &first_name,
            last_name: &last_name,
            phone: phone.as_deref(),
            role,
            is_active: req.is_active,
        },
    )?;
    if let Some(password) = password {
        queries::set_password_hash(&conn, id, &hash_password(password))?;
    }

    log_audit(
        &conn,
        &caller.audit,
        "update",
        "user",
        Some(id),
        serde_json::json!({
            "email": { "from": before.email, "to": email },
            "role": { "from": before.role.as_str(), "to": role.as_str() },
            "is_active": { "from": before.is_active, "to": req.is_active },
            "password_changed": password.is_some(),
        }),
    );

    let user = queries::get_user(&conn, id)?.ok_or_else(|| AppError::not_found("User"))?;
    Ok(Json(user))
}

// GET /api/admin/services
pub async fn list_services(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Service>>, AppError> {
    require_role(&state, &headers, Role::Admin)?;
    let conn = state.conn()?;
    Ok(Json(queries::list_services(&conn, false)?))
}

// POST /api/admin/services and /api/admin/services/:id
#[derive(Deserialize)]
pub struct ServiceRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub duration_minutes: i64,
    pub is_active: Option<bool>,
}

impl ServiceRequest {
    fn validate(&self) -> Result<ServiceFields, AppError> {
        let name = required_text("Name", &self.name, 100)?;
        let description = optional_text("Description", self.description.as_deref(), 500)?;
        let price_cents = price_to_cents(self.price).ok_or_else(|| {
            AppError::InvalidInput(format!(
                "Price must be a number between 0 and {}.",
                format_cents(MAX_PRICE_CENTS)
            ))
        })?;
        if self.duration_minutes < 5 {
            return Err(AppError::invalid("Duration must be at least 5 minutes."));
        }
        if self.duration_minutes > MAX_SERVICE_MINUTES {
            return Err(AppError::InvalidInput(format!(
                "Duration must be at most {MAX_SERVICE_MINUTES} minutes."
            )));
        }
        Ok(ServiceFields {
            name,
            description,
            price_cents,
            duration_minutes: self.duration_minutes,
            is_active: self.is_active.unwrap_or(true),
        })
    }
}

pub async fn create_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ServiceRequest>,
) -> Result<(StatusCode, Json<Service>), AppError> {
    let caller = require_role(&state, &headers, Role::Admin)?;
    let fields = req.validate()?;

    let conn = state.conn()?;
    let id = queries::create_service(&conn, &fields)?;
    log_audit(
        &conn,
        &caller.audit,
        "create",
        "service",
        Some(id),
        serde_json::json!({
            "name": fields.name,
            "price_cents": fields.price_cents,
            "duration_minutes": fields.duration_minutes,
        }),
    );

    let service = queries::get_service(&conn, id)?.ok_or_else(|| AppError::not_found("Service"))?;
    Ok((StatusCode::CREATED, Json(service)))
}

pub async fn update_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<ServiceRequest>,
) -> Result<Json<Service>, AppError> {
    let caller = require_role(&state, &headers, Role::Admin)?;
    let fields = req.validate()?;

    let conn = state.conn()?;
    let before = queries::get_service(&conn, id)?.ok_or_else(|| AppError::not_found("Service"))?;
    queries::update_service(&conn, id, &fields)?;
    log_audit(
        &conn,
        &caller.audit,
        "update",
        "service",
        Some(id),
        serde_json::json!({
            "name": { "from": before.name, "to": fields.name },
            "price_cents": { "from": before.price_cents, "to": fields.price_cents },
            "duration_minutes": { "from": before.duration_minutes, "to": fields.duration_minutes },
            "is_active": { "from": before.is_active, "to": fields.is_active },
        }),
    );

    let service = queries::get_service(&conn, id)?.ok_or_else(|| AppError::not_found("Service"))?;
    Ok(Json(service))
}

// GET /api/admin/business-hours
pub async fn get_business_hours(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<BusinessHours>>, AppError> {
    require_role(&state, &headers, Role::Admin)?;
    let conn = state.conn()?;
    let created = queries::ensure_default_business_hours(&conn)?;
    if created > 0 {
        tracing::info!(created, "seeded default business hours");
    }
    Ok(Json(queries::list_business_hours(&conn)?))
}

// POST /api/admin/business-hours
#[derive(Deserialize)]
pub struct DayHoursRequest {
    pub day_of_week: u32,
    pub is_closed: bool,
    pub open_time: Option<String>,
    pub close_time: Option<String>,
}

#[derive(Deserialize)]
pub struct BusinessHoursRequest {
    pub days: Vec<DayHoursRequest>,
}

fn resolve_day(day: &DayHoursRequest, current: &BusinessHours) -> Result<BusinessHours, AppError> {
    let parse = |value: &Option<String>, fallback: NaiveTime| match non_empty(value) {
        Some(s) => parse_time(s).map_err(|_| AppError::invalid("Invalid time format. Use HH:MM.")),
        None if day.is_closed => Ok(fallback),
        None => Err(AppError::invalid("Invalid time format. Use HH:MM.")),
    };
    let open_time = parse(&day.open_time, current.open_time)?;
    let close_time = parse(&day.close_time, current.close_time)?;

    if !day.is_closed && close_time <= open_time {
        return Err(AppError::invalid(format!(
            "Closing time must be after opening time for {}.",
            day_name(day.day_of_week)
        )));
    }

    Ok(BusinessHours {
        day_of_week: day.day_of_week,
        open_time,
        close_time,
        is_closed: day.is_closed,
    })
}

pub async fn update_business_hours(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<BusinessHoursRequest>,
) -> Result<Json<Vec<BusinessHours>>, AppError> {
    let caller = require_role(&state, &headers, Role::Admin)?;
    if req.days.iter().any(|d| d.day_of_week > 6) {
        return Err(AppError::invalid("Day of week must be between 0 and 6."));
    }

    let conn = state.conn()?;
    queries::ensure_default_business_hours(&conn)?;
    let current = queries::list_business_hours(&conn)?;

    // validate every day before writing any
    let mut changes = vec![];
    for day in &req.days {
        let before = current
            .iter()
            .find(|h| h.day_of_week == day.day_of_week)
            .cloned()
            .unwrap_or_else(|| BusinessHours::default_for(day.day_of_week));
        let after = resolve_day(day, &before)?;
        if after != before {
            changes.push((before, after));
        }
    }

    for (before, after) in &changes {
        queries::upsert_business_hours(&conn, after)?;
        log_audit(
            &conn,
            &caller.audit,
            "update",
            "business_hours",
            Some(after.day_of_week as i64),
            serde_json::json!({ "day": after.day_name(), "from": before, "to": after }),
        );
    }
    tracing::info!(changed = changes.len(), "business hours updated");

    Ok(Json(queries::list_business_hours(&conn)?))
}

// GET /api/admin/holidays
pub async fn list_holidays(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Holiday>>, AppError> {
    require_role(&state, &headers, Role::Admin)?;
    let conn = state.conn()?;
    Ok(Json(queries::list_holidays(&conn)?))
}

// POST /api/admin/holidays
#[derive(Deserialize)]
pub struct HolidayRequest {
    pub date: String,
    pub reason: Option<String>,
}

pub async fn create_holiday(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<HolidayRequest>,
) -> Result<(StatusCode, Json<Holiday>), AppError> {
    let caller = require_role(&state, &headers, Role::Admin)?;
    let date = parse_date_input(&req.date).ok_or_else(invalid_date)?;
    if date < caller.now.date() {
        return Err(AppError::invalid("Holiday date cannot be in the past."));
    }
    let reason = optional_text("Reason", req.reason.as_deref(), 255)?;

    let start_time = date.and_time(NaiveTime::MIN);
    let end_time = start_time + Duration::minutes(23 * 60 + 59);

    let mut conn = state.conn()?;
    let tx = conn.transaction()?;
    let stylists = queries::list_active_stylists(&tx)?;
    for stylist in &stylists {
        queries::create_blocked_time(
            &tx,
            &NewBlockedTime {
                stylist_id: stylist.id,
                start_time,
                end_time,
                reason: reason.clone(),
                is_holiday: true,
            },
        )?;
    }
    tx.commit()?;

    log_audit(
        &conn,
        &caller.audit,
        "create",
        "holiday",
        None,
        serde_json::json!({ "date": date, "reason": reason, "stylists": stylists.len() }),
    );
    tracing::info!(%date, stylists = stylists.len(), "holiday added");

    Ok((
        StatusCode::CREATED,
        Json(Holiday {
            date,
            reason,
            stylist_count: stylists.len() as i64,
        }),
    ))
}

// GET /api/admin/appointments
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
    require_role(&state, &headers, Role::Admin)?;

    let status = match non_empty(&query.status).unwrap_or("all") {
        "all" => None,
        s => Some(AppointmentStatus::parse(s).ok_or_else(|| AppError::invalid("Invalid status filter."))?),
    };
    let from = match non_empty(&query.date_from) {
        Some(s) => Some(parse_date_input(s).ok_or_else(invalid_date)?.and_time(NaiveTime::MIN)),
        None => None,
    };

    let conn = state.conn()?;
    let appointments = queries::list_appointment_details(
        &conn,
        &AppointmentFilter {
            status,
            from,
            newest_first: true,
            ..Default::default()
        },
    )?;
    Ok(Json(appointments))
}

// GET /api/admin/audit-logs
#[derive(Deserialize)]
pub struct AuditLogsQuery {
    pub action: Option<String>,
    pub entity_type: Option<String>,
    pub user_id: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub page: Option<String>,
}

#[derive(Serialize)]
pub struct AuditLogsResponse {
    logs: Vec<AuditLog>,
    page: i64,
    per_page: i64,
    total: i64,
    total_pages: i64,
    actions: Vec<String>,
    entity_types: Vec<String>,
}

pub async fn audit_logs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AuditLogsQuery>,
) -> Result<Json<AuditLogsResponse>, AppError> {
    require_role(&state, &headers, Role::Admin)?;

    let user_id = match non_empty(&query.user_id) {
        Some(s) => Some(s.parse::<i64>().map_err(|_| AppError::invalid("Invalid user id."))?),
        None => None,
    };
    let from = match non_empty(&query.date_from) {
        Some(s) => Some(parse_date_input(s).ok_or_else(invalid_date)?.and_time(NaiveTime::MIN)),
        None => None,
    };
    // date_to is inclusive of the whole day
    let until = match non_empty(&query.date_to) {
        Some(s) => Some(
            parse_date_input(s).ok_or_else(invalid_date)?.and_time(NaiveTime::MIN) + Duration::days(1),
        ),
        None => None,
    };
    let page = non_empty(&query.page)
        .and_then(|p| p.parse::<i64>().ok())
        .filter(|p| *p >= 1)
        .unwrap_or(1);

    let filter = AuditFilter {
        action: non_empty(&query.action).map(str::to_string),
        entity_type: non_empty(&query.entity_type).map(str::to_string),
        user_id,
        from,
        until,
    };

    let conn = state.conn()?;
    let total = queries::count_audit_logs(&conn, &filter)?;
    let logs = queries::list_audit_logs(&conn, &filter, AUDIT_PAGE_SIZE, (page - 1) * AUDIT_PAGE_SIZE)?;

    Ok(Json(AuditLogsResponse {
        logs,
        page,
        per_page: AUDIT_PAGE_SIZE,
        total,
        total_pages: (total + AUDIT_PAGE_SIZE - 1) / AUDIT_PAGE_SIZE,
        actions: queries::distinct_audit_values(&conn, AuditColumn::Action)?,
        entity_types: queries::distinct_audit_values(&conn, AuditColumn::EntityType)?,
    }))
}
