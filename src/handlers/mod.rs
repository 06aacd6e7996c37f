pub mod admin;
pub mod auth;
pub mod client;
pub mod public;
pub mod stylist;

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::routing::{delete, get, post};
use axum::Router;
use chrono::NaiveDateTime;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::models::{Role, User};
use crate::services::audit::AuditContext;
use crate::services::auth as auth_service;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(public::health))
        .route("/api/services", get(public::list_services))
        .route("/api/stylists", get(public::list_stylists))
        // auth
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/reset-password", post(auth::reset_password))
        .route(
            "/api/auth/profile",
            get(auth::get_profile).post(auth::update_profile),
        )
        .route("/api/auth/change-password", post(auth::change_password))
        // client
        .route("/api/client/dashboard", get(client::dashboard))
        .route(
            "/api/client/appointments",
            get(client::list_appointments).post(client::book),
        )
        .route(
            "/api/client/appointments/:id/cancel",
            post(client::cancel),
        )
        .route("/api/client/available-times", post(client::available_times))
        // stylist
        .route("/api/stylist/dashboard", get(stylist::dashboard))
        .route("/api/stylist/appointments", get(stylist::list_appointments))
        .route(
            "/api/stylist/appointments/:id/status",
            post(stylist::update_status),
        )
        .route(
            "/api/stylist/blocked-times",
            get(stylist::list_blocked_times).post(stylist::create_blocked_time),
        )
        .route(
            "/api/stylist/blocked-times/:id",
            delete(stylist::delete_blocked_time),
        )
        .route("/api/stylist/clients", get(stylist::list_clients))
        .route(
            "/api/stylist/clients/:id/notes",
            get(stylist::list_notes).post(stylist::add_note),
        )
        .route(
            "/api/stylist/profile",
            get(stylist::get_profile).post(stylist::update_profile),
        )
        // admin
        .route("/api/admin/dashboard", get(admin::dashboard))
        .route("/api/admin/analytics", get(admin::analytics))
        .route(
            "/api/admin/users",
            get(admin::list_users).post(admin::create_user),
        )
        .route("/api/admin/users/:id", post(admin::update_user))
        .route(
            "/api/admin/services",
            get(admin::list_services).post(admin::create_service),
        )
        .route("/api/admin/services/:id", post(admin::update_service))
        .route(
            "/api/admin/business-hours",
            get(admin::get_business_hours).post(admin::update_business_hours),
        )
        .route(
            "/api/admin/holidays",
            get(admin::list_holidays).post(admin::create_holiday),
        )
        .route("/api/admin/appointments", get(admin::list_appointments))
        .route("/api/admin/audit-logs", get(admin::audit_logs))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Wall-clock time for the current request, in salon local time.
pub(crate) fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// First hop of `X-Forwarded-For`, falling back to `X-Real-IP`.
pub(crate) fn client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    forwarded.or_else(real_ip).map(str::to_string)
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// The authenticated user plus the request context handed to services.
pub(crate) struct Caller {
    pub user: User,
    pub now: NaiveDateTime,
    pub audit: AuditContext,
}

pub(crate) fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Caller, AppError> {
    let token = bearer_token(headers).ok_or(AppError::Unauthorized)?;
    let now = now();
    let user = {
        let conn = state.conn()?;
        auth_service::resolve_session(&conn, &state.config.secret_key, token, now)?
    }
    .ok_or(AppError::Unauthorized)?;

    let audit = AuditContext::new(Some(user.id), client_ip(headers), now);
    Ok(Caller { user, now, audit })
}

pub(crate) fn require_role(
    state: &AppState,
    headers: &HeaderMap,
    role: Role,
) -> Result<Caller, AppError> {
    let caller = authenticate(state, headers)?;
    if !caller.user.has_role(role) {
        tracing::warn!(
            user_id = caller.user.id,
            role = caller.user.role.as_str(),
            required = role.as_str(),
            "role check failed"
        );
        return Err(AppError::Forbidden(
            "You do not have permission to access this page.".to_string(),
        ));
    }
    Ok(caller)
}

/// Trims and checks a required text field.
pub(crate) fn required_text(label: &str, value: &str, max: usize) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::invalid(format!("{label} is required.")));
    }
    if value.chars().count() > max {
        return Err(AppError::invalid(format!(
            "{label} must be at most {max} characters."
        )));
    }
    Ok(value.to_string())
}

/// Trims an optional text field; blank becomes `None`.
pub(crate) fn optional_text(
    label: &str,
    value: Option<&str>,
    max: usize,
) -> Result<Option<String>, AppError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) if v.chars().count() > max => Err(AppError::invalid(format!(
            "{label} must be at most {max} characters."
        ))),
        Some(v) => Ok(Some(v.to_string())),
    }
}

pub(crate) fn validate_email(email: &str) -> Result<String, AppError> {
    let email = required_text("Email", email, 120)?.to_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(AppError::invalid("Please enter a valid email address."));
    }
    Ok(email)
}

/// Query strings from forms send empty values for unset filters.
pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
