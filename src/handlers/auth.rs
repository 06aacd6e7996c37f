use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::{
    authenticate, bearer_token, client_ip, now, optional_text, required_text, validate_email,
};
use crate::models::{NewUser, Role, User};
use crate::services::audit::{log_audit, AuditContext};
use crate::services::auth::{self as auth_service, hash_password, validate_new_password, verify_password};
use crate::state::AppState;

// POST /api/auth/register
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub password: String,
    pub confirm_password: String,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let email = validate_email(&req.email)?;
    let first_name = required_text("First name", &req.first_name, 50)?;
    let last_name = required_text("Last name", &req.last_name, 50)?;
    let phone = optional_text("Phone", req.phone.as_deref(), 20)?;
    validate_new_password(&req.password, &req.confirm_password).map_err(AppError::InvalidInput)?;

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
            role: Role::Client,
        },
    )?;
    let user = queries::get_user(&conn, id)?.ok_or_else(|| AppError::not_found("User"))?;

    let ctx = AuditContext::new(Some(id), client_ip(&headers), now());
    log_audit(&conn, &ctx, "register", "user", Some(id), serde_json::json!({ "email": email }));
    tracing::info!(user_id = id, "client registered");

    Ok((StatusCode::CREATED, Json(user)))
}

// POST /api/auth/login
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    token: String,
    user: User,
    dashboard: &'static str,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let email = req.email.trim().to_lowercase();
    let now = now();
    let conn = state.conn()?;

    let user = match queries::get_user_by_email(&conn, &email)? {
        Some(u) if verify_password(&req.password, &u.password_hash) => u,
        found => {
            let ctx = AuditContext::new(found.map(|u| u.id), client_ip(&headers), now);
            log_audit(&conn, &ctx, "login_failed", "user", ctx.user_id, serde_json::json!({ "email": email }));
            tracing::warn!(email = %email, "failed login attempt");
            return Err(AppError::InvalidCredentials);
        }
    };

    let ctx = AuditContext::new(Some(user.id), client_ip(&headers), now);
    if !user.is_active {
        log_audit(&conn, &ctx, "login_refused", "user", Some(user.id), serde_json::json!({ "reason": "inactive" }));
        return Err(AppError::Forbidden(
            "Your account has been deactivated. Please contact the salon.".to_string(),
        ));
    }

    let token = auth_service::issue_session(&conn, &state.config, user.id, now)?;
    log_audit(&conn, &ctx, "login", "user", Some(user.id), serde_json::Value::Null);
    tracing::info!(user_id = user.id, role = user.role.as_str(), "user logged in");

    Ok(Json(LoginResponse {
        token,
        dashboard: user.role.dashboard_path(),
        user,
    }))
}

// POST /api/auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let caller = authenticate(&state, &headers)?;
    let token = bearer_token(&headers).ok_or(AppError::Unauthorized)?;

    let conn = state.conn()?;
    auth_service::revoke_session(&conn, &state.config.secret_key, token)?;
    log_audit(&conn, &caller.audit, "logout", "user", Some(caller.user.id), serde_json::Value::Null);

    Ok(Json(serde_json::json!({ "message": "You have been logged out." })))
}

// POST /api/auth/reset-password
#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !state.config.dev_password_reset {
        return Err(AppError::NotFound("Not found".to_string()));
    }
    validate_new_password(&req.password, &req.confirm_password).map_err(AppError::InvalidInput)?;

    let conn = state.conn()?;
    let user = queries::get_user_by_email(&conn, req.email.trim())?
        .ok_or_else(|| AppError::NotFound("No account found with that email.".to_string()))?;
    queries::set_password_hash(&conn, user.id, &hash_password(&req.password))?;

    let ctx = AuditContext::new(Some(user.id), client_ip(&headers), now());
    log_audit(&conn, &ctx, "password_reset", "user", Some(user.id), serde_json::Value::Null);
    tracing::warn!(user_id = user.id, "password reset through development flow");

    Ok(Json(serde_json::json!({ "message": "Password has been reset. Please log in." })))
}

// GET /api/auth/profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<User>, AppError> {
    let caller = authenticate(&state, &headers)?;
    Ok(Json(caller.user))
}

// POST /api/auth/profile
#[derive(Deserialize)]
pub struct ProfileRequest {
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ProfileRequest>,
) -> Result<Json<User>, AppError> {
    let caller = authenticate(&state, &headers)?;
    let first_name = required_text("First name", &req.first_name, 50)?;
    let last_name = required_text("Last name", &req.last_name, 50)?;
    let phone = optional_text("Phone", req.phone.as_deref(), 20)?;

    let conn = state.conn()?;
    queries::update_user_profile(&conn, caller.user.id, &first_name, &last_name, phone.as_deref())?;
    log_audit(
        &conn,
        &caller.audit,
        "update",
        "user",
        Some(caller.user.id),
        serde_json::json!({ "first_name": first_name, "last_name": last_name, "phone": phone }),
    );

    let user = queries::get_user(&conn, caller.user.id)?.ok_or_else(|| AppError::not_found("User"))?;
    Ok(Json(user))
}

// POST /api/auth/change-password
#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let caller = authenticate(&state, &headers)?;
    if !verify_password(&req.current_password, &caller.user.password_hash) {
        return Err(AppError::invalid("Current password is incorrect."));
    }
    validate_new_password(&req.new_password, &req.confirm_password)
        .map_err(AppError::InvalidInput)?;

    let conn = state.conn()?;
    queries::set_password_hash(&conn, caller.user.id, &hash_password(&req.new_password))?;
    log_audit(&conn, &caller.audit, "password_change", "user", Some(caller.user.id), serde_json::Value::Null);

    Ok(Json(serde_json::json!({ "message": "Your password has been updated." })))
}
