use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::Service;
use crate::state::AppState;

// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// GET /api/services
pub async fn list_services(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Service>>, AppError> {
    let conn = state.conn()?;
    Ok(Json(queries::list_services(&conn, true)?))
}

// GET /api/stylists
#[derive(Serialize)]
pub struct StylistSummary {
    id: i64,
    name: String,
    bio: Option<String>,
    specialties: Option<String>,
    profile_image: Option<String>,
}

pub async fn list_stylists(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<StylistSummary>>, AppError> {
    let stylists = {
        let conn = state.conn()?;
        queries::list_active_stylists(&conn)?
    };

    Ok(Json(
        stylists
            .into_iter()
            .map(|s| StylistSummary {
                id: s.id,
                name: s.full_name(),
                bio: s.bio,
                specialties: s.specialties,
                profile_image: s.profile_image,
            })
            .collect(),
    ))
}
