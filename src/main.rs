use std::sync::Arc;

use anyhow::Context;
use rusqlite::Connection;
use tracing_subscriber::EnvFilter;

use salon::config::AppConfig;
use salon::db::{self, queries};
use salon::handlers;
use salon::models::{NewUser, Role};
use salon::services::auth::hash_password;
use salon::state::AppState;

/// Creates the configured administrator account when the database has no admin yet.
fn bootstrap_admin(conn: &Connection, config: &AppConfig) -> anyhow::Result<()> {
    let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) else {
        return Ok(());
    };
    if queries::count_users_by_role(conn, Role::Admin)? > 0 {
        return Ok(());
    }
    let email = email.trim().to_lowercase();
    if queries::email_taken(conn, &email, None)? {
        tracing::warn!(email = %email, "ADMIN_EMAIL belongs to an existing non-admin account");
        return Ok(());
    }

    let id = queries::create_user(
        conn,
        &NewUser {
            email: email.clone(),
            password_hash: hash_password(password),
            first_name: "Salon".to_string(),
            last_name: "Admin".to_string(),
            phone: None,
            role: Role::Admin,
        },
    )
    .context("failed to create bootstrap admin")?;
    tracing::info!(user_id = id, email = %email, "created bootstrap admin account");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    if config.uses_default_secret() {
        tracing::warn!("SECRET_KEY is not set, using the development key");
    }
    if config.dev_password_reset {
        tracing::warn!("development password reset endpoint is enabled");
    }

    let conn = db::init_db(&config.database_url)?;
    bootstrap_admin(&conn, &config)?;

    let purged = queries::delete_expired_sessions(&conn, &chrono::Local::now().naive_local())?;
    if purged > 0 {
        tracing::info!(purged, "removed expired sessions");
    }

    let port = config.port;
    let state = Arc::new(AppState::new(conn, config));
    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
