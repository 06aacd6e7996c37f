use std::env;

pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

/// Sessions last at most a year.
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    /// HMAC key for session tokens.
    pub secret_key: String,
    pub session_ttl_hours: i64,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    /// Enables the unauthenticated password reset endpoint. Development only.
    pub dev_password_reset: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "salon.db".to_string()),
            secret_key: env::var("SECRET_KEY").unwrap_or_else(|_| "dev-key".to_string()),
            session_ttl_hours: parse_session_ttl(env::var("SESSION_TTL_HOURS").ok().as_deref()),
            admin_email: env::var("ADMIN_EMAIL").ok().filter(|v| !v.is_empty()),
            admin_password: env::var("ADMIN_PASSWORD").ok().filter(|v| !v.is_empty()),
            dev_password_reset: env::var("DEV_PASSWORD_RESET")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }

    pub fn uses_default_secret(&self) -> bool {
        self.secret_key == "dev-key"
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: ":memory:".to_string(),
            secret_key: "dev-key".to_string(),
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            admin_email: None,
            admin_password: None,
            dev_password_reset: false,
        }
    }
}

/// Unset or unparsable values fall back to the default; the rest is clamped
/// to `1..=MAX_SESSION_TTL_HOURS`.
fn parse_session_ttl(raw: Option<&str>) -> i64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .map(|h| h.clamp(1, MAX_SESSION_TTL_HOURS))
        .unwrap_or(DEFAULT_SESSION_TTL_HOURS)
}
