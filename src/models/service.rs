use chrono::NaiveDateTime;
use serde::Serialize;

/// Longest bookable service; an appointment never spans more than a day.
pub const MAX_SERVICE_MINUTES: i64 = 24 * 60;

/// Highest accepted price, 1,000,000.00.
pub const MAX_PRICE_CENTS: i64 = 100_000_000;

#[derive(Debug, Clone, Serialize)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub duration_minutes: i64,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Service {
    pub fn price_display(&self) -> String {
        format_cents(self.price_cents)
    }
}

#[derive(Debug, Clone)]
pub struct ServiceFields {
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub duration_minutes: i64,
    pub is_active: bool,
}

/// Formats an amount of cents as `12.50`.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Converts a decimal price to cents, rounding to the nearest cent.
pub fn price_to_cents(price: f64) -> Option<i64> {
    if !price.is_finite() || price < 0.0 {
        return None;
    }
    let cents = (price * 100.0).round();
    if cents > MAX_PRICE_CENTS as f64 {
        return None;
    }
    Some(cents as i64)
}
