pub mod appointment;
pub mod audit;
pub mod availability;
pub mod client_note;
pub mod service;
pub mod user;

pub use appointment::{Appointment, AppointmentDetail, AppointmentStatus, NewAppointment};
pub use audit::{AuditFilter, AuditLog};
pub use availability::{BlockedTime, BusinessHours, Holiday, NewBlockedTime};
pub use client_note::ClientNote;
pub use service::{Service, ServiceFields};
pub use user::{NewUser, Role, User};

use chrono::{Datelike, NaiveDate, NaiveDateTime};

/// Storage format for every instant in the database.
pub const DB_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format used for date-times exchanged with API clients.
pub const API_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Inclusive year range accepted from API input.
pub const MIN_INPUT_YEAR: i32 = 1;
pub const MAX_INPUT_YEAR: i32 = 9999;

fn within_input_range(date: NaiveDate) -> bool {
    (MIN_INPUT_YEAR..=MAX_INPUT_YEAR).contains(&date.year())
}

pub fn format_db(dt: &NaiveDateTime) -> String {
    dt.format(DB_DATETIME_FORMAT).to_string()
}

pub fn parse_db(s: &str) -> anyhow::Result<NaiveDateTime> {
    Ok(NaiveDateTime::parse_from_str(s, DB_DATETIME_FORMAT)?)
}

/// Accepts `YYYY-MM-DD HH:MM`, optionally with seconds or a `T` separator.
pub fn parse_datetime_input(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    [
        API_DATETIME_FORMAT,
        "%Y-%m-%dT%H:%M",
        DB_DATETIME_FORMAT,
        "%Y-%m-%dT%H:%M:%S",
    ]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    .filter(|dt| within_input_range(dt.date()))
}

pub fn parse_date_input(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .ok()
        .filter(|d| within_input_range(*d))
}
