use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::models::availability::weekday_index;
use crate::models::{BusinessHours, Role, API_DATETIME_FORMAT};

/// Spacing between candidate start times.
pub const SLOT_INTERVAL_MINUTES: i64 = 30;

/// Minimum gap between "now" and the first bookable start time.
pub const BOOKING_LEAD_MINUTES: i64 = 60;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// A busy half-open range `[start, end)` on a stylist's calendar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Interval {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// Touching ranges (one ends exactly when the other starts) do not overlap.
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.start < end && self.end > start
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slot {
    #[serde(skip)]
    pub start: NaiveDateTime,
    /// `YYYY-MM-DD HH:MM`
    pub datetime: String,
    /// 12-hour display form, e.g. `9:00 AM`.
    pub formatted_time: String,
}

impl Slot {
    pub fn at(start: NaiveDateTime) -> Self {
        Self {
            start,
            datetime: start.format(API_DATETIME_FORMAT).to_string(),
            formatted_time: start.format("%-I:%M %p").to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SlotError {
    #[error("Selected service not found")]
    ServiceNotFound,

    #[error("Selected stylist not found")]
    StylistNotFound,

    #[error("We're closed on this day")]
    Closed,

    #[error("Please select a future date")]
    PastDate,

    #[error("Salon closed: {0}")]
    Holiday(String),

    #[error("Invalid date format")]
    InvalidDate,

    #[error("An error occurred. Please try again.")]
    Internal(#[from] anyhow::Error),
}

/// Earliest start time still bookable today: the next grid boundary strictly
/// after `now`, plus the lead time. `None` once that runs past midnight.
pub fn earliest_start_today(now: NaiveDateTime) -> Option<NaiveTime> {
    let minutes = now.hour() * 60 + now.minute();
    let interval = SLOT_INTERVAL_MINUTES as u32;
    let next_boundary = (minutes / interval + 1) * interval;
    let earliest = next_boundary + BOOKING_LEAD_MINUTES as u32;

    if earliest >= MINUTES_PER_DAY {
        return None;
    }
    NaiveTime::from_hms_opt(earliest / 60, earliest % 60, 0)
}

/// Walks the grid from opening time and keeps every start whose
/// `[start, start + duration)` fits before closing and avoids `busy`.
pub fn generate_slots(
    date: NaiveDate,
    hours: &BusinessHours,
    duration_minutes: i64,
    now: NaiveDateTime,
    busy: &[Interval],
) -> Vec<Slot> {
    if hours.is_closed || duration_minutes <= 0 || duration_minutes > MINUTES_PER_DAY as i64 {
        return vec![];
    }

    let mut cursor = hours.opens_at(date);
    let close = hours.closes_at(date);

    if date == now.date() {
        match earliest_start_today(now) {
            Some(earliest) => {
                let earliest = date.and_time(earliest);
                if earliest > cursor {
                    cursor = earliest;
                }
            }
            None => return vec![],
        }
    }

    let duration = Duration::minutes(duration_minutes);
    let step = Duration::minutes(SLOT_INTERVAL_MINUTES);
    let mut slots = vec![];

    while let Some(end) = cursor.checked_add_signed(duration).filter(|end| *end <= close) {
        if !busy.iter().any(|b| b.overlaps(cursor, end)) {
            slots.push(Slot::at(cursor));
        }
        match cursor.checked_add_signed(step) {
            Some(next) => cursor = next,
            None => break,
        }
    }

    slots
}

/// Whether the stylist can take an appointment over `[start, end)`.
/// Missing hours for the weekday count as closed.
pub fn is_slot_available(
    conn: &Connection,
    stylist_id: i64,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> anyhow::Result<bool> {
    if end <= start {
        return Ok(false);
    }

    let date = start.date();
    let hours = match queries::get_business_hours(conn, weekday_index(date))? {
        Some(h) if !h.is_closed => h,
        _ => return Ok(false),
    };
    if start < hours.opens_at(date) || end > hours.closes_at(date) {
        return Ok(false);
    }

    if queries::has_blocked_overlap(conn, stylist_id, &start, &end)? {
        return Ok(false);
    }
    if queries::has_scheduled_overlap(conn, stylist_id, &start, &end)? {
        return Ok(false);
    }

    Ok(true)
}

/// Bookable start times for a stylist and service on `date`, in ascending order.
pub fn list_available_slots(
    conn: &Connection,
    stylist_id: i64,
    service_id: i64,
    date: NaiveDate,
    now: NaiveDateTime,
) -> Result<Vec<Slot>, SlotError> {
    let service = match queries::get_service(conn, service_id)? {
        Some(s) if s.is_active => s,
        _ => return Err(SlotError::ServiceNotFound),
    };

    match queries::get_user(conn, stylist_id)? {
        Some(u) if u.role == Role::Stylist && u.is_active => {}
        _ => return Err(SlotError::StylistNotFound),
    }

    let hours = match queries::get_business_hours(conn, weekday_index(date))? {
        Some(h) if !h.is_closed => h,
        _ => return Err(SlotError::Closed),
    };

    if date < now.date() {
        return Err(SlotError::PastDate);
    }

    let day_start = date.and_time(NaiveTime::MIN);
    let next_day = date
        .succ_opt()
        .ok_or(SlotError::InvalidDate)?
        .and_time(NaiveTime::MIN);
    let day_last_minute = next_day - Duration::minutes(1);

    if let Some(holiday) =
        queries::find_holiday_touching(conn, stylist_id, &day_start, &day_last_minute)?
    {
        let reason = holiday
            .reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| "holiday".to_string());
        return Err(SlotError::Holiday(reason));
    }

    let mut busy: Vec<Interval> =
        queries::get_blocked_times_touching(conn, stylist_id, &day_start, &next_day)?
            .into_iter()
            .map(|b| Interval::new(b.start_time, b.end_time))
            .collect();
    busy.extend(
        queries::get_scheduled_appointments_between(conn, stylist_id, &day_start, &next_day)?
            .into_iter()
            .map(|a| Interval::new(a.start_time, a.end_time)),
    );

    let slots = generate_slots(date, &hours, service.duration_minutes, now, &busy);
    tracing::debug!(
        stylist_id,
        service_id,
        %date,
        count = slots.len(),
        "resolved available slots"
    );
    Ok(slots)
}
