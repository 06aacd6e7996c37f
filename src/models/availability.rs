use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Serialize, Serializer};

pub const DAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Opening hours for one weekday (0 = Monday .. 6 = Sunday).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusinessHours {
    pub day_of_week: u32,
    #[serde(serialize_with = "serialize_hhmm")]
    pub open_time: NaiveTime,
    #[serde(serialize_with = "serialize_hhmm")]
    pub close_time: NaiveTime,
    pub is_closed: bool,
}

impl BusinessHours {
    /// 09:00-17:00, closed at the weekend.
    pub fn default_for(day_of_week: u32) -> Self {
        Self {
            day_of_week,
            open_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            close_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
            is_closed: day_of_week >= 5,
        }
    }

    pub fn day_name(&self) -> &'static str {
        day_name(self.day_of_week)
    }

    pub fn opens_at(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.open_time)
    }

    pub fn closes_at(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.close_time)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockedTime {
    pub id: i64,
    pub stylist_id: i64,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub reason: Option<String>,
    pub is_holiday: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewBlockedTime {
    pub stylist_id: i64,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub reason: Option<String>,
    pub is_holiday: bool,
}

/// One salon-wide holiday, as listed to administrators.
#[derive(Debug, Clone, Serialize)]
pub struct Holiday {
    pub date: NaiveDate,
    pub reason: Option<String>,
    pub stylist_count: i64,
}

pub fn weekday_index(date: NaiveDate) -> u32 {
    date.weekday().num_days_from_monday()
}

pub fn day_name(day_of_week: u32) -> &'static str {
    DAY_NAMES
        .get(day_of_week as usize)
        .copied()
        .unwrap_or("Unknown")
}

/// Parses a strict `HH:MM` wall-clock time.
pub fn parse_time(s: &str) -> anyhow::Result<NaiveTime> {
    let parts: Vec<&str> = s.trim().split(':').collect();
    if parts.len() != 2 {
        return Err(anyhow::anyhow!("invalid time format: {s}"));
    }
    let hour: u32 = parts[0]
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid hour in: {s}"))?;
    let minute: u32 = parts[1]
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid minute in: {s}"))?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| anyhow::anyhow!("time out of range: {s}"))
}

fn serialize_hhmm<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&time.format("%H:%M").to_string())
}
