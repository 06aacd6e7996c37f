use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries::{self, AnalyticsRow};
use crate::models::availability::{weekday_index, DAY_NAMES};
use crate::models::service::format_cents;
use crate::models::AppointmentStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusCount {
    pub count: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedCount {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub total_appointments: i64,
    /// Empty when there are no appointments in range.
    pub status_counts: BTreeMap<String, StatusCount>,
    pub revenue_cents: i64,
    pub revenue: String,
    /// Percentage of completed among scheduled + completed.
    pub completion_rate: f64,
    pub new_clients: i64,
    pub services: Vec<NamedCount>,
    pub stylists: Vec<NamedCount>,
    /// Monday first, every weekday present.
    pub weekdays: Vec<NamedCount>,
}

fn percent(part: i64, whole: i64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 * 1000.0 / whole as f64).round() / 10.0
}

fn ranked(counts: BTreeMap<String, i64>) -> Vec<NamedCount> {
    let mut out: Vec<NamedCount> = counts
        .into_iter()
        .map(|(name, count)| NamedCount { name, count })
        .collect();
    // stable sort keeps name order among ties
    out.sort_by(|a, b| b.count.cmp(&a.count));
    out
}

pub fn summarize(
    date_from: NaiveDate,
    date_to: NaiveDate,
    rows: &[AnalyticsRow],
    new_clients: i64,
) -> AnalyticsReport {
    let total = rows.len() as i64;

    let mut by_status: BTreeMap<AppointmentStatus, i64> = BTreeMap::new();
    let mut by_service: BTreeMap<String, i64> = BTreeMap::new();
    let mut by_stylist: BTreeMap<String, i64> = BTreeMap::new();
    let mut by_weekday = [0i64; 7];
    let mut revenue_cents = 0;

    for row in rows {
        *by_status.entry(row.status).or_default() += 1;
        *by_service.entry(row.service_name.clone()).or_default() += 1;
        *by_stylist.entry(row.stylist_name.clone()).or_default() += 1;
        by_weekday[weekday_index(row.start_time.date()) as usize] += 1;
        if row.status == AppointmentStatus::Completed {
            revenue_cents += row.price_cents;
        }
    }

    let status_counts = if total > 0 {
        by_status
            .iter()
            .map(|(status, count)| {
                (
                    status.as_str().to_string(),
                    StatusCount {
                        count: *count,
                        percentage: percent(*count, total),
                    },
                )
            })
            .collect()
    } else {
        BTreeMap::new()
    };

    let completed = by_status.get(&AppointmentStatus::Completed).copied().unwrap_or(0);
    let scheduled = by_status.get(&AppointmentStatus::Scheduled).copied().unwrap_or(0);

    AnalyticsReport {
        date_from,
        date_to,
        total_appointments: total,
        status_counts,
        revenue_cents,
        revenue: format_cents(revenue_cents),
        completion_rate: percent(completed, scheduled + completed),
        new_clients,
        services: ranked(by_service),
        stylists: ranked(by_stylist),
        weekdays: DAY_NAMES
            .iter()
            .zip(by_weekday)
            .map(|(name, count)| NamedCount {
                name: name.to_string(),
                count,
            })
            .collect(),
    }
}

/// Report over appointments starting on any day from `date_from` through `date_to`.
pub fn compute(
    conn: &Connection,
    date_from: NaiveDate,
    date_to: NaiveDate,
) -> anyhow::Result<AnalyticsReport> {
    let from = date_from.and_time(NaiveTime::MIN);
    let until = date_to
        .and_hms_opt(23, 59, 59)
        .ok_or_else(|| anyhow::anyhow!("invalid end date: {date_to}"))?;

    let rows = queries::get_analytics_rows(conn, &from, &until)?;
    let new_clients = queries::count_new_clients(conn, &from, &until)?;
    Ok(summarize(date_from, date_to, &rows, new_clients))
}
