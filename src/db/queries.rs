use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    format_db, parse_db, Appointment, AppointmentDetail, AppointmentStatus, AuditFilter, AuditLog,
    BlockedTime, BusinessHours, ClientNote, Holiday, NewAppointment, NewBlockedTime, NewUser, Role,
    Service, ServiceFields, User,
};
use crate::models::availability::parse_time;

// ── Users ──

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, phone, role, is_active, bio, profile_image, specialties, created_at, updated_at";

fn parse_user_row(row: &rusqlite::Row) -> anyhow::Result<User> {
    let role_str: String = row.get(6)?;
    let created_at_str: String = row.get(11)?;
    let updated_at_str: String = row.get(12)?;

    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        phone: row.get(5)?,
        role: Role::parse(&role_str).ok_or_else(|| anyhow::anyhow!("unknown role: {role_str}"))?,
        is_active: row.get::<_, i32>(7)? != 0,
        bio: row.get(8)?,
        profile_image: row.get(9)?,
        specialties: row.get(10)?,
        created_at: parse_db(&created_at_str)?,
        updated_at: parse_db(&updated_at_str)?,
    })
}

pub fn create_user(conn: &Connection, user: &NewUser) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO users (email, password_hash, first_name, last_name, phone, role)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user.email,
            user.password_hash,
            user.first_name,
            user.last_name,
            user.phone,
            user.role.as_str(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_user(conn: &Connection, id: i64) -> anyhow::Result<Option<User>> {
    let result = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            |row| Ok(parse_user_row(row)),
        )
        .optional()?;
    result.transpose()
}

pub fn get_user_by_email(conn: &Connection, email: &str) -> anyhow::Result<Option<User>> {
    let result = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1 COLLATE NOCASE"),
            params![email],
            |row| Ok(parse_user_row(row)),
        )
        .optional()?;
    result.transpose()
}

/// True when another account already uses `email`.
pub fn email_taken(conn: &Connection, email: &str, except_id: Option<i64>) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE email = ?1 COLLATE NOCASE AND id != ?2",
        params![email, except_id.unwrap_or(-1)],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn list_users(conn: &Connection, role: Option<Role>) -> anyhow::Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE (?1 IS NULL OR role = ?1) ORDER BY last_name, first_name, id"
    ))?;
    let rows = stmt.query_map(params![role.map(|r| r.as_str())], |row| {
        Ok(parse_user_row(row))
    })?;

    let mut users = vec![];
    for row in rows {
        users.push(row??);
    }
    Ok(users)
}

pub fn list_active_stylists(conn: &Connection) -> anyhow::Result<Vec<User>> {
    Ok(list_users(conn, Some(Role::Stylist))?
        .into_iter()
        .filter(|u| u.is_active)
        .collect())
}

pub fn count_users_by_role(conn: &Connection, role: Role) -> anyhow::Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE role = ?1",
        params![role.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn update_user_profile(
    conn: &Connection,
    id: i64,
    first_name: &str,
    last_name: &str,
    phone: Option<&str>,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE users SET first_name = ?1, last_name = ?2, phone = ?3, updated_at = datetime('now')
         WHERE id = ?4",
        params![first_name, last_name, phone, id],
    )?;
    Ok(count > 0)
}

pub fn update_stylist_profile(
    conn: &Connection,
    id: i64,
    first_name: &str,
    last_name: &str,
    phone: Option<&str>,
    bio: Option<&str>,
    specialties: Option<&str>,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE users SET first_name = ?1, last_name = ?2, phone = ?3, bio = ?4, specialties = ?5,
           updated_at = datetime('now')
         WHERE id = ?6",
        params![first_name, last_name, phone, bio, specialties, id],
    )?;
    Ok(count > 0)
}

pub struct UserAdminUpdate<'a> {
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub phone: Option<&'a str>,
    pub role: Role,
    pub is_active: bool,
}

pub fn update_user_admin(conn: &Connection, id: i64, update: &UserAdminUpdate) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE users SET email = ?1, first_name = ?2, last_name = ?3, phone = ?4, role = ?5,
           is_active = ?6, updated_at = datetime('now')
         WHERE id = ?7",
        params![
            update.email,
            update.first_name,
            update.last_name,
            update.phone,
            update.role.as_str(),
            update.is_active as i32,
            id,
        ],
    )?;
    Ok(count > 0)
}

pub fn set_password_hash(conn: &Connection, id: i64, password_hash: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE users SET password_hash = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![password_hash, id],
    )?;
    Ok(count > 0)
}

/// Distinct clients that have ever booked with the stylist.
pub fn list_clients_of_stylist(conn: &Connection, stylist_id: i64) -> anyhow::Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users
         WHERE id IN (SELECT DISTINCT client_id FROM appointments WHERE stylist_id = ?1)
         ORDER BY last_name, first_name, id"
    ))?;
    let rows = stmt.query_map(params![stylist_id], |row| Ok(parse_user_row(row)))?;

    let mut users = vec![];
    for row in rows {
        users.push(row??);
    }
    Ok(users)
}

// ── Sessions ──

pub fn create_session(
    conn: &Connection,
    id: &str,
    user_id: i64,
    expires_at: &NaiveDateTime,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO sessions (id, user_id, expires_at) VALUES (?1, ?2, ?3)",
        params![id, user_id, format_db(expires_at)],
    )?;
    Ok(())
}

/// The user owning an unexpired session.
pub fn get_session_user(
    conn: &Connection,
    session_id: &str,
    now: &NaiveDateTime,
) -> anyhow::Result<Option<User>> {
    let columns = USER_COLUMNS
        .split(", ")
        .map(|c| format!("u.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let result = conn
        .query_row(
            &format!(
                "SELECT {columns} FROM sessions s JOIN users u ON u.id = s.user_id
                 WHERE s.id = ?1 AND s.expires_at > ?2"
            ),
            params![session_id, format_db(now)],
            |row| Ok(parse_user_row(row)),
        )
        .optional()?;
    result.transpose()
}

pub fn delete_session(conn: &Connection, session_id: &str) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
    Ok(count > 0)
}

pub fn delete_expired_sessions(conn: &Connection, now: &NaiveDateTime) -> anyhow::Result<usize> {
    let count = conn.execute(
        "DELETE FROM sessions WHERE expires_at <= ?1",
        params![format_db(now)],
    )?;
    Ok(count)
}

// ── Services ──

const SERVICE_COLUMNS: &str =
    "id, name, description, price_cents, duration_minutes, is_active, created_at, updated_at";

fn parse_service_row(row: &rusqlite::Row) -> anyhow::Result<Service> {
    let created_at_str: String = row.get(6)?;
    let updated_at_str: String = row.get(7)?;

    Ok(Service {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        price_cents: row.get(3)?,
        duration_minutes: row.get(4)?,
        is_active: row.get::<_, i32>(5)? != 0,
        created_at: parse_db(&created_at_str)?,
        updated_at: parse_db(&updated_at_str)?,
    })
}

pub fn create_service(conn: &Connection, fields: &ServiceFields) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO services (name, description, price_cents, duration_minutes, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            fields.name,
            fields.description,
            fields.price_cents,
            fields.duration_minutes,
            fields.is_active as i32,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_service(conn: &Connection, id: i64, fields: &ServiceFields) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE services SET name = ?1, description = ?2, price_cents = ?3, duration_minutes = ?4,
           is_active = ?5, updated_at = datetime('now')
         WHERE id = ?6",
        params![
            fields.name,
            fields.description,
            fields.price_cents,
            fields.duration_minutes,
            fields.is_active as i32,
            id,
        ],
    )?;
    Ok(count > 0)
}

pub fn get_service(conn: &Connection, id: i64) -> anyhow::Result<Option<Service>> {
    let result = conn
        .query_row(
            &format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id = ?1"),
            params![id],
            |row| Ok(parse_service_row(row)),
        )
        .optional()?;
    result.transpose()
}

pub fn list_services(conn: &Connection, active_only: bool) -> anyhow::Result<Vec<Service>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SERVICE_COLUMNS} FROM services WHERE (?1 = 0 OR is_active = 1) ORDER BY name, id"
    ))?;
    let rows = stmt.query_map(params![active_only as i32], |row| {
        Ok(parse_service_row(row))
    })?;

    let mut services = vec![];
    for row in rows {
        services.push(row??);
    }
    Ok(services)
}

// ── Appointments ──

const APPOINTMENT_COLUMNS: &str = "a.id, a.client_id, a.stylist_id, a.service_id, a.start_time, a.end_time, a.status, a.notes, a.created_at, a.updated_at";

fn parse_appointment_row(row: &rusqlite::Row) -> anyhow::Result<Appointment> {
    let start_str: String = row.get(4)?;
    let end_str: String = row.get(5)?;
    let status_str: String = row.get(6)?;
    let created_at_str: String = row.get(8)?;
    let updated_at_str: String = row.get(9)?;

    Ok(Appointment {
        id: row.get(0)?,
        client_id: row.get(1)?,
        stylist_id: row.get(2)?,
        service_id: row.get(3)?,
        start_time: parse_db(&start_str)?,
        end_time: parse_db(&end_str)?,
        status: AppointmentStatus::parse(&status_str)
            .ok_or_else(|| anyhow::anyhow!("unknown appointment status: {status_str}"))?,
        notes: row.get(7)?,
        created_at: parse_db(&created_at_str)?,
        updated_at: parse_db(&updated_at_str)?,
    })
}

pub fn create_appointment(conn: &Connection, appt: &NewAppointment) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO appointments (client_id, stylist_id, service_id, start_time, end_time, status, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            appt.client_id,
            appt.stylist_id,
            appt.service_id,
            format_db(&appt.start_time),
            format_db(&appt.end_time),
            AppointmentStatus::Scheduled.as_str(),
            appt.notes,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_appointment(conn: &Connection, id: i64) -> anyhow::Result<Option<Appointment>> {
    let result = conn
        .query_row(
            &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments a WHERE a.id = ?1"),
            params![id],
            |row| Ok(parse_appointment_row(row)),
        )
        .optional()?;
    result.transpose()
}

pub fn update_appointment_status(
    conn: &Connection,
    id: i64,
    status: AppointmentStatus,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE appointments SET status = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![status.as_str(), id],
    )?;
    Ok(count > 0)
}

/// Any scheduled appointment of the stylist overlapping `[start, end)`.
pub fn has_scheduled_overlap(
    conn: &Connection,
    stylist_id: i64,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM appointments
         WHERE stylist_id = ?1 AND status = 'scheduled' AND start_time < ?2 AND end_time > ?3",
        params![stylist_id, format_db(end), format_db(start)],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Scheduled appointments of the stylist overlapping `[from, until)`, by start time.
pub fn get_scheduled_appointments_between(
    conn: &Connection,
    stylist_id: i64,
    from: &NaiveDateTime,
    until: &NaiveDateTime,
) -> anyhow::Result<Vec<Appointment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments a
         WHERE a.stylist_id = ?1 AND a.status = 'scheduled' AND a.start_time < ?2 AND a.end_time > ?3
         ORDER BY a.start_time ASC"
    ))?;
    let rows = stmt.query_map(
        params![stylist_id, format_db(until), format_db(from)],
        |row| Ok(parse_appointment_row(row)),
    )?;

    let mut appointments = vec![];
    for row in rows {
        appointments.push(row??);
    }
    Ok(appointments)
}

#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    pub client_id: Option<i64>,
    pub stylist_id: Option<i64>,
    pub status: Option<AppointmentStatus>,
    /// Inclusive lower bound on start time.
    pub from: Option<NaiveDateTime>,
    /// Exclusive upper bound on start time.
    pub until: Option<NaiveDateTime>,
    pub newest_first: bool,
    pub limit: Option<i64>,
}

pub fn list_appointment_details(
    conn: &Connection,
    filter: &AppointmentFilter,
) -> anyhow::Result<Vec<AppointmentDetail>> {
    let mut clauses: Vec<&str> = vec![];
    let mut values: Vec<Box<dyn ToSql>> = vec![];

    if let Some(client_id) = filter.client_id {
        clauses.push("a.client_id = ?");
        values.push(Box::new(client_id));
    }
    if let Some(stylist_id) = filter.stylist_id {
        clauses.push("a.stylist_id = ?");
        values.push(Box::new(stylist_id));
    }
    if let Some(status) = filter.status {
        clauses.push("a.status = ?");
        values.push(Box::new(status.as_str()));
    }
    if let Some(from) = &filter.from {
        clauses.push("a.start_time >= ?");
        values.push(Box::new(format_db(from)));
    }
    if let Some(until) = &filter.until {
        clauses.push("a.start_time < ?");
        values.push(Box::new(format_db(until)));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let order = if filter.newest_first { "DESC" } else { "ASC" };
    let limit_sql = match filter.limit {
        Some(limit) => {
            values.push(Box::new(limit));
            "LIMIT ?"
        }
        None => "",
    };

    let sql = format!(
        "SELECT {APPOINTMENT_COLUMNS},
                c.first_name || ' ' || c.last_name,
                st.first_name || ' ' || st.last_name,
                sv.name
         FROM appointments a
         JOIN users c ON c.id = a.client_id
         JOIN users st ON st.id = a.stylist_id
         JOIN services sv ON sv.id = a.service_id
         {where_sql}
         ORDER BY a.start_time {order}, a.id {order}
         {limit_sql}"
    );

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn ToSql> = values.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| {
        Ok(parse_appointment_row(row).and_then(|appointment| {
            Ok(AppointmentDetail {
                appointment,
                client_name: row.get(10)?,
                stylist_name: row.get(11)?,
                service_name: row.get(12)?,
            })
        }))
    })?;

    let mut details = vec![];
    for row in rows {
        details.push(row??);
    }
    Ok(details)
}

// ── Business Hours ──

fn parse_business_hours_row(row: &rusqlite::Row) -> anyhow::Result<BusinessHours> {
    let open_str: String = row.get(1)?;
    let close_str: String = row.get(2)?;

    Ok(BusinessHours {
        day_of_week: row.get(0)?,
        open_time: parse_time(&open_str)?,
        close_time: parse_time(&close_str)?,
        is_closed: row.get::<_, i32>(3)? != 0,
    })
}

pub fn get_business_hours(conn: &Connection, day_of_week: u32) -> anyhow::Result<Option<BusinessHours>> {
    let result = conn
        .query_row(
            "SELECT day_of_week, open_time, close_time, is_closed FROM business_hours WHERE day_of_week = ?1",
            params![day_of_week],
            |row| Ok(parse_business_hours_row(row)),
        )
        .optional()?;
    result.transpose()
}

pub fn list_business_hours(conn: &Connection) -> anyhow::Result<Vec<BusinessHours>> {
    let mut stmt = conn.prepare(
        "SELECT day_of_week, open_time, close_time, is_closed FROM business_hours ORDER BY day_of_week",
    )?;
    let rows = stmt.query_map([], |row| Ok(parse_business_hours_row(row)))?;

    let mut hours = vec![];
    for row in rows {
        hours.push(row??);
    }
    Ok(hours)
}

pub fn upsert_business_hours(conn: &Connection, hours: &BusinessHours) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO business_hours (day_of_week, open_time, close_time, is_closed)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(day_of_week) DO UPDATE SET
           open_time = excluded.open_time,
           close_time = excluded.close_time,
           is_closed = excluded.is_closed",
        params![
            hours.day_of_week,
            hours.open_time.format("%H:%M").to_string(),
            hours.close_time.format("%H:%M").to_string(),
            hours.is_closed as i32,
        ],
    )?;
    Ok(())
}

/// Fills in any missing weekday with the default hours. Returns how many were created.
pub fn ensure_default_business_hours(conn: &Connection) -> anyhow::Result<usize> {
    let mut created = 0;
    for day in 0..7 {
        let defaults = BusinessHours::default_for(day);
        created += conn.execute(
            "INSERT OR IGNORE INTO business_hours (day_of_week, open_time, close_time, is_closed)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                day,
                defaults.open_time.format("%H:%M").to_string(),
                defaults.close_time.format("%H:%M").to_string(),
                defaults.is_closed as i32,
            ],
        )?;
    }
    Ok(created)
}

// ── Blocked Times ──

const BLOCKED_COLUMNS: &str = "id, stylist_id, start_time, end_time, reason, is_holiday, created_at";

fn parse_blocked_time_row(row: &rusqlite::Row) -> anyhow::Result<BlockedTime> {
    let start_str: String = row.get(2)?;
    let end_str: String = row.get(3)?;
    let created_at_str: String = row.get(6)?;

    Ok(BlockedTime {
        id: row.get(0)?,
        stylist_id: row.get(1)?,
        start_time: parse_db(&start_str)?,
        end_time: parse_db(&end_str)?,
        reason: row.get(4)?,
        is_holiday: row.get::<_, i32>(5)? != 0,
        created_at: parse_db(&created_at_str)?,
    })
}

fn collect_blocked_times(
    conn: &Connection,
    sql: &str,
    values: &[&dyn ToSql],
) -> anyhow::Result<Vec<BlockedTime>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(values, |row| Ok(parse_blocked_time_row(row)))?;

    let mut blocked = vec![];
    for row in rows {
        blocked.push(row??);
    }
    Ok(blocked)
}

pub fn create_blocked_time(conn: &Connection, block: &NewBlockedTime) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO blocked_times (stylist_id, start_time, end_time, reason, is_holiday)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            block.stylist_id,
            format_db(&block.start_time),
            format_db(&block.end_time),
            block.reason,
            block.is_holiday as i32,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_blocked_time(conn: &Connection, id: i64) -> anyhow::Result<Option<BlockedTime>> {
    let result = conn
        .query_row(
            &format!("SELECT {BLOCKED_COLUMNS} FROM blocked_times WHERE id = ?1"),
            params![id],
            |row| Ok(parse_blocked_time_row(row)),
        )
        .optional()?;
    result.transpose()
}

pub fn delete_blocked_time(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM blocked_times WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

/// Any blocked time of the stylist overlapping `[start, end)`.
pub fn has_blocked_overlap(
    conn: &Connection,
    stylist_id: i64,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM blocked_times
         WHERE stylist_id = ?1 AND start_time < ?2 AND end_time > ?3",
        params![stylist_id, format_db(end), format_db(start)],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Blocked times of the stylist touching the closed range `[from, until]`.
pub fn get_blocked_times_touching(
    conn: &Connection,
    stylist_id: i64,
    from: &NaiveDateTime,
    until: &NaiveDateTime,
) -> anyhow::Result<Vec<BlockedTime>> {
    collect_blocked_times(
        conn,
        &format!(
            "SELECT {BLOCKED_COLUMNS} FROM blocked_times
             WHERE stylist_id = ?1 AND start_time <= ?2 AND end_time >= ?3
             ORDER BY start_time ASC"
        ),
        params![stylist_id, format_db(until), format_db(from)],
    )
}

/// First holiday block of the stylist touching the closed range `[from, until]`.
pub fn find_holiday_touching(
    conn: &Connection,
    stylist_id: i64,
    from: &NaiveDateTime,
    until: &NaiveDateTime,
) -> anyhow::Result<Option<BlockedTime>> {
    let mut holidays = collect_blocked_times(
        conn,
        &format!(
            "SELECT {BLOCKED_COLUMNS} FROM blocked_times
             WHERE stylist_id = ?1 AND is_holiday = 1 AND start_time <= ?2 AND end_time >= ?3
             ORDER BY start_time ASC LIMIT 1"
        ),
        params![stylist_id, format_db(until), format_db(from)],
    )?;
    Ok(holidays.pop())
}

/// Blocks of the stylist that have not ended yet.
pub fn list_upcoming_blocked_times(
    conn: &Connection,
    stylist_id: i64,
    now: &NaiveDateTime,
) -> anyhow::Result<Vec<BlockedTime>> {
    collect_blocked_times(
        conn,
        &format!(
            "SELECT {BLOCKED_COLUMNS} FROM blocked_times
             WHERE stylist_id = ?1 AND end_time >= ?2
             ORDER BY start_time ASC"
        ),
        params![stylist_id, format_db(now)],
    )
}

pub fn list_holidays(conn: &Connection) -> anyhow::Result<Vec<Holiday>> {
    let mut stmt = conn.prepare(
        "SELECT date(start_time), reason, COUNT(*) FROM blocked_times
         WHERE is_holiday = 1
         GROUP BY date(start_time), reason
         ORDER BY date(start_time) ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        let date_str: String = row.get(0)?;
        Ok((date_str, row.get::<_, Option<String>>(1)?, row.get::<_, i64>(2)?))
    })?;

    let mut holidays = vec![];
    for row in rows {
        let (date_str, reason, stylist_count) = row?;
        holidays.push(Holiday {
            date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")?,
            reason,
            stylist_count,
        });
    }
    Ok(holidays)
}

// ── Client Notes ──

pub fn create_client_note(
    conn: &Connection,
    client_id: i64,
    stylist_id: i64,
    note: &str,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO client_notes (client_id, stylist_id, note) VALUES (?1, ?2, ?3)",
        params![client_id, stylist_id, note],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Notes written by one stylist about one client, newest first.
pub fn list_client_notes(
    conn: &Connection,
    client_id: i64,
    stylist_id: i64,
) -> anyhow::Result<Vec<ClientNote>> {
    let mut stmt = conn.prepare(
        "SELECT id, client_id, stylist_id, note, created_at, updated_at FROM client_notes
         WHERE client_id = ?1 AND stylist_id = ?2
         ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt.query_map(params![client_id, stylist_id], |row| {
        let created_at_str: String = row.get(4)?;
        let updated_at_str: String = row.get(5)?;
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, String>(3)?,
            created_at_str,
            updated_at_str,
        ))
    })?;

    let mut notes = vec![];
    for row in rows {
        let (id, client_id, stylist_id, note, created_at_str, updated_at_str) = row?;
        notes.push(ClientNote {
            id,
            client_id,
            stylist_id,
            note,
            created_at: parse_db(&created_at_str)?,
            updated_at: parse_db(&updated_at_str)?,
        });
    }
    Ok(notes)
}

// ── Audit Logs ──

pub struct NewAuditLog<'a> {
    pub user_id: Option<i64>,
    pub timestamp: NaiveDateTime,
    pub action: &'a str,
    pub entity_type: &'a str,
    pub entity_id: Option<i64>,
    pub details: Option<String>,
    pub ip_address: Option<&'a str>,
}

pub fn insert_audit_log(conn: &Connection, entry: &NewAuditLog) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO audit_logs (user_id, timestamp, action, entity_type, entity_id, details, ip_address)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.user_id,
            format_db(&entry.timestamp),
            entry.action,
            entry.entity_type,
            entry.entity_id,
            entry.details,
            entry.ip_address,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn audit_where(filter: &AuditFilter) -> (String, Vec<Box<dyn ToSql>>) {
    let mut clauses: Vec<&str> = vec![];
    let mut values: Vec<Box<dyn ToSql>> = vec![];

    if let Some(action) = &filter.action {
        clauses.push("action = ?");
        values.push(Box::new(action.clone()));
    }
    if let Some(entity_type) = &filter.entity_type {
        clauses.push("entity_type = ?");
        values.push(Box::new(entity_type.clone()));
    }
    if let Some(user_id) = filter.user_id {
        clauses.push("user_id = ?");
        values.push(Box::new(user_id));
    }
    if let Some(from) = &filter.from {
        clauses.push("timestamp >= ?");
        values.push(Box::new(format_db(from)));
    }
    if let Some(until) = &filter.until {
        clauses.push("timestamp < ?");
        values.push(Box::new(format_db(until)));
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!("WHERE {}", clauses.join(" AND ")), values)
    }
}

pub fn count_audit_logs(conn: &Connection, filter: &AuditFilter) -> anyhow::Result<i64> {
    let (where_sql, values) = audit_where(filter);
    let params_refs: Vec<&dyn ToSql> = values.iter().map(|p| p.as_ref()).collect();
    let count = conn.query_row(
        &format!("SELECT COUNT(*) FROM audit_logs {where_sql}"),
        params_refs.as_slice(),
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Newest first.
pub fn list_audit_logs(
    conn: &Connection,
    filter: &AuditFilter,
    limit: i64,
    offset: i64,
) -> anyhow::Result<Vec<AuditLog>> {
    let (where_sql, mut values) = audit_where(filter);
    values.push(Box::new(limit));
    values.push(Box::new(offset));

    let mut stmt = conn.prepare(&format!(
        "SELECT id, user_id, timestamp, action, entity_type, entity_id, details, ip_address
         FROM audit_logs {where_sql}
         ORDER BY timestamp DESC, id DESC
         LIMIT ? OFFSET ?"
    ))?;
    let params_refs: Vec<&dyn ToSql> = values.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, Option<i64>>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, Option<i64>>(5)?,
            row.get::<_, Option<String>>(6)?,
            row.get::<_, Option<String>>(7)?,
        ))
    })?;

    let mut logs = vec![];
    for row in rows {
        let (id, user_id, timestamp_str, action, entity_type, entity_id, details, ip_address) = row?;
        logs.push(AuditLog {
            id,
            user_id,
            timestamp: parse_db(&timestamp_str)?,
            action,
            entity_type,
            entity_id,
            details: AuditLog::details_from_str(details.as_deref()),
            ip_address,
        });
    }
    Ok(logs)
}

pub fn distinct_audit_values(conn: &Connection, column: AuditColumn) -> anyhow::Result<Vec<String>> {
    let sql = match column {
        AuditColumn::Action => "SELECT DISTINCT action FROM audit_logs ORDER BY action",
        AuditColumn::EntityType => "SELECT DISTINCT entity_type FROM audit_logs ORDER BY entity_type",
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut values = vec![];
    for row in rows {
        values.push(row?);
    }
    Ok(values)
}

#[derive(Debug, Clone, Copy)]
pub enum AuditColumn {
    Action,
    EntityType,
}

// ── Dashboard & Analytics ──

pub struct DashboardStats {
    pub total_clients: i64,
    pub total_stylists: i64,
    pub total_admins: i64,
    pub total_appointments: i64,
    pub upcoming_appointments: i64,
    pub total_services: i64,
    pub active_services: i64,
}

pub fn get_dashboard_stats(conn: &Connection, now: &NaiveDateTime) -> anyhow::Result<DashboardStats> {
    let total_appointments: i64 =
        conn.query_row("SELECT COUNT(*) FROM appointments", [], |row| row.get(0))?;
    let upcoming_appointments: i64 = conn.query_row(
        "SELECT COUNT(*) FROM appointments WHERE start_time > ?1 AND status = 'scheduled'",
        params![format_db(now)],
        |row| row.get(0),
    )?;
    let total_services: i64 =
        conn.query_row("SELECT COUNT(*) FROM services", [], |row| row.get(0))?;
    let active_services: i64 = conn.query_row(
        "SELECT COUNT(*) FROM services WHERE is_active = 1",
        [],
        |row| row.get(0),
    )?;

    Ok(DashboardStats {
        total_clients: count_users_by_role(conn, Role::Client)?,
        total_stylists: count_users_by_role(conn, Role::Stylist)?,
        total_admins: count_users_by_role(conn, Role::Admin)?,
        total_appointments,
        upcoming_appointments,
        total_services,
        active_services,
    })
}

/// One appointment in an analytics window, with the fields the report groups by.
#[derive(Debug, Clone)]
pub struct AnalyticsRow {
    pub start_time: NaiveDateTime,
    pub status: AppointmentStatus,
    pub service_name: String,
    pub price_cents: i64,
    pub stylist_id: i64,
    pub stylist_name: String,
}

/// Appointments starting within the closed range `[from, until]`.
pub fn get_analytics_rows(
    conn: &Connection,
    from: &NaiveDateTime,
    until: &NaiveDateTime,
) -> anyhow::Result<Vec<AnalyticsRow>> {
    let mut stmt = conn.prepare(
        "SELECT a.start_time, a.status, sv.name, sv.price_cents, a.stylist_id,
                st.first_name || ' ' || st.last_name
         FROM appointments a
         JOIN services sv ON sv.id = a.service_id
         JOIN users st ON st.id = a.stylist_id
         WHERE a.start_time >= ?1 AND a.start_time <= ?2
         ORDER BY a.start_time ASC",
    )?;
    let rows = stmt.query_map(params![format_db(from), format_db(until)], |row| {
        let start_str: String = row.get(0)?;
        let status_str: String = row.get(1)?;
        Ok((
            start_str,
            status_str,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, i64>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut result = vec![];
    for row in rows {
        let (start_str, status_str, service_name, price_cents, stylist_id, stylist_name) = row?;
        result.push(AnalyticsRow {
            start_time: parse_db(&start_str)?,
            status: AppointmentStatus::parse(&status_str)
                .ok_or_else(|| anyhow::anyhow!("unknown appointment status: {status_str}"))?,
            service_name,
            price_cents,
            stylist_id,
            stylist_name,
        });
    }
    Ok(result)
}

/// Clients whose first-ever appointment starts within `[from, until]`.
pub fn count_new_clients(
    conn: &Connection,
    from: &NaiveDateTime,
    until: &NaiveDateTime,
) -> anyhow::Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM (
             SELECT client_id, MIN(start_time) AS first_appointment
             FROM appointments GROUP BY client_id
         ) WHERE first_appointment >= ?1 AND first_appointment <= ?2",
        params![format_db(from), format_db(until)],
        |row| row.get(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::parse_datetime_input;

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    fn dt(s: &str) -> NaiveDateTime {
        parse_datetime_input(s).unwrap()
    }

    fn add_user(conn: &Connection, email: &str, role: Role) -> i64 {
        create_user(
            conn,
            &NewUser {
                email: email.to_string(),
                password_hash: "x".to_string(),
                first_name: "Test".to_string(),
                last_name: email.to_string(),
                phone: None,
                role,
            },
        )
        .unwrap()
    }

    fn add_service(conn: &Connection, minutes: i64) -> i64 {
        create_service(
            conn,
            &ServiceFields {
                name: "Cut".to_string(),
                description: None,
                price_cents: 4500,
                duration_minutes: minutes,
                is_active: true,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_user_crud() {
        let conn = setup_db();
        let id = add_user(&conn, "ana@example.com", Role::Stylist);

        let user = get_user(&conn, id).unwrap().unwrap();
        assert_eq!(user.role, Role::Stylist);
        assert!(user.is_active);

        let by_email = get_user_by_email(&conn, "ANA@example.com").unwrap().unwrap();
        assert_eq!(by_email.id, id);

        assert!(email_taken(&conn, "ana@example.com", None).unwrap());
        assert!(!email_taken(&conn, "ana@example.com", Some(id)).unwrap());

        assert!(update_user_profile(&conn, id, "Ana", "Silva", Some("555")).unwrap());
        let user = get_user(&conn, id).unwrap().unwrap();
        assert_eq!(user.full_name(), "Ana Silva");
        assert_eq!(count_users_by_role(&conn, Role::Stylist).unwrap(), 1);
    }

    #[test]
    fn test_overlap_queries_are_half_open() {
        let conn = setup_db();
        let stylist = add_user(&conn, "s@example.com", Role::Stylist);
        let client = add_user(&conn, "c@example.com", Role::Client);
        let service = add_service(&conn, 60);

        create_appointment(
            &conn,
            &NewAppointment {
                client_id: client,
                stylist_id: stylist,
                service_id: service,
                start_time: dt("2030-06-17 10:00"),
                end_time: dt("2030-06-17 11:00"),
                notes: None,
            },
        )
        .unwrap();

        assert!(has_scheduled_overlap(&conn, stylist, &dt("2030-06-17 10:30"), &dt("2030-06-17 11:30")).unwrap());
        assert!(!has_scheduled_overlap(&conn, stylist, &dt("2030-06-17 11:00"), &dt("2030-06-17 12:00")).unwrap());
        assert!(!has_scheduled_overlap(&conn, stylist, &dt("2030-06-17 09:00"), &dt("2030-06-17 10:00")).unwrap());
    }

    #[test]
    fn test_cancelled_appointments_do_not_overlap() {
        let conn = setup_db();
        let stylist = add_user(&conn, "s@example.com", Role::Stylist);
        let client = add_user(&conn, "c@example.com", Role::Client);
        let service = add_service(&conn, 60);

        let id = create_appointment(
            &conn,
            &NewAppointment {
                client_id: client,
                stylist_id: stylist,
                service_id: service,
                start_time: dt("2030-06-17 10:00"),
                end_time: dt("2030-06-17 11:00"),
                notes: None,
            },
        )
        .unwrap();
        assert!(update_appointment_status(&conn, id, AppointmentStatus::Cancelled).unwrap());

        assert!(!has_scheduled_overlap(&conn, stylist, &dt("2030-06-17 10:00"), &dt("2030-06-17 11:00")).unwrap());
    }

    #[test]
    fn test_business_hours_defaults_and_upsert() {
        let conn = setup_db();
        assert!(get_business_hours(&conn, 0).unwrap().is_none());

        assert_eq!(ensure_default_business_hours(&conn).unwrap(), 7);
        assert_eq!(ensure_default_business_hours(&conn).unwrap(), 0);

        let mut monday = get_business_hours(&conn, 0).unwrap().unwrap();
        assert!(!monday.is_closed);
        monday.close_time = parse_time("19:30").unwrap();
        upsert_business_hours(&conn, &monday).unwrap();

        let hours = list_business_hours(&conn).unwrap();
        assert_eq!(hours.len(), 7);
        assert_eq!(hours[0].close_time, parse_time("19:30").unwrap());
        assert!(hours[6].is_closed);
    }

    #[test]
    fn test_holidays_grouped_by_date() {
        let conn = setup_db();
        let a = add_user(&conn, "a@example.com", Role::Stylist);
        let b = add_user(&conn, "b@example.com", Role::Stylist);

        for stylist_id in [a, b] {
            create_blocked_time(
                &conn,
                &NewBlockedTime {
                    stylist_id,
                    start_time: dt("2030-12-25 00:00"),
                    end_time: dt("2030-12-25 23:59"),
                    reason: Some("Christmas".to_string()),
                    is_holiday: true,
                },
            )
            .unwrap();
        }

        let holidays = list_holidays(&conn).unwrap();
        assert_eq!(holidays.len(), 1);
        assert_eq!(holidays[0].stylist_count, 2);
        assert_eq!(holidays[0].reason.as_deref(), Some("Christmas"));

        let found = find_holiday_touching(&conn, a, &dt("2030-12-25 00:00"), &dt("2030-12-25 23:59")).unwrap();
        assert!(found.is_some());
        let none = find_holiday_touching(&conn, a, &dt("2030-12-26 00:00"), &dt("2030-12-26 23:59")).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_audit_log_filters_and_pagination() {
        let conn = setup_db();
        for i in 0..3 {
            insert_audit_log(
                &conn,
                &NewAuditLog {
                    user_id: None,
                    timestamp: dt("2030-06-17 10:00") + chrono::Duration::minutes(i),
                    action: if i == 0 { "delete" } else { "create" },
                    entity_type: "service",
                    entity_id: Some(i),
                    details: Some(format!(r#"{{"n":{i}}}"#)),
                    ip_address: None,
                },
            )
            .unwrap();
        }

        let filter = AuditFilter {
            action: Some("create".to_string()),
            ..Default::default()
        };
        assert_eq!(count_audit_logs(&conn, &filter).unwrap(), 2);

        let logs = list_audit_logs(&conn, &AuditFilter::default(), 2, 0).unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].entity_id, Some(2));
        assert_eq!(logs[0].details["n"], 2);

        let actions = distinct_audit_values(&conn, AuditColumn::Action).unwrap();
        assert_eq!(actions, vec!["create".to_string(), "delete".to_string()]);
    }
}
