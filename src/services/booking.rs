use chrono::{Duration, NaiveDateTime};
use rusqlite::{Connection, TransactionBehavior};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::service::MAX_SERVICE_MINUTES;
use crate::models::{Appointment, AppointmentStatus, NewAppointment, Role};
use crate::services::availability::{is_slot_available, BOOKING_LEAD_MINUTES};

pub const MAX_NOTES_LEN: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Selected service not found")]
    ServiceNotFound,

    #[error("Selected stylist not found")]
    StylistNotFound,

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("{0}")]
    Forbidden(String),

    #[error("Sorry, this time slot is no longer available. Please select another time.")]
    SlotUnavailable,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::InvalidInput(msg) => AppError::InvalidInput(msg),
            BookingError::ServiceNotFound
            | BookingError::StylistNotFound
            | BookingError::AppointmentNotFound => AppError::NotFound(err.to_string()),
            BookingError::Forbidden(msg) => AppError::Forbidden(msg),
            BookingError::SlotUnavailable => AppError::Conflict(err.to_string()),
            BookingError::Database(e) => AppError::Database(e),
            BookingError::Internal(e) => AppError::Internal(e),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub client_id: i64,
    pub stylist_id: i64,
    pub service_id: i64,
    pub start_time: NaiveDateTime,
    pub notes: Option<String>,
}

/// Validates and inserts an appointment. The availability check and the
/// insert share one immediate transaction, so two concurrent bookings of the
/// same slot cannot both succeed.
pub fn book_appointment(
    conn: &mut Connection,
    req: &BookingRequest,
    now: NaiveDateTime,
) -> Result<Appointment, BookingError> {
    let notes = req
        .notes
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);
    if notes.as_ref().is_some_and(|n| n.chars().count() > MAX_NOTES_LEN) {
        return Err(BookingError::InvalidInput(format!(
            "Notes must be at most {MAX_NOTES_LEN} characters."
        )));
    }

    if req.start_time < now + Duration::minutes(BOOKING_LEAD_MINUTES) {
        return Err(BookingError::InvalidInput(
            "Appointments must be booked at least 1 hour in advance.".to_string(),
        ));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let service = match queries::get_service(&tx, req.service_id)? {
        Some(s) if s.is_active => s,
        _ => return Err(BookingError::ServiceNotFound),
    };
    match queries::get_user(&tx, req.stylist_id)? {
        Some(u) if u.role == Role::Stylist && u.is_active => {}
        _ => return Err(BookingError::StylistNotFound),
    }

    let end_time = end_after(req.start_time, service.duration_minutes)
        .ok_or_else(|| BookingError::InvalidInput("Invalid appointment time.".to_string()))?;
    if !is_slot_available(&tx, req.stylist_id, req.start_time, end_time)? {
        tracing::info!(
            stylist_id = req.stylist_id,
            start = %req.start_time,
            "booking rejected, slot unavailable"
        );
        return Err(BookingError::SlotUnavailable);
    }

    let id = queries::create_appointment(
        &tx,
        &NewAppointment {
            client_id: req.client_id,
            stylist_id: req.stylist_id,
            service_id: req.service_id,
            start_time: req.start_time,
            end_time,
            notes,
        },
    )?;
    let appointment = queries::get_appointment(&tx, id)?
        .ok_or_else(|| anyhow::anyhow!("appointment {id} missing after insert"))?;
    tx.commit()?;

    tracing::info!(
        appointment_id = id,
        client_id = req.client_id,
        stylist_id = req.stylist_id,
        start = %req.start_time,
        "appointment booked"
    );
    Ok(appointment)
}

fn end_after(start: NaiveDateTime, duration_minutes: i64) -> Option<NaiveDateTime> {
    if !(1..=MAX_SERVICE_MINUTES).contains(&duration_minutes) {
        return None;
    }
    start.checked_add_signed(Duration::minutes(duration_minutes))
}

/// Cancels one of the client's own appointments before it starts.
pub fn cancel_appointment(
    conn: &Connection,
    client_id: i64,
    appointment_id: i64,
    now: NaiveDateTime,
) -> Result<Appointment, BookingError> {
    let appointment = match queries::get_appointment(conn, appointment_id)? {
        Some(a) if a.client_id == client_id => a,
        _ => return Err(BookingError::AppointmentNotFound),
    };
    if appointment.status != AppointmentStatus::Scheduled {
        return Err(BookingError::InvalidInput(
            "Only scheduled appointments can be cancelled.".to_string(),
        ));
    }
    if appointment.start_time <= now {
        return Err(BookingError::InvalidInput(
            "Appointments that have already started cannot be cancelled.".to_string(),
        ));
    }

    queries::update_appointment_status(conn, appointment_id, AppointmentStatus::Cancelled)?;
    Ok(Appointment {
        status: AppointmentStatus::Cancelled,
        ..appointment
    })
}

/// Stylists may only change the status of their own appointments. Moving an
/// appointment back to scheduled re-checks it against the stylist's other
/// scheduled appointments inside the same immediate transaction.
pub fn set_appointment_status(
    conn: &mut Connection,
    stylist_id: i64,
    appointment_id: i64,
    status: AppointmentStatus,
) -> Result<(Appointment, AppointmentStatus), BookingError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let appointment = queries::get_appointment(&tx, appointment_id)?
        .ok_or(BookingError::AppointmentNotFound)?;
    if appointment.stylist_id != stylist_id {
        return Err(BookingError::Forbidden(
            "You can only update your own appointments.".to_string(),
        ));
    }

    let previous = appointment.status;
    if status == AppointmentStatus::Scheduled
        && previous != AppointmentStatus::Scheduled
        && queries::has_scheduled_overlap(
            &tx,
            stylist_id,
            &appointment.start_time,
            &appointment.end_time,
        )?
    {
        tracing::info!(
            appointment_id,
            stylist_id,
            start = %appointment.start_time,
            "reinstatement rejected, slot taken"
        );
        return Err(BookingError::SlotUnavailable);
    }

    queries::update_appointment_status(&tx, appointment_id, status)?;
    tx.commit()?;
    Ok((Appointment { status, ..appointment }, previous))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{parse_datetime_input, NewUser, ServiceFields};

    struct Fixture {
        conn: Connection,
        client: i64,
        stylist: i64,
        service: i64,
    }

    fn dt(s: &str) -> NaiveDateTime {
        parse_datetime_input(s).unwrap()
    }

    fn setup() -> Fixture {
        let conn = db::init_db(":memory:").unwrap();
        queries::ensure_default_business_hours(&conn).unwrap();
        let mut ids = vec![];
        for (email, role) in [("c@example.com", Role::Client), ("s@example.com", Role::Stylist)] {
            ids.push(
                queries::create_user(
                    &conn,
                    &NewUser {
                        email: email.to_string(),
                        password_hash: "x".to_string(),
                        first_name: "F".to_string(),
                        last_name: "L".to_string(),
                        phone: None,
                        role,
                    },
                )
                .unwrap(),
            );
        }
        let service = queries::create_service(
            &conn,
            &ServiceFields {
                name: "Colour".to_string(),
                description: None,
                price_cents: 8000,
                duration_minutes: 90,
                is_active: true,
            },
        )
        .unwrap();
        Fixture {
            conn,
            client: ids[0],
            stylist: ids[1],
            service,
        }
    }

    fn request(f: &Fixture, start: &str) -> BookingRequest {
        BookingRequest {
            client_id: f.client,
            stylist_id: f.stylist,
            service_id: f.service,
            start_time: dt(start),
            notes: Some("  first visit ".to_string()),
        }
    }

    const NOW: &str = "2030-06-10 08:00";

    #[test]
    fn test_book_sets_end_from_duration() {
        let mut f = setup();
        let req = request(&f, "2030-06-17 10:00");
        let appt = book_appointment(&mut f.conn, &req, dt(NOW)).unwrap();

        assert_eq!(appt.end_time, dt("2030-06-17 11:30"));
        assert_eq!(appt.status, AppointmentStatus::Scheduled);
        assert_eq!(appt.notes.as_deref(), Some("first visit"));
    }

    #[test]
    fn test_double_booking_rejected() {
        let mut f = setup();
        let first = request(&f, "2030-06-17 10:00");
        book_appointment(&mut f.conn, &first, dt(NOW)).unwrap();

        let second = request(&f, "2030-06-17 11:00");
        let err = book_appointment(&mut f.conn, &second, dt(NOW)).unwrap_err();
        assert!(matches!(err, BookingError::SlotUnavailable));

        let adjacent = request(&f, "2030-06-17 11:30");
        assert!(book_appointment(&mut f.conn, &adjacent, dt(NOW)).is_ok());
    }

    #[test]
    fn test_lead_time_enforced() {
        let mut f = setup();
        let req = request(&f, "2030-06-17 10:30");
        let err = book_appointment(&mut f.conn, &req, dt("2030-06-17 10:00")).unwrap_err();
        assert!(matches!(err, BookingError::InvalidInput(_)));
    }

    #[test]
    fn test_outside_hours_rejected() {
        let mut f = setup();
        let req = request(&f, "2030-06-17 16:00");
        let err = book_appointment(&mut f.conn, &req, dt(NOW)).unwrap_err();
        assert!(matches!(err, BookingError::SlotUnavailable));
    }

    #[test]
    fn test_notes_length_limit() {
        let mut f = setup();
        let mut req = request(&f, "2030-06-17 10:00");
        req.notes = Some("x".repeat(MAX_NOTES_LEN + 1));
        let err = book_appointment(&mut f.conn, &req, dt(NOW)).unwrap_err();
        assert!(matches!(err, BookingError::InvalidInput(_)));
    }

    #[test]
    fn test_unknown_stylist_and_service() {
        let mut f = setup();
        let mut req = request(&f, "2030-06-17 10:00");
        req.stylist_id = f.client;
        assert!(matches!(
            book_appointment(&mut f.conn, &req, dt(NOW)).unwrap_err(),
            BookingError::StylistNotFound
        ));

        let mut req = request(&f, "2030-06-17 10:00");
        req.service_id = 404;
        assert!(matches!(
            book_appointment(&mut f.conn, &req, dt(NOW)).unwrap_err(),
            BookingError::ServiceNotFound
        ));
    }

    #[test]
    fn test_cancel_frees_slot() {
        let mut f = setup();
        let req = request(&f, "2030-06-17 10:00");
        let appt = book_appointment(&mut f.conn, &req, dt(NOW)).unwrap();

        let cancelled = cancel_appointment(&f.conn, f.client, appt.id, dt(NOW)).unwrap();
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
        assert!(book_appointment(&mut f.conn, &req, dt(NOW)).is_ok());

        let err = cancel_appointment(&f.conn, f.client, appt.id, dt(NOW)).unwrap_err();
        assert!(matches!(err, BookingError::InvalidInput(_)));
    }

    #[test]
    fn test_cancel_requires_ownership_and_future_start() {
        let mut f = setup();
        let req = request(&f, "2030-06-17 10:00");
        let appt = book_appointment(&mut f.conn, &req, dt(NOW)).unwrap();

        assert!(matches!(
            cancel_appointment(&f.conn, f.stylist, appt.id, dt(NOW)).unwrap_err(),
            BookingError::AppointmentNotFound
        ));
        assert!(matches!(
            cancel_appointment(&f.conn, f.client, appt.id, dt("2030-06-17 10:00")).unwrap_err(),
            BookingError::InvalidInput(_)
        ));
    }

    #[test]
    fn test_stylist_status_update_own_only() {
        let mut f = setup();
        let req = request(&f, "2030-06-17 10:00");
        let appt = book_appointment(&mut f.conn, &req, dt(NOW)).unwrap();

        let (updated, previous) =
            set_appointment_status(&mut f.conn, f.stylist, appt.id, AppointmentStatus::Completed).unwrap();
        assert_eq!(previous, AppointmentStatus::Scheduled);
        assert_eq!(updated.status, AppointmentStatus::Completed);

        assert!(matches!(
            set_appointment_status(&mut f.conn, f.client, appt.id, AppointmentStatus::NoShow).unwrap_err(),
            BookingError::Forbidden(_)
        ));
    }

    #[test]
    fn test_reinstating_cancelled_appointment_checks_overlap() {
        let mut f = setup();
        let req = request(&f, "2030-06-17 10:00");
        let first = book_appointment(&mut f.conn, &req, dt(NOW)).unwrap();
        cancel_appointment(&f.conn, f.client, first.id, dt(NOW)).unwrap();
        let second = book_appointment(&mut f.conn, &req, dt(NOW)).unwrap();

        let err = set_appointment_status(&mut f.conn, f.stylist, first.id, AppointmentStatus::Scheduled)
            .unwrap_err();
        assert!(matches!(err, BookingError::SlotUnavailable));
        assert_eq!(
            queries::get_appointment(&f.conn, first.id).unwrap().unwrap().status,
            AppointmentStatus::Cancelled
        );

        cancel_appointment(&f.conn, f.client, second.id, dt(NOW)).unwrap();
        let (restored, previous) =
            set_appointment_status(&mut f.conn, f.stylist, first.id, AppointmentStatus::Scheduled).unwrap();
        assert_eq!(previous, AppointmentStatus::Cancelled);
        assert_eq!(restored.status, AppointmentStatus::Scheduled);
    }

    #[test]
    fn test_service_duration_out_of_range_rejected() {
        let mut f = setup();
        f.conn
            .execute(
                "UPDATE services SET duration_minutes = ?1 WHERE id = ?2",
                rusqlite::params![1_000_000_000_000_000i64, f.service],
            )
            .unwrap();

        let req = request(&f, "2030-06-17 10:00");
        let err = book_appointment(&mut f.conn, &req, dt(NOW)).unwrap_err();
        assert!(matches!(err, BookingError::InvalidInput(_)));
        assert!(end_after(NaiveDateTime::MAX, 60).is_none());
    }
}
