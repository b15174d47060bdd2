use chrono_tz::Tz;
use clinicdesk_core::domain::calendar::{
    busy_block_from_event, event_for_appointment, from_google_json, to_google_json,
    CalendarConnection,
};
use clinicdesk_core::domain::model::{Appointment, AppointmentStatus};
use clinicdesk_core::domain::scheduling::BusySource;
use serde_json::json;

// 2030-01-07 00:00 UTC, a Monday.
const MONDAY: i64 = 1_893_974_400_000;
const HOUR: i64 = 3_600_000;

fn appointment(status: AppointmentStatus) -> Appointment {
    Appointment {
        id: 42,
        clinic_id: 1,
        patient_id: 9,
        provider_id: 2,
        service_id: None,
        starts_at_ms: MONDAY + 9 * HOUR,
        ends_at_ms: MONDAY + 10 * HOUR,
        status,
        notes: Some("private".to_string()),
        google_event_id: None,
        created_at_ms: 0,
        updated_at_ms: 0,
    }
}

#[test]
fn event_summary_leaves_out_patient_unless_given() {
    let appt = appointment(AppointmentStatus::Scheduled);

    let plain = event_for_appointment(&appt, Tz::UTC, Some("Cleaning"), None);
    assert_eq!(plain.summary, "Dental appointment - Cleaning");
    assert_eq!(plain.appointment_id, Some(42));
    assert!(!plain.description.unwrap_or_default().contains("private"));

    let named = event_for_appointment(&appt, Tz::UTC, Some("Cleaning"), Some("Ana López"));
    assert_eq!(named.summary, "Dental appointment - Cleaning (Ana López)");

    let cancelled = event_for_appointment(&appointment(AppointmentStatus::Cancelled), Tz::UTC, None, None);
    assert!(cancelled.cancelled);
}

#[test]
fn google_json_uses_clinic_timezone() {
    let event = event_for_appointment(
        &appointment(AppointmentStatus::Confirmed),
        chrono_tz::Europe::Madrid,
        None,
        None,
    );

    let body = to_google_json(&event);
    assert_eq!(body["start"]["dateTime"], "2030-01-07T10:00:00+01:00");
    assert_eq!(body["start"]["timeZone"], "Europe/Madrid");
    assert_eq!(body["extendedProperties"]["private"]["clinicdeskAppointmentId"], "42");

    let back = from_google_json(&body, chrono_tz::Europe::Madrid).unwrap();
    assert_eq!(back.start_ms, event.start_ms);
    assert_eq!(back.end_ms, event.end_ms);
    assert_eq!(back.appointment_id, Some(42));

    // our own events never become busy blocks
    assert!(busy_block_from_event(&back).is_none());
}

#[test]
fn all_day_events_start_at_local_midnight() {
    let item = json!({
        "id": "holiday",
        "summary": "Closed",
        "start": { "date": "2030-01-08" },
        "end": { "date": "2030-01-09" },
    });

    let event = from_google_json(&item, chrono_tz::Europe::Madrid).unwrap();
    assert!(event.all_day);
    assert_eq!(event.start_ms, MONDAY + 23 * HOUR);
    assert_eq!(event.end_ms, MONDAY + 47 * HOUR);

    let block = busy_block_from_event(&event).unwrap();
    assert_eq!(block.source, BusySource::External);
    assert_eq!(block.calendar_event_id.as_deref(), Some("holiday"));
}

#[test]
fn cancelled_and_broken_items_are_skipped() {
    let cancelled = json!({
        "id": "x",
        "status": "cancelled",
        "start": { "dateTime": "2030-01-07T09:00:00Z" },
        "end": { "dateTime": "2030-01-07T10:00:00Z" },
    });
    let event = from_google_json(&cancelled, Tz::UTC).unwrap();
    assert!(busy_block_from_event(&event).is_none());

    assert!(from_google_json(&json!({ "id": "no-start" }), Tz::UTC).is_none());
    assert!(from_google_json(
        &json!({ "start": { "dateTime": "soon" }, "end": { "dateTime": "later" } }),
        Tz::UTC
    )
    .is_none());
}

#[test]
fn tokens_refresh_ahead_of_expiry() {
    let conn = CalendarConnection {
        clinic_id: 1,
        calendar_id: "primary".to_string(),
        access_token: "a".to_string(),
        refresh_token: Some("r".to_string()),
        expires_at_ms: 100_000,
        last_synced_at_ms: None,
    };

    assert!(conn.needs_refresh(40_000));
    assert!(!conn.needs_refresh(39_999));

    let status = conn.status();
    assert!(status.connected);
    assert_eq!(status.calendar_id.as_deref(), Some("primary"));
}
