//! Calendar connection state and the
//! mapping between appointments and
//! Google Calendar event JSON.

use chrono::{
  DateTime,
  NaiveDate,
  TimeZone,
  Utc
};
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::{
  Value,
  json
};

use crate::domain::model::{
  Appointment,
  AppointmentStatus
};
use crate::domain::scheduling::{
  BusyBlock,
  TimeWindow
};

/// Private extended property tagging
/// events we created.
pub const APPOINTMENT_PROPERTY: &str =
  "clinicdeskAppointmentId";

/// Tokens expiring within this margin
/// are refreshed before use.
pub const REFRESH_SKEW_MS: i64 = 60_000;

#[derive(Debug, Clone, sqlx::FromRow)]

pub struct CalendarConnection {
  pub clinic_id:         i64,
  pub calendar_id:       String,
  pub access_token:      String,
  pub refresh_token:     Option<String>,
  pub expires_at_ms:     i64,
  pub last_synced_at_ms: Option<i64>
}

impl CalendarConnection {
  pub fn needs_refresh(
    &self,
    now_ms: i64
  ) -> bool {
    self.expires_at_ms - now_ms
      <= REFRESH_SKEW_MS
  }

  pub fn status(&self) -> CalendarStatus {
    CalendarStatus {
      connected:         true,
      calendar_id:       Some(
        self.calendar_id.clone()
      ),
      expires_at_ms:     Some(
        self.expires_at_ms
      ),
      last_synced_at_ms: self
        .last_synced_at_ms
    }
  }
}

/// Connection view without tokens.
#[derive(
  Debug, Clone, Default, PartialEq, Eq, Serialize,
)]

pub struct CalendarStatus {
  pub connected:         bool,
  pub calendar_id:       Option<String>,
  pub expires_at_ms:     Option<i64>,
  pub last_synced_at_ms: Option<i64>
}

#[derive(Debug, Clone, PartialEq, Eq)]

pub struct OAuthTokens {
  pub access_token:       String,
  pub refresh_token:      Option<String>,
  pub expires_in_seconds: i64
}

#[derive(
  Debug, Clone, PartialEq, Eq, Serialize,
)]

pub struct CalendarEvent {
  pub id:             Option<String>,
  pub summary:        String,
  pub description:    Option<String>,
  pub start_ms:       i64,
  pub end_ms:         i64,
  pub timezone:       String,
  pub appointment_id: Option<i64>,
  pub cancelled:      bool,
  pub all_day:        bool
}

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize,
)]

pub struct SyncOutcome {
  pub pushed:   usize,
  pub failed:   usize,
  pub imported: usize
}

/// Patient names are left out unless
/// `patient_name` is given.
pub fn event_for_appointment(
  appointment: &Appointment,
  tz: Tz,
  service_name: Option<&str>,
  patient_name: Option<&str>
) -> CalendarEvent {
  let mut summary =
    "Dental appointment".to_string();

  if let Some(service) = service_name {
    summary.push_str(" - ");
    summary.push_str(service);
  }

  if let Some(patient) = patient_name {
    summary.push_str(" (");
    summary.push_str(patient);
    summary.push(')');
  }

  CalendarEvent {
    id: appointment
      .google_event_id
      .clone(),
    summary,
    description: Some(format!(
      "Appointment #{}",
      appointment.id
    )),
    start_ms: appointment.starts_at_ms,
    end_ms: appointment.ends_at_ms,
    timezone: tz.name().to_string(),
    appointment_id: Some(appointment.id),
    cancelled: appointment.status
      == AppointmentStatus::Cancelled,
    all_day: false
  }
}

fn rfc3339(ms: i64, tz: Tz) -> String {
  Utc
    .timestamp_millis_opt(ms)
    .single()
    .unwrap_or_default()
    .with_timezone(&tz)
    .to_rfc3339()
}

pub fn to_google_json(
  event: &CalendarEvent
) -> Value {
  let tz: Tz = event
    .timezone
    .parse()
    .unwrap_or(Tz::UTC);

  let mut body = json!({
    "summary": event.summary,
    "start": {
      "dateTime": rfc3339(event.start_ms, tz),
      "timeZone": tz.name(),
    },
    "end": {
      "dateTime": rfc3339(event.end_ms, tz),
      "timeZone": tz.name(),
    },
  });

  if let Some(description) =
    &event.description
  {
    body["description"] =
      json!(description);
  }

  if let Some(id) = event.appointment_id {
    body["extendedProperties"] = json!({
      "private": {
        APPOINTMENT_PROPERTY: id.to_string(),
      }
    });
  }

  body
}

fn parse_boundary(
  value: &Value,
  tz: Tz
) -> Option<(i64, bool)> {
  if let Some(dt) = value
    .get("dateTime")
    .and_then(Value::as_str)
  {
    let parsed =
      DateTime::parse_from_rfc3339(dt)
        .ok()?;

    return Some((
      parsed.timestamp_millis(),
      false
    ));
  }

  let date = value
    .get("date")
    .and_then(Value::as_str)?;

  let day = NaiveDate::parse_from_str(
    date, "%Y-%m-%d"
  )
  .ok()?;

  let midnight = tz
    .from_local_datetime(
      &day.and_hms_opt(0, 0, 0)?
    )
    .earliest()?;

  Some((midnight.timestamp_millis(), true))
}

/// Reads one item of a Calendar v3
/// `events.list` response. All-day
/// events use `tz` for their midnight
/// boundaries.
pub fn from_google_json(
  value: &Value,
  tz: Tz
) -> Option<CalendarEvent> {
  let (start_ms, all_day) = parse_boundary(
    value.get("start")?,
    tz
  )?;

  let (end_ms, _) =
    parse_boundary(value.get("end")?, tz)?;

  let appointment_id = value
    .pointer(&format!(
      "/extendedProperties/private/{APPOINTMENT_PROPERTY}"
    ))
    .and_then(Value::as_str)
    .and_then(|s| s.parse::<i64>().ok());

  Some(CalendarEvent {
    id: value
      .get("id")
      .and_then(Value::as_str)
      .map(str::to_string),
    summary: value
      .get("summary")
      .and_then(Value::as_str)
      .unwrap_or_default()
      .to_string(),
    description: value
      .get("description")
      .and_then(Value::as_str)
      .map(str::to_string),
    start_ms,
    end_ms,
    timezone: tz.name().to_string(),
    appointment_id,
    cancelled: value
      .get("status")
      .and_then(Value::as_str)
      == Some("cancelled"),
    all_day
  })
}

/// External events that occupy time.
/// Our own events and cancelled ones are
/// skipped since appointments already
/// block their slots.
pub fn busy_block_from_event(
  event: &CalendarEvent
) -> Option<BusyBlock> {
  if event.appointment_id.is_some()
    || event.cancelled
  {
    return None;
  }

  let window = TimeWindow::new(
    event.start_ms,
    event.end_ms
  );

  if window.is_empty() {
    return None;
  }

  Some(BusyBlock::external(
    event.id.clone().unwrap_or_default(),
    window
  ))
}
