//! Keeps a clinic's Google Calendar in
//! step with its appointments and pulls
//! external events back as busy blocks.

use chrono_tz::Tz;
use tracing::{
  debug,
  info,
  warn
};

use crate::app::ServiceResult;
use crate::domain::calendar::{
  CalendarConnection,
  CalendarStatus,
  SyncOutcome,
  busy_block_from_event,
  event_for_appointment
};
use crate::domain::model::Appointment;
use crate::domain::scheduling::{
  TimeWindow,
  parse_timezone
};
use crate::infra::time::format_epoch_ms;
use crate::ports::calendar::{
  CalendarClient,
  CalendarError
};
use crate::ports::repo::{
  AppointmentRepo,
  CalendarRepo,
  CostRepo,
  PatientRepo,
  Repo,
  TenantRepo
};

pub struct CalendarSync<'a> {
  repo:                  &'a dyn Repo,
  client:                &'a dyn CalendarClient,
  include_patient_names: bool
}

impl<'a> CalendarSync<'a> {
  pub fn new(
    repo: &'a dyn Repo,
    client: &'a dyn CalendarClient,
    include_patient_names: bool
  ) -> Self {
    Self {
      repo,
      client,
      include_patient_names
    }
  }

  pub async fn status(
    &self,
    clinic_id: i64
  ) -> ServiceResult<CalendarStatus> {
    Ok(self
      .repo
      .calendar_connection(clinic_id)
      .await?
      .map(|c| c.status())
      .unwrap_or_default())
  }

  /// Exchanges the OAuth code and stores
  /// the connection, replacing any
  /// previous one.
  pub async fn connect(
    &self,
    clinic_id: i64,
    code: &str,
    calendar_id: &str,
    now_ms: i64
  ) -> ServiceResult<CalendarStatus> {
    let tokens =
      self.client.exchange_code(code).await?;

    let connection = CalendarConnection {
      clinic_id,
      calendar_id: calendar_id.to_string(),
      access_token: tokens.access_token,
      refresh_token: tokens.refresh_token,
      expires_at_ms: now_ms
        + tokens.expires_in_seconds * 1_000,
      last_synced_at_ms: None
    };

    self
      .repo
      .save_calendar_connection(&connection, now_ms)
      .await?;

    info!(clinic_id, calendar_id, "calendar connected");

    Ok(connection.status())
  }

  pub async fn disconnect(
    &self,
    clinic_id: i64
  ) -> ServiceResult<bool> {
    Ok(self
      .repo
      .delete_calendar_connection(clinic_id)
      .await?)
  }

  /// Stored connection with a usable
  /// access token, refreshing it first
  /// when it is about to expire.
  async fn connection(
    &self,
    clinic_id: i64,
    now_ms: i64
  ) -> ServiceResult<Option<CalendarConnection>> {
    let Some(mut conn) = self
      .repo
      .calendar_connection(clinic_id)
      .await?
    else {
      return Ok(None);
    };

    if !conn.needs_refresh(now_ms) {
      return Ok(Some(conn));
    }

    let refresh_token = conn
      .refresh_token
      .clone()
      .ok_or(CalendarError::Unauthorized)?;

    let tokens =
      self.client.refresh(&refresh_token).await?;

    conn.access_token = tokens.access_token;

    conn.expires_at_ms =
      now_ms + tokens.expires_in_seconds * 1_000;

    self
      .repo
      .update_calendar_tokens(
        clinic_id,
        &conn.access_token,
        conn.expires_at_ms
      )
      .await?;

    debug!(clinic_id, "calendar token refreshed");

    Ok(Some(conn))
  }

  async fn clinic_timezone(
    &self,
    clinic_id: i64
  ) -> ServiceResult<Tz> {
    let clinic = self.repo.clinic(clinic_id).await?;

    Ok(parse_timezone(&clinic.timezone)?)
  }

  /// Mirrors one appointment. Returns
  /// false when the clinic has no
  /// calendar connected.
  pub async fn push_appointment(
    &self,
    appointment: &Appointment,
    now_ms: i64
  ) -> ServiceResult<bool> {
    let Some(conn) = self
      .connection(appointment.clinic_id, now_ms)
      .await?
    else {
      return Ok(false);
    };

    let tz =
      self.clinic_timezone(appointment.clinic_id).await?;

    self.push_with(&conn, tz, appointment).await?;

    Ok(true)
  }

  async fn push_with(
    &self,
    conn: &CalendarConnection,
    tz: Tz,
    appointment: &Appointment
  ) -> ServiceResult<()> {
    let clinic_id = appointment.clinic_id;

    if !appointment.status.blocks_time() {
      if let Some(event_id) =
        appointment.google_event_id.as_deref()
      {
        self
          .client
          .delete_event(
            &conn.access_token,
            &conn.calendar_id,
            event_id
          )
          .await?;

        self
          .repo
          .set_google_event_id(clinic_id, appointment.id, None)
          .await?;
      }

      return Ok(());
    }

    let service_name = match appointment.service_id {
      | Some(id) => {
        self
          .repo
          .service(clinic_id, id)
          .await
          .ok()
          .map(|s| s.name)
      }
      | None => None
    };

    let patient_name = if self.include_patient_names {
      self
        .repo
        .patient(clinic_id, appointment.patient_id)
        .await
        .ok()
        .filter(|p| !p.is_erased())
        .map(|p| p.display_name())
    } else {
      None
    };

    let event = event_for_appointment(
      appointment,
      tz,
      service_name.as_deref(),
      patient_name.as_deref()
    );

    match appointment.google_event_id.as_deref() {
      | Some(event_id) => {
        self
          .client
          .update_event(
            &conn.access_token,
            &conn.calendar_id,
            event_id,
            &event
          )
          .await?;
      }
      | None => {
        let event_id = self
          .client
          .insert_event(
            &conn.access_token,
            &conn.calendar_id,
            &event
          )
          .await?;

        self
          .repo
          .set_google_event_id(
            clinic_id,
            appointment.id,
            Some(event_id.as_str())
          )
          .await?;
      }
    }

    Ok(())
  }

  /// Pushes unsynced appointments in the
  /// window, then replaces the imported
  /// busy blocks of the window with what
  /// the calendar holds now.
  pub async fn sync(
    &self,
    clinic_id: i64,
    window: TimeWindow,
    now_ms: i64
  ) -> ServiceResult<SyncOutcome> {
    let conn = self
      .connection(clinic_id, now_ms)
      .await?
      .ok_or(CalendarError::NotConnected)?;

    let tz = self.clinic_timezone(clinic_id).await?;

    let mut outcome = SyncOutcome::default();

    let pending = self
      .repo
      .unsynced_appointments(clinic_id, window)
      .await?;

    for appointment in &pending {
      match self.push_with(&conn, tz, appointment).await {
        | Ok(()) => outcome.pushed += 1,
        | Err(e) => {
          warn!(
            clinic_id,
            appointment_id = appointment.id,
            error = %e,
            "calendar push failed"
          );
          outcome.failed += 1;
        }
      }
    }

    let events = self
      .client
      .list_events(
        &conn.access_token,
        &conn.calendar_id,
        window,
        tz
      )
      .await?;

    let blocks: Vec<_> = events
      .iter()
      .filter_map(busy_block_from_event)
      .collect();

    outcome.imported = self
      .repo
      .replace_external_blocks(clinic_id, window, &blocks)
      .await?;

    self
      .repo
      .mark_calendar_synced(clinic_id, now_ms)
      .await?;

    info!(
      clinic_id,
      from = %format_epoch_ms(window.start_ms, &tz),
      to = %format_epoch_ms(window.end_ms, &tz),
      pushed = outcome.pushed,
      failed = outcome.failed,
      imported = outcome.imported,
      "calendar sync done"
    );

    Ok(outcome)
  }
}
