//! Domain models shared by every
//! feature area: tenancy, patients and
//! appointments.

use std::str::FromStr;

use serde::{
  Deserialize,
  Serialize
};
use thiserror::Error;

use crate::domain::scheduling::{
  ScheduleError,
  TimeWindow,
  format_hhmm,
  format_working_days,
  parse_hhmm,
  parse_working_days
};

/// Text stored in the database that
/// does not name a known variant.
#[derive(Debug, Clone, Error)]
#[error("unknown {kind} '{value}'")]

pub struct ParseEnumError {
  pub kind:  &'static str,
  pub value: String
}

impl ParseEnumError {
  pub fn new(
    kind: &'static str,
    value: impl Into<String>
  ) -> Self {
    Self {
      kind,
      value: value.into()
    }
  }
}

#[derive(Debug, Clone, Error)]
#[error("{0}")]

pub struct ValidationError(pub String);

impl ValidationError {
  pub fn new(
    message: impl Into<String>
  ) -> Self {
    Self(message.into())
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "snake_case")]

pub enum Role {
  Owner,
  Admin,
  Dentist,
  Staff
}

impl Role {
  pub fn as_str(self) -> &'static str {
    match self {
      | Role::Owner => "owner",
      | Role::Admin => "admin",
      | Role::Dentist => "dentist",
      | Role::Staff => "staff"
    }
  }

  /// Owners and admins manage costs,
  /// billing, audit and integrations.
  pub fn is_manager(self) -> bool {
    matches!(
      self,
      Role::Owner | Role::Admin
    )
  }

  /// Roles that can have appointments
  /// booked against them.
  pub fn is_provider(self) -> bool {
    matches!(
      self,
      Role::Owner | Role::Dentist
    )
  }
}

impl FromStr for Role {
  type Err = ParseEnumError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s.trim() {
      | "owner" => Ok(Role::Owner),
      | "admin" => Ok(Role::Admin),
      | "dentist" => Ok(Role::Dentist),
      | "staff" => Ok(Role::Staff),
      | other => {
        Err(ParseEnumError::new(
          "role", other
        ))
      }
    }
  }
}

impl TryFrom<String> for Role {
  type Error = ParseEnumError;

  fn try_from(
    value: String
  ) -> Result<Self, Self::Error> {
    value.parse()
  }
}

/// Who is calling, resolved from the
/// bearer token. Every query is scoped
/// by `clinic_id`.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize,
)]

pub struct TenantContext {
  pub clinic_id: i64,
  pub user_id:   i64,
  pub role:      Role
}

#[derive(
  Debug, Clone, Serialize, sqlx::FromRow,
)]

pub struct Clinic {
  pub id:            i64,
  pub name:          String,
  pub timezone:      String,
  pub open_minute:   i64,
  pub close_minute:  i64,
  pub working_days:  String,
  pub created_at_ms: i64
}

/// Validated clinic settings ready to
/// be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]

pub struct ClinicSettings {
  pub timezone:     String,
  pub open_minute:  i64,
  pub close_minute: i64,
  pub working_days: String
}

#[derive(Debug, Clone, Deserialize)]

pub struct ClinicSettingsInput {
  pub timezone:     String,
  pub open:         String,
  pub close:        String,
  pub working_days: Vec<String>
}

impl ClinicSettingsInput {
  pub fn validate(
    &self
  ) -> Result<ClinicSettings, ScheduleError>
  {
    let timezone = self.timezone.trim();

    timezone
      .parse::<chrono_tz::Tz>()
      .map_err(|_| {
        ScheduleError::InvalidTimezone(
          timezone.to_string()
        )
      })?;

    let open_minute =
      parse_hhmm(&self.open)?;

    let close_minute =
      parse_hhmm(&self.close)?;

    if open_minute >= close_minute {
      return Err(
        ScheduleError::InvalidHours
      );
    }

    let days = parse_working_days(
      &self.working_days.join(",")
    )?;

    Ok(ClinicSettings {
      timezone: timezone.to_string(),
      open_minute,
      close_minute,
      working_days: format_working_days(
        &days
      )
    })
  }
}

#[derive(Debug, Clone, Serialize)]

pub struct ClinicSettingsView {
  pub clinic_id:    i64,
  pub name:         String,
  pub timezone:     String,
  pub open:         String,
  pub close:        String,
  pub working_days: Vec<String>
}

impl From<&Clinic> for ClinicSettingsView {
  fn from(clinic: &Clinic) -> Self {
    Self {
      clinic_id:    clinic.id,
      name:         clinic.name.clone(),
      timezone:     clinic
        .timezone
        .clone(),
      open:         format_hhmm(
        clinic.open_minute
      ),
      close:        format_hhmm(
        clinic.close_minute
      ),
      working_days: clinic
        .working_days
        .split(',')
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .collect()
    }
  }
}

#[derive(
  Debug, Clone, Serialize, sqlx::FromRow,
)]

pub struct User {
  pub id:            i64,
  pub clinic_id:     i64,
  pub name:          String,
  pub email:         Option<String>,
  #[sqlx(try_from = "String")]
  pub role:          Role,
  pub created_at_ms: i64
}

/// Initial tenant created at startup
/// from configuration.
#[derive(Debug, Clone)]

pub struct TenantSeed {
  pub clinic_name:         String,
  pub timezone:            String,
  pub owner_name:          String,
  pub owner_email:         Option<String>,
  pub token_hash:          String,
  pub token_expires_at_ms: i64
}

pub const ERASED_MARKER: &str = "erased";

#[derive(
  Debug, Clone, Serialize, sqlx::FromRow,
)]

pub struct Patient {
  pub id:            i64,
  pub clinic_id:     i64,
  pub first_name:    String,
  pub last_name:     String,
  pub email:         Option<String>,
  pub phone:         Option<String>,
  pub created_at_ms: i64,
  pub erased_at_ms:  Option<i64>
}

impl Patient {
  pub fn is_erased(&self) -> bool {
    self.erased_at_ms.is_some()
  }

  pub fn display_name(&self) -> String {
    format!(
      "{} {}",
      self.first_name, self.last_name
    )
  }
}

#[derive(Debug, Clone, Deserialize)]

pub struct NewPatient {
  pub first_name: String,
  pub last_name:  String,
  pub email:      Option<String>,
  pub phone:      Option<String>
}

impl NewPatient {
  /// Trims every field and drops empty
  /// optional contact details.
  pub fn normalized(
    &self
  ) -> Result<Self, ValidationError> {
    let first_name =
      self.first_name.trim();

    let last_name = self.last_name.trim();

    if first_name.is_empty()
      || last_name.is_empty()
    {
      return Err(ValidationError::new(
        "first_name and last_name \
         required"
      ));
    }

    let email = clean_optional(
      self.email.as_deref()
    );

    if let Some(email) = &email
      && !email.contains('@')
    {
      return Err(ValidationError::new(
        "email is not valid"
      ));
    }

    Ok(Self {
      first_name: first_name.to_string(),
      last_name: last_name.to_string(),
      email,
      phone: clean_optional(
        self.phone.as_deref()
      )
    })
  }
}

fn clean_optional(
  raw: Option<&str>
) -> Option<String> {
  raw
    .map(str::trim)
    .filter(|v| !v.is_empty())
    .map(str::to_string)
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "snake_case")]

pub enum AppointmentStatus {
  Scheduled,
  Confirmed,
  Completed,
  Cancelled,
  NoShow
}

impl AppointmentStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      | AppointmentStatus::Scheduled => {
        "scheduled"
      }
      | AppointmentStatus::Confirmed => {
        "confirmed"
      }
      | AppointmentStatus::Completed => {
        "completed"
      }
      | AppointmentStatus::Cancelled => {
        "cancelled"
      }
      | AppointmentStatus::NoShow => {
        "no_show"
      }
    }
  }

  /// Cancelled appointments free their
  /// slot; everything else keeps it.
  pub fn blocks_time(self) -> bool {
    self != AppointmentStatus::Cancelled
  }
}

impl FromStr for AppointmentStatus {
  type Err = ParseEnumError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s.trim() {
      | "scheduled" => Ok(Self::Scheduled),
      | "confirmed" => Ok(Self::Confirmed),
      | "completed" => Ok(Self::Completed),
      | "cancelled" => Ok(Self::Cancelled),
      | "no_show" => Ok(Self::NoShow),
      | other => {
        Err(ParseEnumError::new(
          "appointment status",
          other
        ))
      }
    }
  }
}

impl TryFrom<String> for AppointmentStatus {
  type Error = ParseEnumError;

  fn try_from(
    value: String
  ) -> Result<Self, Self::Error> {
    value.parse()
  }
}

#[derive(
  Debug, Clone, Serialize, sqlx::FromRow,
)]

pub struct Appointment {
  pub id:              i64,
  pub clinic_id:       i64,
  pub patient_id:      i64,
  pub provider_id:     i64,
  pub service_id:      Option<i64>,
  pub starts_at_ms:    i64,
  pub ends_at_ms:      i64,
  #[sqlx(try_from = "String")]
  pub status:          AppointmentStatus,
  pub notes:           Option<String>,
  pub google_event_id: Option<String>,
  pub created_at_ms:   i64,
  pub updated_at_ms:   i64
}

impl Appointment {
  pub fn window(&self) -> TimeWindow {
    TimeWindow::new(
      self.starts_at_ms,
      self.ends_at_ms
    )
  }
}

#[derive(Debug, Clone)]

pub struct NewAppointment {
  pub clinic_id:     i64,
  pub patient_id:    i64,
  pub provider_id:   i64,
  pub service_id:    Option<i64>,
  pub starts_at_ms:  i64,
  pub ends_at_ms:    i64,
  pub notes:         Option<String>,
  pub created_at_ms: i64
}

/// Full replacement of the mutable
/// appointment columns.
#[derive(Debug, Clone)]

pub struct AppointmentUpdate {
  pub starts_at_ms:  i64,
  pub ends_at_ms:    i64,
  pub status:        AppointmentStatus,
  pub notes:         Option<String>,
  pub updated_at_ms: i64
}

/// Result of erasing a patient.
#[derive(Debug, Clone, Serialize)]

pub struct Erasure {
  pub patient:   Patient,
  pub cancelled: Vec<Appointment>
}
