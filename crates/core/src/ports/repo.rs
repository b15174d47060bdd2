//! Persistence ports, one trait per
//! feature area. Every method is scoped
//! by clinic id.

use thiserror::Error;

use crate::domain::audit::{
  AuditEvent,
  AuditFilter,
  AuditPage,
  ConsentInput,
  ConsentRecord,
  NewAuditEvent
};
use crate::domain::calendar::CalendarConnection;
use crate::domain::costs::{
  Asset,
  AssetInput,
  ClinicService,
  FixedCost,
  FixedCostInput,
  ServiceInput,
  TimeSettings
};
use crate::domain::model::{
  Appointment,
  AppointmentUpdate,
  Clinic,
  ClinicSettings,
  Erasure,
  NewAppointment,
  NewPatient,
  Patient,
  Role,
  TenantContext,
  TenantSeed,
  User
};
use crate::domain::plans::Subscription;
use crate::domain::scheduling::{
  BusyBlock,
  TimeWindow
};

#[derive(Debug, Error)]

pub enum RepoError {
  #[error("{0} not found")]
  NotFound(&'static str),
  #[error("{0}")]
  Conflict(String),
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error)
}

impl RepoError {
  /// Postgres `23505` and SQLite `2067`
  /// / `1555` signal a unique violation.
  pub fn is_unique_violation(
    &self
  ) -> bool {
    matches!(
      self,
      RepoError::Database(sqlx::Error::Database(db_err))
        if matches!(
          db_err.code().as_deref(),
          Some("23505" | "2067" | "1555")
        )
    )
  }
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait::async_trait]
pub trait TenantRepo: Send + Sync {
  async fn resolve_token(
    &self,
    token_hash: &str,
    now_ms: i64
  ) -> RepoResult<Option<TenantContext>>;

  /// Creates the clinic, its owner and
  /// the token unless the token already
  /// exists.
  async fn ensure_seed(
    &self,
    seed: &TenantSeed,
    now_ms: i64
  ) -> RepoResult<TenantContext>;

  async fn clinic(
    &self,
    clinic_id: i64
  ) -> RepoResult<Clinic>;

  async fn update_clinic_settings(
    &self,
    clinic_id: i64,
    settings: &ClinicSettings
  ) -> RepoResult<Clinic>;

  async fn create_user(
    &self,
    clinic_id: i64,
    name: &str,
    email: Option<&str>,
    role: Role,
    now_ms: i64
  ) -> RepoResult<User>;

  /// Inserts the token or moves its
  /// expiry when the hash already exists.
  async fn store_token(
    &self,
    clinic_id: i64,
    user_id: i64,
    token_hash: &str,
    expires_at_ms: i64,
    now_ms: i64
  ) -> RepoResult<()>;

  async fn user(
    &self,
    clinic_id: i64,
    user_id: i64
  ) -> RepoResult<Option<User>>;

  async fn count_users(
    &self,
    clinic_id: i64
  ) -> RepoResult<i64>;

  async fn count_providers(
    &self,
    clinic_id: i64
  ) -> RepoResult<i64>;
}

#[async_trait::async_trait]
pub trait CostRepo: Send + Sync {
  async fn time_settings(
    &self,
    clinic_id: i64
  ) -> RepoResult<Option<TimeSettings>>;

  async fn save_time_settings(
    &self,
    clinic_id: i64,
    settings: &TimeSettings,
    now_ms: i64
  ) -> RepoResult<()>;

  async fn list_fixed_costs(
    &self,
    clinic_id: i64
  ) -> RepoResult<Vec<FixedCost>>;

  async fn create_fixed_cost(
    &self,
    clinic_id: i64,
    input: &FixedCostInput,
    now_ms: i64
  ) -> RepoResult<FixedCost>;

  async fn update_fixed_cost(
    &self,
    clinic_id: i64,
    id: i64,
    input: &FixedCostInput
  ) -> RepoResult<FixedCost>;

  async fn delete_fixed_cost(
    &self,
    clinic_id: i64,
    id: i64
  ) -> RepoResult<()>;

  async fn list_assets(
    &self,
    clinic_id: i64
  ) -> RepoResult<Vec<Asset>>;

  async fn create_asset(
    &self,
    clinic_id: i64,
    input: &AssetInput,
    now_ms: i64
  ) -> RepoResult<Asset>;

  async fn update_asset(
    &self,
    clinic_id: i64,
    id: i64,
    input: &AssetInput
  ) -> RepoResult<Asset>;

  async fn delete_asset(
    &self,
    clinic_id: i64,
    id: i64
  ) -> RepoResult<()>;

  async fn list_services(
    &self,
    clinic_id: i64
  ) -> RepoResult<Vec<ClinicService>>;

  async fn service(
    &self,
    clinic_id: i64,
    id: i64
  ) -> RepoResult<ClinicService>;

  async fn create_service(
    &self,
    clinic_id: i64,
    input: &ServiceInput,
    now_ms: i64
  ) -> RepoResult<ClinicService>;

  async fn update_service(
    &self,
    clinic_id: i64,
    id: i64,
    input: &ServiceInput
  ) -> RepoResult<ClinicService>;

  async fn delete_service(
    &self,
    clinic_id: i64,
    id: i64
  ) -> RepoResult<()>;
}

#[async_trait::async_trait]
pub trait PatientRepo: Send + Sync {
  async fn create_patient(
    &self,
    clinic_id: i64,
    input: &NewPatient,
    now_ms: i64
  ) -> RepoResult<Patient>;

  async fn patient(
    &self,
    clinic_id: i64,
    id: i64
  ) -> RepoResult<Patient>;

  async fn list_patients(
    &self,
    clinic_id: i64,
    include_erased: bool
  ) -> RepoResult<Vec<Patient>>;

  /// Patients not yet erased.
  async fn count_patients(
    &self,
    clinic_id: i64
  ) -> RepoResult<i64>;

  /// Replaces personal data with the
  /// erased marker and cancels the
  /// patient's future appointments.
  /// Erasing twice is a conflict.
  async fn erase_patient(
    &self,
    clinic_id: i64,
    id: i64,
    now_ms: i64
  ) -> RepoResult<Erasure>;
}

#[async_trait::async_trait]
pub trait AppointmentRepo: Send + Sync {
  async fn create_appointment(
    &self,
    input: &NewAppointment
  ) -> RepoResult<Appointment>;

  async fn appointment(
    &self,
    clinic_id: i64,
    id: i64
  ) -> RepoResult<Appointment>;

  async fn list_appointments(
    &self,
    clinic_id: i64,
    window: TimeWindow,
    provider_id: Option<i64>
  ) -> RepoResult<Vec<Appointment>>;

  async fn update_appointment(
    &self,
    clinic_id: i64,
    id: i64,
    update: &AppointmentUpdate
  ) -> RepoResult<Appointment>;

  /// Blocking appointments of the
  /// provider plus external blocks that
  /// intersect `window`.
  async fn busy_blocks(
    &self,
    clinic_id: i64,
    provider_id: i64,
    window: TimeWindow,
    exclude_appointment_id: Option<i64>
  ) -> RepoResult<Vec<BusyBlock>>;

  async fn set_google_event_id(
    &self,
    clinic_id: i64,
    id: i64,
    event_id: Option<&str>
  ) -> RepoResult<()>;

  /// Non-cancelled appointments in the
  /// window with no calendar event yet.
  async fn unsynced_appointments(
    &self,
    clinic_id: i64,
    window: TimeWindow
  ) -> RepoResult<Vec<Appointment>>;
}

#[async_trait::async_trait]
pub trait CalendarRepo: Send + Sync {
  async fn calendar_connection(
    &self,
    clinic_id: i64
  ) -> RepoResult<Option<CalendarConnection>>;

  async fn save_calendar_connection(
    &self,
    connection: &CalendarConnection,
    now_ms: i64
  ) -> RepoResult<()>;

  async fn update_calendar_tokens(
    &self,
    clinic_id: i64,
    access_token: &str,
    expires_at_ms: i64
  ) -> RepoResult<()>;

  /// Also drops imported busy blocks.
  async fn delete_calendar_connection(
    &self,
    clinic_id: i64
  ) -> RepoResult<bool>;

  async fn mark_calendar_synced(
    &self,
    clinic_id: i64,
    now_ms: i64
  ) -> RepoResult<()>;

  /// Replaces imported blocks starting
  /// inside `window` with `blocks`.
  async fn replace_external_blocks(
    &self,
    clinic_id: i64,
    window: TimeWindow,
    blocks: &[BusyBlock]
  ) -> RepoResult<usize>;
}

#[async_trait::async_trait]
pub trait AuditRepo: Send + Sync {
  async fn insert_audit_event(
    &self,
    event: &NewAuditEvent
  ) -> RepoResult<i64>;

  async fn list_audit_events(
    &self,
    clinic_id: i64,
    filter: &AuditFilter
  ) -> RepoResult<AuditPage>;

  /// Oldest first.
  async fn entity_history(
    &self,
    clinic_id: i64,
    entity_type: &str,
    entity_id: &str
  ) -> RepoResult<Vec<AuditEvent>>;

  /// Oldest first.
  async fn patient_events(
    &self,
    clinic_id: i64,
    patient_id: i64
  ) -> RepoResult<Vec<AuditEvent>>;

  async fn purge_audit_events(
    &self,
    clinic_id: i64,
    before_ms: i64
  ) -> RepoResult<u64>;

  async fn record_consent(
    &self,
    clinic_id: i64,
    patient_id: i64,
    input: &ConsentInput,
    recorded_by: Option<i64>,
    now_ms: i64
  ) -> RepoResult<ConsentRecord>;

  /// Full history, oldest first.
  async fn consents(
    &self,
    clinic_id: i64,
    patient_id: i64
  ) -> RepoResult<Vec<ConsentRecord>>;
}

#[async_trait::async_trait]
pub trait BillingRepo: Send + Sync {
  async fn subscription(
    &self,
    clinic_id: i64
  ) -> RepoResult<Option<Subscription>>;

  async fn save_subscription(
    &self,
    subscription: &Subscription
  ) -> RepoResult<()>;
}

/// Everything the server needs from
/// storage.
pub trait Repo:
  TenantRepo
  + CostRepo
  + PatientRepo
  + AppointmentRepo
  + CalendarRepo
  + AuditRepo
  + BillingRepo
{
}

impl<T> Repo for T where
  T: TenantRepo
    + CostRepo
    + PatientRepo
    + AppointmentRepo
    + CalendarRepo
    + AuditRepo
    + BillingRepo
{
}
