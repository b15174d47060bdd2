use axum::Json;
use axum::extract::{
  Path as AxumPath,
  Query,
  State
};
use axum::http::{
  HeaderMap,
  StatusCode
};
use clinicdesk_core::app::audit::{
  access_report as build_access_report,
  erase_patient,
  event,
  record,
  record_consent as store_consent
};
use clinicdesk_core::app::billing::ensure_patient_capacity;
use clinicdesk_core::domain::audit::{
  AccessReport,
  AuditAction,
  ConsentInput,
  ConsentRecord,
  current_consents
};
use clinicdesk_core::domain::model::{
  NewPatient,
  Patient
};
use clinicdesk_core::ports::repo::{
  AuditRepo,
  PatientRepo
};
use serde_json::json;

use crate::app_state::AppState;
use crate::auth::{
  request_meta,
  require_manager,
  tenant
};
use crate::errors::ServerError;
use crate::models::{
  ConsentsResponse,
  ErasureResponse,
  PatientListQuery
};

pub async fn create_patient(
  State(state): State<AppState>,
  headers: HeaderMap,
  Json(payload): Json<NewPatient>
) -> Result<(StatusCode, Json<Patient>), ServerError> {
  let ctx = tenant(&state, &headers).await?;

  let input = payload.normalized()?;

  let now_ms = state.now_ms();

  ensure_patient_capacity(
    state.repo.as_ref(),
    &state.plans,
    ctx.clinic_id,
    now_ms
  )
  .await?;

  let patient = state
    .repo
    .create_patient(ctx.clinic_id, &input, now_ms)
    .await?;

  record(
    state.repo.as_ref(),
    event(
      &ctx,
      &request_meta(&headers),
      AuditAction::Create,
      "patient",
      now_ms
    )
    .entity(patient.id)
    .patient(patient.id)
    .metadata(json!({
      "has_email": patient.email.is_some(),
      "has_phone": patient.phone.is_some(),
    }))
  )
  .await?;

  tracing::info!(
    clinic_id = ctx.clinic_id,
    patient_id = patient.id,
    "patient created"
  );

  Ok((StatusCode::CREATED, Json(patient)))
}

pub async fn list_patients(
  State(state): State<AppState>,
  headers: HeaderMap,
  Query(query): Query<PatientListQuery>
) -> Result<Json<Vec<Patient>>, ServerError> {
  let ctx = tenant(&state, &headers).await?;

  let patients = state
    .repo
    .list_patients(
      ctx.clinic_id,
      query.include_erased
    )
    .await?;

  record(
    state.repo.as_ref(),
    event(
      &ctx,
      &request_meta(&headers),
      AuditAction::Read,
      "patient",
      state.now_ms()
    )
    .metadata(json!({
      "count": patients.len(),
      "include_erased": query.include_erased,
    }))
  )
  .await?;

  Ok(Json(patients))
}

/// Every read of a patient record lands
/// in the audit trail.
pub async fn patient_detail(
  State(state): State<AppState>,
  headers: HeaderMap,
  AxumPath(patient_id): AxumPath<i64>
) -> Result<Json<Patient>, ServerError> {
  let ctx = tenant(&state, &headers).await?;

  let patient = state
    .repo
    .patient(ctx.clinic_id, patient_id)
    .await?;

  record(
    state.repo.as_ref(),
    event(
      &ctx,
      &request_meta(&headers),
      AuditAction::Read,
      "patient",
      state.now_ms()
    )
    .entity(patient_id)
    .patient(patient_id)
  )
  .await?;

  Ok(Json(patient))
}

/// Right to erasure. Events of the
/// cancelled appointments are removed
/// from the connected calendar.
pub async fn erase(
  State(state): State<AppState>,
  headers: HeaderMap,
  AxumPath(patient_id): AxumPath<i64>
) -> Result<Json<ErasureResponse>, ServerError> {
  let ctx = tenant(&state, &headers).await?;

  require_manager(&ctx)?;

  let now_ms = state.now_ms();

  let erasure = erase_patient(
    state.repo.as_ref(),
    &ctx,
    &request_meta(&headers),
    patient_id,
    now_ms
  )
  .await?;

  let mut removed = 0;

  if let Ok(sync) = state.calendar_sync() {
    for appointment in erasure
      .cancelled
      .iter()
      .filter(|a| a.google_event_id.is_some())
    {
      match sync
        .push_appointment(appointment, now_ms)
        .await
      {
        | Ok(true) => removed += 1,
        | Ok(false) => break,
        | Err(e) => {
          tracing::warn!(
            clinic_id = ctx.clinic_id,
            appointment_id = appointment.id,
            error = %e,
            "calendar event removal failed"
          );
        }
      }
    }
  }

  Ok(Json(ErasureResponse {
    patient_id,
    erased_at_ms: erasure.patient.erased_at_ms,
    cancelled_appointments: erasure.cancelled.len(),
    calendar_events_removed: removed
  }))
}

pub async fn list_consents(
  State(state): State<AppState>,
  headers: HeaderMap,
  AxumPath(patient_id): AxumPath<i64>
) -> Result<Json<ConsentsResponse>, ServerError> {
  let ctx = tenant(&state, &headers).await?;

  state
    .repo
    .patient(ctx.clinic_id, patient_id)
    .await?;

  let history = state
    .repo
    .consents(ctx.clinic_id, patient_id)
    .await?;

  Ok(Json(ConsentsResponse {
    current: current_consents(&history),
    history
  }))
}

pub async fn record_consent(
  State(state): State<AppState>,
  headers: HeaderMap,
  AxumPath(patient_id): AxumPath<i64>,
  Json(payload): Json<ConsentInput>
) -> Result<(StatusCode, Json<ConsentRecord>), ServerError>
{
  let ctx = tenant(&state, &headers).await?;

  let consent = store_consent(
    state.repo.as_ref(),
    &ctx,
    &request_meta(&headers),
    patient_id,
    &payload,
    state.now_ms()
  )
  .await?;

  Ok((StatusCode::CREATED, Json(consent)))
}

/// Right of access.
pub async fn access_report(
  State(state): State<AppState>,
  headers: HeaderMap,
  AxumPath(patient_id): AxumPath<i64>
) -> Result<Json<AccessReport>, ServerError> {
  let ctx = tenant(&state, &headers).await?;

  require_manager(&ctx)?;

  let report = build_access_report(
    state.repo.as_ref(),
    &ctx,
    &request_meta(&headers),
    patient_id,
    state.now_ms()
  )
  .await?;

  Ok(Json(report))
}
