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
use clinicdesk_core::app::scheduling::{
  AppointmentInput,
  AppointmentPatch,
  SlotRequest,
  SuggestionQuery,
  book,
  suggest,
  update,
  validate
};
use clinicdesk_core::domain::model::Appointment;
use clinicdesk_core::domain::scheduling::{
  DAY_MS,
  TimeWindow,
  ValidationReport
};
use clinicdesk_core::ports::repo::AppointmentRepo;

use crate::app_state::AppState;
use crate::auth::{
  request_meta,
  tenant
};
use crate::errors::ServerError;
use crate::models::AppointmentListQuery;

const DEFAULT_LIST_DAYS: i64 = 7;

/// Mirrors the appointment to the
/// connected calendar. Failures are
/// logged, never returned.
async fn push_to_calendar(
  state: &AppState,
  appointment: &Appointment
) {
  let Ok(sync) = state.calendar_sync() else {
    return;
  };

  if let Err(e) = sync
    .push_appointment(appointment, state.now_ms())
    .await
  {
    tracing::warn!(
      clinic_id = appointment.clinic_id,
      appointment_id = appointment.id,
      error = %e,
      "calendar push failed"
    );
  }
}

pub async fn create_appointment(
  State(state): State<AppState>,
  headers: HeaderMap,
  Json(payload): Json<AppointmentInput>
) -> Result<(StatusCode, Json<Appointment>), ServerError>
{
  let ctx = tenant(&state, &headers).await?;

  let appointment = book(
    state.repo.as_ref(),
    &state.rules,
    &ctx,
    &request_meta(&headers),
    &payload,
    state.now_ms()
  )
  .await?;

  push_to_calendar(&state, &appointment).await;

  Ok((StatusCode::CREATED, Json(appointment)))
}

pub async fn list_appointments(
  State(state): State<AppState>,
  headers: HeaderMap,
  Query(query): Query<AppointmentListQuery>
) -> Result<Json<Vec<Appointment>>, ServerError> {
  let ctx = tenant(&state, &headers).await?;

  let from_ms =
    query.from_ms.unwrap_or_else(|| state.now_ms());

  let to_ms = query.to_ms.unwrap_or(
    from_ms.saturating_add(DEFAULT_LIST_DAYS * DAY_MS)
  );

  let window = TimeWindow::new(from_ms, to_ms);

  if window.is_empty() {
    return Err(ServerError::bad_request(
      "to_ms must be after from_ms"
    ));
  }

  let rows = state
    .repo
    .list_appointments(
      ctx.clinic_id,
      window,
      query.provider_id
    )
    .await?;

  Ok(Json(rows))
}

pub async fn appointment_detail(
  State(state): State<AppState>,
  headers: HeaderMap,
  AxumPath(appointment_id): AxumPath<i64>
) -> Result<Json<Appointment>, ServerError> {
  let ctx = tenant(&state, &headers).await?;

  let row = state
    .repo
    .appointment(ctx.clinic_id, appointment_id)
    .await?;

  Ok(Json(row))
}

pub async fn update_appointment(
  State(state): State<AppState>,
  headers: HeaderMap,
  AxumPath(appointment_id): AxumPath<i64>,
  Json(payload): Json<AppointmentPatch>
) -> Result<Json<Appointment>, ServerError> {
  let ctx = tenant(&state, &headers).await?;

  let appointment = update(
    state.repo.as_ref(),
    &state.rules,
    &ctx,
    &request_meta(&headers),
    appointment_id,
    &payload,
    state.now_ms()
  )
  .await?;

  push_to_calendar(&state, &appointment).await;

  Ok(Json(appointment))
}

/// Dry run of the booking checks. An
/// invalid window is a 200 with
/// `valid: false`.
pub async fn validate_slot(
  State(state): State<AppState>,
  headers: HeaderMap,
  Json(payload): Json<SlotRequest>
) -> Result<Json<ValidationReport>, ServerError> {
  let ctx = tenant(&state, &headers).await?;

  let report = validate(
    state.repo.as_ref(),
    &state.rules,
    ctx.clinic_id,
    &payload,
    state.now_ms()
  )
  .await?;

  Ok(Json(report))
}

pub async fn suggestions(
  State(state): State<AppState>,
  headers: HeaderMap,
  Query(query): Query<SuggestionQuery>
) -> Result<Json<Vec<TimeWindow>>, ServerError> {
  let ctx = tenant(&state, &headers).await?;

  let slots = suggest(
    state.repo.as_ref(),
    &state.rules,
    ctx.clinic_id,
    &query,
    state.now_ms()
  )
  .await?;

  Ok(Json(slots))
}
