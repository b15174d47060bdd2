//! Appointment booking on top of the
//! pure validator: loads the clinic's
//! hours and the provider's busy blocks,
//! then checks, persists and audits.

use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::app::audit::{
  event,
  record
};
use crate::app::{
  ServiceError,
  ServiceResult
};
use crate::domain::audit::{
  AuditAction,
  RequestMeta
};
use crate::domain::model::{
  Appointment,
  AppointmentStatus,
  AppointmentUpdate,
  NewAppointment,
  TenantContext
};
use crate::domain::scheduling::{
  DAY_MS,
  MINUTE_MS,
  SchedulingRules,
  TimeWindow,
  ValidationReport,
  WorkingHours,
  suggest_slots,
  validate_window
};
use crate::ports::repo::{
  AppointmentRepo,
  CostRepo,
  PatientRepo,
  Repo,
  TenantRepo
};

/// A window to check for one provider.
#[derive(Debug, Clone, Deserialize)]

pub struct SlotRequest {
  pub provider_id:            i64,
  pub starts_at_ms:           i64,
  pub ends_at_ms:             i64,
  #[serde(default)]
  pub exclude_appointment_id: Option<i64>
}

#[derive(Debug, Clone, Deserialize)]

pub struct SuggestionQuery {
  pub provider_id:      i64,
  pub duration_minutes: i64,
  pub from_ms:          Option<i64>,
  pub limit:            Option<usize>
}

/// Booking request. The duration comes
/// from the service when not given.
#[derive(Debug, Clone, Deserialize)]

pub struct AppointmentInput {
  pub patient_id:       i64,
  pub provider_id:      i64,
  pub service_id:       Option<i64>,
  pub starts_at_ms:     i64,
  pub duration_minutes: Option<i64>,
  pub notes:            Option<String>
}

/// Partial change. Moving the start
/// keeps the current duration unless one
/// is given.
#[derive(Debug, Clone, Default, Deserialize)]

pub struct AppointmentPatch {
  pub starts_at_ms:     Option<i64>,
  pub duration_minutes: Option<i64>,
  pub status:           Option<AppointmentStatus>,
  pub notes:            Option<String>
}

async fn working_hours(
  repo: &dyn Repo,
  clinic_id: i64
) -> ServiceResult<WorkingHours> {
  let clinic = repo.clinic(clinic_id).await?;

  Ok(WorkingHours::from_clinic(&clinic)?)
}

async fn ensure_provider(
  repo: &dyn Repo,
  clinic_id: i64,
  provider_id: i64
) -> ServiceResult<()> {
  let user = repo
    .user(clinic_id, provider_id)
    .await?
    .ok_or_else(|| {
      ServiceError::Invalid(format!(
        "provider {provider_id} not found"
      ))
    })?;

  if !user.role.is_provider() {
    return Err(ServiceError::Invalid(format!(
      "user {provider_id} cannot take appointments"
    )));
  }

  Ok(())
}

/// Checks a window against every
/// scheduling rule. Never fails on an
/// invalid window; that is reported.
pub async fn validate(
  repo: &dyn Repo,
  rules: &SchedulingRules,
  clinic_id: i64,
  request: &SlotRequest,
  now_ms: i64
) -> ServiceResult<ValidationReport> {
  ensure_provider(repo, clinic_id, request.provider_id)
    .await?;

  let hours = working_hours(repo, clinic_id).await?;

  let window = TimeWindow::new(
    request.starts_at_ms,
    request.ends_at_ms
  );

  let busy = repo
    .busy_blocks(
      clinic_id,
      request.provider_id,
      window.widened(buffer_ms(rules)),
      request.exclude_appointment_id
    )
    .await?;

  Ok(validate_window(
    window, rules, &hours, now_ms, &busy
  ))
}

fn buffer_ms(rules: &SchedulingRules) -> i64 {
  rules.buffer_minutes.max(0).saturating_mul(MINUTE_MS)
}

fn checked_window(
  starts_at_ms: i64,
  minutes: i64
) -> ServiceResult<TimeWindow> {
  TimeWindow::from_duration(starts_at_ms, minutes).ok_or_else(
    || {
      ServiceError::Invalid(
        "appointment window is out of range".to_string()
      )
    }
  )
}

fn check_duration(
  rules: &SchedulingRules,
  minutes: i64
) -> ServiceResult<()> {
  if minutes < rules.min_duration_minutes
    || minutes > rules.max_duration_minutes
  {
    return Err(ServiceError::Invalid(format!(
      "duration_minutes must be between {} and {}",
      rules.min_duration_minutes,
      rules.max_duration_minutes
    )));
  }

  Ok(())
}

pub async fn suggest(
  repo: &dyn Repo,
  rules: &SchedulingRules,
  clinic_id: i64,
  query: &SuggestionQuery,
  now_ms: i64
) -> ServiceResult<Vec<TimeWindow>> {
  check_duration(rules, query.duration_minutes)?;

  ensure_provider(repo, clinic_id, query.provider_id)
    .await?;

  let hours = working_hours(repo, clinic_id).await?;

  let from_ms = query.from_ms.unwrap_or(now_ms);

  let start = from_ms.max(now_ms);

  // one extra day covers the local/UTC
  // offset of the last scanned day
  let days = rules.suggestion_days.max(0).saturating_add(1);

  let range = TimeWindow::new(
    start,
    start.saturating_add(days.saturating_mul(DAY_MS))
  )
  .widened(buffer_ms(rules));

  let busy = repo
    .busy_blocks(clinic_id, query.provider_id, range, None)
    .await?;

  Ok(suggest_slots(
    from_ms,
    query.duration_minutes,
    query.limit.unwrap_or(rules.max_suggestions),
    rules,
    &hours,
    now_ms,
    &busy
  ))
}

pub async fn book(
  repo: &dyn Repo,
  rules: &SchedulingRules,
  ctx: &TenantContext,
  meta: &RequestMeta,
  input: &AppointmentInput,
  now_ms: i64
) -> ServiceResult<Appointment> {
  let patient = repo
    .patient(ctx.clinic_id, input.patient_id)
    .await?;

  if patient.is_erased() {
    return Err(ServiceError::Invalid(
      "patient has been erased".to_string()
    ));
  }

  let service_minutes = match input.service_id {
    | Some(id) => {
      Some(
        repo
          .service(ctx.clinic_id, id)
          .await?
          .duration_minutes
      )
    }
    | None => None
  };

  let minutes = input
    .duration_minutes
    .or(service_minutes)
    .ok_or_else(|| {
      ServiceError::Invalid(
        "duration_minutes or service_id required"
          .to_string()
      )
    })?;

  let window =
    checked_window(input.starts_at_ms, minutes)?;

  let report = validate(
    repo,
    rules,
    ctx.clinic_id,
    &SlotRequest {
      provider_id:            input.provider_id,
      starts_at_ms:           window.start_ms,
      ends_at_ms:             window.end_ms,
      exclude_appointment_id: None
    },
    now_ms
  )
  .await?;

  if !report.valid {
    return Err(ServiceError::Rejected(report));
  }

  let appointment = repo
    .create_appointment(&NewAppointment {
      clinic_id:     ctx.clinic_id,
      patient_id:    input.patient_id,
      provider_id:   input.provider_id,
      service_id:    input.service_id,
      starts_at_ms:  window.start_ms,
      ends_at_ms:    window.end_ms,
      notes:         clean_notes(input.notes.as_deref()),
      created_at_ms: now_ms
    })
    .await?;

  record(
    repo,
    event(
      ctx,
      meta,
      AuditAction::Create,
      "appointment",
      now_ms
    )
    .entity(appointment.id)
    .patient(appointment.patient_id)
    .metadata(json!({
      "provider_id": appointment.provider_id,
      "service_id": appointment.service_id,
      "starts_at_ms": appointment.starts_at_ms,
      "ends_at_ms": appointment.ends_at_ms,
    }))
  )
  .await?;

  info!(
    clinic_id = ctx.clinic_id,
    appointment_id = appointment.id,
    provider_id = appointment.provider_id,
    "appointment booked"
  );

  Ok(appointment)
}

/// Applies a patch. A move, or a status
/// change that starts blocking time
/// again, is re-validated with the
/// appointment itself excluded.
pub async fn update(
  repo: &dyn Repo,
  rules: &SchedulingRules,
  ctx: &TenantContext,
  meta: &RequestMeta,
  id: i64,
  patch: &AppointmentPatch,
  now_ms: i64
) -> ServiceResult<Appointment> {
  let current = repo.appointment(ctx.clinic_id, id).await?;

  let minutes = patch
    .duration_minutes
    .unwrap_or(current.window().duration_minutes());

  if minutes < 1 {
    return Err(ServiceError::Invalid(
      "duration_minutes must be at least 1"
        .to_string()
    ));
  }

  let starts_at_ms =
    patch.starts_at_ms.unwrap_or(current.starts_at_ms);

  let window = checked_window(starts_at_ms, minutes)?;

  let status = patch.status.unwrap_or(current.status);

  let moved = window != current.window();

  let reblocks = status.blocks_time()
    && !current.status.blocks_time();

  if status.blocks_time() && (moved || reblocks) {
    let report = validate(
      repo,
      rules,
      ctx.clinic_id,
      &SlotRequest {
        provider_id:            current.provider_id,
        starts_at_ms:           window.start_ms,
        ends_at_ms:             window.end_ms,
        exclude_appointment_id: Some(id)
      },
      now_ms
    )
    .await?;

    if !report.valid {
      return Err(ServiceError::Rejected(report));
    }
  }

  let notes = match &patch.notes {
    | Some(n) => clean_notes(Some(n)),
    | None => current.notes.clone()
  };

  let updated = repo
    .update_appointment(ctx.clinic_id, id, &AppointmentUpdate {
      starts_at_ms: window.start_ms,
      ends_at_ms: window.end_ms,
      status,
      notes,
      updated_at_ms: now_ms
    })
    .await?;

  record(
    repo,
    event(
      ctx,
      meta,
      AuditAction::Update,
      "appointment",
      now_ms
    )
    .entity(id)
    .patient(updated.patient_id)
    .metadata(json!({
      "status": {
        "from": current.status.as_str(),
        "to": updated.status.as_str(),
      },
      "starts_at_ms": {
        "from": current.starts_at_ms,
        "to": updated.starts_at_ms,
      },
      "ends_at_ms": {
        "from": current.ends_at_ms,
        "to": updated.ends_at_ms,
      },
    }))
  )
  .await?;

  Ok(updated)
}

fn clean_notes(raw: Option<&str>) -> Option<String> {
  raw
    .map(str::trim)
    .filter(|n| !n.is_empty())
    .map(str::to_string)
}
