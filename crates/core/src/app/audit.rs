//! Writes to the audit trail and the
//! GDPR flows built on it: consent
//! changes, right of access, right to
//! erasure and retention purge.

use serde::Serialize;
use serde_json::json;
use tracing::{
  debug,
  info
};

use crate::app::{
  ServiceError,
  ServiceResult
};
use crate::domain::audit::{
  AccessReport,
  AuditAction,
  ConsentInput,
  ConsentRecord,
  NewAuditEvent,
  RequestMeta,
  MAX_RETENTION_DAYS,
  MIN_RETENTION_DAYS,
  current_consents,
  retention_cutoff
};
use crate::domain::model::{
  Erasure,
  TenantContext
};
use crate::ports::repo::{
  AuditRepo,
  PatientRepo,
  Repo
};

/// Event attributed to the caller.
pub fn event(
  ctx: &TenantContext,
  meta: &RequestMeta,
  action: AuditAction,
  entity_type: &str,
  now_ms: i64
) -> NewAuditEvent {
  NewAuditEvent::new(
    ctx.clinic_id,
    Some(ctx.user_id),
    action,
    entity_type,
    now_ms
  )
  .request(meta)
}

/// Redacts and stores one event.
pub async fn record(
  repo: &dyn Repo,
  event: NewAuditEvent
) -> ServiceResult<i64> {
  let event = event.redacted();

  let id = repo.insert_audit_event(&event).await?;

  debug!(
    clinic_id = event.clinic_id,
    audit_id = id,
    action = event.action.as_str(),
    entity_type = %event.entity_type,
    "audit event recorded"
  );

  Ok(id)
}

pub async fn record_consent(
  repo: &dyn Repo,
  ctx: &TenantContext,
  meta: &RequestMeta,
  patient_id: i64,
  input: &ConsentInput,
  now_ms: i64
) -> ServiceResult<ConsentRecord> {
  let patient =
    repo.patient(ctx.clinic_id, patient_id).await?;

  if patient.is_erased() {
    return Err(ServiceError::Invalid(
      "patient has been erased".to_string()
    ));
  }

  let consent = repo
    .record_consent(
      ctx.clinic_id,
      patient_id,
      input,
      Some(ctx.user_id),
      now_ms
    )
    .await?;

  record(
    repo,
    event(
      ctx,
      meta,
      input.audit_action(),
      "consent",
      now_ms
    )
    .entity(consent.id)
    .patient(patient_id)
    .metadata(json!({ "kind": input.kind.as_str() }))
  )
  .await?;

  Ok(consent)
}

/// Everything held about one patient.
/// Producing it is itself recorded as an
/// export, after the events are read.
pub async fn access_report(
  repo: &dyn Repo,
  ctx: &TenantContext,
  meta: &RequestMeta,
  patient_id: i64,
  now_ms: i64
) -> ServiceResult<AccessReport> {
  let patient =
    repo.patient(ctx.clinic_id, patient_id).await?;

  let consent_history =
    repo.consents(ctx.clinic_id, patient_id).await?;

  let events = repo
    .patient_events(ctx.clinic_id, patient_id)
    .await?;

  record(
    repo,
    event(
      ctx,
      meta,
      AuditAction::Export,
      "patient",
      now_ms
    )
    .entity(patient_id)
    .patient(patient_id)
    .metadata(json!({
      "events": events.len(),
      "consents": consent_history.len(),
    }))
  )
  .await?;

  Ok(AccessReport {
    patient,
    consents: current_consents(&consent_history),
    consent_history,
    events,
    generated_at_ms: now_ms
  })
}

pub async fn erase_patient(
  repo: &dyn Repo,
  ctx: &TenantContext,
  meta: &RequestMeta,
  patient_id: i64,
  now_ms: i64
) -> ServiceResult<Erasure> {
  let erasure = repo
    .erase_patient(ctx.clinic_id, patient_id, now_ms)
    .await?;

  record(
    repo,
    event(
      ctx,
      meta,
      AuditAction::Erase,
      "patient",
      now_ms
    )
    .entity(patient_id)
    .patient(patient_id)
    .metadata(json!({
      "cancelled_appointments": erasure.cancelled.len(),
    }))
  )
  .await?;

  Ok(erasure)
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize,
)]

pub struct PurgeOutcome {
  pub deleted:        u64,
  pub cutoff_ms:      i64,
  pub retention_days: i64
}

/// Deletes events older than the
/// retention window. The purge event is
/// written afterwards so it survives.
pub async fn purge(
  repo: &dyn Repo,
  ctx: &TenantContext,
  meta: &RequestMeta,
  retention_days: i64,
  now_ms: i64
) -> ServiceResult<PurgeOutcome> {
  let cutoff_ms = retention_cutoff(
    now_ms,
    retention_days
  )
  .ok_or_else(|| {
    ServiceError::Invalid(format!(
      "retention_days must be between {} and {}",
      MIN_RETENTION_DAYS,
      MAX_RETENTION_DAYS
    ))
  })?;

  let deleted = repo
    .purge_audit_events(ctx.clinic_id, cutoff_ms)
    .await?;

  record(
    repo,
    event(
      ctx,
      meta,
      AuditAction::Purge,
      "audit_log",
      now_ms
    )
    .metadata(json!({
      "retention_days": retention_days,
      "cutoff_ms": cutoff_ms,
      "deleted": deleted,
    }))
  )
  .await?;

  info!(
    clinic_id = ctx.clinic_id,
    deleted,
    retention_days,
    "audit events purged"
  );

  Ok(PurgeOutcome {
    deleted,
    cutoff_ms,
    retention_days
  })
}
