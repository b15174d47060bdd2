use axum::Json;
use axum::extract::{
  Path as AxumPath,
  Query,
  State
};
use axum::http::HeaderMap;
use clinicdesk_core::app::audit::{
  PurgeOutcome,
  purge as purge_events
};
use clinicdesk_core::domain::audit::{
  AuditEvent,
  AuditFilter,
  AuditPage
};
use clinicdesk_core::ports::repo::AuditRepo;

use crate::app_state::AppState;
use crate::auth::{
  request_meta,
  require_manager,
  require_owner,
  tenant
};
use crate::errors::ServerError;
use crate::models::PurgeRequest;

/// Newest first, paginated.
pub async fn list_events(
  State(state): State<AppState>,
  headers: HeaderMap,
  Query(filter): Query<AuditFilter>
) -> Result<Json<AuditPage>, ServerError> {
  let ctx = tenant(&state, &headers).await?;

  require_manager(&ctx)?;

  let page = state
    .repo
    .list_audit_events(ctx.clinic_id, &filter)
    .await?;

  Ok(Json(page))
}

pub async fn entity_history(
  State(state): State<AppState>,
  headers: HeaderMap,
  AxumPath((entity_type, entity_id)): AxumPath<(
    String,
    String
  )>
) -> Result<Json<Vec<AuditEvent>>, ServerError> {
  let ctx = tenant(&state, &headers).await?;

  require_manager(&ctx)?;

  let events = state
    .repo
    .entity_history(
      ctx.clinic_id,
      &entity_type,
      &entity_id
    )
    .await?;

  Ok(Json(events))
}

/// Owner only. Without a body the
/// configured retention applies.
pub async fn purge(
  State(state): State<AppState>,
  headers: HeaderMap,
  payload: Option<Json<PurgeRequest>>
) -> Result<Json<PurgeOutcome>, ServerError> {
  let ctx = tenant(&state, &headers).await?;

  require_owner(&ctx)?;

  let retention_days = payload
    .and_then(|Json(p)| p.retention_days)
    .unwrap_or(state.audit_retention_days);

  let outcome = purge_events(
    state.repo.as_ref(),
    &ctx,
    &request_meta(&headers),
    retention_days,
    state.now_ms()
  )
  .await?;

  tracing::info!(
    clinic_id = ctx.clinic_id,
    deleted = outcome.deleted,
    retention_days,
    "audit purge"
  );

  Ok(Json(outcome))
}
