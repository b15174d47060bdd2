use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use clinicdesk_core::app::audit::{
  event,
  record
};
use clinicdesk_core::app::billing::ensure_calendar_sync;
use clinicdesk_core::domain::audit::AuditAction;
use clinicdesk_core::domain::calendar::{
  CalendarStatus,
  SyncOutcome
};
use clinicdesk_core::domain::model::TenantContext;
use clinicdesk_core::domain::scheduling::{
  DAY_MS,
  TimeWindow
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
  CalendarConnectRequest,
  CalendarSyncRequest,
  DisconnectResponse
};

async fn manager(
  state: &AppState,
  headers: &HeaderMap
) -> Result<TenantContext, ServerError> {
  let ctx = tenant(state, headers).await?;

  require_manager(&ctx)?;

  Ok(ctx)
}

pub async fn status(
  State(state): State<AppState>,
  headers: HeaderMap
) -> Result<Json<CalendarStatus>, ServerError> {
  let ctx = tenant(&state, &headers).await?;

  let sync = state.calendar_sync()?;

  Ok(Json(sync.status(ctx.clinic_id).await?))
}

pub async fn connect(
  State(state): State<AppState>,
  headers: HeaderMap,
  Json(payload): Json<CalendarConnectRequest>
) -> Result<Json<CalendarStatus>, ServerError> {
  let ctx = manager(&state, &headers).await?;

  let sync = state.calendar_sync()?;

  let code = payload.code.trim();

  let calendar_id = payload.calendar_id.trim();

  if code.is_empty() || calendar_id.is_empty() {
    return Err(ServerError::bad_request(
      "code and calendar_id required"
    ));
  }

  let now_ms = state.now_ms();

  ensure_calendar_sync(
    state.repo.as_ref(),
    &state.plans,
    ctx.clinic_id,
    now_ms
  )
  .await?;

  let status = sync
    .connect(ctx.clinic_id, code, calendar_id, now_ms)
    .await?;

  record(
    state.repo.as_ref(),
    event(
      &ctx,
      &request_meta(&headers),
      AuditAction::Create,
      "calendar_connection",
      now_ms
    )
    .entity(ctx.clinic_id)
    .metadata(json!({ "calendar_id": calendar_id }))
  )
  .await?;

  Ok(Json(status))
}

pub async fn disconnect(
  State(state): State<AppState>,
  headers: HeaderMap
) -> Result<Json<DisconnectResponse>, ServerError> {
  let ctx = manager(&state, &headers).await?;

  let sync = state.calendar_sync()?;

  let disconnected =
    sync.disconnect(ctx.clinic_id).await?;

  if disconnected {
    record(
      state.repo.as_ref(),
      event(
        &ctx,
        &request_meta(&headers),
        AuditAction::Delete,
        "calendar_connection",
        state.now_ms()
      )
      .entity(ctx.clinic_id)
    )
    .await?;

    tracing::info!(
      clinic_id = ctx.clinic_id,
      "calendar disconnected"
    );
  }

  Ok(Json(DisconnectResponse { disconnected }))
}

/// Defaults to the next
/// `suggestion_days` days.
pub async fn sync(
  State(state): State<AppState>,
  headers: HeaderMap,
  payload: Option<Json<CalendarSyncRequest>>
) -> Result<Json<SyncOutcome>, ServerError> {
  let ctx = manager(&state, &headers).await?;

  let sync = state.calendar_sync()?;

  let now_ms = state.now_ms();

  let request = payload
    .map(|Json(r)| r)
    .unwrap_or_default();

  let from_ms = request.from_ms.unwrap_or(now_ms);

  let to_ms = request.to_ms.unwrap_or(
    from_ms + state.rules.suggestion_days * DAY_MS
  );

  let window = TimeWindow::new(from_ms, to_ms);

  if window.is_empty() {
    return Err(ServerError::bad_request(
      "to_ms must be after from_ms"
    ));
  }

  ensure_calendar_sync(
    state.repo.as_ref(),
    &state.plans,
    ctx.clinic_id,
    now_ms
  )
  .await?;

  let outcome =
    sync.sync(ctx.clinic_id, window, now_ms).await?;

  record(
    state.repo.as_ref(),
    event(
      &ctx,
      &request_meta(&headers),
      AuditAction::Sync,
      "calendar",
      now_ms
    )
    .entity(ctx.clinic_id)
    .metadata(json!({
      "from_ms": from_ms,
      "to_ms": to_ms,
      "pushed": outcome.pushed,
      "failed": outcome.failed,
      "imported": outcome.imported,
    }))
  )
  .await?;

  Ok(Json(outcome))
}
