use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use clinicdesk_core::app::audit::{
  event,
  record
};
use clinicdesk_core::domain::audit::AuditAction;
use clinicdesk_core::domain::model::{
  ClinicSettingsInput,
  ClinicSettingsView
};
use clinicdesk_core::ports::repo::TenantRepo;
use serde_json::json;

use crate::app_state::AppState;
use crate::auth::{
  request_meta,
  require_manager,
  tenant
};
use crate::errors::ServerError;

pub async fn settings(
  State(state): State<AppState>,
  headers: HeaderMap
) -> Result<Json<ClinicSettingsView>, ServerError>
{
  let ctx = tenant(&state, &headers).await?;

  let clinic =
    state.repo.clinic(ctx.clinic_id).await?;

  Ok(Json(ClinicSettingsView::from(&clinic)))
}

pub async fn update_settings(
  State(state): State<AppState>,
  headers: HeaderMap,
  Json(payload): Json<ClinicSettingsInput>
) -> Result<Json<ClinicSettingsView>, ServerError>
{
  let ctx = tenant(&state, &headers).await?;

  require_manager(&ctx)?;

  let settings = payload.validate()?;

  let clinic = state
    .repo
    .update_clinic_settings(
      ctx.clinic_id,
      &settings
    )
    .await?;

  let view = ClinicSettingsView::from(&clinic);

  record(
    state.repo.as_ref(),
    event(
      &ctx,
      &request_meta(&headers),
      AuditAction::Update,
      "clinic_settings",
      state.now_ms()
    )
    .entity(ctx.clinic_id)
    .metadata(json!({
      "timezone": view.timezone,
      "open": view.open,
      "close": view.close,
      "working_days": view.working_days,
    }))
  )
  .await?;

  Ok(Json(view))
}
