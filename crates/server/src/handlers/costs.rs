use axum::Json;
use axum::extract::{
  Path as AxumPath,
  State
};
use axum::http::{
  HeaderMap,
  StatusCode
};
use clinicdesk_core::app::audit::{
  event,
  record
};
use clinicdesk_core::app::costs::{
  cost_summary,
  quote as quote_service
};
use clinicdesk_core::domain::audit::AuditAction;
use clinicdesk_core::domain::costs::{
  Asset,
  AssetInput,
  ClinicService,
  CostBreakdown,
  FixedCost,
  FixedCostInput,
  QuoteRequest,
  ServiceInput,
  TimeSettings
};
use clinicdesk_core::domain::model::TenantContext;
use clinicdesk_core::infra::cache::{
  clinic_key,
  clinic_prefix
};
use clinicdesk_core::ports::repo::CostRepo;
use serde_json::{
  Value,
  json
};

use crate::app_state::AppState;
use crate::auth::{
  request_meta,
  require_manager,
  tenant
};
use crate::errors::ServerError;

const AREA: &str = "costs";

/// Audits a cost mutation and drops the
/// clinic's cached cost responses.
async fn changed(
  state: &AppState,
  ctx: &TenantContext,
  headers: &HeaderMap,
  action: AuditAction,
  entity_type: &str,
  entity_id: i64,
  metadata: Value
) -> Result<(), ServerError> {
  record(
    state.repo.as_ref(),
    event(
      ctx,
      &request_meta(headers),
      action,
      entity_type,
      state.now_ms()
    )
    .entity(entity_id)
    .metadata(metadata)
  )
  .await?;

  let dropped = state
    .cache
    .invalidate_prefix(&clinic_prefix(
      ctx.clinic_id,
      AREA
    ));

  tracing::debug!(
    clinic_id = ctx.clinic_id,
    dropped,
    "cost cache invalidated"
  );

  Ok(())
}

async fn manager(
  state: &AppState,
  headers: &HeaderMap
) -> Result<TenantContext, ServerError> {
  let ctx = tenant(state, headers).await?;

  require_manager(&ctx)?;

  Ok(ctx)
}

pub async fn time_settings(
  State(state): State<AppState>,
  headers: HeaderMap
) -> Result<Json<TimeSettings>, ServerError> {
  let ctx = tenant(&state, &headers).await?;

  let settings = state
    .repo
    .time_settings(ctx.clinic_id)
    .await?
    .unwrap_or_default();

  Ok(Json(settings))
}

pub async fn save_time_settings(
  State(state): State<AppState>,
  headers: HeaderMap,
  Json(payload): Json<TimeSettings>
) -> Result<Json<TimeSettings>, ServerError> {
  let ctx = manager(&state, &headers).await?;

  payload.validate()?;

  state
    .repo
    .save_time_settings(
      ctx.clinic_id,
      &payload,
      state.now_ms()
    )
    .await?;

  changed(
    &state,
    &ctx,
    &headers,
    AuditAction::Update,
    "time_settings",
    ctx.clinic_id,
    json!(payload)
  )
  .await?;

  Ok(Json(payload))
}

pub async fn list_fixed_costs(
  State(state): State<AppState>,
  headers: HeaderMap
) -> Result<Json<Vec<FixedCost>>, ServerError> {
  let ctx = tenant(&state, &headers).await?;

  let rows = state
    .repo
    .list_fixed_costs(ctx.clinic_id)
    .await?;

  Ok(Json(rows))
}

pub async fn create_fixed_cost(
  State(state): State<AppState>,
  headers: HeaderMap,
  Json(payload): Json<FixedCostInput>
) -> Result<(StatusCode, Json<FixedCost>), ServerError> {
  let ctx = manager(&state, &headers).await?;

  payload.validate()?;

  let row = state
    .repo
    .create_fixed_cost(
      ctx.clinic_id,
      &payload,
      state.now_ms()
    )
    .await?;

  changed(
    &state,
    &ctx,
    &headers,
    AuditAction::Create,
    "fixed_cost",
    row.id,
    json!({
      "category": row.category.as_str(),
      "monthly_amount_cents": row.monthly_amount_cents,
    })
  )
  .await?;

  Ok((StatusCode::CREATED, Json(row)))
}

pub async fn update_fixed_cost(
  State(state): State<AppState>,
  headers: HeaderMap,
  AxumPath(id): AxumPath<i64>,
  Json(payload): Json<FixedCostInput>
) -> Result<Json<FixedCost>, ServerError> {
  let ctx = manager(&state, &headers).await?;

  payload.validate()?;

  let row = state
    .repo
    .update_fixed_cost(ctx.clinic_id, id, &payload)
    .await?;

  changed(
    &state,
    &ctx,
    &headers,
    AuditAction::Update,
    "fixed_cost",
    id,
    json!({
      "category": row.category.as_str(),
      "monthly_amount_cents": row.monthly_amount_cents,
      "active": row.active,
    })
  )
  .await?;

  Ok(Json(row))
}

pub async fn delete_fixed_cost(
  State(state): State<AppState>,
  headers: HeaderMap,
  AxumPath(id): AxumPath<i64>
) -> Result<StatusCode, ServerError> {
  let ctx = manager(&state, &headers).await?;

  state
    .repo
    .delete_fixed_cost(ctx.clinic_id, id)
    .await?;

  changed(
    &state,
    &ctx,
    &headers,
    AuditAction::Delete,
    "fixed_cost",
    id,
    json!({})
  )
  .await?;

  Ok(StatusCode::NO_CONTENT)
}

pub async fn list_assets(
  State(state): State<AppState>,
  headers: HeaderMap
) -> Result<Json<Vec<Asset>>, ServerError> {
  let ctx = tenant(&state, &headers).await?;

  let rows =
    state.repo.list_assets(ctx.clinic_id).await?;

  Ok(Json(rows))
}

pub async fn create_asset(
  State(state): State<AppState>,
  headers: HeaderMap,
  Json(payload): Json<AssetInput>
) -> Result<(StatusCode, Json<Asset>), ServerError> {
  let ctx = manager(&state, &headers).await?;

  payload.validate()?;

  let row = state
    .repo
    .create_asset(
      ctx.clinic_id,
      &payload,
      state.now_ms()
    )
    .await?;

  changed(
    &state,
    &ctx,
    &headers,
    AuditAction::Create,
    "asset",
    row.id,
    json!({
      "purchase_price_cents": row.purchase_price_cents,
      "useful_life_months": row.useful_life_months,
    })
  )
  .await?;

  Ok((StatusCode::CREATED, Json(row)))
}

pub async fn update_asset(
  State(state): State<AppState>,
  headers: HeaderMap,
  AxumPath(id): AxumPath<i64>,
  Json(payload): Json<AssetInput>
) -> Result<Json<Asset>, ServerError> {
  let ctx = manager(&state, &headers).await?;

  payload.validate()?;

  let row = state
    .repo
    .update_asset(ctx.clinic_id, id, &payload)
    .await?;

  changed(
    &state,
    &ctx,
    &headers,
    AuditAction::Update,
    "asset",
    id,
    json!({
      "purchase_price_cents": row.purchase_price_cents,
      "useful_life_months": row.useful_life_months,
    })
  )
  .await?;

  Ok(Json(row))
}

pub async fn delete_asset(
  State(state): State<AppState>,
  headers: HeaderMap,
  AxumPath(id): AxumPath<i64>
) -> Result<StatusCode, ServerError> {
  let ctx = manager(&state, &headers).await?;

  state
    .repo
    .delete_asset(ctx.clinic_id, id)
    .await?;

  changed(
    &state,
    &ctx,
    &headers,
    AuditAction::Delete,
    "asset",
    id,
    json!({})
  )
  .await?;

  Ok(StatusCode::NO_CONTENT)
}

pub async fn list_services(
  State(state): State<AppState>,
  headers: HeaderMap
) -> Result<Json<Vec<ClinicService>>, ServerError> {
  let ctx = tenant(&state, &headers).await?;

  let rows = state
    .repo
    .list_services(ctx.clinic_id)
    .await?;

  Ok(Json(rows))
}

pub async fn create_service(
  State(state): State<AppState>,
  headers: HeaderMap,
  Json(payload): Json<ServiceInput>
) -> Result<(StatusCode, Json<ClinicService>), ServerError>
{
  let ctx = manager(&state, &headers).await?;

  payload.validate()?;

  let row = state
    .repo
    .create_service(
      ctx.clinic_id,
      &payload,
      state.now_ms()
    )
    .await?;

  changed(
    &state,
    &ctx,
    &headers,
    AuditAction::Create,
    "service",
    row.id,
    json!({
      "name": row.name,
      "duration_minutes": row.duration_minutes,
      "margin_pct": row.margin_pct,
    })
  )
  .await?;

  Ok((StatusCode::CREATED, Json(row)))
}

pub async fn update_service(
  State(state): State<AppState>,
  headers: HeaderMap,
  AxumPath(id): AxumPath<i64>,
  Json(payload): Json<ServiceInput>
) -> Result<Json<ClinicService>, ServerError> {
  let ctx = manager(&state, &headers).await?;

  payload.validate()?;

  let row = state
    .repo
    .update_service(ctx.clinic_id, id, &payload)
    .await?;

  changed(
    &state,
    &ctx,
    &headers,
    AuditAction::Update,
    "service",
    id,
    json!({
      "name": row.name,
      "duration_minutes": row.duration_minutes,
      "margin_pct": row.margin_pct,
      "active": row.active,
    })
  )
  .await?;

  Ok(Json(row))
}

pub async fn delete_service(
  State(state): State<AppState>,
  headers: HeaderMap,
  AxumPath(id): AxumPath<i64>
) -> Result<StatusCode, ServerError> {
  let ctx = manager(&state, &headers).await?;

  state
    .repo
    .delete_service(ctx.clinic_id, id)
    .await?;

  changed(
    &state,
    &ctx,
    &headers,
    AuditAction::Delete,
    "service",
    id,
    json!({})
  )
  .await?;

  Ok(StatusCode::NO_CONTENT)
}

/// Cached per clinic until the next cost
/// mutation or the TTL, whichever comes
/// first.
pub async fn summary(
  State(state): State<AppState>,
  headers: HeaderMap
) -> Result<Json<Value>, ServerError> {
  let ctx = tenant(&state, &headers).await?;

  let key =
    clinic_key(ctx.clinic_id, AREA, "summary");

  let repo = state.repo.clone();

  let value = state
    .cache
    .get_or_try_insert(&key, None, || async move {
      let summary =
        cost_summary(repo.as_ref(), ctx.clinic_id)
          .await
          .map_err(ServerError::from)?;

      serde_json::to_value(summary).map_err(|e| {
        ServerError::internal(e.to_string())
      })
    })
    .await?;

  Ok(Json(value))
}

pub async fn quote(
  State(state): State<AppState>,
  headers: HeaderMap,
  Json(payload): Json<QuoteRequest>
) -> Result<Json<CostBreakdown>, ServerError> {
  let ctx = tenant(&state, &headers).await?;

  let breakdown = quote_service(
    state.repo.as_ref(),
    ctx.clinic_id,
    &payload
  )
  .await?;

  Ok(Json(breakdown))
}
