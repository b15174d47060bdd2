use std::str::FromStr;

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
use clinicdesk_core::app::billing::{
  PlanChange,
  Usage,
  effective_plan,
  record_plan_change,
  usage as clinic_usage
};
use clinicdesk_core::domain::audit::AuditAction;
use clinicdesk_core::domain::plans::{
  PlanId,
  Subscription
};
use serde_json::{
  Value,
  json
};

use crate::app_state::AppState;
use crate::auth::{
  request_meta,
  require_manager,
  require_owner,
  tenant
};
use crate::errors::ServerError;
use crate::models::{
  PlanView,
  SubscriptionResponse
};

const PLANS_KEY: &str = "plans:all";

/// Public and cached.
pub async fn list_plans(
  State(state): State<AppState>
) -> Result<Json<Value>, ServerError> {
  let value = state
    .cache
    .get_or_try_insert(PLANS_KEY, None, || async {
      let views: Vec<PlanView> = state
        .plans
        .list()
        .iter()
        .map(|p| PlanView::new(p, &state.currency))
        .collect();

      serde_json::to_value(views).map_err(|e| {
        ServerError::internal(e.to_string())
      })
    })
    .await?;

  Ok(Json(value))
}

pub async fn plan_detail(
  State(state): State<AppState>,
  AxumPath(plan_id): AxumPath<String>
) -> Result<Json<Value>, ServerError> {
  let id = PlanId::from_str(&plan_id).map_err(|_| {
    ServerError::new(
      StatusCode::NOT_FOUND,
      format!("plan '{plan_id}' not found")
    )
  })?;

  let key = format!("plans:{}", id.as_str());

  let value = state
    .cache
    .get_or_try_insert(&key, None, || async {
      let plan = state.plans.get(id).ok_or_else(|| {
        ServerError::new(
          StatusCode::NOT_FOUND,
          format!("plan '{}' not found", id.as_str())
        )
      })?;

      serde_json::to_value(PlanView::new(
        plan,
        &state.currency
      ))
      .map_err(|e| ServerError::internal(e.to_string()))
    })
    .await?;

  Ok(Json(value))
}

async fn subscription_response(
  state: &AppState,
  clinic_id: i64
) -> Result<SubscriptionResponse, ServerError> {
  let (plan, subscription) = effective_plan(
    state.repo.as_ref(),
    &state.plans,
    clinic_id,
    state.now_ms()
  )
  .await?;

  let plan_name = state
    .plans
    .get(subscription.plan_id)
    .map(|p| p.name.clone())
    .unwrap_or_else(|| {
      subscription.plan_id.as_str().to_string()
    });

  Ok(SubscriptionResponse {
    plan_name,
    grants_access: subscription.status.grants_access(),
    effective_plan: plan.id.as_str().to_string(),
    subscription
  })
}

pub async fn subscription(
  State(state): State<AppState>,
  headers: HeaderMap
) -> Result<Json<SubscriptionResponse>, ServerError> {
  let ctx = tenant(&state, &headers).await?;

  require_manager(&ctx)?;

  Ok(Json(
    subscription_response(&state, ctx.clinic_id).await?
  ))
}

/// Applies a plan change reported by the
/// billing provider.
pub async fn update_subscription(
  State(state): State<AppState>,
  headers: HeaderMap,
  Json(payload): Json<PlanChange>
) -> Result<Json<SubscriptionResponse>, ServerError> {
  let ctx = tenant(&state, &headers).await?;

  require_owner(&ctx)?;

  let now_ms = state.now_ms();

  let saved: Subscription = record_plan_change(
    state.repo.as_ref(),
    &state.plans,
    ctx.clinic_id,
    &payload,
    now_ms
  )
  .await?;

  record(
    state.repo.as_ref(),
    event(
      &ctx,
      &request_meta(&headers),
      AuditAction::Update,
      "subscription",
      now_ms
    )
    .entity(ctx.clinic_id)
    .metadata(json!({
      "plan_id": saved.plan_id.as_str(),
      "billing_interval": saved.billing_interval.as_str(),
      "status": saved.status.as_str(),
    }))
  )
  .await?;

  Ok(Json(
    subscription_response(&state, ctx.clinic_id).await?
  ))
}

pub async fn usage(
  State(state): State<AppState>,
  headers: HeaderMap
) -> Result<Json<Usage>, ServerError> {
  let ctx = tenant(&state, &headers).await?;

  let usage = clinic_usage(
    state.repo.as_ref(),
    &state.plans,
    ctx.clinic_id,
    state.now_ms()
  )
  .await?;

  Ok(Json(usage))
}
