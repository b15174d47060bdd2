use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use clinicdesk_core::infra::cache::CacheStats;

use crate::app_state::AppState;
use crate::auth::{
  require_manager,
  tenant
};
use crate::errors::ServerError;
use crate::models::CacheClearResponse;

pub async fn cache_stats(
  State(state): State<AppState>,
  headers: HeaderMap
) -> Result<Json<CacheStats>, ServerError> {
  let ctx = tenant(&state, &headers).await?;

  require_manager(&ctx)?;

  Ok(Json(state.cache.stats()))
}

pub async fn clear_cache(
  State(state): State<AppState>,
  headers: HeaderMap
) -> Result<Json<CacheClearResponse>, ServerError> {
  let ctx = tenant(&state, &headers).await?;

  require_manager(&ctx)?;

  let removed = state.cache.clear();

  tracing::info!(
    clinic_id = ctx.clinic_id,
    user_id = ctx.user_id,
    removed,
    "response cache cleared"
  );

  Ok(Json(CacheClearResponse { removed }))
}
