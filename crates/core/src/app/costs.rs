use crate::app::ServiceResult;
use crate::domain::costs::{
  CostBreakdown,
  CostSummary,
  QuoteRequest,
  breakdown,
  summarize
};
use crate::ports::repo::{
  CostRepo,
  Repo
};

/// Monthly cost picture of one clinic.
/// Missing time settings fall back to
/// the defaults.
pub async fn cost_summary(
  repo: &dyn Repo,
  clinic_id: i64
) -> ServiceResult<CostSummary> {
  let settings = repo
    .time_settings(clinic_id)
    .await?
    .unwrap_or_default();

  let fixed = repo.list_fixed_costs(clinic_id).await?;

  let assets = repo.list_assets(clinic_id).await?;

  let services = repo.list_services(clinic_id).await?;

  Ok(summarize(settings, &fixed, &assets, &services)?)
}

/// Prices a service that has not been
/// saved, using the clinic's current
/// per-minute rate.
pub async fn quote(
  repo: &dyn Repo,
  clinic_id: i64,
  request: &QuoteRequest
) -> ServiceResult<CostBreakdown> {
  let summary = cost_summary(repo, clinic_id).await?;

  Ok(breakdown(
    summary.fixed_cost_per_minute_cents,
    request
  )?)
}
