//! Subscription state and plan limit
//! enforcement.

use serde::{
  Deserialize,
  Serialize
};
use tracing::info;

use crate::app::{
  ServiceError,
  ServiceResult
};
use crate::domain::plans::{
  LimitCheck,
  Plan,
  PlanCatalog,
  PlanId,
  Subscription,
  SubscriptionStatus,
  check_limit
};
use crate::ports::repo::{
  BillingRepo,
  PatientRepo,
  Repo,
  TenantRepo
};

/// Plan change reported by the billing
/// provider.
#[derive(Debug, Clone, Deserialize)]

pub struct PlanChange {
  pub stripe_price_id:        String,
  pub status:                 SubscriptionStatus,
  pub stripe_customer_id:     Option<String>,
  pub stripe_subscription_id: Option<String>,
  pub current_period_end_ms:  Option<i64>
}

#[derive(Debug, Clone, Serialize)]

pub struct Usage {
  pub plan_id:       PlanId,
  pub status:        SubscriptionStatus,
  pub users:         LimitCheck,
  pub patients:      LimitCheck,
  pub providers:     LimitCheck,
  pub calendar_sync: bool
}

pub async fn subscription(
  repo: &dyn Repo,
  clinic_id: i64,
  now_ms: i64
) -> ServiceResult<Subscription> {
  Ok(repo
    .subscription(clinic_id)
    .await?
    .unwrap_or_else(|| Subscription::trial(clinic_id, now_ms)))
}

/// Plan whose limits apply. A
/// subscription that no longer grants
/// access falls back to basic.
pub async fn effective_plan<'c>(
  repo: &dyn Repo,
  catalog: &'c PlanCatalog,
  clinic_id: i64,
  now_ms: i64
) -> ServiceResult<(&'c Plan, Subscription)> {
  let sub = subscription(repo, clinic_id, now_ms).await?;

  let plan_id = if sub.status.grants_access() {
    sub.plan_id
  } else {
    PlanId::Basic
  };

  let plan = catalog.get(plan_id).ok_or_else(|| {
    ServiceError::Invalid(format!(
      "plan {} not in catalog",
      plan_id.as_str()
    ))
  })?;

  Ok((plan, sub))
}

pub async fn usage(
  repo: &dyn Repo,
  catalog: &PlanCatalog,
  clinic_id: i64,
  now_ms: i64
) -> ServiceResult<Usage> {
  let (plan, sub) =
    effective_plan(repo, catalog, clinic_id, now_ms).await?;

  let users = repo.count_users(clinic_id).await?;

  let patients = repo.count_patients(clinic_id).await?;

  let providers = repo.count_providers(clinic_id).await?;

  Ok(Usage {
    plan_id:       sub.plan_id,
    status:        sub.status,
    users:         check_limit(plan.limits.max_users, users),
    patients:      check_limit(
      plan.limits.max_patients,
      patients
    ),
    providers:     check_limit(
      plan.limits.max_providers,
      providers
    ),
    calendar_sync: plan.limits.calendar_sync
  })
}

pub async fn ensure_patient_capacity(
  repo: &dyn Repo,
  catalog: &PlanCatalog,
  clinic_id: i64,
  now_ms: i64
) -> ServiceResult<()> {
  let (plan, _) =
    effective_plan(repo, catalog, clinic_id, now_ms).await?;

  let current = repo.count_patients(clinic_id).await?;

  let check =
    check_limit(plan.limits.max_patients, current);

  if !check.allowed {
    return Err(ServiceError::Forbidden(format!(
      "patient limit of the {} plan reached ({})",
      plan.name, current
    )));
  }

  Ok(())
}

pub async fn ensure_calendar_sync(
  repo: &dyn Repo,
  catalog: &PlanCatalog,
  clinic_id: i64,
  now_ms: i64
) -> ServiceResult<()> {
  let (plan, _) =
    effective_plan(repo, catalog, clinic_id, now_ms).await?;

  if !plan.limits.calendar_sync {
    return Err(ServiceError::Forbidden(format!(
      "calendar sync is not included in the {} plan",
      plan.name
    )));
  }

  Ok(())
}

/// Maps the Stripe price to a plan and
/// stores the new subscription state.
pub async fn record_plan_change(
  repo: &dyn Repo,
  catalog: &PlanCatalog,
  clinic_id: i64,
  change: &PlanChange,
  now_ms: i64
) -> ServiceResult<Subscription> {
  let (plan, interval) = catalog
    .find_by_stripe_price(&change.stripe_price_id)
    .ok_or_else(|| {
      ServiceError::Invalid(format!(
        "unknown stripe price '{}'",
        change.stripe_price_id
      ))
    })?;

  let sub = Subscription {
    clinic_id,
    plan_id: plan.id,
    billing_interval: interval,
    status: change.status,
    stripe_customer_id: change.stripe_customer_id.clone(),
    stripe_subscription_id: change
      .stripe_subscription_id
      .clone(),
    current_period_end_ms: change.current_period_end_ms,
    updated_at_ms: now_ms
  };

  repo.save_subscription(&sub).await?;

  info!(
    clinic_id,
    plan = plan.id.as_str(),
    interval = interval.as_str(),
    status = sub.status.as_str(),
    "subscription updated"
  );

  Ok(sub)
}
