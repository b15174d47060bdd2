use super::PostgresRepo;
use crate::domain::plans::Subscription;
use crate::ports::repo::{
  BillingRepo,
  RepoResult
};

#[async_trait::async_trait]
impl BillingRepo for PostgresRepo {
  async fn subscription(
    &self,
    clinic_id: i64
  ) -> RepoResult<Option<Subscription>> {
    let row = sqlx::query_as::<_, Subscription>(
      r#"
      SELECT clinic_id, plan_id, billing_interval, status,
             stripe_customer_id, stripe_subscription_id,
             current_period_end_ms, updated_at_ms
      FROM clinic_subscriptions
      WHERE clinic_id = $1
      "#
    )
    .bind(clinic_id)
    .fetch_optional(&self.pool)
    .await?;

    Ok(row)
  }

  async fn save_subscription(
    &self,
    subscription: &Subscription
  ) -> RepoResult<()> {
    sqlx::query(
      r#"
      INSERT INTO clinic_subscriptions(
        clinic_id,
        plan_id,
        billing_interval,
        status,
        stripe_customer_id,
        stripe_subscription_id,
        current_period_end_ms,
        updated_at_ms
      ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
      ON CONFLICT(clinic_id)
      DO UPDATE SET
        plan_id = excluded.plan_id,
        billing_interval = excluded.billing_interval,
        status = excluded.status,
        stripe_customer_id = excluded.stripe_customer_id,
        stripe_subscription_id = excluded.stripe_subscription_id,
        current_period_end_ms = excluded.current_period_end_ms,
        updated_at_ms = excluded.updated_at_ms
      "#
    )
    .bind(subscription.clinic_id)
    .bind(subscription.plan_id.as_str())
    .bind(subscription.billing_interval.as_str())
    .bind(subscription.status.as_str())
    .bind(subscription.stripe_customer_id.as_deref())
    .bind(subscription.stripe_subscription_id.as_deref())
    .bind(subscription.current_period_end_ms)
    .bind(subscription.updated_at_ms)
    .execute(&self.pool)
    .await?;

    Ok(())
  }
}
