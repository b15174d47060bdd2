use super::PostgresRepo;
use crate::domain::costs::{
  Asset,
  AssetInput,
  ClinicService,
  FixedCost,
  FixedCostInput,
  ServiceInput,
  TimeSettings
};
use crate::ports::repo::{
  CostRepo,
  RepoError,
  RepoResult
};

const FIXED_COST_COLUMNS: &str = "id, clinic_id, category, concept, \
   monthly_amount_cents, active, created_at_ms";

const ASSET_COLUMNS: &str = "id, clinic_id, name, purchase_price_cents, \
   useful_life_months, purchased_at_ms, created_at_ms";

const SERVICE_COLUMNS: &str = "id, clinic_id, name, duration_minutes, \
   variable_cost_cents, margin_pct, active, created_at_ms";

#[async_trait::async_trait]
impl CostRepo for PostgresRepo {
  async fn time_settings(
    &self,
    clinic_id: i64
  ) -> RepoResult<Option<TimeSettings>> {
    let row = sqlx::query_as::<_, TimeSettings>(
      r#"
      SELECT work_days_per_month, hours_per_day, real_utilization_pct
      FROM time_settings
      WHERE clinic_id = $1
      "#
    )
    .bind(clinic_id)
    .fetch_optional(&self.pool)
    .await?;

    Ok(row)
  }

  async fn save_time_settings(
    &self,
    clinic_id: i64,
    settings: &TimeSettings,
    now_ms: i64
  ) -> RepoResult<()> {
    sqlx::query(
      r#"
      INSERT INTO time_settings(
        clinic_id,
        work_days_per_month,
        hours_per_day,
        real_utilization_pct,
        updated_at_ms
      ) VALUES ($1, $2, $3, $4, $5)
      ON CONFLICT(clinic_id)
      DO UPDATE SET
        work_days_per_month = excluded.work_days_per_month,
        hours_per_day = excluded.hours_per_day,
        real_utilization_pct = excluded.real_utilization_pct,
        updated_at_ms = excluded.updated_at_ms
      "#
    )
    .bind(clinic_id)
    .bind(settings.work_days_per_month)
    .bind(settings.hours_per_day)
    .bind(settings.real_utilization_pct)
    .bind(now_ms)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn list_fixed_costs(
    &self,
    clinic_id: i64
  ) -> RepoResult<Vec<FixedCost>> {
    let sql = format!(
      "SELECT {FIXED_COST_COLUMNS} FROM fixed_costs \
       WHERE clinic_id = $1 ORDER BY id"
    );

    let rows = sqlx::query_as::<_, FixedCost>(&sql)
      .bind(clinic_id)
      .fetch_all(&self.pool)
      .await?;

    Ok(rows)
  }

  async fn create_fixed_cost(
    &self,
    clinic_id: i64,
    input: &FixedCostInput,
    now_ms: i64
  ) -> RepoResult<FixedCost> {
    let sql = format!(
      "INSERT INTO fixed_costs(clinic_id, category, concept, \
       monthly_amount_cents, active, created_at_ms) \
       VALUES ($1, $2, $3, $4, $5, $6) \
       RETURNING {FIXED_COST_COLUMNS}"
    );

    let row = sqlx::query_as::<_, FixedCost>(&sql)
      .bind(clinic_id)
      .bind(input.category.as_str())
      .bind(input.concept.trim())
      .bind(input.monthly_amount_cents)
      .bind(input.active)
      .bind(now_ms)
      .fetch_one(&self.pool)
      .await?;

    Ok(row)
  }

  async fn update_fixed_cost(
    &self,
    clinic_id: i64,
    id: i64,
    input: &FixedCostInput
  ) -> RepoResult<FixedCost> {
    let sql = format!(
      "UPDATE fixed_costs SET category = $3, concept = $4, \
       monthly_amount_cents = $5, active = $6 \
       WHERE clinic_id = $1 AND id = $2 \
       RETURNING {FIXED_COST_COLUMNS}"
    );

    sqlx::query_as::<_, FixedCost>(&sql)
      .bind(clinic_id)
      .bind(id)
      .bind(input.category.as_str())
      .bind(input.concept.trim())
      .bind(input.monthly_amount_cents)
      .bind(input.active)
      .fetch_optional(&self.pool)
      .await?
      .ok_or(RepoError::NotFound("fixed cost"))
  }

  async fn delete_fixed_cost(
    &self,
    clinic_id: i64,
    id: i64
  ) -> RepoResult<()> {
    let res = sqlx::query(
      "DELETE FROM fixed_costs WHERE clinic_id = $1 AND id = $2"
    )
    .bind(clinic_id)
    .bind(id)
    .execute(&self.pool)
    .await?;

    if res.rows_affected() == 0 {
      return Err(RepoError::NotFound("fixed cost"));
    }

    Ok(())
  }

  async fn list_assets(
    &self,
    clinic_id: i64
  ) -> RepoResult<Vec<Asset>> {
    let sql = format!(
      "SELECT {ASSET_COLUMNS} FROM assets \
       WHERE clinic_id = $1 ORDER BY id"
    );

    let rows = sqlx::query_as::<_, Asset>(&sql)
      .bind(clinic_id)
      .fetch_all(&self.pool)
      .await?;

    Ok(rows)
  }

  async fn create_asset(
    &self,
    clinic_id: i64,
    input: &AssetInput,
    now_ms: i64
  ) -> RepoResult<Asset> {
    let sql = format!(
      "INSERT INTO assets(clinic_id, name, purchase_price_cents, \
       useful_life_months, purchased_at_ms, created_at_ms) \
       VALUES ($1, $2, $3, $4, $5, $6) \
       RETURNING {ASSET_COLUMNS}"
    );

    let row = sqlx::query_as::<_, Asset>(&sql)
      .bind(clinic_id)
      .bind(input.name.trim())
      .bind(input.purchase_price_cents)
      .bind(input.useful_life_months)
      .bind(input.purchased_at_ms)
      .bind(now_ms)
      .fetch_one(&self.pool)
      .await?;

    Ok(row)
  }

  async fn update_asset(
    &self,
    clinic_id: i64,
    id: i64,
    input: &AssetInput
  ) -> RepoResult<Asset> {
    let sql = format!(
      "UPDATE assets SET name = $3, purchase_price_cents = $4, \
       useful_life_months = $5, purchased_at_ms = $6 \
       WHERE clinic_id = $1 AND id = $2 \
       RETURNING {ASSET_COLUMNS}"
    );

    sqlx::query_as::<_, Asset>(&sql)
      .bind(clinic_id)
      .bind(id)
      .bind(input.name.trim())
      .bind(input.purchase_price_cents)
      .bind(input.useful_life_months)
      .bind(input.purchased_at_ms)
      .fetch_optional(&self.pool)
      .await?
      .ok_or(RepoError::NotFound("asset"))
  }

  async fn delete_asset(
    &self,
    clinic_id: i64,
    id: i64
  ) -> RepoResult<()> {
    let res = sqlx::query(
      "DELETE FROM assets WHERE clinic_id = $1 AND id = $2"
    )
    .bind(clinic_id)
    .bind(id)
    .execute(&self.pool)
    .await?;

    if res.rows_affected() == 0 {
      return Err(RepoError::NotFound("asset"));
    }

    Ok(())
  }

  async fn list_services(
    &self,
    clinic_id: i64
  ) -> RepoResult<Vec<ClinicService>> {
    let sql = format!(
      "SELECT {SERVICE_COLUMNS} FROM services \
       WHERE clinic_id = $1 ORDER BY id"
    );

    let rows = sqlx::query_as::<_, ClinicService>(&sql)
      .bind(clinic_id)
      .fetch_all(&self.pool)
      .await?;

    Ok(rows)
  }

  async fn service(
    &self,
    clinic_id: i64,
    id: i64
  ) -> RepoResult<ClinicService> {
    let sql = format!(
      "SELECT {SERVICE_COLUMNS} FROM services \
       WHERE clinic_id = $1 AND id = $2"
    );

    sqlx::query_as::<_, ClinicService>(&sql)
      .bind(clinic_id)
      .bind(id)
      .fetch_optional(&self.pool)
      .await?
      .ok_or(RepoError::NotFound("service"))
  }

  async fn create_service(
    &self,
    clinic_id: i64,
    input: &ServiceInput,
    now_ms: i64
  ) -> RepoResult<ClinicService> {
    let sql = format!(
      "INSERT INTO services(clinic_id, name, duration_minutes, \
       variable_cost_cents, margin_pct, active, created_at_ms) \
       VALUES ($1, $2, $3, $4, $5, $6, $7) \
       RETURNING {SERVICE_COLUMNS}"
    );

    let row = sqlx::query_as::<_, ClinicService>(&sql)
      .bind(clinic_id)
      .bind(input.name.trim())
      .bind(input.duration_minutes)
      .bind(input.variable_cost_cents)
      .bind(input.margin_pct)
      .bind(input.active)
      .bind(now_ms)
      .fetch_one(&self.pool)
      .await?;

    Ok(row)
  }

  async fn update_service(
    &self,
    clinic_id: i64,
    id: i64,
    input: &ServiceInput
  ) -> RepoResult<ClinicService> {
    let sql = format!(
      "UPDATE services SET name = $3, duration_minutes = $4, \
       variable_cost_cents = $5, margin_pct = $6, active = $7 \
       WHERE clinic_id = $1 AND id = $2 \
       RETURNING {SERVICE_COLUMNS}"
    );

    sqlx::query_as::<_, ClinicService>(&sql)
      .bind(clinic_id)
      .bind(id)
      .bind(input.name.trim())
      .bind(input.duration_minutes)
      .bind(input.variable_cost_cents)
      .bind(input.margin_pct)
      .bind(input.active)
      .fetch_optional(&self.pool)
      .await?
      .ok_or(RepoError::NotFound("service"))
  }

  async fn delete_service(
    &self,
    clinic_id: i64,
    id: i64
  ) -> RepoResult<()> {
    let res = sqlx::query(
      "DELETE FROM services WHERE clinic_id = $1 AND id = $2"
    )
    .bind(clinic_id)
    .bind(id)
    .execute(&self.pool)
    .await?;

    if res.rows_affected() == 0 {
      return Err(RepoError::NotFound("service"));
    }

    Ok(())
  }
}
