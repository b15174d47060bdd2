use tracing::info;

use super::PostgresRepo;
use crate::domain::model::{
  Clinic,
  ClinicSettings,
  Role,
  TenantContext,
  TenantSeed,
  User
};
use crate::ports::repo::{
  RepoError,
  RepoResult,
  TenantRepo
};

#[derive(Debug, sqlx::FromRow)]

struct TokenRow {
  clinic_id: i64,
  user_id:   i64,
  #[sqlx(try_from = "String")]
  role:      Role
}

impl From<TokenRow> for TenantContext {
  fn from(row: TokenRow) -> Self {
    Self {
      clinic_id: row.clinic_id,
      user_id:   row.user_id,
      role:      row.role
    }
  }
}

#[async_trait::async_trait]
impl TenantRepo for PostgresRepo {
  async fn resolve_token(
    &self,
    token_hash: &str,
    now_ms: i64
  ) -> RepoResult<Option<TenantContext>> {
    let row = sqlx::query_as::<_, TokenRow>(
      r#"
      SELECT t.clinic_id, t.user_id, u.role
      FROM api_tokens t
      JOIN users u
        ON u.id = t.user_id
       AND u.clinic_id = t.clinic_id
      WHERE t.token_hash = $1
        AND t.expires_at_ms > $2
      "#
    )
    .bind(token_hash)
    .bind(now_ms)
    .fetch_optional(&self.pool)
    .await?;

    Ok(row.map(TenantContext::from))
  }

  async fn ensure_seed(
    &self,
    seed: &TenantSeed,
    now_ms: i64
  ) -> RepoResult<TenantContext> {
    let mut tx = self.pool.begin().await?;

    let existing = sqlx::query_as::<_, TokenRow>(
      r#"
      SELECT t.clinic_id, t.user_id, u.role
      FROM api_tokens t
      JOIN users u ON u.id = t.user_id
      WHERE t.token_hash = $1
      "#
    )
    .bind(&seed.token_hash)
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(row) = existing {
      sqlx::query(
        "UPDATE api_tokens SET expires_at_ms = $2 \
         WHERE token_hash = $1"
      )
      .bind(&seed.token_hash)
      .bind(seed.token_expires_at_ms)
      .execute(&mut *tx)
      .await?;

      tx.commit().await?;

      return Ok(row.into());
    }

    let clinic_id: i64 = sqlx::query_scalar(
      r#"
      INSERT INTO clinics(name, timezone, created_at_ms)
      VALUES ($1, $2, $3)
      RETURNING id
      "#
    )
    .bind(&seed.clinic_name)
    .bind(&seed.timezone)
    .bind(now_ms)
    .fetch_one(&mut *tx)
    .await?;

    let user_id: i64 = sqlx::query_scalar(
      r#"
      INSERT INTO users(clinic_id, name, email, role, created_at_ms)
      VALUES ($1, $2, $3, $4, $5)
      RETURNING id
      "#
    )
    .bind(clinic_id)
    .bind(&seed.owner_name)
    .bind(seed.owner_email.as_deref())
    .bind(Role::Owner.as_str())
    .bind(now_ms)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
      r#"
      INSERT INTO api_tokens(
        token_hash, user_id, clinic_id, expires_at_ms, created_at_ms
      ) VALUES ($1, $2, $3, $4, $5)
      "#
    )
    .bind(&seed.token_hash)
    .bind(user_id)
    .bind(clinic_id)
    .bind(seed.token_expires_at_ms)
    .bind(now_ms)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(clinic_id, user_id, "seed tenant created");

    Ok(TenantContext {
      clinic_id,
      user_id,
      role: Role::Owner
    })
  }

  async fn clinic(
    &self,
    clinic_id: i64
  ) -> RepoResult<Clinic> {
    sqlx::query_as::<_, Clinic>(
      r#"
      SELECT id, name, timezone, open_minute, close_minute,
             working_days, created_at_ms
      FROM clinics
      WHERE id = $1
      "#
    )
    .bind(clinic_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or(RepoError::NotFound("clinic"))
  }

  async fn update_clinic_settings(
    &self,
    clinic_id: i64,
    settings: &ClinicSettings
  ) -> RepoResult<Clinic> {
    let res = sqlx::query(
      r#"
      UPDATE clinics
      SET timezone = $2,
          open_minute = $3,
          close_minute = $4,
          working_days = $5
      WHERE id = $1
      "#
    )
    .bind(clinic_id)
    .bind(&settings.timezone)
    .bind(settings.open_minute)
    .bind(settings.close_minute)
    .bind(&settings.working_days)
    .execute(&self.pool)
    .await?;

    if res.rows_affected() == 0 {
      return Err(RepoError::NotFound("clinic"));
    }

    self.clinic(clinic_id).await
  }

  async fn create_user(
    &self,
    clinic_id: i64,
    name: &str,
    email: Option<&str>,
    role: Role,
    now_ms: i64
  ) -> RepoResult<User> {
    let user = sqlx::query_as::<_, User>(
      r#"
      INSERT INTO users(clinic_id, name, email, role, created_at_ms)
      VALUES ($1, $2, $3, $4, $5)
      RETURNING id, clinic_id, name, email, role, created_at_ms
      "#
    )
    .bind(clinic_id)
    .bind(name)
    .bind(email)
    .bind(role.as_str())
    .bind(now_ms)
    .fetch_one(&self.pool)
    .await?;

    Ok(user)
  }

  async fn store_token(
    &self,
    clinic_id: i64,
    user_id: i64,
    token_hash: &str,
    expires_at_ms: i64,
    now_ms: i64
  ) -> RepoResult<()> {
    sqlx::query(
      r#"
      INSERT INTO api_tokens(
        token_hash, user_id, clinic_id, expires_at_ms, created_at_ms
      ) VALUES ($1, $2, $3, $4, $5)
      ON CONFLICT(token_hash)
      DO UPDATE SET expires_at_ms = excluded.expires_at_ms
      "#
    )
    .bind(token_hash)
    .bind(user_id)
    .bind(clinic_id)
    .bind(expires_at_ms)
    .bind(now_ms)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn user(
    &self,
    clinic_id: i64,
    user_id: i64
  ) -> RepoResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(
      r#"
      SELECT id, clinic_id, name, email, role, created_at_ms
      FROM users
      WHERE clinic_id = $1 AND id = $2
      "#
    )
    .bind(clinic_id)
    .bind(user_id)
    .fetch_optional(&self.pool)
    .await?;

    Ok(user)
  }

  async fn count_users(
    &self,
    clinic_id: i64
  ) -> RepoResult<i64> {
    let n: i64 = sqlx::query_scalar(
      "SELECT COUNT(*) FROM users WHERE clinic_id = $1"
    )
    .bind(clinic_id)
    .fetch_one(&self.pool)
    .await?;

    Ok(n)
  }

  async fn count_providers(
    &self,
    clinic_id: i64
  ) -> RepoResult<i64> {
    let n: i64 = sqlx::query_scalar(
      r#"
      SELECT COUNT(*) FROM users
      WHERE clinic_id = $1 AND role IN ('owner', 'dentist')
      "#
    )
    .bind(clinic_id)
    .fetch_one(&self.pool)
    .await?;

    Ok(n)
  }
}
