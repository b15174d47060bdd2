use std::path::Path;
use std::sync::Arc;

use clinicdesk_core::domain::model::{
  TenantContext,
  TenantSeed
};
use clinicdesk_core::infra::postgres_repo::PostgresRepo;
use clinicdesk_core::infra::sqlite_repo::SqliteRepo;
use clinicdesk_core::ports::repo::{
  Repo,
  RepoResult,
  TenantRepo
};

use crate::auth::hash_token;
use crate::config::{
  AppMode,
  ConfigError,
  ServerConfig,
  SqlDialect
};

/// Opens the configured database,
/// applies the schema and, in dev mode
/// with `reset_on_start`, wipes tenant
/// data.
pub async fn connect_repo(
  config: &ServerConfig,
  config_path: &Path
) -> Result<Arc<dyn Repo>, ConfigError> {
  let reset = config.app.mode == AppMode::Dev
    && config.dev.reset_on_start;

  match config.dialect()? {
    | SqlDialect::Sqlite => {
      let base_dir = config_path
        .parent()
        .ok_or_else(|| {
          ConfigError::Invalid(
            "config path has no parent"
              .into()
          )
        })?;

      let path =
        config.sqlite_path(base_dir);

      tracing::info!(
        path = %path.display(),
        "opening sqlite database"
      );

      let repo =
        SqliteRepo::connect(&path).await?;

      repo.migrate().await?;

      if reset {
        repo.reset().await?;
        tracing::warn!(
          "dev reset: tenant data cleared"
        );
      }

      let repo: Arc<dyn Repo> =
        Arc::new(repo);

      Ok(repo)
    }
    | SqlDialect::Postgres => {
      let settings =
        config.postgres_settings()?;

      tracing::info!(
        host = %settings.host,
        database = %settings.database,
        schema = %settings.schema,
        "opening postgres database"
      );

      let repo =
        PostgresRepo::connect(&settings)
          .await?;

      repo.migrate().await?;

      if reset {
        repo.reset().await?;
        tracing::warn!(
          "dev reset: tenant data cleared"
        );
      }

      let repo: Arc<dyn Repo> =
        Arc::new(repo);

      Ok(repo)
    }
  }
}

/// Creates the configured clinic, its
/// owner and extra users when missing,
/// and pushes every configured token's
/// expiry forward.
pub async fn seed_tenant(
  repo: &dyn Repo,
  config: &ServerConfig,
  now_ms: i64
) -> RepoResult<TenantContext> {
  let seed = &config.seed;

  let ttl_ms = i64::try_from(
    config.auth.token_ttl_seconds
  )
  .unwrap_or(i64::MAX / 2_000)
    * 1_000;

  let expires_at_ms =
    now_ms.saturating_add(ttl_ms);

  let owner = repo
    .ensure_seed(
      &TenantSeed {
        clinic_name:         seed
          .clinic_name
          .clone(),
        timezone:            seed
          .timezone
          .clone(),
        owner_name:          seed
          .owner_name
          .clone(),
        owner_email:         seed
          .owner_email
          .clone(),
        token_hash:          hash_token(
          &seed.token
        ),
        token_expires_at_ms: expires_at_ms
      },
      now_ms
    )
    .await?;

  for user in &seed.users {
    let token_hash = hash_token(&user.token);

    let user_id = match repo
      .resolve_token(&token_hash, i64::MIN)
      .await?
    {
      | Some(existing) => existing.user_id,
      | None => {
        let created = repo
          .create_user(
            owner.clinic_id,
            &user.name,
            user.email.as_deref(),
            user.role,
            now_ms
          )
          .await?;

        tracing::info!(
          clinic_id = owner.clinic_id,
          user_id = created.id,
          role = user.role.as_str(),
          "seed user created"
        );

        created.id
      }
    };

    repo
      .store_token(
        owner.clinic_id,
        user_id,
        &token_hash,
        expires_at_ms,
        now_ms
      )
      .await?;
  }

  tracing::info!(
    clinic_id = owner.clinic_id,
    users = seed.users.len() + 1,
    "seed tenant ready"
  );

  Ok(owner)
}
