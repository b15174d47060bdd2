//! Postgres implementation of the
//! repository ports. Same statements as
//! `sqlite_repo` with `$N` placeholders.

use sqlx::PgPool;
use tracing::info;

use crate::infra::RESET_ORDER;
use crate::ports::repo::RepoResult;

mod appointments;
mod audit;
mod billing;
mod calendar;
pub mod connection;
mod costs;
mod patients;
mod tenants;

pub use connection::PostgresSettings;

const SCHEMA: &str =
  include_str!("../../../sql/postgres/schema.sql");

#[derive(Clone)]

pub struct PostgresRepo {
  pool: PgPool
}

impl PostgresRepo {
  pub async fn connect(
    cfg: &PostgresSettings
  ) -> RepoResult<Self> {
    let pool = connection::create_pool(cfg).await?;

    Ok(Self { pool })
  }

  pub fn pool(&self) -> &PgPool {
    &self.pool
  }

  pub async fn migrate(&self) -> RepoResult<()> {
    info!("postgres migrate start");

    for stmt in SCHEMA
      .split(';')
      .map(str::trim)
      .filter(|s| !s.is_empty())
    {
      sqlx::query(stmt)
        .execute(&self.pool)
        .await?;
    }

    info!("postgres migrate done");

    Ok(())
  }

  /// Deletes every tenant row and resets
  /// id sequences.
  pub async fn reset(&self) -> RepoResult<()> {
    let tables = RESET_ORDER.join(", ");

    sqlx::query(&format!(
      "TRUNCATE {tables} RESTART IDENTITY CASCADE"
    ))
    .execute(&self.pool)
    .await?;

    info!("postgres tenant data wiped");

    Ok(())
  }
}
