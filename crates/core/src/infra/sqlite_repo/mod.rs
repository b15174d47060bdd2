//! SQLite implementation of the
//! repository ports. Queries use `?N`
//! placeholders; the Postgres twin lives
//! in `postgres_repo`.

use std::path::Path;

use sqlx::SqlitePool;
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

const SCHEMA: &str =
  include_str!("../../../sql/sqlite/schema.sql");

#[derive(Clone)]

pub struct SqliteRepo {
  pool: SqlitePool
}

impl SqliteRepo {
  pub async fn connect(
    db_path: &Path
  ) -> RepoResult<Self> {
    let pool =
      connection::create_pool(db_path).await?;

    Ok(Self { pool })
  }

  pub async fn in_memory() -> RepoResult<Self> {
    let pool =
      connection::memory_pool().await?;

    Ok(Self { pool })
  }

  pub fn pool(&self) -> &SqlitePool {
    &self.pool
  }

  pub async fn migrate(&self) -> RepoResult<()> {
    info!("sqlite migrate start");

    for stmt in SCHEMA
      .split(';')
      .map(str::trim)
      .filter(|s| !s.is_empty())
    {
      sqlx::query(stmt)
        .execute(&self.pool)
        .await?;
    }

    info!("sqlite migrate done");

    Ok(())
  }

  /// Deletes every tenant row. Tables
  /// stay in place.
  pub async fn reset(&self) -> RepoResult<()> {
    let mut tx = self.pool.begin().await?;

    for table in RESET_ORDER {
      sqlx::query(&format!("DELETE FROM {table}"))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    info!("sqlite tenant data wiped");

    Ok(())
  }
}
