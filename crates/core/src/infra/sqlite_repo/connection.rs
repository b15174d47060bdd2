//! Helpers to create/configure the
//! SQLite pool.

use std::path::{
  Path,
  PathBuf
};
use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{
  SqliteConnectOptions,
  SqliteJournalMode,
  SqlitePoolOptions
};

pub async fn create_pool(
  db_path: &Path
) -> Result<SqlitePool, sqlx::Error> {
  let full_path = if db_path.is_absolute() {
    db_path.to_path_buf()
  } else {
    std::env::current_dir()
      .unwrap_or_else(|_| PathBuf::from("."))
      .join(db_path)
  };

  if let Some(parent) = full_path
    .parent()
    .filter(|p| !p.as_os_str().is_empty())
  {
    std::fs::create_dir_all(parent)?;
  }

  let url =
    format!("sqlite://{}", full_path.display());

  let opts = SqliteConnectOptions::from_str(&url)?
    .create_if_missing(true)
    .journal_mode(SqliteJournalMode::Wal)
    .busy_timeout(Duration::from_secs(5))
    .foreign_keys(true);

  SqlitePoolOptions::new()
    .max_connections(10)
    .connect_with(opts)
    .await
}

/// Single-connection in-memory pool; a
/// second connection would see an
/// empty database.
pub async fn memory_pool()
-> Result<SqlitePool, sqlx::Error> {
  let opts = SqliteConnectOptions::from_str(
    "sqlite::memory:"
  )?
  .foreign_keys(true);

  SqlitePoolOptions::new()
    .max_connections(1)
    .min_connections(1)
    .idle_timeout(None)
    .max_lifetime(None)
    .connect_with(opts)
    .await
}
