//! Helpers to create/configure the
//! Postgres pool.

use sqlx::PgPool;
use sqlx::postgres::{
  PgConnectOptions,
  PgPoolOptions
};
use tracing::info;

#[derive(Debug, Clone)]

pub struct PostgresSettings {
  pub host:     String,
  pub port:     u16,
  pub user:     String,
  pub password: String,
  pub database: String,
  pub schema:   String
}

pub async fn create_pool(
  cfg: &PostgresSettings
) -> Result<PgPool, sqlx::Error> {
  let opts = connect_options(
    cfg,
    Some(&cfg.database)
  );

  let pool = PgPoolOptions::new()
    .max_connections(10)
    .after_connect(set_session_defaults(
      cfg.schema.clone()
    ))
    .connect_with(opts.clone())
    .await;

  match pool {
    | Ok(p) => Ok(p),
    | Err(_e) => {
      ensure_database_exists(cfg).await?;

      PgPoolOptions::new()
        .max_connections(10)
        .after_connect(set_session_defaults(
          cfg.schema.clone()
        ))
        .connect_with(opts)
        .await
    }
  }
}

#[allow(clippy::type_complexity)]
fn set_session_defaults(
  schema: String
) -> impl Fn(
  &mut sqlx::PgConnection,
  sqlx::pool::PoolConnectionMetadata
) -> std::pin::Pin<
  Box<
    dyn std::future::Future<
        Output = Result<(), sqlx::Error>
      > + Send
      + '_
  >
> {
  move |conn, _meta| {
    let schema_name = schema.clone();

    Box::pin(async move {
      let schema_ident =
        quote_ident(&schema_name);

      let create_stmt = format!(
        "CREATE SCHEMA IF NOT EXISTS \
         {schema_ident}"
      );

      sqlx::query(&create_stmt)
        .execute(&mut *conn)
        .await?;

      let search_stmt = format!(
        "SET search_path TO \
         {schema_ident}"
      );

      sqlx::query(&search_stmt)
        .execute(&mut *conn)
        .await?;

      // timestamps are epoch ms; keep the
      // session in UTC
      sqlx::query("SET TIME ZONE 'UTC'")
        .execute(&mut *conn)
        .await?;

      Ok(())
    })
  }
}

pub(crate) fn quote_ident(name: &str) -> String {
  format!(
    "\"{}\"",
    name.replace('"', "\"\"")
  )
}

fn connect_options(
  cfg: &PostgresSettings,
  database: Option<&str>
) -> PgConnectOptions {
  let mut opts = PgConnectOptions::new()
    .host(&cfg.host)
    .port(cfg.port)
    .username(&cfg.user)
    .password(&cfg.password);

  if let Some(db) = database {
    opts = opts.database(db);
  }

  opts
}

async fn ensure_database_exists(
  cfg: &PostgresSettings
) -> Result<(), sqlx::Error> {
  validate_db_name(&cfg.database)?;

  let admin_opts =
    connect_options(cfg, Some("postgres"));

  let admin_pool = PgPoolOptions::new()
    .max_connections(2)
    .connect_with(admin_opts)
    .await?;

  let create_sql = format!(
    "CREATE DATABASE {}",
    quote_ident(&cfg.database)
  );

  let res = sqlx::query(&create_sql)
    .execute(&admin_pool)
    .await;

  match res {
    | Ok(_) => {
      info!(
        database = %cfg.database,
        "postgres database created"
      );
      Ok(())
    }
    | Err(e) if is_duplicate_db_error(&e) => {
      Ok(())
    }
    | Err(e) => Err(e)
  }
}

fn validate_db_name(
  name: &str
) -> Result<(), sqlx::Error> {
  if !name.is_empty()
    && name.chars().all(|c| {
      c.is_ascii_alphanumeric()
        || c == '_'
        || c == '-'
    })
  {
    Ok(())
  } else {
    Err(sqlx::Error::Configuration(
      format!(
        "invalid postgres database name \
         '{name}': only alphanumeric, '_' \
         and '-' allowed"
      )
      .into()
    ))
  }
}

fn is_duplicate_db_error(
  e: &sqlx::Error
) -> bool {
  matches!(
    e,
    sqlx::Error::Database(db_err)
      if db_err.code().as_deref() == Some("42P04")
  )
}
