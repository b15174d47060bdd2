use std::collections::HashMap;
use std::path::{
  Path,
  PathBuf
};

use clinicdesk_core::domain::model::Role;
use clinicdesk_core::domain::plans::{
  PlanId,
  StripePrices
};
use clinicdesk_core::domain::scheduling::SchedulingRules;
use clinicdesk_core::infra::google_calendar::{
  DEFAULT_API_BASE,
  DEFAULT_TOKEN_URL,
  GoogleCalendarConfig
};
use clinicdesk_core::infra::postgres_repo::PostgresSettings;
use clinicdesk_core::ports::repo::RepoError;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]

pub enum ConfigError {
  #[error("config IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("config parse error: {0}")]
  Parse(#[from] toml::de::Error),
  #[error("config invalid: {0}")]
  Invalid(String),
  #[error("startup database error: {0}")]
  Database(#[from] RepoError)
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]

pub enum AppMode {
  Dev,
  Prod
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]

pub enum SqlDialect {
  Sqlite,
  Postgres
}

#[derive(Debug, Deserialize)]

pub struct ServerConfig {
  pub app:      AppConfig,
  pub http:     HttpConfig,
  pub database: DatabaseConfig,
  pub sqlite:   SqliteConfig,
  pub postgres: Option<PostgresConfig>,
  pub logging:  LoggingConfig,
  pub auth:     AuthConfig,
  pub dev:      DevConfig,
  pub seed:     SeedConfig,
  #[serde(default)]
  pub scheduling: SchedulingConfig,
  #[serde(default)]
  pub cache:    CacheConfig,
  #[serde(default)]
  pub audit:    AuditConfig,
  #[serde(default)]
  pub billing:  BillingConfig,
  pub calendar: Option<CalendarConfig>
}

#[derive(Debug, Deserialize)]

pub struct AppConfig {
  pub mode:     AppMode,
  pub timezone: Option<String>
}

#[derive(Debug, Deserialize)]

pub struct HttpConfig {
  pub host: String,
  pub port: u16
}

#[derive(Debug, Deserialize)]

pub struct DatabaseConfig {
  pub dialect: String
}

#[derive(Debug, Deserialize)]

pub struct SqliteConfig {
  pub path: String
}

#[derive(Debug, Deserialize)]

pub struct PostgresConfig {
  pub host:           String,
  pub port:           u16,
  pub database:       String,
  pub user:           String,
  pub password:       String,
  pub schema:         String
}

#[derive(Debug, Deserialize)]

pub struct LoggingConfig {
  pub level: Option<String>
}

#[derive(Debug, Deserialize)]

pub struct AuthConfig {
  pub token_ttl_seconds: u64
}

#[derive(Debug, Deserialize)]

pub struct DevConfig {
  pub reset_on_start: bool
}

#[derive(Debug, Deserialize)]

pub struct SeedConfig {
  pub clinic_name: String,
  pub timezone:    String,
  pub owner_name:  String,
  pub owner_email: Option<String>,
  pub token:       String,
  #[serde(default)]
  pub users:       Vec<SeedUserConfig>
}

/// Extra staff created next to the
/// owner, each with its own token.
#[derive(Debug, Deserialize)]

pub struct SeedUserConfig {
  pub name:  String,
  pub email: Option<String>,
  pub role:  Role,
  pub token: String
}

/// Unset keys keep the built-in rule.
#[derive(Debug, Default, Deserialize)]

pub struct SchedulingConfig {
  pub slot_minutes:         Option<i64>,
  pub min_duration_minutes: Option<i64>,
  pub max_duration_minutes: Option<i64>,
  pub buffer_minutes:       Option<i64>,
  pub max_days_ahead:       Option<i64>,
  pub suggestion_days:      Option<i64>,
  pub max_suggestions:      Option<usize>
}

impl SchedulingConfig {
  pub fn rules(&self) -> SchedulingRules {
    let base = SchedulingRules::default();

    SchedulingRules {
      slot_minutes:         self
        .slot_minutes
        .unwrap_or(base.slot_minutes),
      min_duration_minutes: self
        .min_duration_minutes
        .unwrap_or(base.min_duration_minutes),
      max_duration_minutes: self
        .max_duration_minutes
        .unwrap_or(base.max_duration_minutes),
      buffer_minutes:       self
        .buffer_minutes
        .unwrap_or(base.buffer_minutes),
      max_days_ahead:       self
        .max_days_ahead
        .unwrap_or(base.max_days_ahead),
      suggestion_days:      self
        .suggestion_days
        .unwrap_or(base.suggestion_days),
      max_suggestions:      self
        .max_suggestions
        .unwrap_or(base.max_suggestions)
    }
  }
}

#[derive(Debug, Deserialize)]

pub struct CacheConfig {
  #[serde(default = "default_cache_ttl")]
  pub default_ttl_seconds:    u64,
  #[serde(default = "default_sweep_interval")]
  pub sweep_interval_seconds: u64
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      default_ttl_seconds:    default_cache_ttl(),
      sweep_interval_seconds: default_sweep_interval()
    }
  }
}

fn default_cache_ttl() -> u64 {
  300
}

fn default_sweep_interval() -> u64 {
  60
}

#[derive(Debug, Deserialize)]

pub struct AuditConfig {
  #[serde(default = "default_retention_days")]
  pub retention_days: i64
}

impl Default for AuditConfig {
  fn default() -> Self {
    Self {
      retention_days: default_retention_days()
    }
  }
}

fn default_retention_days() -> i64 {
  365
}

#[derive(Debug, Deserialize)]

pub struct BillingConfig {
  #[serde(default = "default_currency")]
  pub currency: String,
  #[serde(default)]
  pub prices:   HashMap<PlanId, StripePrices>
}

impl Default for BillingConfig {
  fn default() -> Self {
    Self {
      currency: default_currency(),
      prices:   HashMap::new()
    }
  }
}

fn default_currency() -> String {
  "usd".to_string()
}

/// Google OAuth client. Without this
/// section the calendar endpoints answer
/// with a conflict.
#[derive(Debug, Deserialize)]

pub struct CalendarConfig {
  pub client_id:             String,
  pub client_secret:         String,
  pub redirect_uri:          String,
  pub token_url:             Option<String>,
  pub api_base:              Option<String>,
  #[serde(default)]
  pub include_patient_names: bool
}

impl CalendarConfig {
  pub fn client_config(
    &self
  ) -> GoogleCalendarConfig {
    GoogleCalendarConfig {
      client_id:     self.client_id.clone(),
      client_secret: self
        .client_secret
        .clone(),
      redirect_uri:  self
        .redirect_uri
        .clone(),
      token_url:     self
        .token_url
        .clone()
        .unwrap_or_else(|| {
          DEFAULT_TOKEN_URL.to_string()
        }),
      api_base:      self
        .api_base
        .clone()
        .unwrap_or_else(|| {
          DEFAULT_API_BASE.to_string()
        })
    }
  }
}

impl ServerConfig {
  pub async fn load(
    path: &Path
  ) -> Result<Self, ConfigError> {
    let base_dir = path
      .parent()
      .ok_or_else(|| {
        ConfigError::Invalid(
          "config path has no parent"
            .into()
        )
      })?;

    let schema_path = base_dir
      .join("schemas")
      .join("server.schema.json");

    let schema =
      load_schema(&schema_path).await?;

    let content =
      tokio::fs::read_to_string(path)
        .await?;

    validate_toml(
      &schema,
      &content,
      &path.display().to_string()
    )?;

    let config: ServerConfig =
      toml::from_str(&content)?;

    Ok(config)
  }

  pub fn dialect(
    &self
  ) -> Result<SqlDialect, ConfigError>
  {
    match self
      .database
      .dialect
      .trim()
      .to_lowercase()
      .as_str()
    {
      | "sqlite" => {
        Ok(SqlDialect::Sqlite)
      }
      | "postgres" => {
        Ok(SqlDialect::Postgres)
      }
      | other => {
        Err(ConfigError::Invalid(
          format!(
            "invalid database.dialect \
             '{other}'"
          )
        ))
      }
    }
  }

  pub fn sqlite_path(
    &self,
    base_dir: &Path
  ) -> PathBuf {
    let raw = self.sqlite.path.trim();

    if raw.is_empty() {
      return base_dir
        .join("server.sqlite");
    }

    base_dir.join(raw)
  }

  pub fn postgres_settings(
    &self
  ) -> Result<PostgresSettings, ConfigError>
  {
    let pg =
      self.postgres.as_ref().ok_or_else(
        || {
          ConfigError::Invalid(
            "postgres section missing"
              .into()
          )
        }
      )?;

    Ok(PostgresSettings {
      host:     pg.host.clone(),
      port:     pg.port,
      user:     pg.user.clone(),
      password: pg.password.clone(),
      database: pg.database.clone(),
      schema:   validate_schema_name(
        &pg.schema
      )?
    })
  }
}

async fn load_schema(
  path: &Path
) -> Result<String, ConfigError> {
  let content =
    tokio::fs::read_to_string(path)
      .await
      .map_err(|_| {
        ConfigError::Invalid(format!(
          "schema not found at {}",
          path.display()
        ))
      })?;

  Ok(content)
}

fn validate_toml(
  schema: &str,
  toml_input: &str,
  name: &str
) -> Result<(), ConfigError> {
  let schema_json: serde_json::Value =
    serde_json::from_str(schema)
      .map_err(|e| {
        ConfigError::Invalid(format!(
          "schema parse error: {e}"
        ))
      })?;

  let compiled =
    jsonschema::validator_for(
      &schema_json
    )
    .map_err(|e| {
      ConfigError::Invalid(format!(
        "schema compile error: {e}"
      ))
    })?;

  let toml_value: toml::Value =
    toml::from_str(toml_input)
      .map_err(|e| {
        ConfigError::Invalid(format!(
          "{name}: {e}"
        ))
      })?;

  let json_value =
    serde_json::to_value(toml_value)
      .map_err(|e| {
        ConfigError::Invalid(
          e.to_string()
        )
      })?;

  let mut errors =
    compiled.iter_errors(&json_value);

  if let Some(err) = errors.next() {
    let mut messages =
      vec![err.to_string()];

    for e in errors.take(4) {
      messages.push(e.to_string());
    }

    return Err(ConfigError::Invalid(
      format!(
        "schema validation failed for \
         {name}: {}",
        messages.join("; ")
      )
    ));
  }

  Ok(())
}

pub(crate) fn validate_schema_name(
  raw: &str
) -> Result<String, ConfigError> {
  let trimmed = raw.trim();

  if trimmed.is_empty() {
    return Err(ConfigError::Invalid(
      "postgres schema cannot be empty"
        .into()
    ));
  }

  if !trimmed.chars().all(|c| {
    c.is_ascii_alphanumeric()
      || c == '_'
  }) {
    return Err(ConfigError::Invalid(
      format!(
        "invalid postgres schema \
         '{trimmed}': only \
         alphanumeric and '_' allowed"
      )
    ));
  }

  Ok(trimmed.to_string())
}
