use std::path::{Path, PathBuf};

use clinicdesk_core::domain::model::Role;
use clinicdesk_core::domain::plans::PlanId;
use clinicdesk_server::config::{AppMode, ConfigError, ServerConfig, SqlDialect};
use tempfile::TempDir;

fn res_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("res")
}

/// Lays out `config.toml` next to a copy of the shipped schema.
fn workspace(config: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("schemas")).unwrap();
    std::fs::copy(
        res_dir().join("schemas").join("server.schema.json"),
        dir.path().join("schemas").join("server.schema.json"),
    )
    .unwrap();

    let path = dir.path().join("config.toml");
    std::fs::write(&path, config).unwrap();
    (dir, path)
}

fn shipped_config() -> String {
    std::fs::read_to_string(res_dir().join("config.toml")).unwrap()
}

#[tokio::test]
async fn shipped_config_loads() {
    let (dir, path) = workspace(&shipped_config());
    let config = ServerConfig::load(&path).await.unwrap();

    assert_eq!(config.app.mode, AppMode::Dev);
    assert_eq!(config.dialect().unwrap(), SqlDialect::Sqlite);
    assert_eq!(
        config.sqlite_path(dir.path()),
        dir.path().join("clinicdesk.sqlite")
    );

    assert_eq!(config.seed.clinic_name, "Demo Dental");
    assert_eq!(config.seed.users.len(), 2);
    assert_eq!(config.seed.users[0].role, Role::Dentist);

    let rules = config.scheduling.rules();
    assert_eq!(rules.slot_minutes, 15);
    assert_eq!(rules.max_days_ahead, 180);

    assert_eq!(config.audit.retention_days, 365);
    assert_eq!(config.billing.currency, "eur");
    assert_eq!(
        config.billing.prices[&PlanId::Professional].monthly.as_deref(),
        Some("price_professional_monthly")
    );
    assert!(config.calendar.is_none());
}

#[tokio::test]
async fn schema_rejects_bad_values() {
    let broken = shipped_config().replace("port = 8080", "port = 70000");
    let (_dir, path) = workspace(&broken);

    let err = ServerConfig::load(&path).await.unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[tokio::test]
async fn missing_schema_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, shipped_config()).unwrap();

    let err = ServerConfig::load(&path).await.unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(ref m) if m.starts_with("schema not found")));
}

#[test]
fn optional_sections_fall_back_to_defaults() {
    let minimal = r#"
[app]
mode = "prod"

[http]
host = "0.0.0.0"
port = 8080

[database]
dialect = "postgres"

[sqlite]
path = ""

[logging]

[auth]
token_ttl_seconds = 60

[dev]
reset_on_start = true

[seed]
clinic_name = "Smile"
timezone = "UTC"
owner_name = "Owner"
token = "t"
"#;

    let config: ServerConfig = toml::from_str(minimal).unwrap();
    assert_eq!(config.dialect().unwrap(), SqlDialect::Postgres);
    assert_eq!(config.cache.default_ttl_seconds, 300);
    assert_eq!(config.billing.currency, "usd");
    assert!(config.seed.users.is_empty());
    assert!(config.postgres_settings().is_err());
    assert_eq!(
        config.sqlite_path(Path::new("/data")),
        Path::new("/data").join("server.sqlite")
    );
}
