use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clinicdesk_core::infra::system_clock::SystemClock;
use clinicdesk_core::ports::clock::Clock;
use clinicdesk_server::app_state::AppState;
use clinicdesk_server::config::{ConfigError, ServerConfig};
use clinicdesk_server::{db, handlers, logging};

#[tokio::main]
async fn main() -> Result<(), ConfigError> {
    let config_path = std::env::var("SERVER_CONFIG_PATH")
        .unwrap_or_else(|_| "crates/server/res/config.toml".to_string());

    let config = ServerConfig::load(Path::new(&config_path)).await?;
    logging::init_tracing(&config)?;
    if let Some(tz) = config.app.timezone.as_deref() {
        tracing::info!(timezone = tz, "server timezone configured");
    }

    tracing::info!(mode = ?config.app.mode, "server mode configured");
    tracing::info!(host = %config.http.host, port = config.http.port, "server http bind");

    let repo = db::connect_repo(&config, Path::new(&config_path)).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    db::seed_tenant(repo.as_ref(), &config, clock.now_epoch_ms()).await?;

    let state = AppState::from_config(&config, repo, clock)?;
    let _sweeper = state
        .cache
        .spawn_sweeper(Duration::from_secs(config.cache.sweep_interval_seconds));

    let addr: SocketAddr = format!("{}:{}", config.http.host, config.http.port)
        .parse()
        .map_err(|e| ConfigError::Invalid(format!("invalid http bind: {e}")))?;

    let app = handlers::router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| ConfigError::Invalid(format!("http server error: {e}")))?;

    Ok(())
}
