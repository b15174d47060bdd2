#![allow(dead_code)]

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use axum::http::{HeaderMap, HeaderValue, header};
use chrono_tz::Tz;
use clinicdesk_core::domain::calendar::{CalendarEvent, OAuthTokens};
use clinicdesk_core::domain::model::TenantContext;
use clinicdesk_core::domain::scheduling::TimeWindow;
use clinicdesk_core::infra::sqlite_repo::SqliteRepo;
use clinicdesk_core::ports::calendar::{CalendarClient, CalendarError};
use clinicdesk_core::ports::clock::Clock;
use clinicdesk_core::ports::repo::{Repo, TenantRepo};
use clinicdesk_server::app_state::AppState;
use clinicdesk_server::auth::hash_token;
use clinicdesk_server::config::ServerConfig;
use clinicdesk_server::db;
use clinicdesk_server::errors::ServerError;

// 2030-01-07 00:00 UTC, a Monday.
pub const MONDAY: i64 = 1_893_974_400_000;
pub const HOUR: i64 = 3_600_000;
pub const NOW: i64 = MONDAY + 7 * HOUR;

pub const OWNER: &str = "owner-token";
pub const DENTIST: &str = "dentist-token";
pub const STAFF: &str = "staff-token";

const CONFIG: &str = r#"
[app]
mode = "dev"

[http]
host = "127.0.0.1"
port = 8080

[database]
dialect = "sqlite"

[sqlite]
path = ":memory:"

[logging]

[auth]
token_ttl_seconds = 86400

[dev]
reset_on_start = false

[seed]
clinic_name = "Smile"
timezone = "UTC"
owner_name = "Owner"
token = "owner-token"

[[seed.users]]
name = "Dr. Ruiz"
role = "dentist"
token = "dentist-token"

[[seed.users]]
name = "Front Desk"
role = "staff"
token = "staff-token"

[billing]
currency = "eur"

[billing.prices.professional]
monthly = "price_pro_monthly"
yearly = "price_pro_yearly"
"#;

pub struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn set(&self, now_ms: i64) {
        self.0.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_epoch_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeCalendar {
    pub calls: Mutex<Vec<String>>,
    pub remote: Vec<CalendarEvent>,
}

impl FakeCalendar {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl CalendarClient for FakeCalendar {
    async fn exchange_code(&self, code: &str) -> Result<OAuthTokens, CalendarError> {
        self.log(format!("exchange:{code}"));
        Ok(OAuthTokens {
            access_token: "at".to_string(),
            refresh_token: Some("rt".to_string()),
            expires_in_seconds: 3_600,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<OAuthTokens, CalendarError> {
        self.log(format!("refresh:{refresh_token}"));
        Ok(OAuthTokens {
            access_token: "at2".to_string(),
            refresh_token: None,
            expires_in_seconds: 3_600,
        })
    }

    async fn insert_event(
        &self,
        _access_token: &str,
        _calendar_id: &str,
        event: &CalendarEvent,
    ) -> Result<String, CalendarError> {
        let id = event.appointment_id.unwrap_or_default();
        self.log(format!("insert:{id}"));
        Ok(format!("evt-{id}"))
    }

    async fn update_event(
        &self,
        _access_token: &str,
        _calendar_id: &str,
        event_id: &str,
        _event: &CalendarEvent,
    ) -> Result<(), CalendarError> {
        self.log(format!("update:{event_id}"));
        Ok(())
    }

    async fn delete_event(
        &self,
        _access_token: &str,
        _calendar_id: &str,
        event_id: &str,
    ) -> Result<(), CalendarError> {
        self.log(format!("delete:{event_id}"));
        Ok(())
    }

    async fn list_events(
        &self,
        _access_token: &str,
        _calendar_id: &str,
        _window: TimeWindow,
        _tz: Tz,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        self.log("list".to_string());
        Ok(self.remote.clone())
    }
}

pub fn external(id: &str, start: i64, end: i64) -> CalendarEvent {
    CalendarEvent {
        id: Some(id.to_string()),
        summary: "Conference".to_string(),
        description: None,
        start_ms: start,
        end_ms: end,
        timezone: "UTC".to_string(),
        appointment_id: None,
        cancelled: false,
        all_day: false,
    }
}

pub fn config() -> ServerConfig {
    toml::from_str(CONFIG).unwrap()
}

pub struct TestApp {
    pub state: AppState,
    pub clock: Arc<FixedClock>,
}

impl TestApp {
    pub async fn new() -> Self {
        let config = config();
        let repo = SqliteRepo::in_memory().await.unwrap();
        repo.migrate().await.unwrap();
        let repo: Arc<dyn Repo> = Arc::new(repo);

        db::seed_tenant(repo.as_ref(), &config, NOW).await.unwrap();

        let clock = Arc::new(FixedClock(AtomicI64::new(NOW)));
        let state = AppState::from_config(&config, repo, clock.clone()).unwrap();

        Self { state, clock }
    }

    pub fn with_calendar(mut self, client: Arc<FakeCalendar>) -> Self {
        self.state.calendar = Some(client as Arc<dyn CalendarClient>);
        self
    }

    pub async fn ctx(&self, token: &str) -> TenantContext {
        self.state
            .repo
            .resolve_token(&hash_token(token), NOW)
            .await
            .unwrap()
            .unwrap()
    }
}

pub fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    );
    headers
}

pub fn expect_err<T>(result: Result<T, ServerError>) -> ServerError {
    match result {
        Ok(_) => panic!("expected an error response"),
        Err(e) => e,
    }
}
