use std::sync::Arc;
use std::time::Duration;

use clinicdesk_core::app::calendar_sync::CalendarSync;
use clinicdesk_core::domain::plans::PlanCatalog;
use clinicdesk_core::domain::scheduling::SchedulingRules;
use clinicdesk_core::infra::cache::ResponseCache;
use clinicdesk_core::infra::google_calendar::GoogleCalendarClient;
use clinicdesk_core::ports::calendar::{CalendarClient, CalendarError};
use clinicdesk_core::ports::clock::Clock;
use clinicdesk_core::ports::repo::Repo;

use crate::config::{ConfigError, ServerConfig};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub clock: Arc<dyn Clock>,
    pub cache: Arc<ResponseCache>,
    pub plans: Arc<PlanCatalog>,
    pub rules: Arc<SchedulingRules>,
    /// `None` when no `[calendar]` section is configured.
    pub calendar: Option<Arc<dyn CalendarClient>>,
    pub include_patient_names: bool,
    pub audit_retention_days: i64,
    pub currency: String,
}

impl AppState {
    pub fn now_ms(&self) -> i64 {
        self.clock.now_epoch_ms()
    }

    pub fn calendar_sync(&self) -> Result<CalendarSync<'_>, CalendarError> {
        let client = self.calendar.as_deref().ok_or(CalendarError::Disabled)?;
        Ok(CalendarSync::new(
            self.repo.as_ref(),
            client,
            self.include_patient_names,
        ))
    }
}

impl AppState {
    /// Wires the configured collaborators around an opened repository.
    pub fn from_config(
        config: &ServerConfig,
        repo: Arc<dyn Repo>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let cache = Arc::new(ResponseCache::new(
            clock.clone(),
            Duration::from_secs(config.cache.default_ttl_seconds),
        ));

        let plans = PlanCatalog::standard().with_stripe_prices(&config.billing.prices);

        let calendar = match &config.calendar {
            Some(cfg) => {
                let client = GoogleCalendarClient::new(cfg.client_config())
                    .map_err(|e| ConfigError::Invalid(format!("calendar client: {e}")))?;
                tracing::info!("google calendar integration enabled");
                Some(Arc::new(client) as Arc<dyn CalendarClient>)
            }
            None => None,
        };

        Ok(Self {
            repo,
            clock,
            cache,
            plans: Arc::new(plans),
            rules: Arc::new(config.scheduling.rules()),
            include_patient_names: config
                .calendar
                .as_ref()
                .is_some_and(|c| c.include_patient_names),
            calendar,
            audit_retention_days: config.audit.retention_days,
            currency: config.billing.currency.clone(),
        })
    }
}
