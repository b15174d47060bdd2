use clinicdesk_core::domain::audit::ConsentRecord;
use clinicdesk_core::domain::plans::{
  Plan,
  Subscription,
  format_price
};
use serde::{
  Deserialize,
  Serialize
};

#[derive(Debug, Deserialize)]

pub struct AppointmentListQuery {
  pub from_ms:     Option<i64>,
  pub to_ms:       Option<i64>,
  pub provider_id: Option<i64>
}

#[derive(Debug, Default, Deserialize)]

pub struct PatientListQuery {
  #[serde(default)]
  pub include_erased: bool
}

#[derive(Debug, Serialize)]

pub struct ErasureResponse {
  pub patient_id:              i64,
  pub erased_at_ms:            Option<i64>,
  pub cancelled_appointments:  usize,
  pub calendar_events_removed: usize
}

#[derive(Debug, Serialize)]

pub struct ConsentsResponse {
  pub current: Vec<ConsentRecord>,
  pub history: Vec<ConsentRecord>
}

#[derive(Debug, Default, Deserialize)]

pub struct PurgeRequest {
  pub retention_days: Option<i64>
}

#[derive(Debug, Deserialize)]

pub struct CalendarConnectRequest {
  pub code:        String,
  #[serde(default = "default_calendar_id")]
  pub calendar_id: String
}

fn default_calendar_id() -> String {
  "primary".to_string()
}

#[derive(Debug, Default, Deserialize)]

pub struct CalendarSyncRequest {
  pub from_ms: Option<i64>,
  pub to_ms:   Option<i64>
}

#[derive(Debug, Serialize)]

pub struct DisconnectResponse {
  pub disconnected: bool
}

/// Plan with display prices in the
/// configured currency.
#[derive(Debug, Serialize)]

pub struct PlanView {
  #[serde(flatten)]
  pub plan:                 Plan,
  pub monthly_price:        String,
  pub yearly_price:         String,
  pub yearly_savings_cents: i64,
  pub yearly_discount_pct:  f64
}

impl PlanView {
  pub fn new(
    plan: &Plan,
    currency: &str
  ) -> Self {
    Self {
      plan:                 plan.clone(),
      monthly_price:        format_price(
        plan.monthly_price_cents,
        currency
      ),
      yearly_price:         format_price(
        plan.yearly_price_cents,
        currency
      ),
      yearly_savings_cents: plan
        .yearly_savings_cents(),
      yearly_discount_pct:  plan
        .yearly_discount_pct()
    }
  }
}

#[derive(Debug, Serialize)]

pub struct SubscriptionResponse {
  #[serde(flatten)]
  pub subscription:   Subscription,
  pub plan_name:      String,
  pub grants_access:  bool,
  /// Plan whose limits currently apply.
  pub effective_plan: String
}

#[derive(Debug, Serialize)]

pub struct CacheClearResponse {
  pub removed: usize
}
