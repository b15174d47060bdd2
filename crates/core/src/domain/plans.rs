//! Subscription plan catalog and the
//! Stripe price metadata attached to it.
//! No Stripe calls happen here; the
//! catalog only maps prices to plans and
//! answers limit questions.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{
  Deserialize,
  Serialize
};

use crate::domain::model::ParseEnumError;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "snake_case")]

pub enum PlanId {
  Basic,
  Professional,
  Enterprise
}

impl PlanId {
  pub const ALL: [PlanId; 3] = [
    PlanId::Basic,
    PlanId::Professional,
    PlanId::Enterprise
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      | PlanId::Basic => "basic",
      | PlanId::Professional => {
        "professional"
      }
      | PlanId::Enterprise => "enterprise"
    }
  }
}

impl FromStr for PlanId {
  type Err = ParseEnumError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s.trim() {
      | "basic" => Ok(PlanId::Basic),
      | "professional" => {
        Ok(PlanId::Professional)
      }
      | "enterprise" => {
        Ok(PlanId::Enterprise)
      }
      | other => {
        Err(ParseEnumError::new(
          "plan", other
        ))
      }
    }
  }
}

impl TryFrom<String> for PlanId {
  type Error = ParseEnumError;

  fn try_from(
    value: String
  ) -> Result<Self, Self::Error> {
    value.parse()
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "snake_case")]

pub enum BillingInterval {
  Monthly,
  Yearly
}

impl BillingInterval {
  pub fn as_str(self) -> &'static str {
    match self {
      | BillingInterval::Monthly => {
        "monthly"
      }
      | BillingInterval::Yearly => "yearly"
    }
  }
}

impl FromStr for BillingInterval {
  type Err = ParseEnumError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s.trim() {
      | "monthly" => Ok(Self::Monthly),
      | "yearly" => Ok(Self::Yearly),
      | other => {
        Err(ParseEnumError::new(
          "billing interval",
          other
        ))
      }
    }
  }
}

impl TryFrom<String> for BillingInterval {
  type Error = ParseEnumError;

  fn try_from(
    value: String
  ) -> Result<Self, Self::Error> {
    value.parse()
  }
}

/// Mirrors the Stripe subscription
/// status values we act on.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "snake_case")]

pub enum SubscriptionStatus {
  Trialing,
  Active,
  PastDue,
  Canceled,
  Unpaid
}

impl SubscriptionStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      | Self::Trialing => "trialing",
      | Self::Active => "active",
      | Self::PastDue => "past_due",
      | Self::Canceled => "canceled",
      | Self::Unpaid => "unpaid"
    }
  }

  /// Past-due clinics keep access while
  /// Stripe retries the charge.
  pub fn grants_access(self) -> bool {
    matches!(
      self,
      Self::Trialing
        | Self::Active
        | Self::PastDue
    )
  }
}

impl FromStr for SubscriptionStatus {
  type Err = ParseEnumError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s.trim() {
      | "trialing" => Ok(Self::Trialing),
      | "active" => Ok(Self::Active),
      | "past_due" => Ok(Self::PastDue),
      | "canceled" => Ok(Self::Canceled),
      | "unpaid" => Ok(Self::Unpaid),
      | other => {
        Err(ParseEnumError::new(
          "subscription status",
          other
        ))
      }
    }
  }
}

impl TryFrom<String> for SubscriptionStatus {
  type Error = ParseEnumError;

  fn try_from(
    value: String
  ) -> Result<Self, Self::Error> {
    value.parse()
  }
}

/// `None` means unlimited.
#[derive(
  Debug, Clone, PartialEq, Eq, Serialize,
)]

pub struct PlanLimits {
  pub max_users:            Option<i64>,
  pub max_patients:         Option<i64>,
  pub max_providers:        Option<i64>,
  pub calendar_sync:        bool,
  pub audit_retention_days: i64
}

#[derive(
  Debug,
  Clone,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]

pub struct StripePrices {
  pub monthly: Option<String>,
  pub yearly:  Option<String>
}

#[derive(
  Debug, Clone, PartialEq, Eq, Serialize,
)]

pub struct Plan {
  pub id:                  PlanId,
  pub name:                String,
  pub description:         String,
  pub monthly_price_cents: i64,
  pub yearly_price_cents:  i64,
  pub features:            Vec<String>,
  pub limits:              PlanLimits,
  pub stripe_prices:       StripePrices
}

impl Plan {
  pub fn price_cents(
    &self,
    interval: BillingInterval
  ) -> i64 {
    match interval {
      | BillingInterval::Monthly => {
        self.monthly_price_cents
      }
      | BillingInterval::Yearly => {
        self.yearly_price_cents
      }
    }
  }

  /// What a year costs on monthly
  /// billing minus the yearly price.
  pub fn yearly_savings_cents(&self) -> i64 {
    self.monthly_price_cents * 12
      - self.yearly_price_cents
  }

  pub fn yearly_discount_pct(&self) -> f64 {
    let full = self.monthly_price_cents * 12;

    if full == 0 {
      return 0.0;
    }

    self.yearly_savings_cents() as f64
      / full as f64
      * 100.0
  }

  pub fn stripe_price(
    &self,
    interval: BillingInterval
  ) -> Option<&str> {
    match interval {
      | BillingInterval::Monthly => {
        self.stripe_prices.monthly.as_deref()
      }
      | BillingInterval::Yearly => {
        self.stripe_prices.yearly.as_deref()
      }
    }
  }
}

#[derive(Debug, Clone)]

pub struct PlanCatalog {
  plans: Vec<Plan>
}

impl Default for PlanCatalog {
  fn default() -> Self {
    Self::standard()
  }
}

impl PlanCatalog {
  /// The three published tiers. Yearly
  /// billing is ten monthly payments.
  pub fn standard() -> Self {
    let plan = |id: PlanId,
                name: &str,
                description: &str,
                monthly: i64,
                features: &[&str],
                limits: PlanLimits| {
      Plan {
        id,
        name: name.to_string(),
        description: description
          .to_string(),
        monthly_price_cents: monthly,
        yearly_price_cents: monthly * 10,
        features: features
          .iter()
          .map(|f| f.to_string())
          .collect(),
        limits,
        stripe_prices: StripePrices::default()
      }
    };

    Self {
      plans: vec![
        plan(
          PlanId::Basic,
          "Basic",
          "Single-dentist practice",
          4_900,
          &[
            "appointments",
            "patients",
            "cost_tracking",
            "audit_log"
          ],
          PlanLimits {
            max_users:            Some(3),
            max_patients:         Some(500),
            max_providers:        Some(1),
            calendar_sync:        false,
            audit_retention_days: 365
          }
        ),
        plan(
          PlanId::Professional,
          "Professional",
          "Growing clinic with several \
           chairs",
          9_900,
          &[
            "appointments",
            "patients",
            "cost_tracking",
            "audit_log",
            "calendar_sync",
            "break_even_analysis"
          ],
          PlanLimits {
            max_users:            Some(10),
            max_patients:         Some(5_000),
            max_providers:        Some(5),
            calendar_sync:        true,
            audit_retention_days: 1_095
          }
        ),
        plan(
          PlanId::Enterprise,
          "Enterprise",
          "Multi-chair clinics and groups",
          19_900,
          &[
            "appointments",
            "patients",
            "cost_tracking",
            "audit_log",
            "calendar_sync",
            "break_even_analysis",
            "priority_support"
          ],
          PlanLimits {
            max_users:            None,
            max_patients:         None,
            max_providers:        None,
            calendar_sync:        true,
            audit_retention_days: 3_650
          }
        ),
      ]
    }
  }

  pub fn with_stripe_prices(
    mut self,
    prices: &HashMap<PlanId, StripePrices>
  ) -> Self {
    for plan in &mut self.plans {
      if let Some(p) = prices.get(&plan.id)
      {
        plan.stripe_prices = p.clone();
      }
    }

    self
  }

  pub fn list(&self) -> &[Plan] {
    &self.plans
  }

  pub fn get(
    &self,
    id: PlanId
  ) -> Option<&Plan> {
    self.plans.iter().find(|p| p.id == id)
  }

  pub fn find_by_stripe_price(
    &self,
    price_id: &str
  ) -> Option<(&Plan, BillingInterval)> {
    let price_id = price_id.trim();

    if price_id.is_empty() {
      return None;
    }

    self.plans.iter().find_map(|plan| {
      [
        BillingInterval::Monthly,
        BillingInterval::Yearly
      ]
      .into_iter()
      .find(|i| {
        plan.stripe_price(*i)
          == Some(price_id)
      })
      .map(|i| (plan, i))
    })
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize,
)]

pub struct LimitCheck {
  pub allowed:   bool,
  pub limit:     Option<i64>,
  pub current:   i64,
  pub remaining: Option<i64>
}

/// Whether one more item fits under
/// `limit` given `current` usage.
pub fn check_limit(
  limit: Option<i64>,
  current: i64
) -> LimitCheck {
  match limit {
    | None => {
      LimitCheck {
        allowed: true,
        limit,
        current,
        remaining: None
      }
    }
    | Some(max) => {
      LimitCheck {
        allowed: current < max,
        limit,
        current,
        remaining: Some(
          (max - current).max(0)
        )
      }
    }
  }
}

#[derive(
  Debug, Clone, Serialize, sqlx::FromRow,
)]

pub struct Subscription {
  pub clinic_id:              i64,
  #[sqlx(try_from = "String")]
  pub plan_id:                PlanId,
  #[sqlx(try_from = "String")]
  pub billing_interval:       BillingInterval,
  #[sqlx(try_from = "String")]
  pub status:                 SubscriptionStatus,
  pub stripe_customer_id:     Option<String>,
  pub stripe_subscription_id: Option<String>,
  pub current_period_end_ms:  Option<i64>,
  pub updated_at_ms:          i64
}

impl Subscription {
  /// What a clinic without a stored
  /// subscription is on.
  pub fn trial(
    clinic_id: i64,
    now_ms: i64
  ) -> Self {
    Self {
      clinic_id,
      plan_id: PlanId::Basic,
      billing_interval:
        BillingInterval::Monthly,
      status: SubscriptionStatus::Trialing,
      stripe_customer_id: None,
      stripe_subscription_id: None,
      current_period_end_ms: None,
      updated_at_ms: now_ms
    }
  }
}

/// Formats cents with the currency
/// symbol and thousands separators.
pub fn format_price(
  cents: i64,
  currency: &str
) -> String {
  let code = currency.trim().to_lowercase();

  let prefix = match code.as_str() {
    | "usd" => "$".to_string(),
    | "eur" => "€".to_string(),
    | "mxn" => "MX$".to_string(),
    | other => {
      format!("{} ", other.to_uppercase())
    }
  };

  let sign = if cents < 0 { "-" } else { "" };

  let abs = cents.unsigned_abs();

  let units = (abs / 100).to_string();

  let mut grouped = String::new();

  for (i, ch) in units.chars().enumerate() {
    if i > 0 && (units.len() - i) % 3 == 0
    {
      grouped.push(',');
    }
    grouped.push(ch);
  }

  format!(
    "{sign}{prefix}{grouped}.{:02}",
    abs % 100
  )
}
