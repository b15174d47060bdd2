//! Operational cost model: fixed monthly
//! costs, straight-line amortization of
//! equipment, cost per chair-minute,
//! service pricing and break-even.
//!
//! Money is integer cents throughout;
//! only the per-minute rate is kept as a
//! fraction and rounded when applied.

use std::str::FromStr;

use serde::{
  Deserialize,
  Serialize
};
use thiserror::Error;

use crate::domain::model::ParseEnumError;

pub const MAX_MARGIN_PCT: i64 = 1_000;
/// Ten billion in major units.
pub const MAX_AMOUNT_CENTS: i64 = 1_000_000_000_000;
pub const MAX_SERVICE_MINUTES: i64 = 1_440;

#[derive(Debug, Clone, PartialEq, Eq, Error)]

pub enum CostError {
  #[error("work_days_per_month must be between 1 and 31")]
  InvalidWorkDays,
  #[error("hours_per_day must be between 1 and 24")]
  InvalidHours,
  #[error("real_utilization_pct must be between 1 and 100")]
  InvalidUtilization,
  #[error("{0} must not be negative")]
  NegativeAmount(&'static str),
  #[error("useful_life_months must be at least 1")]
  InvalidUsefulLife,
  #[error("{0} must not exceed {max}", max = MAX_AMOUNT_CENTS)]
  AmountTooLarge(&'static str),
  #[error(
    "duration_minutes must be between 1 and {max}",
    max = MAX_SERVICE_MINUTES
  )]
  InvalidDuration,
  #[error("margin_pct must be between 0 and 1000")]
  InvalidMargin,
  #[error("{0} must not be empty")]
  EmptyField(&'static str),
  #[error("time settings leave no available minutes")]
  NoAvailableMinutes,
  #[error("monthly totals are out of range")]
  TotalOutOfRange
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  sqlx::FromRow,
)]

pub struct TimeSettings {
  pub work_days_per_month:  i64,
  pub hours_per_day:        i64,
  pub real_utilization_pct: i64
}

impl Default for TimeSettings {
  fn default() -> Self {
    Self {
      work_days_per_month:  22,
      hours_per_day:        8,
      real_utilization_pct: 80
    }
  }
}

impl TimeSettings {
  pub fn validate(
    &self
  ) -> Result<(), CostError> {
    if !(1..=31)
      .contains(&self.work_days_per_month)
    {
      return Err(
        CostError::InvalidWorkDays
      );
    }

    if !(1..=24)
      .contains(&self.hours_per_day)
    {
      return Err(CostError::InvalidHours);
    }

    if !(1..=100)
      .contains(&self.real_utilization_pct)
    {
      return Err(
        CostError::InvalidUtilization
      );
    }

    Ok(())
  }

  /// Chair minutes actually billable in
  /// a month once utilization is
  /// applied.
  pub fn available_minutes(&self) -> i64 {
    self.work_days_per_month
      * self.hours_per_day
      * 60
      * self.real_utilization_pct
      / 100
  }
}

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

pub enum FixedCostCategory {
  Rent,
  Salaries,
  Utilities,
  Insurance,
  Marketing,
  Software,
  Maintenance,
  Other
}

impl FixedCostCategory {
  pub fn as_str(self) -> &'static str {
    match self {
      | Self::Rent => "rent",
      | Self::Salaries => "salaries",
      | Self::Utilities => "utilities",
      | Self::Insurance => "insurance",
      | Self::Marketing => "marketing",
      | Self::Software => "software",
      | Self::Maintenance => "maintenance",
      | Self::Other => "other"
    }
  }
}

impl FromStr for FixedCostCategory {
  type Err = ParseEnumError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s.trim() {
      | "rent" => Ok(Self::Rent),
      | "salaries" => Ok(Self::Salaries),
      | "utilities" => Ok(Self::Utilities),
      | "insurance" => Ok(Self::Insurance),
      | "marketing" => Ok(Self::Marketing),
      | "software" => Ok(Self::Software),
      | "maintenance" => {
        Ok(Self::Maintenance)
      }
      | "other" => Ok(Self::Other),
      | other => {
        Err(ParseEnumError::new(
          "fixed cost category",
          other
        ))
      }
    }
  }
}

impl TryFrom<String> for FixedCostCategory {
  type Error = ParseEnumError;

  fn try_from(
    value: String
  ) -> Result<Self, Self::Error> {
    value.parse()
  }
}

#[derive(
  Debug, Clone, Serialize, sqlx::FromRow,
)]

pub struct FixedCost {
  pub id:                   i64,
  pub clinic_id:            i64,
  #[sqlx(try_from = "String")]
  pub category:             FixedCostCategory,
  pub concept:              String,
  pub monthly_amount_cents: i64,
  pub active:               bool,
  pub created_at_ms:        i64
}

#[derive(Debug, Clone, Deserialize)]

pub struct FixedCostInput {
  pub category:             FixedCostCategory,
  pub concept:              String,
  pub monthly_amount_cents: i64,
  #[serde(default = "default_active")]
  pub active:               bool
}

impl FixedCostInput {
  pub fn validate(
    &self
  ) -> Result<(), CostError> {
    if self.concept.trim().is_empty() {
      return Err(CostError::EmptyField(
        "concept"
      ));
    }

    check_amount(
      "monthly_amount_cents",
      self.monthly_amount_cents
    )
  }
}

#[derive(
  Debug, Clone, Serialize, sqlx::FromRow,
)]

pub struct Asset {
  pub id:                   i64,
  pub clinic_id:            i64,
  pub name:                 String,
  pub purchase_price_cents: i64,
  pub useful_life_months:   i64,
  pub purchased_at_ms:      Option<i64>,
  pub created_at_ms:        i64
}

impl Asset {
  pub fn monthly_depreciation_cents(
    &self
  ) -> i64 {
    monthly_depreciation_cents(
      self.purchase_price_cents,
      self.useful_life_months
    )
    .unwrap_or(0)
  }
}

#[derive(Debug, Clone, Deserialize)]

pub struct AssetInput {
  pub name:                 String,
  pub purchase_price_cents: i64,
  pub useful_life_months:   i64,
  pub purchased_at_ms:      Option<i64>
}

impl AssetInput {
  pub fn validate(
    &self
  ) -> Result<(), CostError> {
    if self.name.trim().is_empty() {
      return Err(CostError::EmptyField(
        "name"
      ));
    }

    monthly_depreciation_cents(
      self.purchase_price_cents,
      self.useful_life_months
    )
    .map(|_| ())
  }
}

#[derive(
  Debug, Clone, Serialize, sqlx::FromRow,
)]

pub struct ClinicService {
  pub id:                  i64,
  pub clinic_id:           i64,
  pub name:                String,
  pub duration_minutes:    i64,
  pub variable_cost_cents: i64,
  pub margin_pct:          i64,
  pub active:              bool,
  pub created_at_ms:       i64
}

#[derive(Debug, Clone, Deserialize)]

pub struct ServiceInput {
  pub name:                String,
  pub duration_minutes:    i64,
  pub variable_cost_cents: i64,
  pub margin_pct:          i64,
  #[serde(default = "default_active")]
  pub active:              bool
}

impl ServiceInput {
  pub fn validate(
    &self
  ) -> Result<(), CostError> {
    if self.name.trim().is_empty() {
      return Err(CostError::EmptyField(
        "name"
      ));
    }

    validate_quote(
      self.duration_minutes,
      self.variable_cost_cents,
      self.margin_pct
    )
  }
}

fn default_active() -> bool {
  true
}

/// Pricing preview for a service that
/// has not been saved.
#[derive(
  Debug, Clone, Copy, Deserialize,
)]

pub struct QuoteRequest {
  pub duration_minutes:    i64,
  pub variable_cost_cents: i64,
  pub margin_pct:          i64
}

#[derive(
  Debug, Clone, PartialEq, Serialize,
)]

pub struct CostBreakdown {
  pub duration_minutes:    i64,
  pub fixed_cost_cents:    i64,
  pub variable_cost_cents: i64,
  pub total_cost_cents:    i64,
  pub margin_pct:          i64,
  pub price_cents:         i64,
  pub profit_cents:        i64,
  pub markup_pct:          Option<f64>,
  pub gross_margin_pct:    Option<f64>
}

#[derive(
  Debug, Clone, PartialEq, Serialize,
)]

pub struct ServiceCost {
  pub service_id: i64,
  pub name:       String,
  #[serde(flatten)]
  pub breakdown:  CostBreakdown
}

#[derive(
  Debug, Clone, PartialEq, Serialize,
)]

pub struct BreakEven {
  pub monthly_fixed_cents:         i64,
  pub average_price_cents:         i64,
  pub average_variable_cost_cents: i64,
  pub average_contribution_cents:  i64,
  pub services_needed:             Option<i64>,
  pub revenue_needed_cents:        Option<i64>
}

#[derive(
  Debug, Clone, PartialEq, Serialize,
)]

pub struct CostSummary {
  pub time_settings:               TimeSettings,
  pub available_minutes:           i64,
  pub fixed_costs_monthly_cents:   i64,
  pub depreciation_monthly_cents:  i64,
  pub total_monthly_cents:         i64,
  pub fixed_cost_per_minute_cents: f64,
  pub services:                    Vec<ServiceCost>,
  pub break_even:                  BreakEven
}

pub fn round_cents(value: f64) -> i64 {
  value.round() as i64
}

pub fn monthly_depreciation_cents(
  purchase_price_cents: i64,
  useful_life_months: i64
) -> Result<i64, CostError> {
  check_amount(
    "purchase_price_cents",
    purchase_price_cents
  )?;

  if useful_life_months < 1 {
    return Err(
      CostError::InvalidUsefulLife
    );
  }

  Ok(round_cents(
    purchase_price_cents as f64
      / useful_life_months as f64
  ))
}

pub fn fixed_cost_per_minute(
  monthly_total_cents: i64,
  available_minutes: i64
) -> Result<f64, CostError> {
  if available_minutes <= 0 {
    return Err(
      CostError::NoAvailableMinutes
    );
  }

  Ok(
    monthly_total_cents as f64
      / available_minutes as f64
  )
}

pub fn price_with_margin(
  cost_cents: i64,
  margin_pct: i64
) -> i64 {
  round_cents(
    cost_cents as f64
      * (100 + margin_pct) as f64
      / 100.0
  )
}

/// Profit as a share of cost.
pub fn markup_pct(
  cost_cents: i64,
  price_cents: i64
) -> Option<f64> {
  if cost_cents == 0 {
    return None;
  }

  Some(
    (price_cents - cost_cents) as f64
      / cost_cents as f64
      * 100.0
  )
}

/// Profit as a share of price.
pub fn gross_margin_pct(
  cost_cents: i64,
  price_cents: i64
) -> Option<f64> {
  if price_cents == 0 {
    return None;
  }

  Some(
    (price_cents - cost_cents) as f64
      / price_cents as f64
      * 100.0
  )
}

fn check_amount(
  field: &'static str,
  cents: i64
) -> Result<(), CostError> {
  if cents < 0 {
    return Err(CostError::NegativeAmount(
      field
    ));
  }

  if cents > MAX_AMOUNT_CENTS {
    return Err(CostError::AmountTooLarge(
      field
    ));
  }

  Ok(())
}

fn checked_sum(
  mut amounts: impl Iterator<Item = i64>
) -> Result<i64, CostError> {
  amounts.try_fold(0_i64, |acc, cents| {
    acc
      .checked_add(cents)
      .ok_or(CostError::TotalOutOfRange)
  })
}

fn validate_quote(
  duration_minutes: i64,
  variable_cost_cents: i64,
  margin_pct: i64
) -> Result<(), CostError> {
  if !(1..=MAX_SERVICE_MINUTES)
    .contains(&duration_minutes)
  {
    return Err(CostError::InvalidDuration);
  }

  check_amount(
    "variable_cost_cents",
    variable_cost_cents
  )?;

  if !(0..=MAX_MARGIN_PCT)
    .contains(&margin_pct)
  {
    return Err(CostError::InvalidMargin);
  }

  Ok(())
}

pub fn breakdown(
  per_minute_cents: f64,
  request: &QuoteRequest
) -> Result<CostBreakdown, CostError> {
  validate_quote(
    request.duration_minutes,
    request.variable_cost_cents,
    request.margin_pct
  )?;

  let fixed_cost_cents = round_cents(
    per_minute_cents
      * request.duration_minutes as f64
  );

  let total_cost_cents = fixed_cost_cents
    .checked_add(request.variable_cost_cents)
    .ok_or(CostError::TotalOutOfRange)?;

  let price_cents = price_with_margin(
    total_cost_cents,
    request.margin_pct
  );

  Ok(CostBreakdown {
    duration_minutes: request
      .duration_minutes,
    fixed_cost_cents,
    variable_cost_cents: request
      .variable_cost_cents,
    total_cost_cents,
    margin_pct: request.margin_pct,
    price_cents,
    profit_cents: price_cents
      - total_cost_cents,
    markup_pct: markup_pct(
      total_cost_cents,
      price_cents
    ),
    gross_margin_pct: gross_margin_pct(
      total_cost_cents,
      price_cents
    )
  })
}

/// Each entry is `(price_cents,
/// variable_cost_cents)` of one active
/// service.
pub fn break_even(
  monthly_fixed_cents: i64,
  priced: &[(i64, i64)]
) -> BreakEven {
  if priced.is_empty() {
    return BreakEven {
      monthly_fixed_cents,
      average_price_cents: 0,
      average_variable_cost_cents: 0,
      average_contribution_cents: 0,
      services_needed: None,
      revenue_needed_cents: None
    };
  }

  let count = priced.len() as f64;

  let average_price = priced
    .iter()
    .map(|(p, _)| *p as f64)
    .sum::<f64>()
    / count;

  let average_variable = priced
    .iter()
    .map(|(_, v)| *v as f64)
    .sum::<f64>()
    / count;

  let contribution =
    average_price - average_variable;

  let services_needed = if contribution
    <= 0.0
  {
    None
  } else if monthly_fixed_cents <= 0 {
    Some(0)
  } else {
    Some(
      (monthly_fixed_cents as f64
        / contribution)
        .ceil() as i64
    )
  };

  BreakEven {
    monthly_fixed_cents,
    average_price_cents: round_cents(
      average_price
    ),
    average_variable_cost_cents:
      round_cents(average_variable),
    average_contribution_cents:
      round_cents(contribution),
    services_needed,
    revenue_needed_cents: services_needed
      .map(|n| {
        round_cents(n as f64 * average_price)
      })
  }
}

/// Builds the full monthly picture from
/// stored rows. Inactive fixed costs and
/// services are ignored.
pub fn summarize(
  settings: TimeSettings,
  fixed_costs: &[FixedCost],
  assets: &[Asset],
  services: &[ClinicService]
) -> Result<CostSummary, CostError> {
  settings.validate()?;

  let available_minutes =
    settings.available_minutes();

  let fixed_costs_monthly_cents =
    checked_sum(
      fixed_costs
        .iter()
        .filter(|c| c.active)
        .map(|c| c.monthly_amount_cents)
    )?;

  let depreciation_monthly_cents =
    checked_sum(
      assets
        .iter()
        .map(Asset::monthly_depreciation_cents)
    )?;

  let total_monthly_cents =
    fixed_costs_monthly_cents
      .checked_add(depreciation_monthly_cents)
      .ok_or(CostError::TotalOutOfRange)?;

  let per_minute = fixed_cost_per_minute(
    total_monthly_cents,
    available_minutes
  )?;

  let mut service_costs = Vec::new();

  for service in
    services.iter().filter(|s| s.active)
  {
    let breakdown = breakdown(
      per_minute,
      &QuoteRequest {
        duration_minutes:    service
          .duration_minutes,
        variable_cost_cents: service
          .variable_cost_cents,
        margin_pct:          service
          .margin_pct
      }
    )?;

    service_costs.push(ServiceCost {
      service_id: service.id,
      name: service.name.clone(),
      breakdown
    });
  }

  let priced: Vec<(i64, i64)> =
    service_costs
      .iter()
      .map(|s| {
        (
          s.breakdown.price_cents,
          s.breakdown.variable_cost_cents
        )
      })
      .collect();

  Ok(CostSummary {
    time_settings: settings,
    available_minutes,
    fixed_costs_monthly_cents,
    depreciation_monthly_cents,
    total_monthly_cents,
    fixed_cost_per_minute_cents:
      per_minute,
    services: service_costs,
    break_even: break_even(
      total_monthly_cents,
      &priced
    )
  })
}
