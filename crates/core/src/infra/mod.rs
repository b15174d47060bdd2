pub mod cache;
pub mod google_calendar;
pub mod postgres_repo;
pub mod sqlite_repo;
pub mod system_clock;
pub mod time;

/// Tenant tables, children first.
pub(crate) const RESET_ORDER: &[&str] = &[
  "consents",
  "audit_events",
  "external_busy_blocks",
  "calendar_connections",
  "appointments",
  "patients",
  "services",
  "assets",
  "fixed_costs",
  "time_settings",
  "clinic_subscriptions",
  "api_tokens",
  "users",
  "clinics"
];
