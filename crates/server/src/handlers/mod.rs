pub mod admin;
pub mod appointments;
pub mod audit;
pub mod billing;
pub mod calendar;
pub mod clinic;
pub mod costs;
pub mod health;
pub mod patients;

use axum::Router;
use axum::routing::{
  delete,
  get,
  post,
  put
};

use crate::app_state::AppState;

pub fn router(
  state: AppState
) -> Router {
  Router::new()
        .route("/health", get(health::health))
        .route("/v1/clinic/settings", get(clinic::settings).put(clinic::update_settings))
        .route("/v1/costs/time-settings", get(costs::time_settings).put(costs::save_time_settings))
        .route("/v1/costs/fixed", get(costs::list_fixed_costs).post(costs::create_fixed_cost))
        .route("/v1/costs/fixed/:id", put(costs::update_fixed_cost).delete(costs::delete_fixed_cost))
        .route("/v1/costs/assets", get(costs::list_assets).post(costs::create_asset))
        .route("/v1/costs/assets/:id", put(costs::update_asset).delete(costs::delete_asset))
        .route("/v1/costs/services", get(costs::list_services).post(costs::create_service))
        .route("/v1/costs/services/:id", put(costs::update_service).delete(costs::delete_service))
        .route("/v1/costs/summary", get(costs::summary))
        .route("/v1/costs/quote", post(costs::quote))
        .route("/v1/patients", get(patients::list_patients).post(patients::create_patient))
        .route("/v1/patients/:patient_id", get(patients::patient_detail).delete(patients::erase))
        .route("/v1/patients/:patient_id/consents", get(patients::list_consents).post(patients::record_consent))
        .route("/v1/patients/:patient_id/access-report", get(patients::access_report))
        .route("/v1/appointments", get(appointments::list_appointments).post(appointments::create_appointment))
        .route("/v1/appointments/validate", post(appointments::validate_slot))
        .route("/v1/appointments/suggestions", get(appointments::suggestions))
        .route("/v1/appointments/:appointment_id", get(appointments::appointment_detail).patch(appointments::update_appointment))
        .route("/v1/audit/events", get(audit::list_events))
        .route("/v1/audit/entities/:entity_type/:entity_id", get(audit::entity_history))
        .route("/v1/audit/purge", post(audit::purge))
        .route("/v1/calendar/status", get(calendar::status))
        .route("/v1/calendar/connect", post(calendar::connect))
        .route("/v1/calendar/connection", delete(calendar::disconnect))
        .route("/v1/calendar/sync", post(calendar::sync))
        .route("/v1/plans", get(billing::list_plans))
        .route("/v1/plans/:plan_id", get(billing::plan_detail))
        .route("/v1/billing/subscription", get(billing::subscription).put(billing::update_subscription))
        .route("/v1/billing/usage", get(billing::usage))
        .route("/v1/admin/cache/stats", get(admin::cache_stats))
        .route("/v1/admin/cache/clear", post(admin::clear_cache))
        .with_state(state)
}
