#![allow(dead_code)]

use clinicdesk_core::domain::model::{NewPatient, Patient, Role, TenantContext, TenantSeed, User};
use clinicdesk_core::infra::sqlite_repo::SqliteRepo;
use clinicdesk_core::ports::repo::{PatientRepo, TenantRepo};

// 2030-01-07 00:00 UTC, a Monday.
pub const MONDAY: i64 = 1_893_974_400_000;
pub const HOUR: i64 = 3_600_000;
pub const NOW: i64 = MONDAY + 7 * HOUR;

pub async fn repo() -> SqliteRepo {
    let repo = SqliteRepo::in_memory().await.unwrap();
    repo.migrate().await.unwrap();
    repo
}

pub async fn seed(repo: &SqliteRepo, clinic: &str, token_hash: &str) -> TenantContext {
    repo.ensure_seed(
        &TenantSeed {
            clinic_name: clinic.to_string(),
            timezone: "UTC".to_string(),
            owner_name: "Owner".to_string(),
            owner_email: None,
            token_hash: token_hash.to_string(),
            token_expires_at_ms: NOW + 24 * HOUR,
        },
        NOW,
    )
    .await
    .unwrap()
}

pub async fn user(repo: &SqliteRepo, ctx: &TenantContext, name: &str, role: Role) -> User {
    repo.create_user(ctx.clinic_id, name, None, role, NOW).await.unwrap()
}

pub async fn patient(repo: &SqliteRepo, ctx: &TenantContext, first: &str) -> Patient {
    repo.create_patient(
        ctx.clinic_id,
        &NewPatient {
            first_name: first.to_string(),
            last_name: "García".to_string(),
            email: Some(format!("{}@example.com", first.to_lowercase())),
            phone: None,
        },
        NOW,
    )
    .await
    .unwrap()
}
