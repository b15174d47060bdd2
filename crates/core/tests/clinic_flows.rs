mod common;

use std::collections::HashMap;

use clinicdesk_core::app::scheduling::{
    book, suggest, update, validate, AppointmentInput, AppointmentPatch, SlotRequest,
    SuggestionQuery,
};
use clinicdesk_core::app::{audit, billing, costs, ServiceError};
use clinicdesk_core::domain::audit::{
    AuditAction, AuditFilter, ConsentInput, ConsentKind, NewAuditEvent, RequestMeta,
};
use clinicdesk_core::domain::costs::{FixedCostCategory, FixedCostInput, QuoteRequest};
use clinicdesk_core::domain::model::{AppointmentStatus, Role, ERASED_MARKER};
use clinicdesk_core::domain::plans::{PlanCatalog, PlanId, StripePrices, SubscriptionStatus};
use clinicdesk_core::domain::scheduling::{
    BusyBlock, BusySource, SchedulingRules, TimeWindow, ValidationIssue, DAY_MS,
};
use clinicdesk_core::ports::repo::{
    AppointmentRepo, AuditRepo, CalendarRepo, CostRepo, PatientRepo, RepoError, TenantRepo,
};
use common::{patient, repo, seed, user, HOUR, MONDAY, NOW};

fn input(patient_id: i64, provider_id: i64, start: i64, minutes: i64) -> AppointmentInput {
    AppointmentInput {
        patient_id,
        provider_id,
        service_id: None,
        starts_at_ms: start,
        duration_minutes: Some(minutes),
        notes: Some("  first visit ".to_string()),
    }
}

#[tokio::test]
async fn seed_is_idempotent_and_tokens_expire() {
    let repo = repo().await;
    let first = seed(&repo, "Smile", "hash-a").await;
    let again = seed(&repo, "Smile", "hash-a").await;
    assert_eq!(first, again);
    assert_eq!(first.role, Role::Owner);

    let resolved = repo.resolve_token("hash-a", NOW).await.unwrap();
    assert_eq!(resolved, Some(first));

    assert_eq!(repo.resolve_token("hash-a", NOW + 25 * HOUR).await.unwrap(), None);
    assert_eq!(repo.resolve_token("unknown", NOW).await.unwrap(), None);

    let clinic = repo.clinic(first.clinic_id).await.unwrap();
    assert_eq!(clinic.open_minute, 480);
    assert_eq!(clinic.working_days, "mon,tue,wed,thu,fri");
}

#[tokio::test]
async fn clinics_never_see_each_other() {
    let repo = repo().await;
    let a = seed(&repo, "A", "hash-a").await;
    let b = seed(&repo, "B", "hash-b").await;
    assert_ne!(a.clinic_id, b.clinic_id);

    let ana = patient(&repo, &a, "Ana").await;

    assert!(matches!(
        repo.patient(b.clinic_id, ana.id).await,
        Err(RepoError::NotFound("patient"))
    ));
    assert!(repo.list_patients(b.clinic_id, true).await.unwrap().is_empty());
    assert_eq!(repo.count_patients(a.clinic_id).await.unwrap(), 1);

    assert!(repo.user(b.clinic_id, a.user_id).await.unwrap().is_none());
}

#[tokio::test]
async fn booking_rejects_overlaps_and_frees_cancelled_slots() {
    let repo = repo().await;
    let ctx = seed(&repo, "Smile", "hash").await;
    let dentist = user(&repo, &ctx, "Dr. Ruiz", Role::Dentist).await;
    let ana = patient(&repo, &ctx, "Ana").await;
    let rules = SchedulingRules::default();
    let meta = RequestMeta::default();

    let booked = book(&repo, &rules, &ctx, &meta, &input(ana.id, dentist.id, MONDAY + 9 * HOUR, 30), NOW)
        .await
        .unwrap();
    assert_eq!(booked.status, AppointmentStatus::Scheduled);
    assert_eq!(booked.notes.as_deref(), Some("first visit"));
    assert_eq!(booked.ends_at_ms, MONDAY + 9 * HOUR + 30 * 60_000);

    let clash = book(
        &repo,
        &rules,
        &ctx,
        &meta,
        &input(ana.id, dentist.id, MONDAY + 9 * HOUR + 15 * 60_000, 30),
        NOW,
    )
    .await
    .unwrap_err();

    match clash {
        ServiceError::Rejected(report) => {
            assert_eq!(report.issues, vec![ValidationIssue::Conflict]);
            assert_eq!(report.conflicts[0].appointment_id, Some(booked.id));
        }
        other => panic!("expected rejection, got {other}"),
    }

    // another provider is free at the same time
    let owner_slot = book(&repo, &rules, &ctx, &meta, &input(ana.id, ctx.user_id, MONDAY + 9 * HOUR, 30), NOW).await;
    assert!(owner_slot.is_ok());

    let cancelled = update(
        &repo,
        &rules,
        &ctx,
        &meta,
        booked.id,
        &AppointmentPatch { status: Some(AppointmentStatus::Cancelled), ..AppointmentPatch::default() },
        NOW,
    )
    .await
    .unwrap();
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);

    let rebooked =
        book(&repo, &rules, &ctx, &meta, &input(ana.id, dentist.id, MONDAY + 9 * HOUR, 30), NOW).await;
    assert!(rebooked.is_ok());

    // reviving the cancelled one now clashes
    let revive = update(
        &repo,
        &rules,
        &ctx,
        &meta,
        booked.id,
        &AppointmentPatch { status: Some(AppointmentStatus::Confirmed), ..AppointmentPatch::default() },
        NOW,
    )
    .await;
    assert!(matches!(revive, Err(ServiceError::Rejected(_))));
}

#[tokio::test]
async fn staff_cannot_take_appointments() {
    let repo = repo().await;
    let ctx = seed(&repo, "Smile", "hash").await;
    let staff = user(&repo, &ctx, "Front desk", Role::Staff).await;
    let ana = patient(&repo, &ctx, "Ana").await;

    let err = book(
        &repo,
        &SchedulingRules::default(),
        &ctx,
        &RequestMeta::default(),
        &input(ana.id, staff.id, MONDAY + 9 * HOUR, 30),
        NOW,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ServiceError::Invalid(_)));
}

#[tokio::test]
async fn moving_an_appointment_excludes_itself() {
    let repo = repo().await;
    let ctx = seed(&repo, "Smile", "hash").await;
    let ana = patient(&repo, &ctx, "Ana").await;
    let rules = SchedulingRules::default();
    let meta = RequestMeta::default();

    let appt = book(&repo, &rules, &ctx, &meta, &input(ana.id, ctx.user_id, MONDAY + 9 * HOUR, 60), NOW)
        .await
        .unwrap();

    let moved = update(
        &repo,
        &rules,
        &ctx,
        &meta,
        appt.id,
        &AppointmentPatch { starts_at_ms: Some(MONDAY + 9 * HOUR + 30 * 60_000), ..AppointmentPatch::default() },
        NOW,
    )
    .await
    .unwrap();

    assert_eq!(moved.window().duration_minutes(), 60);

    let history = repo.entity_history(ctx.clinic_id, "appointment", &appt.id.to_string()).await.unwrap();
    let actions: Vec<AuditAction> = history.iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![AuditAction::Create, AuditAction::Update]);
}

#[tokio::test]
async fn validation_and_suggestions_see_external_blocks() {
    let repo = repo().await;
    let ctx = seed(&repo, "Smile", "hash").await;
    let rules = SchedulingRules::default();

    let day = TimeWindow::new(MONDAY, MONDAY + DAY_MS);
    repo.replace_external_blocks(
        ctx.clinic_id,
        day,
        &[
            BusyBlock::external("a", TimeWindow::new(MONDAY + 8 * HOUR, MONDAY + 9 * HOUR)),
            BusyBlock::external("b", TimeWindow::new(MONDAY + 12 * HOUR, MONDAY + 13 * HOUR)),
        ],
    )
    .await
    .unwrap();

    // a second import replaces the first
    let kept = repo
        .replace_external_blocks(
            ctx.clinic_id,
            day,
            &[BusyBlock::external("a", TimeWindow::new(MONDAY + 8 * HOUR, MONDAY + 9 * HOUR))],
        )
        .await
        .unwrap();
    assert_eq!(kept, 1);

    let busy = repo.busy_blocks(ctx.clinic_id, ctx.user_id, day, None).await.unwrap();
    assert_eq!(busy.len(), 1);
    assert_eq!(busy[0].source, BusySource::External);

    let report = validate(
        &repo,
        &rules,
        ctx.clinic_id,
        &SlotRequest {
            provider_id: ctx.user_id,
            starts_at_ms: MONDAY + 8 * HOUR + 30 * 60_000,
            ends_at_ms: MONDAY + 9 * HOUR,
            exclude_appointment_id: None,
        },
        NOW,
    )
    .await
    .unwrap();
    assert_eq!(report.issues, vec![ValidationIssue::Conflict]);

    let slots = suggest(
        &repo,
        &rules,
        ctx.clinic_id,
        &SuggestionQuery { provider_id: ctx.user_id, duration_minutes: 30, from_ms: None, limit: Some(2) },
        NOW,
    )
    .await
    .unwrap();
    assert_eq!(slots[0].start_ms, MONDAY + 9 * HOUR);
    assert_eq!(slots[1].start_ms, MONDAY + 9 * HOUR + 15 * 60_000);

    let bad = suggest(
        &repo,
        &rules,
        ctx.clinic_id,
        &SuggestionQuery { provider_id: ctx.user_id, duration_minutes: 5, from_ms: None, limit: None },
        NOW,
    )
    .await;
    assert!(matches!(bad, Err(ServiceError::Invalid(_))));
}

#[tokio::test]
async fn reimports_replace_blocks_that_started_before_the_window() {
    let repo = repo().await;
    let ctx = seed(&repo, "Smile", "hash").await;
    let day = TimeWindow::new(MONDAY, MONDAY + DAY_MS);
    let overnight = BusyBlock::external("ev1", TimeWindow::new(MONDAY - 2 * HOUR, MONDAY + 9 * HOUR));

    for _ in 0..3 {
        repo.replace_external_blocks(ctx.clinic_id, day, &[overnight.clone()])
            .await
            .unwrap();
    }
    let busy = repo.busy_blocks(ctx.clinic_id, ctx.user_id, day, None).await.unwrap();
    assert_eq!(busy.len(), 1);

    // the meeting was deleted remotely
    repo.replace_external_blocks(ctx.clinic_id, day, &[]).await.unwrap();
    let busy = repo.busy_blocks(ctx.clinic_id, ctx.user_id, day, None).await.unwrap();
    assert!(busy.is_empty());
}

#[tokio::test]
async fn erasure_scrubs_patient_and_cancels_future_visits() {
    let repo = repo().await;
    let ctx = seed(&repo, "Smile", "hash").await;
    let ana = patient(&repo, &ctx, "Ana").await;
    let rules = SchedulingRules::default();
    let meta = RequestMeta::default();

    book(&repo, &rules, &ctx, &meta, &input(ana.id, ctx.user_id, MONDAY + 9 * HOUR, 30), NOW)
        .await
        .unwrap();

    let erasure = audit::erase_patient(&repo, &ctx, &meta, ana.id, NOW).await.unwrap();
    assert_eq!(erasure.patient.first_name, ERASED_MARKER);
    assert_eq!(erasure.patient.email, None);
    assert_eq!(erasure.cancelled.len(), 1);
    assert_eq!(erasure.cancelled[0].status, AppointmentStatus::Cancelled);
    assert_eq!(erasure.cancelled[0].notes, None);

    let twice = audit::erase_patient(&repo, &ctx, &meta, ana.id, NOW).await;
    assert!(matches!(twice, Err(ServiceError::Repo(RepoError::Conflict(_)))));

    assert!(repo.list_patients(ctx.clinic_id, false).await.unwrap().is_empty());
    assert_eq!(repo.list_patients(ctx.clinic_id, true).await.unwrap().len(), 1);

    let rebook =
        book(&repo, &rules, &ctx, &meta, &input(ana.id, ctx.user_id, MONDAY + 11 * HOUR, 30), NOW).await;
    assert!(matches!(rebook, Err(ServiceError::Invalid(_))));

    let consent = audit::record_consent(
        &repo,
        &ctx,
        &meta,
        ana.id,
        &ConsentInput { kind: ConsentKind::Marketing, granted: true },
        NOW,
    )
    .await;
    assert!(matches!(consent, Err(ServiceError::Invalid(_))));
}

#[tokio::test]
async fn access_report_lists_consents_and_is_audited() {
    let repo = repo().await;
    let ctx = seed(&repo, "Smile", "hash").await;
    let ana = patient(&repo, &ctx, "Ana").await;
    let meta = RequestMeta { ip_address: Some("10.0.0.1".to_string()), user_agent: None };

    for (granted, at) in [(true, NOW), (false, NOW + 1_000)] {
        audit::record_consent(
            &repo,
            &ctx,
            &meta,
            ana.id,
            &ConsentInput { kind: ConsentKind::Marketing, granted },
            at,
        )
        .await
        .unwrap();
    }

    let report = audit::access_report(&repo, &ctx, &meta, ana.id, NOW + 2_000).await.unwrap();
    assert_eq!(report.consent_history.len(), 2);
    assert_eq!(report.consents.len(), 1);
    assert!(!report.consents[0].granted);
    assert_eq!(report.events.len(), 2);

    let exports = repo
        .list_audit_events(
            ctx.clinic_id,
            &AuditFilter { action: Some(AuditAction::Export), ..AuditFilter::default() },
        )
        .await
        .unwrap();
    assert_eq!(exports.total, 1);
    assert_eq!(exports.events[0].patient_id, Some(ana.id));
    assert_eq!(exports.events[0].ip_address.as_deref(), Some("10.0.0.1"));
}

#[tokio::test]
async fn audit_listing_filters_pages_and_purges() {
    let repo = repo().await;
    let ctx = seed(&repo, "Smile", "hash").await;
    let other = seed(&repo, "Other", "hash-2").await;

    for i in 0..5 {
        repo.insert_audit_event(
            &NewAuditEvent::new(ctx.clinic_id, Some(ctx.user_id), AuditAction::Read, "patient", NOW - i * DAY_MS * 100)
                .entity(i),
        )
        .await
        .unwrap();
    }
    repo.insert_audit_event(&NewAuditEvent::new(other.clinic_id, None, AuditAction::Read, "patient", NOW))
        .await
        .unwrap();

    let page = repo
        .list_audit_events(
            ctx.clinic_id,
            &AuditFilter { limit: Some(2), offset: Some(1), ..AuditFilter::default() },
        )
        .await
        .unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.events.len(), 2);
    // newest first
    assert_eq!(page.events[0].entity_id.as_deref(), Some("1"));

    let ranged = repo
        .list_audit_events(
            ctx.clinic_id,
            &AuditFilter { from_ms: Some(NOW - 150 * DAY_MS), ..AuditFilter::default() },
        )
        .await
        .unwrap();
    assert_eq!(ranged.total, 2);

    let meta = RequestMeta::default();
    let short = audit::purge(&repo, &ctx, &meta, 29, NOW).await;
    assert!(matches!(short, Err(ServiceError::Invalid(_))));

    // events 400 days old are past a 365 day retention
    let outcome = audit::purge(&repo, &ctx, &meta, 365, NOW).await.unwrap();
    assert_eq!(outcome.deleted, 1);
    assert_eq!(outcome.cutoff_ms, NOW - 365 * DAY_MS);

    let after = repo.list_audit_events(ctx.clinic_id, &AuditFilter::default()).await.unwrap();
    assert_eq!(after.total, 5);
    assert_eq!(after.events[0].action, AuditAction::Purge);

    let untouched = repo.list_audit_events(other.clinic_id, &AuditFilter::default()).await.unwrap();
    assert_eq!(untouched.total, 1);
}

#[tokio::test]
async fn cost_summary_uses_defaults_until_settings_exist() {
    let repo = repo().await;
    let ctx = seed(&repo, "Smile", "hash").await;

    let empty = costs::cost_summary(&repo, ctx.clinic_id).await.unwrap();
    assert_eq!(empty.available_minutes, 8_448);
    assert_eq!(empty.total_monthly_cents, 0);

    repo.create_fixed_cost(
        ctx.clinic_id,
        &FixedCostInput {
            category: FixedCostCategory::Rent,
            concept: "Rent".to_string(),
            monthly_amount_cents: 84_480,
            active: true,
        },
        NOW,
    )
    .await
    .unwrap();

    let quote = costs::quote(
        &repo,
        ctx.clinic_id,
        &QuoteRequest { duration_minutes: 60, variable_cost_cents: 400, margin_pct: 50 },
    )
    .await
    .unwrap();

    // 84_480 / 8_448 = 10 cents per minute
    assert_eq!(quote.fixed_cost_cents, 600);
    assert_eq!(quote.total_cost_cents, 1_000);
    assert_eq!(quote.price_cents, 1_500);

    let other = seed(&repo, "Other", "hash-2").await;
    assert!(repo.list_fixed_costs(other.clinic_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn plan_changes_drive_limits() {
    let repo = repo().await;
    let ctx = seed(&repo, "Smile", "hash").await;

    let mut prices = HashMap::new();
    prices.insert(
        PlanId::Professional,
        StripePrices { monthly: Some("price_pro_m".to_string()), yearly: None },
    );
    let catalog = PlanCatalog::standard().with_stripe_prices(&prices);

    let usage = billing::usage(&repo, &catalog, ctx.clinic_id, NOW).await.unwrap();
    assert_eq!(usage.plan_id, PlanId::Basic);
    assert_eq!(usage.status, SubscriptionStatus::Trialing);
    assert_eq!(usage.users.current, 1);
    assert!(!usage.calendar_sync);

    let denied = billing::ensure_calendar_sync(&repo, &catalog, ctx.clinic_id, NOW).await;
    assert!(matches!(denied, Err(ServiceError::Forbidden(_))));

    let change = billing::PlanChange {
        stripe_price_id: "price_pro_m".to_string(),
        status: SubscriptionStatus::Active,
        stripe_customer_id: Some("cus_1".to_string()),
        stripe_subscription_id: None,
        current_period_end_ms: None,
    };
    let sub = billing::record_plan_change(&repo, &catalog, ctx.clinic_id, &change, NOW).await.unwrap();
    assert_eq!(sub.plan_id, PlanId::Professional);

    billing::ensure_calendar_sync(&repo, &catalog, ctx.clinic_id, NOW).await.unwrap();

    let canceled = billing::PlanChange { status: SubscriptionStatus::Canceled, ..change.clone() };
    billing::record_plan_change(&repo, &catalog, ctx.clinic_id, &canceled, NOW).await.unwrap();
    let (plan, stored) = billing::effective_plan(&repo, &catalog, ctx.clinic_id, NOW).await.unwrap();
    assert_eq!(plan.id, PlanId::Basic);
    assert_eq!(stored.plan_id, PlanId::Professional);

    let unknown = billing::PlanChange { stripe_price_id: "price_x".to_string(), ..change };
    let err = billing::record_plan_change(&repo, &catalog, ctx.clinic_id, &unknown, NOW).await;
    assert!(matches!(err, Err(ServiceError::Invalid(_))));
}

#[tokio::test]
async fn calendar_connection_round_trip() {
    use clinicdesk_core::domain::calendar::CalendarConnection;

    let repo = repo().await;
    let ctx = seed(&repo, "Smile", "hash").await;

    assert!(repo.calendar_connection(ctx.clinic_id).await.unwrap().is_none());

    let conn = CalendarConnection {
        clinic_id: ctx.clinic_id,
        calendar_id: "primary".to_string(),
        access_token: "at".to_string(),
        refresh_token: Some("rt".to_string()),
        expires_at_ms: NOW + HOUR,
        last_synced_at_ms: None,
    };
    repo.save_calendar_connection(&conn, NOW).await.unwrap();
    repo.update_calendar_tokens(ctx.clinic_id, "at2", NOW + 2 * HOUR).await.unwrap();
    repo.mark_calendar_synced(ctx.clinic_id, NOW).await.unwrap();

    let stored = repo.calendar_connection(ctx.clinic_id).await.unwrap().unwrap();
    assert_eq!(stored.access_token, "at2");
    assert_eq!(stored.last_synced_at_ms, Some(NOW));

    assert!(repo.delete_calendar_connection(ctx.clinic_id).await.unwrap());
    assert!(!repo.delete_calendar_connection(ctx.clinic_id).await.unwrap());
}
