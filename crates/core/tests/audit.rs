use clinicdesk_core::domain::audit::{
    current_consents, redact, retention_cutoff, AuditAction, AuditFilter, ConsentKind,
    ConsentRecord, NewAuditEvent, REDACTED,
};
use clinicdesk_core::domain::scheduling::DAY_MS;
use serde_json::json;

fn consent(id: i64, kind: ConsentKind, granted: bool, at: i64) -> ConsentRecord {
    ConsentRecord {
        id,
        clinic_id: 1,
        patient_id: 1,
        kind,
        granted,
        recorded_at_ms: at,
        recorded_by: None,
    }
}

#[test]
fn redaction_reaches_nested_keys() {
    let out = redact(&json!({
        "email": "ana@example.com",
        "profile": { "Phone": "555", "name": "Ana" },
        "items": [{ "refresh_token": "t" }],
        "patient_email": "x@example.com",
        "emails_sent": 3,
    }));

    assert_eq!(out["email"], REDACTED);
    assert_eq!(out["profile"]["Phone"], REDACTED);
    assert_eq!(out["profile"]["name"], "Ana");
    assert_eq!(out["items"][0]["refresh_token"], REDACTED);
    assert_eq!(out["patient_email"], REDACTED);
    assert_eq!(out["emails_sent"], 3);
}

#[test]
fn builder_redacts_metadata() {
    let event = NewAuditEvent::new(1, Some(2), AuditAction::Update, "patient", 10)
        .entity(5)
        .patient(5)
        .metadata(json!({ "notes": "allergic", "changed": ["notes"] }))
        .redacted();

    assert_eq!(event.entity_id.as_deref(), Some("5"));
    assert_eq!(event.metadata["notes"], REDACTED);
    assert_eq!(event.metadata["changed"][0], "notes");
}

#[test]
fn retention_has_a_floor() {
    let now = 400 * DAY_MS;
    assert_eq!(retention_cutoff(now, 29), None);
    assert_eq!(retention_cutoff(now, 30), Some(370 * DAY_MS));
    assert_eq!(retention_cutoff(now, 36_500), Some(now - 36_500 * DAY_MS));
    assert_eq!(retention_cutoff(now, 36_501), None);
    assert_eq!(retention_cutoff(now, i64::MAX), None);
}

#[test]
fn filter_page_is_clamped() {
    assert_eq!(AuditFilter::default().page(), (50, 0));

    let wide = AuditFilter { limit: Some(10_000), offset: Some(-5), ..AuditFilter::default() };
    assert_eq!(wide.page(), (500, 0));

    let tiny = AuditFilter { limit: Some(0), offset: Some(20), ..AuditFilter::default() };
    assert_eq!(tiny.page(), (1, 20));
}

#[test]
fn latest_consent_per_kind_wins() {
    let records = vec![
        consent(2, ConsentKind::Marketing, false, 200),
        consent(1, ConsentKind::Marketing, true, 100),
        consent(3, ConsentKind::Treatment, true, 100),
        consent(5, ConsentKind::Treatment, false, 300),
        consent(6, ConsentKind::Treatment, true, 300),
    ];

    let current = current_consents(&records);
    assert_eq!(current.len(), 2);

    assert_eq!(current[0].kind, ConsentKind::Marketing);
    assert!(!current[0].granted);

    assert_eq!(current[1].kind, ConsentKind::Treatment);
    assert_eq!(current[1].id, 6);
    assert!(current[1].granted);
}

#[test]
fn actions_parse_from_storage() {
    assert_eq!("consent_revoked".parse::<AuditAction>().unwrap(), AuditAction::ConsentRevoked);
    assert_eq!(AuditAction::Erase.as_str(), "erase");
    assert!("drop".parse::<AuditAction>().is_err());
}
