mod common;

use std::sync::Mutex;

use chrono_tz::Tz;
use clinicdesk_core::app::calendar_sync::CalendarSync;
use clinicdesk_core::app::scheduling::{book, update, AppointmentInput, AppointmentPatch};
use clinicdesk_core::app::ServiceError;
use clinicdesk_core::domain::audit::RequestMeta;
use clinicdesk_core::domain::calendar::{CalendarEvent, OAuthTokens};
use clinicdesk_core::domain::model::AppointmentStatus;
use clinicdesk_core::domain::scheduling::{BusySource, SchedulingRules, TimeWindow, DAY_MS};
use clinicdesk_core::ports::calendar::{CalendarClient, CalendarError};
use clinicdesk_core::ports::repo::{AppointmentRepo, CalendarRepo};
use common::{patient, repo, seed, HOUR, MONDAY, NOW};

#[derive(Default)]
struct FakeCalendar {
    calls: Mutex<Vec<String>>,
    remote: Vec<CalendarEvent>,
}

impl FakeCalendar {
    fn calls(&self) -> Vec<String> {
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
            expires_in_seconds: 30,
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
        access_token: &str,
        _calendar_id: &str,
        event: &CalendarEvent,
    ) -> Result<String, CalendarError> {
        let id = event.appointment_id.unwrap_or_default();
        self.log(format!("insert:{access_token}:{id}"));
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

fn external(id: &str, start: i64, end: i64) -> CalendarEvent {
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

#[tokio::test]
async fn sync_without_connection_fails() {
    let repo = repo().await;
    let ctx = seed(&repo, "Smile", "hash").await;
    let client = FakeCalendar::default();
    let sync = CalendarSync::new(&repo, &client, false);

    assert!(!sync.status(ctx.clinic_id).await.unwrap().connected);

    let err = sync.sync(ctx.clinic_id, TimeWindow::new(NOW, NOW + DAY_MS), NOW).await.unwrap_err();
    assert!(matches!(err, ServiceError::Calendar(CalendarError::NotConnected)));
}

#[tokio::test]
async fn push_follows_appointment_lifecycle() {
    let repo = repo().await;
    let ctx = seed(&repo, "Smile", "hash").await;
    let ana = patient(&repo, &ctx, "Ana").await;
    let client = FakeCalendar::default();
    let sync = CalendarSync::new(&repo, &client, false);
    let rules = SchedulingRules::default();
    let meta = RequestMeta::default();

    let appt = book(
        &repo,
        &rules,
        &ctx,
        &meta,
        &AppointmentInput {
            patient_id: ana.id,
            provider_id: ctx.user_id,
            service_id: None,
            starts_at_ms: MONDAY + 9 * HOUR,
            duration_minutes: Some(30),
            notes: None,
        },
        NOW,
    )
    .await
    .unwrap();

    // nothing to push to yet
    assert!(!sync.push_appointment(&appt, NOW).await.unwrap());

    let status = sync.connect(ctx.clinic_id, "code-1", "primary", NOW).await.unwrap();
    assert!(status.connected);
    assert_eq!(status.expires_at_ms, Some(NOW + 30_000));

    // token expires within the refresh margin
    assert!(sync.push_appointment(&appt, NOW).await.unwrap());
    let stored = repo.appointment(ctx.clinic_id, appt.id).await.unwrap();
    assert_eq!(stored.google_event_id, Some(format!("evt-{}", appt.id)));

    let conn = repo.calendar_connection(ctx.clinic_id).await.unwrap().unwrap();
    assert_eq!(conn.access_token, "at2");

    let cancelled = update(
        &repo,
        &rules,
        &ctx,
        &meta,
        appt.id,
        &AppointmentPatch { status: Some(AppointmentStatus::Cancelled), ..AppointmentPatch::default() },
        NOW,
    )
    .await
    .unwrap();
    sync.push_appointment(&cancelled, NOW).await.unwrap();

    let cleared = repo.appointment(ctx.clinic_id, appt.id).await.unwrap();
    assert_eq!(cleared.google_event_id, None);

    assert_eq!(
        client.calls(),
        vec![
            "exchange:code-1".to_string(),
            "refresh:rt".to_string(),
            format!("insert:at2:{}", appt.id),
            format!("delete:evt-{}", appt.id),
        ]
    );
}

#[tokio::test]
async fn sync_pushes_pending_and_imports_external_events() {
    let repo = repo().await;
    let ctx = seed(&repo, "Smile", "hash").await;
    let ana = patient(&repo, &ctx, "Ana").await;
    let client = FakeCalendar {
        remote: vec![
            external("conf", MONDAY + 14 * HOUR, MONDAY + 16 * HOUR),
            CalendarEvent { appointment_id: Some(99), ..external("ours", MONDAY + 9 * HOUR, MONDAY + 10 * HOUR) },
        ],
        ..FakeCalendar::default()
    };
    let sync = CalendarSync::new(&repo, &client, true);

    book(
        &repo,
        &SchedulingRules::default(),
        &ctx,
        &RequestMeta::default(),
        &AppointmentInput {
            patient_id: ana.id,
            provider_id: ctx.user_id,
            service_id: None,
            starts_at_ms: MONDAY + 11 * HOUR,
            duration_minutes: Some(45),
            notes: None,
        },
        NOW,
    )
    .await
    .unwrap();

    sync.connect(ctx.clinic_id, "code", "primary", NOW).await.unwrap();

    let window = TimeWindow::new(MONDAY, MONDAY + DAY_MS);
    let outcome = sync.sync(ctx.clinic_id, window, NOW).await.unwrap();
    assert_eq!(outcome.pushed, 1);
    assert_eq!(outcome.failed, 0);
    assert_eq!(outcome.imported, 1);

    let busy = repo.busy_blocks(ctx.clinic_id, ctx.user_id, window, None).await.unwrap();
    let external: Vec<_> = busy.iter().filter(|b| b.source == BusySource::External).collect();
    assert_eq!(external.len(), 1);
    assert_eq!(external[0].calendar_event_id.as_deref(), Some("conf"));

    assert!(sync.status(ctx.clinic_id).await.unwrap().last_synced_at_ms.is_some());

    // everything is pushed, a second run only re-imports
    let again = sync.sync(ctx.clinic_id, window, NOW).await.unwrap();
    assert_eq!(again.pushed, 0);
    assert_eq!(again.imported, 1);

    assert!(sync.disconnect(ctx.clinic_id).await.unwrap());
    let busy = repo.busy_blocks(ctx.clinic_id, ctx.user_id, window, None).await.unwrap();
    assert!(busy.iter().all(|b| b.source == BusySource::Appointment));
}
