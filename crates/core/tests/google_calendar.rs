use chrono_tz::Tz;
use clinicdesk_core::domain::calendar::{busy_block_from_event, CalendarEvent};
use clinicdesk_core::domain::scheduling::TimeWindow;
use clinicdesk_core::infra::google_calendar::{GoogleCalendarClient, GoogleCalendarConfig};
use clinicdesk_core::ports::calendar::{CalendarClient, CalendarError};
use httpmock::prelude::*;
use serde_json::json;

// 2030-01-07 00:00 UTC, a Monday.
const MONDAY: i64 = 1_893_974_400_000;
const HOUR: i64 = 3_600_000;

fn client(server: &MockServer) -> GoogleCalendarClient {
    GoogleCalendarClient::new(GoogleCalendarConfig {
        client_id: "cid".to_string(),
        client_secret: "secret".to_string(),
        redirect_uri: "http://localhost/cb".to_string(),
        token_url: server.url("/token"),
        api_base: server.url("/calendar/v3"),
    })
    .unwrap()
}

fn event() -> CalendarEvent {
    CalendarEvent {
        id: None,
        summary: "Dental appointment".to_string(),
        description: None,
        start_ms: MONDAY + 9 * HOUR,
        end_ms: MONDAY + 10 * HOUR,
        timezone: "UTC".to_string(),
        appointment_id: Some(7),
        cancelled: false,
        all_day: false,
    }
}

#[tokio::test]
async fn exchange_code_posts_form() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/token")
                .body_contains("grant_type=authorization_code")
                .body_contains("code=abc");
            then.status(200).json_body(json!({
                "access_token": "at",
                "refresh_token": "rt",
                "expires_in": 3600,
            }));
        })
        .await;

    let tokens = client(&server).exchange_code("abc").await.unwrap();
    mock.assert_async().await;

    assert_eq!(tokens.access_token, "at");
    assert_eq!(tokens.refresh_token.as_deref(), Some("rt"));
    assert_eq!(tokens.expires_in_seconds, 3600);
}

#[tokio::test]
async fn rejected_token_is_unauthorized() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/token");
            then.status(401).body("invalid_grant");
        })
        .await;

    let err = client(&server).refresh("old").await.unwrap_err();
    assert!(matches!(err, CalendarError::Unauthorized));
}

#[tokio::test]
async fn insert_returns_event_id() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/calendar/v3/calendars/primary/events")
                .header("authorization", "Bearer tok")
                .body_contains("clinicdeskAppointmentId");
            then.status(200).json_body(json!({ "id": "evt1" }));
        })
        .await;

    let id = client(&server).insert_event("tok", "primary", &event()).await.unwrap();
    mock.assert_async().await;
    assert_eq!(id, "evt1");
}

#[tokio::test]
async fn update_surfaces_server_errors() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(PUT).path("/calendar/v3/calendars/primary/events/evt1");
            then.status(500).body("boom");
        })
        .await;

    let err = client(&server)
        .update_event("tok", "primary", "evt1", &event())
        .await
        .unwrap_err();

    match err {
        CalendarError::Status { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn deleting_a_gone_event_succeeds() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(DELETE).path("/calendar/v3/calendars/primary/events/evt1");
            then.status(410);
        })
        .await;

    client(&server).delete_event("tok", "primary", "evt1").await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn list_events_reads_items() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/calendar/v3/calendars/primary/events")
                .header("authorization", "Bearer tok")
                .query_param("singleEvents", "true")
                .query_param("orderBy", "startTime")
                .query_param("maxResults", "250");
            then.status(200).json_body(json!({
                "items": [
                    {
                        "id": "lunch",
                        "start": { "dateTime": "2030-01-07T13:00:00Z" },
                        "end": { "dateTime": "2030-01-07T14:00:00Z" },
                    },
                    {
                        "id": "ours",
                        "start": { "dateTime": "2030-01-07T09:00:00Z" },
                        "end": { "dateTime": "2030-01-07T10:00:00Z" },
                        "extendedProperties": { "private": { "clinicdeskAppointmentId": "7" } },
                    },
                    {
                        "id": "holiday",
                        "start": { "date": "2030-01-08" },
                        "end": { "date": "2030-01-09" },
                    },
                ],
            }));
        })
        .await;

    let events = client(&server)
        .list_events("tok", "primary", TimeWindow::new(MONDAY, MONDAY + 48 * HOUR), Tz::UTC)
        .await
        .unwrap();
    mock.assert_async().await;

    assert_eq!(events.len(), 3);
    assert_eq!(events[1].appointment_id, Some(7));

    let blocks: Vec<_> = events.iter().filter_map(busy_block_from_event).collect();
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].window, TimeWindow::new(MONDAY + 13 * HOUR, MONDAY + 14 * HOUR));
    assert_eq!(blocks[1].window, TimeWindow::new(MONDAY + 24 * HOUR, MONDAY + 48 * HOUR));
}
