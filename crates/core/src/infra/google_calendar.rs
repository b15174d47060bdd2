//! Reqwest-backed `CalendarClient` for
//! the Google OAuth token endpoint and
//! the Calendar v3 REST API.

use std::time::Duration;

use chrono_tz::Tz;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{
  debug,
  warn
};
use url::Url;

use crate::domain::calendar::{
  CalendarEvent,
  OAuthTokens,
  from_google_json,
  to_google_json
};
use crate::domain::scheduling::TimeWindow;
use crate::infra::time::epoch_ms_to_rfc3339_utc;
use crate::ports::calendar::{
  CalendarClient,
  CalendarError
};

pub const DEFAULT_TOKEN_URL: &str =
  "https://oauth2.googleapis.com/token";

pub const DEFAULT_API_BASE: &str =
  "https://www.googleapis.com/calendar/v3";

const PAGE_SIZE: &str = "250";

#[derive(Debug, Clone)]

pub struct GoogleCalendarConfig {
  pub client_id:     String,
  pub client_secret: String,
  pub redirect_uri:  String,
  pub token_url:     String,
  pub api_base:      String
}

pub struct GoogleCalendarClient {
  client: reqwest::Client,
  cfg:    GoogleCalendarConfig
}

#[derive(Debug, Deserialize)]

struct TokenResponse {
  access_token:  String,
  refresh_token: Option<String>,
  #[serde(default)]
  expires_in:    i64
}

impl From<TokenResponse> for OAuthTokens {
  fn from(value: TokenResponse) -> Self {
    Self {
      access_token:       value.access_token,
      refresh_token:      value.refresh_token,
      expires_in_seconds: value.expires_in
    }
  }
}

impl GoogleCalendarClient {
  pub fn new(
    cfg: GoogleCalendarConfig
  ) -> Result<Self, reqwest::Error> {
    let client = reqwest::Client::builder()
      .user_agent(concat!(
        "clinicdesk/",
        env!("CARGO_PKG_VERSION")
      ))
      .pool_idle_timeout(
        Duration::from_secs(120)
      )
      .timeout(Duration::from_secs(30))
      .build()?;

    Ok(Self { client, cfg })
  }

  fn events_url(
    &self,
    calendar_id: &str,
    event_id: Option<&str>
  ) -> Result<Url, CalendarError> {
    let mut url =
      Url::parse(&self.cfg.api_base)
        .map_err(|e| {
          CalendarError::Decode(format!(
            "api base: {e}"
          ))
        })?;

    {
      let mut segments = url
        .path_segments_mut()
        .map_err(|_| {
          CalendarError::Decode(
            "api base cannot hold a path"
              .to_string()
          )
        })?;

      segments.pop_if_empty().extend([
        "calendars",
        calendar_id,
        "events"
      ]);

      if let Some(id) = event_id {
        segments.push(id);
      }
    }

    Ok(url)
  }

  async fn check(
    resp: reqwest::Response
  ) -> Result<reqwest::Response, CalendarError>
  {
    let status = resp.status();

    if status == StatusCode::UNAUTHORIZED {
      return Err(CalendarError::Unauthorized);
    }

    if !status.is_success() {
      let body =
        resp.text().await.unwrap_or_default();

      return Err(CalendarError::Status {
        status: status.as_u16(),
        body
      });
    }

    Ok(resp)
  }

  async fn token_request(
    &self,
    form: &[(&str, &str)]
  ) -> Result<OAuthTokens, CalendarError> {
    let resp = self
      .client
      .post(&self.cfg.token_url)
      .form(form)
      .send()
      .await?;

    let resp = Self::check(resp).await?;

    let token: TokenResponse = resp
      .json()
      .await
      .map_err(|e| {
        CalendarError::Decode(e.to_string())
      })?;

    Ok(token.into())
  }
}

#[async_trait::async_trait]
impl CalendarClient for GoogleCalendarClient {
  async fn exchange_code(
    &self,
    code: &str
  ) -> Result<OAuthTokens, CalendarError> {
    debug!("oauth code exchange");

    self
      .token_request(&[
        ("grant_type", "authorization_code"),
        ("code", code),
        ("client_id", self.cfg.client_id.as_str()),
        (
          "client_secret",
          self.cfg.client_secret.as_str()
        ),
        (
          "redirect_uri",
          self.cfg.redirect_uri.as_str()
        )
      ])
      .await
  }

  async fn refresh(
    &self,
    refresh_token: &str
  ) -> Result<OAuthTokens, CalendarError> {
    debug!("oauth token refresh");

    self
      .token_request(&[
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
        ("client_id", self.cfg.client_id.as_str()),
        (
          "client_secret",
          self.cfg.client_secret.as_str()
        )
      ])
      .await
  }

  async fn insert_event(
    &self,
    access_token: &str,
    calendar_id: &str,
    event: &CalendarEvent
  ) -> Result<String, CalendarError> {
    let url =
      self.events_url(calendar_id, None)?;

    let resp = self
      .client
      .post(url)
      .bearer_auth(access_token)
      .json(&to_google_json(event))
      .send()
      .await?;

    let body: Value = Self::check(resp)
      .await?
      .json()
      .await
      .map_err(|e| {
        CalendarError::Decode(e.to_string())
      })?;

    body
      .get("id")
      .and_then(Value::as_str)
      .map(str::to_string)
      .ok_or_else(|| {
        CalendarError::Decode(
          "event id missing".to_string()
        )
      })
  }

  async fn update_event(
    &self,
    access_token: &str,
    calendar_id: &str,
    event_id: &str,
    event: &CalendarEvent
  ) -> Result<(), CalendarError> {
    let url = self.events_url(
      calendar_id,
      Some(event_id)
    )?;

    let resp = self
      .client
      .put(url)
      .bearer_auth(access_token)
      .json(&to_google_json(event))
      .send()
      .await?;

    Self::check(resp).await?;

    Ok(())
  }

  async fn delete_event(
    &self,
    access_token: &str,
    calendar_id: &str,
    event_id: &str
  ) -> Result<(), CalendarError> {
    let url = self.events_url(
      calendar_id,
      Some(event_id)
    )?;

    let resp = self
      .client
      .delete(url)
      .bearer_auth(access_token)
      .send()
      .await?;

    if matches!(
      resp.status(),
      StatusCode::NOT_FOUND | StatusCode::GONE
    ) {
      warn!(event_id, "event already gone");
      return Ok(());
    }

    Self::check(resp).await?;

    Ok(())
  }

  async fn list_events(
    &self,
    access_token: &str,
    calendar_id: &str,
    window: TimeWindow,
    tz: Tz
  ) -> Result<Vec<CalendarEvent>, CalendarError>
  {
    let url =
      self.events_url(calendar_id, None)?;

    let time_min =
      epoch_ms_to_rfc3339_utc(window.start_ms);

    let time_max =
      epoch_ms_to_rfc3339_utc(window.end_ms);

    let mut events = Vec::new();

    let mut page_token: Option<String> = None;

    loop {
      let mut query = vec![
        ("timeMin", time_min.as_str()),
        ("timeMax", time_max.as_str()),
        ("singleEvents", "true"),
        ("orderBy", "startTime"),
        ("maxResults", PAGE_SIZE)
      ];

      if let Some(token) = &page_token {
        query.push(("pageToken", token.as_str()));
      }

      let resp = self
        .client
        .get(url.clone())
        .bearer_auth(access_token)
        .query(&query)
        .send()
        .await?;

      let body: Value = Self::check(resp)
        .await?
        .json()
        .await
        .map_err(|e| {
          CalendarError::Decode(e.to_string())
        })?;

      if let Some(items) = body
        .get("items")
        .and_then(Value::as_array)
      {
        events.extend(
          items
            .iter()
            .filter_map(|item| {
              from_google_json(item, tz)
            })
        );
      }

      page_token = body
        .get("nextPageToken")
        .and_then(Value::as_str)
        .map(str::to_string);

      if page_token.is_none() {
        break;
      }
    }

    debug!(
      calendar_id,
      count = events.len(),
      "calendar events listed"
    );

    Ok(events)
  }
}
