//! Google Calendar access. Implemented
//! over HTTP in `infra::google_calendar`.

use chrono_tz::Tz;
use thiserror::Error;

use crate::domain::calendar::{
  CalendarEvent,
  OAuthTokens
};
use crate::domain::scheduling::TimeWindow;

#[derive(Debug, Error)]

pub enum CalendarError {
  #[error("calendar request failed: {0}")]
  Http(#[from] reqwest::Error),
  #[error("calendar returned {status}: {body}")]
  Status { status: u16, body: String },
  #[error("calendar authorization rejected")]
  Unauthorized,
  #[error("calendar response invalid: {0}")]
  Decode(String),
  #[error("calendar not connected")]
  NotConnected,
  #[error("calendar integration disabled")]
  Disabled
}

#[async_trait::async_trait]
pub trait CalendarClient: Send + Sync {
  /// Trades an OAuth authorization code
  /// for tokens.
  async fn exchange_code(
    &self,
    code: &str
  ) -> Result<OAuthTokens, CalendarError>;

  async fn refresh(
    &self,
    refresh_token: &str
  ) -> Result<OAuthTokens, CalendarError>;

  /// Returns the new event id.
  async fn insert_event(
    &self,
    access_token: &str,
    calendar_id: &str,
    event: &CalendarEvent
  ) -> Result<String, CalendarError>;

  async fn update_event(
    &self,
    access_token: &str,
    calendar_id: &str,
    event_id: &str,
    event: &CalendarEvent
  ) -> Result<(), CalendarError>;

  /// Deleting an event that is already
  /// gone succeeds.
  async fn delete_event(
    &self,
    access_token: &str,
    calendar_id: &str,
    event_id: &str
  ) -> Result<(), CalendarError>;

  async fn list_events(
    &self,
    access_token: &str,
    calendar_id: &str,
    window: TimeWindow,
    tz: Tz
  ) -> Result<Vec<CalendarEvent>, CalendarError>;
}
