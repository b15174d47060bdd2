use chrono::{
  DateTime,
  SecondsFormat,
  TimeZone,
  Utc
};
use chrono_tz::Tz;

fn to_utc(ms: i64) -> DateTime<Utc> {
  Utc
    .timestamp_millis_opt(ms)
    .single()
    .unwrap_or_default()
}

/// Human readable local time for log
/// lines.
pub fn format_epoch_ms(
  ms: i64,
  zone: &Tz
) -> String {
  to_utc(ms)
    .with_timezone(zone)
    .format("%Y-%m-%d %H:%M %Z")
    .to_string()
}

/// RFC 3339 in UTC with a `Z` suffix, as
/// the Calendar API expects for
/// `timeMin`/`timeMax`.
pub fn epoch_ms_to_rfc3339_utc(
  ms: i64
) -> String {
  to_utc(ms).to_rfc3339_opts(
    SecondsFormat::Secs,
    true
  )
}
