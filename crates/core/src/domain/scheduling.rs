//! Appointment validation: half-open
//! interval overlap against busy
//! blocks, working-hour checks in the
//! clinic timezone, and a bounded scan
//! over fixed-size candidate slots.

use chrono::{
  Datelike,
  Days,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  TimeDelta,
  TimeZone,
  Timelike,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use serde::{
  Deserialize,
  Serialize
};
use thiserror::Error;

use crate::domain::model::{
  Clinic,
  ParseEnumError
};

pub const MINUTE_MS: i64 = 60_000;
pub const DAY_MS: i64 = 86_400_000;
pub const MINUTES_PER_DAY: i64 = 1_440;

#[derive(Debug, Clone, Error)]

pub enum ScheduleError {
  #[error("invalid timezone '{0}'")]
  InvalidTimezone(String),
  #[error("invalid time '{0}', expected HH:MM")]
  InvalidTime(String),
  #[error("opening time must be before closing time")]
  InvalidHours,
  #[error("at least one working day is required")]
  NoWorkingDays,
  #[error(transparent)]
  InvalidWorkingDay(#[from] ParseEnumError)
}

/// A half-open `[start, end)` interval
/// in epoch milliseconds.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]

pub struct TimeWindow {
  pub start_ms: i64,
  pub end_ms:   i64
}

impl TimeWindow {
  pub fn new(
    start_ms: i64,
    end_ms: i64
  ) -> Self {
    Self {
      start_ms,
      end_ms
    }
  }

  /// `None` when the end does not fit in
  /// an `i64`.
  pub fn from_duration(
    start_ms: i64,
    minutes: i64
  ) -> Option<Self> {
    let end_ms = minutes
      .checked_mul(MINUTE_MS)
      .and_then(|ms| start_ms.checked_add(ms))?;

    Some(Self::new(start_ms, end_ms))
  }

  /// Touching windows (one ends exactly
  /// when the other starts) do not
  /// overlap.
  pub fn overlaps(
    &self,
    other: &TimeWindow
  ) -> bool {
    self.start_ms < other.end_ms
      && other.start_ms < self.end_ms
  }

  pub fn contains(
    &self,
    other: &TimeWindow
  ) -> bool {
    self.start_ms <= other.start_ms
      && other.end_ms <= self.end_ms
  }

  pub fn widened(
    &self,
    margin_ms: i64
  ) -> Self {
    Self::new(
      self.start_ms.saturating_sub(margin_ms),
      self.end_ms.saturating_add(margin_ms)
    )
  }

  pub fn is_empty(&self) -> bool {
    self.end_ms <= self.start_ms
  }

  pub fn duration_ms(&self) -> i64 {
    self.end_ms.saturating_sub(self.start_ms)
  }

  pub fn duration_minutes(&self) -> i64 {
    self.duration_ms() / MINUTE_MS
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "snake_case")]

pub enum BusySource {
  Appointment,
  External
}

/// Time already taken, either by one of
/// our appointments or by an event
/// imported from the clinic calendar.
#[derive(
  Debug, Clone, PartialEq, Eq, Serialize,
)]

pub struct BusyBlock {
  pub source:            BusySource,
  pub appointment_id:    Option<i64>,
  pub calendar_event_id: Option<String>,
  pub window:            TimeWindow
}

impl BusyBlock {
  pub fn appointment(
    id: i64,
    window: TimeWindow
  ) -> Self {
    Self {
      source: BusySource::Appointment,
      appointment_id: Some(id),
      calendar_event_id: None,
      window
    }
  }

  pub fn external(
    event_id: impl Into<String>,
    window: TimeWindow
  ) -> Self {
    Self {
      source: BusySource::External,
      appointment_id: None,
      calendar_event_id: Some(
        event_id.into()
      ),
      window
    }
  }
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]

pub struct SchedulingRules {
  pub slot_minutes:         i64,
  pub min_duration_minutes: i64,
  pub max_duration_minutes: i64,
  pub buffer_minutes:       i64,
  pub max_days_ahead:       i64,
  pub suggestion_days:      i64,
  pub max_suggestions:      usize
}

impl Default for SchedulingRules {
  fn default() -> Self {
    Self {
      slot_minutes:         15,
      min_duration_minutes: 15,
      max_duration_minutes: 480,
      buffer_minutes:       0,
      max_days_ahead:       180,
      suggestion_days:      14,
      max_suggestions:      10
    }
  }
}

/// Opening hours of one clinic,
/// expressed in minutes after local
/// midnight.
#[derive(Debug, Clone)]

pub struct WorkingHours {
  pub open_minute:  i64,
  pub close_minute: i64,
  pub days:         Vec<Weekday>,
  pub timezone:     Tz
}

impl WorkingHours {
  pub fn from_clinic(
    clinic: &Clinic
  ) -> Result<Self, ScheduleError> {
    let timezone = parse_timezone(
      &clinic.timezone
    )?;

    Ok(Self {
      open_minute: clinic.open_minute,
      close_minute: clinic.close_minute,
      days: parse_working_days(
        &clinic.working_days
      )?,
      timezone
    })
  }

  pub fn is_working_day(
    &self,
    day: Weekday
  ) -> bool {
    self.days.contains(&day)
  }

  pub fn local_date(
    &self,
    at_ms: i64
  ) -> Option<NaiveDate> {
    Utc
      .timestamp_millis_opt(at_ms)
      .single()
      .map(|dt| {
        dt.with_timezone(&self.timezone)
          .date_naive()
      })
  }

  /// Opening window of `date` in UTC
  /// milliseconds. An opening or closing
  /// time inside a DST gap moves forward
  /// to the first local time that exists.
  pub fn local_bounds(
    &self,
    date: NaiveDate
  ) -> Option<TimeWindow> {
    let start = self.local_instant(
      date,
      self.open_minute
    )?;

    let end = self.local_instant(
      date,
      self.close_minute
    )?;

    Some(TimeWindow::new(start, end))
  }

  fn local_instant(
    &self,
    date: NaiveDate,
    minute: i64
  ) -> Option<i64> {
    let midnight: NaiveDateTime =
      date.and_hms_opt(0, 0, 0)?;

    (0..=MINUTES_PER_DAY).find_map(|shift| {
      let naive = midnight
        + TimeDelta::minutes(minute + shift);

      self
        .timezone
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp_millis())
    })
  }
}

#[derive(
  Debug, Clone, PartialEq, Eq, Serialize,
)]
#[serde(
  tag = "kind",
  rename_all = "snake_case"
)]

pub enum ValidationIssue {
  InvalidWindow,
  DurationTooShort {
    minimum_minutes: i64
  },
  DurationTooLong {
    maximum_minutes: i64
  },
  InPast,
  TooFarAhead {
    max_days_ahead: i64
  },
  ClosedDay {
    weekday: String
  },
  OutsideWorkingHours,
  Conflict
}

#[derive(Debug, Clone, Serialize)]

pub struct ValidationReport {
  pub valid:     bool,
  pub issues:    Vec<ValidationIssue>,
  pub conflicts: Vec<BusyBlock>
}

impl ValidationReport {
  pub fn has_conflicts(&self) -> bool {
    !self.conflicts.is_empty()
  }
}

/// Busy blocks that intersect `window`
/// once each block is widened by the
/// buffer on both sides.
pub fn find_conflicts(
  window: TimeWindow,
  busy: &[BusyBlock],
  buffer_minutes: i64
) -> Vec<BusyBlock> {
  let margin = buffer_minutes
    .max(0)
    .saturating_mul(MINUTE_MS);

  busy
    .iter()
    .filter(|b| {
      b.window
        .widened(margin)
        .overlaps(&window)
    })
    .cloned()
    .collect()
}

/// Checks a requested window against
/// every rule and reports all issues
/// found, not only the first one.
pub fn validate_window(
  window: TimeWindow,
  rules: &SchedulingRules,
  hours: &WorkingHours,
  now_ms: i64,
  busy: &[BusyBlock]
) -> ValidationReport {
  let mut issues = Vec::new();

  if window.is_empty() {
    issues
      .push(ValidationIssue::InvalidWindow);
  } else {
    let span = window.duration_ms();

    if span
      < rules
        .min_duration_minutes
        .saturating_mul(MINUTE_MS)
    {
      issues.push(
        ValidationIssue::DurationTooShort {
          minimum_minutes: rules
            .min_duration_minutes
        }
      );
    }

    if span
      > rules
        .max_duration_minutes
        .saturating_mul(MINUTE_MS)
    {
      issues.push(
        ValidationIssue::DurationTooLong {
          maximum_minutes: rules
            .max_duration_minutes
        }
      );
    }
  }

  if window.start_ms < now_ms {
    issues.push(ValidationIssue::InPast);
  }

  let horizon = now_ms.saturating_add(
    rules.max_days_ahead.saturating_mul(DAY_MS)
  );

  if window.start_ms > horizon {
    issues.push(
      ValidationIssue::TooFarAhead {
        max_days_ahead: rules
          .max_days_ahead
      }
    );
  }

  if let Some(date) =
    hours.local_date(window.start_ms)
  {
    let weekday = date.weekday();

    if !hours.is_working_day(weekday) {
      issues.push(
        ValidationIssue::ClosedDay {
          weekday: weekday_name(weekday)
            .to_string()
        }
      );
    } else {
      let inside = hours
        .local_bounds(date)
        .is_some_and(|b| {
          b.contains(&window)
        });

      if !inside {
        issues.push(
          ValidationIssue::OutsideWorkingHours
        );
      }
    }
  }

  let conflicts = find_conflicts(
    window,
    busy,
    rules.buffer_minutes
  );

  if !conflicts.is_empty() {
    issues.push(ValidationIssue::Conflict);
  }

  ValidationReport {
    valid: issues.is_empty(),
    issues,
    conflicts
  }
}

/// Walks local days from `from_ms`, and
/// within each day the slot grid from
/// opening time, collecting free
/// windows of `duration_minutes` until
/// `limit` is reached or the search
/// range runs out.
pub fn suggest_slots(
  from_ms: i64,
  duration_minutes: i64,
  limit: usize,
  rules: &SchedulingRules,
  hours: &WorkingHours,
  now_ms: i64,
  busy: &[BusyBlock]
) -> Vec<TimeWindow> {
  let mut found = Vec::new();

  let limit =
    limit.min(rules.max_suggestions);

  if duration_minutes <= 0 || limit == 0 {
    return found;
  }

  let earliest = from_ms.max(now_ms);

  let horizon = now_ms.saturating_add(
    rules.max_days_ahead.saturating_mul(DAY_MS)
  );

  let step = rules
    .slot_minutes
    .max(1)
    .saturating_mul(MINUTE_MS);

  let duration_ms =
    duration_minutes.saturating_mul(MINUTE_MS);

  let Some(first_day) =
    hours.local_date(earliest)
  else {
    return found;
  };

  for offset in
    0..rules.suggestion_days.max(0)
  {
    let Some(date) = first_day
      .checked_add_days(Days::new(
        offset as u64
      ))
    else {
      break;
    };

    if !hours.is_working_day(date.weekday())
    {
      continue;
    }

    let Some(bounds) =
      hours.local_bounds(date)
    else {
      continue;
    };

    let mut start = bounds.start_ms;

    while start.saturating_add(duration_ms)
      <= bounds.end_ms
    {
      if start > horizon {
        return found;
      }

      let candidate = TimeWindow::new(
        start,
        start + duration_ms
      );

      if start >= earliest
        && find_conflicts(
          candidate,
          busy,
          rules.buffer_minutes
        )
        .is_empty()
      {
        found.push(candidate);

        if found.len() >= limit {
          return found;
        }
      }

      start = start.saturating_add(step);
    }
  }

  found
}

pub fn parse_timezone(
  raw: &str
) -> Result<Tz, ScheduleError> {
  raw.trim().parse::<Tz>().map_err(|_| {
    ScheduleError::InvalidTimezone(
      raw.to_string()
    )
  })
}

/// Parses `HH:MM` into minutes after
/// midnight; `24:00` is accepted as end
/// of day.
pub fn parse_hhmm(
  raw: &str
) -> Result<i64, ScheduleError> {
  let trimmed = raw.trim();

  if trimmed == "24:00" {
    return Ok(MINUTES_PER_DAY);
  }

  let time = NaiveTime::parse_from_str(
    trimmed, "%H:%M"
  )
  .map_err(|_| {
    ScheduleError::InvalidTime(
      trimmed.to_string()
    )
  })?;

  Ok(i64::from(time.hour()) * 60
    + i64::from(time.minute()))
}

pub fn format_hhmm(minute: i64) -> String {
  format!(
    "{:02}:{:02}",
    minute / 60,
    minute % 60
  )
}

pub fn parse_working_days(
  raw: &str
) -> Result<Vec<Weekday>, ScheduleError> {
  let mut days = Vec::new();

  for part in raw.split(',') {
    let trimmed = part.trim();

    if trimmed.is_empty() {
      continue;
    }

    let day =
      trimmed.parse::<Weekday>().map_err(
        |_| {
          ParseEnumError::new(
            "weekday", trimmed
          )
        }
      )?;

    if !days.contains(&day) {
      days.push(day);
    }
  }

  if days.is_empty() {
    return Err(
      ScheduleError::NoWorkingDays
    );
  }

  days.sort_by_key(|d| {
    d.num_days_from_monday()
  });

  Ok(days)
}

pub fn format_working_days(
  days: &[Weekday]
) -> String {
  days
    .iter()
    .map(|d| weekday_name(*d))
    .collect::<Vec<_>>()
    .join(",")
}

pub fn weekday_name(
  day: Weekday
) -> &'static str {
  match day {
    | Weekday::Mon => "mon",
    | Weekday::Tue => "tue",
    | Weekday::Wed => "wed",
    | Weekday::Thu => "thu",
    | Weekday::Fri => "fri",
    | Weekday::Sat => "sat",
    | Weekday::Sun => "sun"
  }
}
