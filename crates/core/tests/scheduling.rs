use chrono::{TimeZone, Utc, Weekday};
use clinicdesk_core::domain::scheduling::{
    find_conflicts, format_hhmm, parse_hhmm, parse_working_days, suggest_slots, validate_window,
    BusyBlock, ScheduleError, SchedulingRules, TimeWindow, ValidationIssue, WorkingHours, DAY_MS,
};

// 2030-01-07 00:00 UTC, a Monday.
const MONDAY: i64 = 1_893_974_400_000;
const HOUR: i64 = 3_600_000;
const MIN: i64 = 60_000;

fn hours() -> WorkingHours {
    WorkingHours {
        open_minute: 8 * 60,
        close_minute: 18 * 60,
        days: vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri],
        timezone: chrono_tz::Tz::UTC,
    }
}

fn at(hour: i64, minute: i64) -> i64 {
    MONDAY + hour * HOUR + minute * MIN
}

fn utc(month: u32, day: u32, hour: u32) -> i64 {
    Utc.with_ymd_and_hms(2030, month, day, hour, 0, 0).unwrap().timestamp_millis()
}

fn madrid_sundays(open_minute: i64, close_minute: i64) -> WorkingHours {
    WorkingHours {
        open_minute,
        close_minute,
        days: vec![Weekday::Sun],
        timezone: chrono_tz::Europe::Madrid,
    }
}

#[test]
fn touching_windows_do_not_overlap() {
    let a = TimeWindow::new(0, 10);
    assert!(!a.overlaps(&TimeWindow::new(10, 20)));
    assert!(a.overlaps(&TimeWindow::new(9, 20)));
    assert!(TimeWindow::new(5, 5).is_empty());
}

#[test]
fn durations_that_overflow_have_no_window() {
    assert_eq!(TimeWindow::from_duration(at(9, 0), i64::MAX / 1_000), None);
    assert_eq!(TimeWindow::from_duration(at(9, 0), 30), Some(TimeWindow::new(at(9, 0), at(9, 30))));
}

#[test]
fn valid_window_has_no_issues() {
    let report = validate_window(
        TimeWindow::new(at(9, 0), at(9, 30)),
        &SchedulingRules::default(),
        &hours(),
        at(7, 0),
        &[],
    );

    assert!(report.valid);
    assert!(report.issues.is_empty());
}

#[test]
fn closed_day_is_reported_with_weekday() {
    let saturday = MONDAY + 5 * DAY_MS + 9 * HOUR;
    let report = validate_window(
        TimeWindow::from_duration(saturday, 30).unwrap(),
        &SchedulingRules::default(),
        &hours(),
        at(7, 0),
        &[],
    );

    assert!(!report.valid);
    assert_eq!(report.issues, vec![ValidationIssue::ClosedDay { weekday: "sat".to_string() }]);
}

#[test]
fn every_failed_rule_is_reported() {
    let report = validate_window(
        TimeWindow::new(at(6, 0), at(6, 10)),
        &SchedulingRules::default(),
        &hours(),
        at(7, 0),
        &[],
    );

    assert!(report.issues.contains(&ValidationIssue::DurationTooShort { minimum_minutes: 15 }));
    assert!(report.issues.contains(&ValidationIssue::InPast));
    assert!(report.issues.contains(&ValidationIssue::OutsideWorkingHours));
}

#[test]
fn seconds_past_the_maximum_duration_count() {
    let report = validate_window(
        TimeWindow::new(at(8, 0), at(16, 0) + 59_000),
        &SchedulingRules::default(),
        &hours(),
        at(7, 0),
        &[],
    );

    assert_eq!(report.issues, vec![ValidationIssue::DurationTooLong { maximum_minutes: 480 }]);
}

#[test]
fn window_past_closing_is_outside_hours() {
    let report = validate_window(
        TimeWindow::new(at(17, 30), at(18, 30)),
        &SchedulingRules::default(),
        &hours(),
        at(7, 0),
        &[],
    );

    assert_eq!(report.issues, vec![ValidationIssue::OutsideWorkingHours]);
}

#[test]
fn too_far_ahead_is_rejected() {
    let rules = SchedulingRules { max_days_ahead: 1, ..SchedulingRules::default() };
    let report = validate_window(
        TimeWindow::from_duration(at(9, 0) + 2 * DAY_MS, 30).unwrap(),
        &rules,
        &hours(),
        at(7, 0),
        &[],
    );

    assert!(report.issues.contains(&ValidationIssue::TooFarAhead { max_days_ahead: 1 }));
}

#[test]
fn overlapping_booking_is_a_conflict() {
    let busy = vec![BusyBlock::appointment(7, TimeWindow::new(at(9, 0), at(10, 0)))];

    let report = validate_window(
        TimeWindow::new(at(9, 30), at(10, 30)),
        &SchedulingRules::default(),
        &hours(),
        at(7, 0),
        &busy,
    );

    assert_eq!(report.issues, vec![ValidationIssue::Conflict]);
    assert!(report.has_conflicts());
    assert_eq!(report.conflicts[0].appointment_id, Some(7));

    let back_to_back = validate_window(
        TimeWindow::new(at(10, 0), at(10, 30)),
        &SchedulingRules::default(),
        &hours(),
        at(7, 0),
        &busy,
    );
    assert!(back_to_back.valid);
}

#[test]
fn buffer_widens_busy_blocks() {
    let busy = vec![BusyBlock::external("evt", TimeWindow::new(at(9, 0), at(10, 0)))];

    assert_eq!(find_conflicts(TimeWindow::new(at(10, 0), at(10, 30)), &busy, 0).len(), 0);
    assert_eq!(find_conflicts(TimeWindow::new(at(10, 0), at(10, 30)), &busy, 15).len(), 1);
    assert_eq!(find_conflicts(TimeWindow::new(at(10, 15), at(10, 30)), &busy, 15).len(), 0);
}

#[test]
fn suggestions_skip_busy_time() {
    let busy = vec![BusyBlock::external("evt", TimeWindow::new(at(9, 0), at(10, 0)))];

    let slots = suggest_slots(
        at(7, 0),
        60,
        3,
        &SchedulingRules::default(),
        &hours(),
        at(7, 0),
        &busy,
    );

    let starts: Vec<i64> = slots.iter().map(|w| w.start_ms).collect();
    assert_eq!(starts, vec![at(8, 0), at(10, 0), at(10, 15)]);
    assert!(slots.iter().all(|w| w.duration_minutes() == 60));
}

#[test]
fn suggestions_never_start_before_now() {
    let slots = suggest_slots(
        MONDAY,
        30,
        1,
        &SchedulingRules::default(),
        &hours(),
        at(11, 5),
        &[],
    );

    assert_eq!(slots[0].start_ms, at(11, 15));
}

#[test]
fn suggestions_roll_over_the_weekend() {
    let saturday = MONDAY + 5 * DAY_MS;

    let slots = suggest_slots(
        saturday,
        30,
        1,
        &SchedulingRules::default(),
        &hours(),
        at(7, 0),
        &[],
    );

    assert_eq!(slots[0].start_ms, MONDAY + 7 * DAY_MS + 8 * HOUR);
}

#[test]
fn suggestion_limit_is_capped_by_rules() {
    let rules = SchedulingRules { max_suggestions: 4, ..SchedulingRules::default() };

    let slots = suggest_slots(at(7, 0), 15, 50, &rules, &hours(), at(7, 0), &[]);
    assert_eq!(slots.len(), 4);

    assert!(suggest_slots(at(7, 0), 0, 5, &rules, &hours(), at(7, 0), &[]).is_empty());
}

#[test]
fn madrid_opening_hours_are_local() {
    let madrid = WorkingHours { timezone: chrono_tz::Europe::Madrid, ..hours() };
    let date = madrid.local_date(at(12, 0)).unwrap();
    let bounds = madrid.local_bounds(date).unwrap();

    // UTC+1 in January
    assert_eq!(bounds.start_ms, at(7, 0));
    assert_eq!(bounds.end_ms, at(17, 0));
}

#[test]
fn opening_inside_spring_gap_moves_to_first_local_time() {
    // 2030-03-31 02:00 local does not exist; clocks jump to 03:00 (01:00 UTC)
    let madrid = madrid_sundays(2 * 60, 10 * 60);
    let date = madrid.local_date(utc(3, 31, 12)).unwrap();
    let bounds = madrid.local_bounds(date).unwrap();
    assert_eq!(bounds, TimeWindow::new(utc(3, 31, 1), utc(3, 31, 8)));

    let slots = suggest_slots(
        utc(3, 30, 12),
        60,
        3,
        &SchedulingRules::default(),
        &madrid,
        utc(3, 30, 12),
        &[],
    );

    let starts: Vec<i64> = slots.iter().map(|w| w.start_ms).collect();
    assert_eq!(starts, vec![utc(3, 31, 1), utc(3, 31, 1) + 15 * MIN, utc(3, 31, 1) + 30 * MIN]);
}

#[test]
fn fall_back_day_keeps_the_repeated_hour() {
    // 2030-10-27 03:00 CEST falls back to 02:00 CET, so 01:00-04:00 local spans four hours
    let madrid = madrid_sundays(60, 4 * 60);
    let date = madrid.local_date(utc(10, 27, 12)).unwrap();
    let bounds = madrid.local_bounds(date).unwrap();
    assert_eq!(bounds, TimeWindow::new(utc(10, 26, 23), utc(10, 27, 3)));
    assert_eq!(bounds.duration_minutes(), 240);

    let rules = SchedulingRules { max_suggestions: 20, ..SchedulingRules::default() };
    let slots = suggest_slots(utc(10, 26, 12), 60, 20, &rules, &madrid, utc(10, 26, 12), &[]);

    assert_eq!(slots.len(), 13);
    assert_eq!(slots[0].start_ms, utc(10, 26, 23));
    assert_eq!(slots[12].end_ms, utc(10, 27, 3));
}

#[test]
fn hhmm_parsing() {
    assert_eq!(parse_hhmm("08:30").unwrap(), 510);
    assert_eq!(parse_hhmm(" 24:00 ").unwrap(), 1_440);
    assert!(matches!(parse_hhmm("8h"), Err(ScheduleError::InvalidTime(_))));
    assert_eq!(format_hhmm(1_080), "18:00");
}

#[test]
fn working_days_are_sorted_and_deduped() {
    let days = parse_working_days("fri, mon,mon ,wed").unwrap();
    assert_eq!(days, vec![Weekday::Mon, Weekday::Wed, Weekday::Fri]);

    assert!(matches!(parse_working_days(" , "), Err(ScheduleError::NoWorkingDays)));
    assert!(matches!(parse_working_days("mon,funday"), Err(ScheduleError::InvalidWorkingDay(_))));
}
