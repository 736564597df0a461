// Recurrence expansion. Pure computation, no storage: a pattern string of
// the form `TYPE:interval[:extra...]` is expanded into concrete instances of
// the master event, or into upcoming occurrence timestamps for display.

use chrono::{Datelike, Duration, Months, NaiveDateTime, Weekday};

use crate::models::GoodWork;

pub const DEFAULT_MAX_INSTANCES: usize = 52;
pub const DEFAULT_UPCOMING_COUNT: usize = 5;

/// Hard bound on stepping iterations for the upcoming-occurrences scan, so a
/// pattern that never yields a future date still terminates.
const UPCOMING_ITERATION_BOUND: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurrenceKind {
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

#[derive(Debug, Clone)]
pub struct RecurrencePattern {
    pub kind: RecurrenceKind,
    pub interval: i64,
    pub days_of_week: Vec<Weekday>,
    pub day_of_month: u32,
    pub month_of_year: u32,
}

/// Longest interval a pattern may carry. Anything outside `1..=MAX_INTERVAL`
/// counts as malformed and falls back to 1.
const MAX_INTERVAL: i64 = 366;

/// Parse `DAILY:1`, `WEEKLY:1:MON,WED,FRI`, `MONTHLY:1:15`, `YEARLY:1:3:15`.
/// Malformed pieces fall back to defaults rather than erroring.
pub fn parse_pattern(pattern: &str) -> RecurrencePattern {
    let parts: Vec<&str> = pattern.split(':').collect();

    let kind = match parts.first().map(|p| p.to_ascii_uppercase()).as_deref() {
        Some("DAILY") => RecurrenceKind::Daily,
        Some("WEEKLY") => RecurrenceKind::Weekly,
        Some("MONTHLY") => RecurrenceKind::Monthly,
        Some("YEARLY") => RecurrenceKind::Yearly,
        _ => RecurrenceKind::None,
    };

    // The interval bound keeps every stepping computation (day durations,
    // month counts) inside chrono's arithmetic range.
    let interval = parts
        .get(1)
        .and_then(|p| p.parse::<i64>().ok())
        .filter(|i| (1..=MAX_INTERVAL).contains(i))
        .unwrap_or(1);

    let mut parsed = RecurrencePattern {
        kind,
        interval,
        days_of_week: Vec::new(),
        day_of_month: 1,
        month_of_year: 1,
    };

    match kind {
        RecurrenceKind::Weekly => {
            if let Some(days) = parts.get(2) {
                parsed.days_of_week = days.split(',').filter_map(parse_weekday).collect();
            }
        }
        RecurrenceKind::Monthly => {
            parsed.day_of_month = parts.get(2).and_then(|p| p.parse().ok()).unwrap_or(1);
        }
        RecurrenceKind::Yearly => {
            parsed.month_of_year = parts.get(2).and_then(|p| p.parse().ok()).unwrap_or(1);
            parsed.day_of_month = parts.get(3).and_then(|p| p.parse().ok()).unwrap_or(1);
        }
        _ => {}
    }

    parsed
}

fn parse_weekday(token: &str) -> Option<Weekday> {
    match token.trim().to_ascii_lowercase().as_str() {
        "mon" | "monday" => Some(Weekday::Mon),
        "tue" | "tuesday" => Some(Weekday::Tue),
        "wed" | "wednesday" => Some(Weekday::Wed),
        "thu" | "thursday" => Some(Weekday::Thu),
        "fri" | "friday" => Some(Weekday::Fri),
        "sat" | "saturday" => Some(Weekday::Sat),
        "sun" | "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

fn short_day(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

/// Step from `current` to the next occurrence.
pub fn next_occurrence(current: NaiveDateTime, pattern: &RecurrencePattern) -> NaiveDateTime {
    match pattern.kind {
        RecurrenceKind::Daily => current + Duration::days(pattern.interval),
        RecurrenceKind::Weekly => next_weekly_occurrence(current, pattern),
        RecurrenceKind::Monthly => current
            .checked_add_months(Months::new(pattern.interval as u32))
            .unwrap_or(current + Duration::days(30 * pattern.interval)),
        RecurrenceKind::Yearly => current
            .checked_add_months(Months::new(12 * pattern.interval as u32))
            .unwrap_or(current + Duration::days(365 * pattern.interval)),
        RecurrenceKind::None => current + Duration::days(7),
    }
}

/// With an explicit day-of-week set, scan forward day by day (bounded to
/// `7*interval + 7` probes) for the next allowed day; otherwise, or if the
/// scan finds nothing, jump a whole interval of weeks.
fn next_weekly_occurrence(current: NaiveDateTime, pattern: &RecurrencePattern) -> NaiveDateTime {
    if pattern.days_of_week.is_empty() {
        return current + Duration::days(7 * pattern.interval);
    }

    let max_probes = 7 * pattern.interval + 7;
    let mut candidate = current + Duration::days(1);
    let mut probed = 0;
    while probed < max_probes {
        if pattern.days_of_week.contains(&candidate.weekday()) {
            return candidate;
        }
        candidate += Duration::days(1);
        probed += 1;
    }

    current + Duration::days(7 * pattern.interval)
}

fn clone_instance(master: &GoodWork, start: NaiveDateTime) -> GoodWork {
    let mut instance = master.clone();
    instance.id = None;
    instance.is_recurring = true;
    instance.start_time = Some(start);
    if let (Some(master_start), Some(master_end)) = (master.start_time, master.end_time) {
        instance.end_time = Some(start + (master_end - master_start));
    }
    instance
}

/// Expand a recurring master event into dated instances: one per occurrence
/// from the master start up to the recurrence end date (default one year
/// out), capped at `max_instances` (default 52). Non-recurring masters, and
/// windows that admit no occurrence at all, expand to the master alone.
pub fn expand_instances(master: &GoodWork, max_instances: Option<usize>) -> Vec<GoodWork> {
    let max_instances = max_instances.unwrap_or(DEFAULT_MAX_INSTANCES);
    let pattern_text = match &master.recurrence_pattern {
        Some(p) if master.is_recurring && !p.is_empty() => p.as_str(),
        _ => return vec![master.clone()],
    };
    let start = match master.start_time {
        Some(start) => start,
        None => return vec![master.clone()],
    };

    let pattern = parse_pattern(pattern_text);
    let end = master
        .recurrence_end_date
        .unwrap_or_else(|| one_year_out(start));

    let mut instances = Vec::new();
    let mut current = start;
    while current <= end && instances.len() < max_instances {
        instances.push(clone_instance(master, current));
        current = next_occurrence(current, &pattern);
    }

    if instances.is_empty() {
        return vec![master.clone()];
    }
    instances
}

/// Future occurrences relative to `now`, at most `count` (default 5), for
/// display. Bounded to 100 stepping iterations regardless of the pattern.
pub fn upcoming_occurrences(
    work: &GoodWork,
    count: Option<usize>,
    now: NaiveDateTime,
) -> Vec<NaiveDateTime> {
    let count = count.unwrap_or(DEFAULT_UPCOMING_COUNT);
    let start = match work.start_time {
        Some(start) if work.is_recurring => start,
        _ => return Vec::new(),
    };
    let pattern = parse_pattern(work.recurrence_pattern.as_deref().unwrap_or(""));

    // Re-anchor a past series at today, keeping the time of day.
    let mut current = if start < now {
        now.date().and_time(start.time())
    } else {
        start
    };
    let end = work.recurrence_end_date.unwrap_or_else(|| one_year_out(current));

    let mut occurrences = Vec::new();
    let mut iterations = 0;
    while occurrences.len() < count && current <= end && iterations < UPCOMING_ITERATION_BOUND {
        if current >= now {
            occurrences.push(current);
        }
        current = next_occurrence(current, &pattern);
        iterations += 1;
    }

    occurrences
}

fn one_year_out(from: NaiveDateTime) -> NaiveDateTime {
    from.checked_add_months(Months::new(12))
        .unwrap_or(from + Duration::days(365))
}

/// Human-readable rendering of a pattern string. Empty or unrecognized
/// patterns render as "Does not repeat".
pub fn format_pattern(pattern: &str) -> String {
    if pattern.is_empty() {
        return "Does not repeat".to_string();
    }

    let parsed = parse_pattern(pattern);
    match parsed.kind {
        RecurrenceKind::Daily => format!(
            "Daily (every {} day{})",
            parsed.interval,
            if parsed.interval > 1 { "s" } else { "" }
        ),
        RecurrenceKind::Weekly if !parsed.days_of_week.is_empty() => {
            let days: Vec<&str> = parsed.days_of_week.iter().copied().map(short_day).collect();
            format!("Weekly on {}", days.join(", "))
        }
        RecurrenceKind::Weekly => format!(
            "Weekly (every {} week{})",
            parsed.interval,
            if parsed.interval > 1 { "s" } else { "" }
        ),
        RecurrenceKind::Monthly => format!("Monthly on day {}", parsed.day_of_month),
        RecurrenceKind::Yearly => {
            format!("Yearly on {}/{}", parsed.month_of_year, parsed.day_of_month)
        }
        RecurrenceKind::None => "Does not repeat".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn recurring(pattern: &str, start: NaiveDateTime) -> GoodWork {
        GoodWork {
            name: "Weekly park cleanup".to_string(),
            is_recurring: true,
            recurrence_pattern: Some(pattern.to_string()),
            start_time: Some(start),
            end_time: Some(start + Duration::hours(2)),
            ..Default::default()
        }
    }

    #[test]
    fn non_recurring_master_expands_to_itself() {
        let master = GoodWork {
            name: "One-off".to_string(),
            start_time: Some(at(2024, 6, 1, 9)),
            ..Default::default()
        };
        let instances = expand_instances(&master, None);
        assert_eq!(instances.len(), 1);
        assert!(!instances[0].is_recurring);
    }

    #[test]
    fn end_before_start_yields_the_master_alone() {
        let mut master = recurring("DAILY:1", at(2024, 6, 1, 9));
        master.recurrence_end_date = Some(at(2024, 5, 1, 9));
        let instances = expand_instances(&master, None);
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].start_time, Some(at(2024, 6, 1, 9)));
        assert_eq!(instances[0].recurrence_pattern.as_deref(), Some("DAILY:1"));
    }

    #[test]
    fn daily_pattern_hits_the_default_instance_cap() {
        let master = recurring("DAILY:1", at(2024, 6, 1, 9));
        let instances = expand_instances(&master, None);
        assert_eq!(instances.len(), DEFAULT_MAX_INSTANCES);
        for (n, instance) in instances.iter().enumerate() {
            let expected = at(2024, 6, 1, 9) + Duration::days(n as i64);
            assert_eq!(instance.start_time, Some(expected));
            // Duration preserved.
            assert_eq!(instance.end_time, Some(expected + Duration::hours(2)));
        }
    }

    #[test]
    fn weekly_with_day_set_cycles_through_the_days() {
        // 2024-06-03 is a Monday.
        let master = recurring("WEEKLY:1:MON,WED,FRI", at(2024, 6, 3, 18));
        let instances = expand_instances(&master, Some(9));
        assert_eq!(instances.len(), 9);

        let allowed = [Weekday::Mon, Weekday::Wed, Weekday::Fri];
        let starts: Vec<NaiveDateTime> = instances.iter().filter_map(|i| i.start_time).collect();
        for start in &starts {
            assert!(allowed.contains(&start.weekday()), "landed on {}", start);
        }
        for pair in starts.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap > Duration::zero() && gap <= Duration::days(4));
        }
        assert_eq!(starts[0].weekday(), Weekday::Mon);
        assert_eq!(starts[1].weekday(), Weekday::Wed);
        assert_eq!(starts[2].weekday(), Weekday::Fri);
        assert_eq!(starts[3].weekday(), Weekday::Mon);
    }

    #[test]
    fn weekly_without_day_set_jumps_whole_intervals() {
        let master = recurring("WEEKLY:2", at(2024, 6, 3, 18));
        let instances = expand_instances(&master, Some(3));
        let starts: Vec<NaiveDateTime> = instances.iter().filter_map(|i| i.start_time).collect();
        assert_eq!(starts[1] - starts[0], Duration::days(14));
        assert_eq!(starts[2] - starts[1], Duration::days(14));
    }

    #[test]
    fn monthly_stepping_is_calendar_aware() {
        let pattern = parse_pattern("MONTHLY:1");
        let next = next_occurrence(at(2024, 1, 31, 12), &pattern);
        // Clamped to the end of February, not January 31 + 30 days.
        assert_eq!(next, at(2024, 2, 29, 12));
    }

    #[test]
    fn upcoming_skips_past_occurrences_and_terminates() {
        let master = recurring("WEEKLY:1", at(2024, 1, 1, 18));
        let now = at(2024, 6, 5, 0);
        let upcoming = upcoming_occurrences(&master, None, now);
        assert_eq!(upcoming.len(), DEFAULT_UPCOMING_COUNT);
        for occurrence in &upcoming {
            assert!(*occurrence >= now);
        }
    }

    #[test]
    fn upcoming_with_window_fully_in_the_past_is_empty() {
        let mut master = recurring("DAILY:1", at(2020, 1, 1, 9));
        master.recurrence_end_date = Some(at(2020, 6, 1, 9));
        let upcoming = upcoming_occurrences(&master, Some(5), at(2024, 6, 1, 0));
        assert!(upcoming.is_empty());
    }

    #[test]
    fn out_of_range_intervals_fall_back_to_one() {
        assert_eq!(parse_pattern("DAILY:0").interval, 1);
        assert_eq!(parse_pattern("WEEKLY:-2").interval, 1);
        assert_eq!(parse_pattern("MONTHLY:367").interval, 1);
        assert_eq!(parse_pattern("DAILY:9000000000000000000").interval, 1);
        assert_eq!(parse_pattern("DAILY:366").interval, 366);

        // A stored pattern with an absurd interval must still expand.
        let daily = recurring("DAILY:9000000000000000000", at(2024, 6, 1, 9));
        let instances = expand_instances(&daily, Some(3));
        assert_eq!(instances[1].start_time, Some(at(2024, 6, 2, 9)));

        let yearly = recurring("YEARLY:999999999:3:15", at(2024, 6, 1, 9));
        let instances = expand_instances(&yearly, Some(3));
        assert_eq!(instances[1].start_time, Some(at(2025, 6, 1, 9)));

        let upcoming = upcoming_occurrences(
            &recurring("DAILY:9000000000000000000", at(2024, 6, 1, 9)),
            Some(2),
            at(2024, 6, 1, 0),
        );
        assert_eq!(upcoming, vec![at(2024, 6, 1, 9), at(2024, 6, 2, 9)]);
    }

    #[test]
    fn formatting_covers_every_pattern_type() {
        assert_eq!(format_pattern(""), "Does not repeat");
        assert_eq!(format_pattern("SOMETIMES:1"), "Does not repeat");
        assert_eq!(format_pattern("DAILY:1"), "Daily (every 1 day)");
        assert_eq!(format_pattern("DAILY:3"), "Daily (every 3 days)");
        assert_eq!(format_pattern("WEEKLY:1:MON,WED"), "Weekly on Mon, Wed");
        assert_eq!(format_pattern("WEEKLY:2"), "Weekly (every 2 weeks)");
        assert_eq!(format_pattern("MONTHLY:1:15"), "Monthly on day 15");
        assert_eq!(format_pattern("YEARLY:1:3:15"), "Yearly on 3/15");
    }
}
