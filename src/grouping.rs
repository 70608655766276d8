use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, Locale, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::models::Event;

pub const TODAY_LABEL: &str = "Aujourd'hui";
pub const TOMORROW_LABEL: &str = "Demain";
pub const THIS_WEEK_LABEL: &str = "Cette semaine";
pub const NEXT_WEEK_LABEL: &str = "Semaine prochaine";

/// A fixed "now" in a given timezone.
///
/// Grouping and season logic never read the wall clock themselves; callers
/// pass a clock so results are reproducible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalClock {
    now: DateTime<Tz>,
}

impl LocalClock {
    pub fn new(now: DateTime<Utc>, tz: Tz) -> Self {
        Self {
            now: now.with_timezone(&tz),
        }
    }

    pub fn system(tz: Tz) -> Self {
        Self::new(Utc::now(), tz)
    }

    pub fn now(&self) -> DateTime<Tz> {
        self.now
    }

    pub fn tz(&self) -> Tz {
        self.now.timezone()
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    /// Calendar month of "now", 1-12.
    pub fn month(&self) -> u32 {
        self.now.month()
    }

    pub fn local_day(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.tz()).date_naive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BucketKey {
    Day(NaiveDate),
    /// Weeks from the current Monday-based week, past weeks folded into 0.
    Week(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventGroup {
    pub key: BucketKey,
    pub label: String,
    pub events: Vec<Event>,
}

/// Buckets events by local calendar day of `date_start`, oldest day first,
/// each bucket ordered by descending interest score.
pub fn group_by_day(events: &[Event], clock: &LocalClock) -> Vec<EventGroup> {
    let today = clock.today();
    let mut buckets: BTreeMap<NaiveDate, Vec<Event>> = BTreeMap::new();
    for event in events {
        buckets
            .entry(clock.local_day(event.date_start))
            .or_default()
            .push(event.clone());
    }

    buckets
        .into_iter()
        .map(|(day, mut bucket)| {
            sort_by_score(&mut bucket);
            EventGroup {
                key: BucketKey::Day(day),
                label: day_label(day, today),
                events: bucket,
            }
        })
        .collect()
}

/// Buckets events by calendar week relative to the current week.
///
/// Events from past weeks are not dropped: they land in the current week.
pub fn group_by_week(events: &[Event], clock: &LocalClock) -> Vec<EventGroup> {
    let today = clock.today();
    let mut buckets: BTreeMap<u32, Vec<Event>> = BTreeMap::new();
    for event in events {
        let offset = week_offset(clock.local_day(event.date_start), today);
        let key = u32::try_from(offset.max(0)).unwrap_or(u32::MAX);
        buckets.entry(key).or_default().push(event.clone());
    }

    buckets
        .into_iter()
        .map(|(offset, mut bucket)| {
            sort_by_score(&mut bucket);
            EventGroup {
                key: BucketKey::Week(offset),
                label: week_label(offset),
                events: bucket,
            }
        })
        .collect()
}

/// Number of Monday-started calendar weeks between `today` and `day`.
pub fn week_offset(day: NaiveDate, today: NaiveDate) -> i64 {
    (start_of_week(day) - start_of_week(today)).num_days() / 7
}

fn start_of_week(day: NaiveDate) -> NaiveDate {
    day - Duration::days(i64::from(day.weekday().num_days_from_monday()))
}

pub fn day_label(day: NaiveDate, today: NaiveDate) -> String {
    if day == today {
        return TODAY_LABEL.to_string();
    }
    if today.succ_opt() == Some(day) {
        return TOMORROW_LABEL.to_string();
    }
    let Some(noon) = day.and_hms_opt(12, 0, 0) else {
        return day.to_string();
    };
    let formatted = Utc
        .from_utc_datetime(&noon)
        .format_localized("%A %-d %b", Locale::fr_FR)
        .to_string();
    capitalize(&formatted)
}

pub fn week_label(offset: u32) -> String {
    match offset {
        0 => THIS_WEEK_LABEL.to_string(),
        1 => NEXT_WEEK_LABEL.to_string(),
        n => format!("Dans {n} semaines"),
    }
}

fn sort_by_score(events: &mut [Event]) {
    // stable: equal scores keep their arrival order
    events.sort_by(|a, b| b.interest_score.cmp(&a.interest_score));
}

fn capitalize(input: &str) -> String {
    let mut chars = input.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARIS: Tz = chrono_tz::Europe::Paris;

    // Wednesday 2025-03-12, 10:00 in Paris
    fn clock() -> LocalClock {
        LocalClock::new(Utc.with_ymd_and_hms(2025, 3, 12, 9, 0, 0).unwrap(), PARIS)
    }

    fn event(id: &str, start: DateTime<Utc>, score: u8) -> Event {
        Event {
            id: id.to_string(),
            date_start: start,
            interest_score: score,
            ..Default::default()
        }
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn days_are_chronological_and_labeled() {
        let events = vec![
            event("later", at(15, 18), 50),
            event("today", at(12, 18), 40),
            event("tomorrow", at(13, 18), 90),
        ];
        let groups = group_by_day(&events, &clock());
        let labels: Vec<&str> = groups.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(labels[0], TODAY_LABEL);
        assert_eq!(labels[1], TOMORROW_LABEL);
        assert!(labels[2].starts_with("Samedi"), "got {}", labels[2]);
        assert!(labels[2].contains("15"));
    }

    #[test]
    fn day_uses_local_calendar_not_utc() {
        // 23:30 UTC on the 12th is already the 13th in Paris
        let events = vec![event("late", Utc.with_ymd_and_hms(2025, 3, 12, 23, 30, 0).unwrap(), 10)];
        let groups = group_by_day(&events, &clock());
        assert_eq!(groups[0].key, BucketKey::Day(NaiveDate::from_ymd_opt(2025, 3, 13).unwrap()));
        assert_eq!(groups[0].label, TOMORROW_LABEL);
    }

    #[test]
    fn buckets_sort_by_score_and_keep_ties_stable() {
        let events = vec![
            event("a", at(12, 10), 30),
            event("b", at(12, 11), 80),
            event("c", at(12, 12), 30),
            event("d", at(12, 13), 80),
        ];
        let groups = group_by_day(&events, &clock());
        assert_eq!(groups.len(), 1);
        let order: Vec<&str> = groups[0].events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(order, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn past_weeks_fold_into_this_week() {
        let events = vec![
            event("last_week", at(3, 12), 10),
            event("monday", at(10, 12), 20),
            event("sunday", at(16, 12), 30),
            event("next", at(17, 12), 40),
            event("in_three", at(31, 12), 50),
        ];
        let groups = group_by_week(&events, &clock());
        let keys: Vec<BucketKey> = groups.iter().map(|g| g.key).collect();
        assert_eq!(keys, vec![BucketKey::Week(0), BucketKey::Week(1), BucketKey::Week(3)]);
        assert_eq!(groups[0].label, THIS_WEEK_LABEL);
        assert_eq!(groups[1].label, NEXT_WEEK_LABEL);
        assert_eq!(groups[2].label, "Dans 3 semaines");
        let first: Vec<&str> = groups[0].events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(first, vec!["sunday", "monday", "last_week"]);
    }

    #[test]
    fn week_offset_counts_monday_boundaries() {
        let wed = NaiveDate::from_ymd_opt(2025, 3, 12).unwrap();
        assert_eq!(week_offset(NaiveDate::from_ymd_opt(2025, 3, 16).unwrap(), wed), 0);
        assert_eq!(week_offset(NaiveDate::from_ymd_opt(2025, 3, 17).unwrap(), wed), 1);
        assert_eq!(week_offset(NaiveDate::from_ymd_opt(2025, 3, 9).unwrap(), wed), -1);
    }

    #[test]
    fn grouping_is_repeatable_for_a_fixed_clock() {
        let events = vec![
            event("x", at(20, 8), 70),
            event("y", at(12, 8), 70),
            event("z", at(14, 8), 20),
        ];
        assert_eq!(group_by_day(&events, &clock()), group_by_day(&events, &clock()));
        assert_eq!(group_by_week(&events, &clock()), group_by_week(&events, &clock()));
    }

    #[test]
    fn empty_input_gives_no_groups() {
        assert!(group_by_day(&[], &clock()).is_empty());
        assert!(group_by_week(&[], &clock()).is_empty());
    }
}
