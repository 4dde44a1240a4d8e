// Turns the free-text "clean_time" column of the roster into weekday/time rules.
use std::{collections::BTreeSet, sync::OnceLock};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

/// Weekday indices start at Monday = 0.
const DAY_KEYWORDS: &[(&str, &[u32])] = &[
    ("ежедневно", &[0, 1, 2, 3, 4, 5, 6]),
    ("будние", &[0, 1, 2, 3, 4]),
    ("понедельник", &[0]),
    ("вторник", &[1]),
    ("среда", &[2]),
    ("четверг", &[3]),
    ("пятница", &[4]),
    ("суббота", &[5]),
    ("воскресенье", &[6]),
];

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("no time of day in schedule {0:?}")]
    MissingTime(String),

    #[error("time {time:?} in schedule {text:?} is not a valid clock time")]
    InvalidTime { text: String, time: String },

    #[error("no weekday keyword in schedule {0:?}")]
    NoDays(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleRule {
    pub weekdays: BTreeSet<u32>,
    pub time_of_day: NaiveTime,
}

fn time_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+:\d+").expect("static pattern"))
}

/// Parses strings such as `"5/2 Будние дни, в 11:00"`.
///
/// Every weekday keyword found contributes its days. Only the first `H:MM`
/// in the text is used, so a schedule listing two times for two different
/// places ("... в 13:30 по рем.зоне. ... в 19:30 по магазину") yields the
/// first one.
pub fn parse(text: &str) -> Result<ScheduleRule, ParseError> {
    let lowered = text.to_lowercase();
    let weekdays: BTreeSet<u32> = DAY_KEYWORDS
        .iter()
        .filter(|(keyword, _)| lowered.contains(keyword))
        .flat_map(|(_, days)| days.iter().copied())
        .collect();

    let time = time_pattern()
        .find(text)
        .ok_or_else(|| ParseError::MissingTime(text.to_string()))?
        .as_str();
    let time_of_day = parse_clock(time).ok_or_else(|| ParseError::InvalidTime {
        text: text.to_string(),
        time: time.to_string(),
    })?;

    if weekdays.is_empty() {
        return Err(ParseError::NoDays(text.to_string()));
    }
    Ok(ScheduleRule { weekdays, time_of_day })
}

fn parse_clock(time: &str) -> Option<NaiveTime> {
    let (hours, minutes) = time.split_once(':')?;
    NaiveTime::from_hms_opt(hours.parse().ok()?, minutes.parse().ok()?, 0)
}

/// The due timestamp for `today`, if the rule fires on that weekday.
pub fn resolve(rule: &ScheduleRule, today: NaiveDate) -> Option<NaiveDateTime> {
    let weekday = today.weekday().num_days_from_monday();
    rule.weekdays
        .contains(&weekday)
        .then(|| today.and_time(rule.time_of_day))
}

/// Seconds from `now` until `due_at`; zero or negative once it is due.
pub fn seconds_until(due_at: NaiveDateTime, now: NaiveDateTime) -> i64 {
    (due_at - now).num_seconds()
}
