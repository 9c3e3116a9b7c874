//! Time parsing and the HHMM numeric-time convention.
//!
//! All wall-clock interpretation happens in the configured target zone so that
//! the numeric time of an event always agrees with the date bucket it lands in.

use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone,
    Timelike, Utc,
};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

static CLOCK_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\d{1,2})(?::(\d{2}))?(?::(\d{2}))?\s*(a\.?m\.?|p\.?m\.?)?$")
        .expect("clock time pattern is valid")
});

const NAIVE_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// A start or end time as published by the events source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTime {
    /// A wall-clock time without a date ("9:30 PM", "21:30").
    Clock(NaiveTime),
    /// A full timestamp.
    Instant(DateTime<FixedOffset>),
}

/// HHMM number for a wall-clock time: 14:30 -> 1430, 09:05 -> 905.
pub fn numeric_time(time: NaiveTime) -> u16 {
    // hour < 24 and minute < 60, so this fits in u16
    (time.hour() * 100 + time.minute()) as u16
}

/// Parses "9:30 PM", "9 PM", "9:30pm", "21:30" and "21:30:00".
///
/// A bare hour without AM/PM is ambiguous and rejected.
pub fn parse_clock_time(input: &str) -> Option<NaiveTime> {
    let caps = CLOCK_TIME.captures(input.trim())?;
    let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
    let second: u32 = caps.get(3).map_or(Some(0), |m| m.as_str().parse().ok())?;

    let hour_24 = match caps.get(4) {
        Some(period) => {
            if !(1..=12).contains(&hour) {
                return None;
            }
            let is_pm = period.as_str().to_ascii_lowercase().starts_with('p');
            match (is_pm, hour) {
                (true, 12) => 12,
                (true, h) => h + 12,
                (false, 12) => 0,
                (false, h) => h,
            }
        }
        None if caps.get(2).is_some() => hour,
        None => return None,
    };

    NaiveTime::from_hms_opt(hour_24, minute, second)
}

/// Parses an event time: RFC 3339, a naive timestamp in the target zone, or a clock time.
pub fn parse_event_time(input: &str, tz: Tz) -> Option<EventTime> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(EventTime::Instant(dt));
    }
    for format in NAIVE_TIMESTAMP_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return localize(naive, tz).map(EventTime::Instant);
        }
    }
    parse_clock_time(trimmed).map(EventTime::Clock)
}

/// Interprets a naive local date-time in `tz`. For ambiguous local times
/// (DST fall-back) the earlier instant wins; non-existent ones yield `None`.
pub fn localize(naive: NaiveDateTime, tz: Tz) -> Option<DateTime<FixedOffset>> {
    tz.from_local_datetime(&naive).earliest().map(to_fixed)
}

/// Anchors a wall-clock time to a calendar date in `tz`.
pub fn anchor(date: NaiveDate, time: NaiveTime, tz: Tz) -> Option<DateTime<FixedOffset>> {
    localize(date.and_time(time), tz)
}

pub fn to_fixed<T: TimeZone>(dt: DateTime<T>) -> DateTime<FixedOffset> {
    let offset = dt.offset().fix();
    dt.with_timezone(&offset)
}

/// Calendar date and wall-clock time of an instant as seen in `tz`.
pub fn local_parts(dt: &DateTime<FixedOffset>, tz: Tz) -> (NaiveDate, NaiveTime) {
    let local = dt.with_timezone(&tz);
    (local.date_naive(), local.time())
}

/// Resolves a parsed start/end pair against the bucket date.
///
/// Clock times are anchored to `date`; a clock end earlier than the start is
/// taken to be after midnight.
pub fn resolve_span(
    date: NaiveDate,
    start: EventTime,
    end: Option<EventTime>,
    tz: Tz,
) -> Option<(DateTime<FixedOffset>, Option<DateTime<FixedOffset>>)> {
    let starts_at = match start {
        EventTime::Instant(dt) => dt,
        EventTime::Clock(t) => anchor(date, t, tz)?,
    };
    let ends_at = end.and_then(|end| match end {
        EventTime::Instant(dt) => Some(dt),
        EventTime::Clock(t) => {
            let (start_date, start_time) = local_parts(&starts_at, tz);
            let end_date = if t < start_time { start_date + Duration::days(1) } else { start_date };
            anchor(end_date, t, tz)
        }
    });
    Some((starts_at, ends_at))
}

/// Sunset as published by the weather source ("HH:MM:SS") to HHMM.
pub fn sunset_to_numeric(sunset: &str) -> Option<u16> {
    let mut parts = sunset.trim().split(':');
    let hours: u16 = parts.next()?.parse().ok()?;
    let minutes: u16 = parts.next()?.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some(hours * 100 + minutes)
}

pub fn today_in(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

/// `days` consecutive dates starting at `start`.
pub fn window_dates(start: NaiveDate, days: u32) -> Vec<NaiveDate> {
    start.iter_days().take(days as usize).collect()
}
