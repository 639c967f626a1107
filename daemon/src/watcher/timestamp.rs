//! Leading timestamp tokens found in server logs.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use regex::{Captures, Regex};

/// `2024.01.15-12.00.01`, optionally `[…:123]` and an Unreal frame counter.
static ENGINE_STAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\[?(\d{4})\.(\d{1,2})\.(\d{1,2})-(\d{1,2})\.(\d{1,2})\.(\d{1,2})(?::(\d{1,3}))?\]?(?:\[\s*\d+\])?:?\s*",
    )
    .expect("engine timestamp regex")
});

/// `2024-01-15 12:00:01[.123]`, optionally bracketed.
static ISO_STAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\[?(\d{4})-(\d{1,2})-(\d{1,2})[ T](\d{1,2}):(\d{1,2}):(\d{1,2})(?:[.,](\d{1,3})\d*)?Z?\]?:?\s*",
    )
    .expect("iso timestamp regex")
});

/// `[12:00:01]`: time of day only.
static CLOCK_STAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[(\d{1,2}):(\d{1,2}):(\d{1,2})\]\s*").expect("clock timestamp regex")
});

/// A clock-only stamp further than this ahead of receipt belongs to yesterday.
const FUTURE_TOLERANCE_HOURS: i64 = 12;

/// Outcome of stripping a timestamp from the front of a line.
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped<'a> {
    pub time: DateTime<Utc>,
    /// False when `time` is the receipt fallback.
    pub parsed: bool,
    pub body: &'a str,
}

/// Split `line` into its embedded timestamp and message body.
///
/// Falls back to `received_at` when no token is present or it does not form
/// a valid date.
pub fn extract(line: &str, received_at: DateTime<Utc>) -> Stamped<'_> {
    let fallback = |body| Stamped {
        time: received_at,
        parsed: false,
        body,
    };

    for pattern in [&*ENGINE_STAMP, &*ISO_STAMP] {
        if let Some(caps) = pattern.captures(line) {
            let body = &line[caps[0].len()..];
            return match full_date_time(&caps) {
                Some(time) => Stamped {
                    time,
                    parsed: true,
                    body,
                },
                None => fallback(body),
            };
        }
    }

    if let Some(caps) = CLOCK_STAMP.captures(line) {
        let body = &line[caps[0].len()..];
        return match clock_time(&caps, received_at) {
            Some(time) => Stamped {
                time,
                parsed: true,
                body,
            },
            None => fallback(body),
        };
    }

    fallback(line)
}

fn number(caps: &Captures<'_>, idx: usize) -> Option<u32> {
    caps.get(idx)?.as_str().parse().ok()
}

fn full_date_time(caps: &Captures<'_>) -> Option<DateTime<Utc>> {
    let date = NaiveDate::from_ymd_opt(
        caps[1].parse().ok()?,
        number(caps, 2)?,
        number(caps, 3)?,
    )?;
    let millis = caps
        .get(7)
        .map(|m| {
            // "5" means 500 ms, "05" means 50 ms.
            let digits = m.as_str();
            digits.parse::<u32>().ok().map(|v| v * 10u32.pow(3 - digits.len() as u32))
        })
        .unwrap_or(Some(0))?;
    let time = NaiveTime::from_hms_milli_opt(
        number(caps, 4)?,
        number(caps, 5)?,
        number(caps, 6)?,
        millis,
    )?;
    Some(date.and_time(time).and_utc())
}

fn clock_time(caps: &Captures<'_>, received_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let time = NaiveTime::from_hms_opt(number(caps, 1)?, number(caps, 2)?, number(caps, 3)?)?;
    let candidate = received_at.date_naive().and_time(time).and_utc();
    if candidate - received_at > Duration::hours(FUTURE_TOLERANCE_HOURS) {
        Some(candidate - Duration::days(1))
    } else {
        Some(candidate)
    }
}
