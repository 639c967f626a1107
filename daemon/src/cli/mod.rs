//! Command-line entry points.

pub mod actions;
pub mod bans;
pub mod console;
pub mod daemon;
pub mod exec;
pub mod history;
pub mod reconcile;
pub mod status;

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};

use crate::config::Config;
use crate::error::Error;
use crate::storage::Store;

/// Load config and open the ledger it points at.
fn open(config_path: Option<&Path>) -> Result<(Config, Store), Error> {
    let config = Config::load(config_path)?;
    let store = Store::open(&config.database_path()?)?;
    Ok((config, store))
}

fn format_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn format_duration(duration: chrono::Duration) -> String {
    let secs = duration.num_seconds().max(0);
    let (h, m, s) = (secs / 3600, secs % 3600 / 60, secs % 60);
    if h > 0 {
        format!("{h}h{m:02}m{s:02}s")
    } else if m > 0 {
        format!("{m}m{s:02}s")
    } else {
        format!("{s}s")
    }
}

/// Accepts RFC 3339 or a bare `YYYY-MM-DD` (midnight UTC).
fn parse_time(value: &str) -> Result<DateTime<Utc>, Error> {
    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Ok(time.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| Error::InvalidArgument(format!("not a date or RFC 3339 time: {value}")))
}
