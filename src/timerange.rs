//! Time-range normalization.
//!
//! Callers send `start`/`end` as wall-clock times (`YYYY-MM-DD HH:MM`) in their
//! own timezone; queries filter on UTC instants with `[start, end)` semantics.

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer};

use crate::error::{Result, StatsError};

/// Wall-clock format accepted for `start`/`end`.
pub const LOCAL_INPUT_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Storage format of every `created_at` column.
pub const DB_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Raw `start`/`end` query parameters. Empty strings count as absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeRangeQuery {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub start: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub end: Option<String>,
}

impl TimeRangeQuery {
    /// Normalize into UTC bounds using the caller's timezone.
    pub fn normalize(&self, tz: Tz) -> Result<TimeRange> {
        parse_time_range(self.start.as_deref(), self.end.as_deref(), tz)
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

/// Half-open UTC window. A missing bound is unbounded on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// A window covering all history.
    pub fn unbounded() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| at >= start) && self.end.map_or(true, |end| at < end)
    }

    /// Lower bound in storage format.
    pub fn start_param(&self) -> Option<String> {
        self.start.map(to_db_timestamp)
    }

    /// Upper bound in storage format.
    pub fn end_param(&self) -> Option<String> {
        self.end.map(to_db_timestamp)
    }
}

/// Parse optional wall-clock bounds in `tz` into a UTC [`TimeRange`].
///
/// Ambiguous wall-clock times (clocks turned back) resolve to the standard-time
/// instant; times inside a spring-forward gap are moved one hour ahead.
pub fn parse_time_range(start: Option<&str>, end: Option<&str>, tz: Tz) -> Result<TimeRange> {
    let start = parse_bound("start", start, tz)?;
    let end = parse_bound("end", end, tz)?;

    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(StatsError::InvalidTimeRange(
                "start must be earlier than or equal to end".to_string(),
            ));
        }
    }

    Ok(TimeRange { start, end })
}

fn parse_bound(label: &str, raw: Option<&str>, tz: Tz) -> Result<Option<DateTime<Utc>>> {
    let Some(raw) = raw.filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    let naive = NaiveDateTime::parse_from_str(raw, LOCAL_INPUT_FORMAT).map_err(|_| {
        StatsError::InvalidTimeRange(format!(
            "Invalid {} time format: time data '{}' does not match format '{}'",
            label, raw, LOCAL_INPUT_FORMAT
        ))
    })?;

    Ok(Some(localize(naive, tz)))
}

/// Resolve a wall-clock time in `tz` to a UTC instant.
pub fn localize(naive: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        // The later instant is the one on standard time.
        LocalResult::Ambiguous(_, standard) => standard.with_timezone(&Utc),
        LocalResult::None => {
            let shifted = naive + Duration::hours(1);
            for step_minutes in 0..=(24 * 60) {
                let probe = shifted + Duration::minutes(step_minutes);
                match tz.from_local_datetime(&probe) {
                    LocalResult::Single(dt) => return dt.with_timezone(&Utc),
                    LocalResult::Ambiguous(_, standard) => return standard.with_timezone(&Utc),
                    LocalResult::None => continue,
                }
            }
            naive.and_utc()
        }
    }
}

/// Parse an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| StatsError::InvalidTimezone(name.to_string()))
}

/// Format an instant the way `created_at` columns store it.
pub fn to_db_timestamp(at: DateTime<Utc>) -> String {
    at.format(DB_TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored `created_at` value.
///
/// Accepts the canonical form with optional fractional seconds, and RFC 3339.
pub fn from_db_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }

    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StatsError::Database(format!("Invalid stored timestamp '{}': {}", raw, e)))
}
