//! Timezone-adjusted calendar dates in SQL.
//!
//! SQLite has no timezone database, so the caller's timezone is flattened into
//! the UTC-offset segments covering the queried span and rendered as a
//! `date(col, '+N seconds')` expression (a `CASE` over segments when the span
//! crosses a DST transition).

use chrono::{DateTime, Duration, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use sqlx::{QueryBuilder, Sqlite};

/// Offsets are sampled at this interval; transitions are then located to the second.
const SCAN_STEP_HOURS: i64 = 1;

/// Interval of constant UTC offset, ending before `until` (open-ended when `None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetSegment {
    pub until: Option<DateTime<Utc>>,
    pub offset_secs: i32,
}

impl OffsetSegment {
    /// SQLite date modifier applying this offset.
    pub fn modifier(&self) -> String {
        format!("{:+} seconds", self.offset_secs)
    }
}

/// Local-date bucketing for one timezone over one span of instants.
#[derive(Debug, Clone)]
pub struct LocalDateBuckets {
    segments: Vec<OffsetSegment>,
}

impl LocalDateBuckets {
    /// Compute the offset segments of `tz` covering `[first, last]`.
    pub fn for_span(tz: Tz, first: DateTime<Utc>, last: DateTime<Utc>) -> Self {
        let step = Duration::hours(SCAN_STEP_HOURS);
        let mut segments = Vec::new();
        let mut current = offset_at(tz, first);
        let mut cursor = first;

        while cursor < last {
            let next = (cursor + step).min(last);
            let next_offset = offset_at(tz, next);
            if next_offset != current {
                let boundary = find_transition(tz, cursor, next, current);
                segments.push(OffsetSegment {
                    until: Some(boundary),
                    offset_secs: current,
                });
                current = next_offset;
            }
            cursor = next;
        }

        segments.push(OffsetSegment {
            until: None,
            offset_secs: current,
        });

        Self { segments }
    }

    pub fn segments(&self) -> &[OffsetSegment] {
        &self.segments
    }

    /// Local calendar date of `at`, computed the same way the SQL expression does.
    #[cfg(test)]
    pub fn local_date(&self, at: DateTime<Utc>) -> chrono::NaiveDate {
        let offset = self
            .segments
            .iter()
            .find(|segment| segment.until.map_or(true, |until| at < until))
            .map_or(0, |segment| segment.offset_secs);
        (at + Duration::seconds(i64::from(offset))).date_naive()
    }

    /// Append the local-date expression for `column` with bound parameters.
    pub fn push_date_expr(&self, qb: &mut QueryBuilder<'_, Sqlite>, column: &str) {
        if let [only] = self.segments.as_slice() {
            qb.push("date(").push(column).push(", ");
            qb.push_bind(only.modifier());
            qb.push(")");
            return;
        }

        qb.push("CASE");
        for segment in &self.segments {
            match segment.until {
                Some(until) => {
                    qb.push(" WHEN ").push(column).push(" < ");
                    qb.push_bind(crate::timerange::to_db_timestamp(until));
                    qb.push(" THEN date(").push(column).push(", ");
                    qb.push_bind(segment.modifier());
                    qb.push(")");
                }
                None => {
                    qb.push(" ELSE date(").push(column).push(", ");
                    qb.push_bind(segment.modifier());
                    qb.push(")");
                }
            }
        }
        qb.push(" END");
    }
}

fn offset_at(tz: Tz, at: DateTime<Utc>) -> i32 {
    tz.offset_from_utc_datetime(&at.naive_utc())
        .fix()
        .local_minus_utc()
}

/// First second in `(before, after]` whose offset differs from `old_offset`.
fn find_transition(
    tz: Tz,
    mut before: DateTime<Utc>,
    mut after: DateTime<Utc>,
    old_offset: i32,
) -> DateTime<Utc> {
    while after - before > Duration::seconds(1) {
        let mid = before + Duration::seconds((after - before).num_seconds() / 2);
        if offset_at(tz, mid) == old_offset {
            before = mid;
        } else {
            after = mid;
        }
    }
    after
}
