//! Spot times carry only the time of day. The date is recovered by picking
//! the instant with that clock time closest to now, assuming spots are never
//! more than half a day old (or ahead, with clock skew).

use chrono::{DateTime, Duration, NaiveTime, Utc};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid time of day '{0}'")]
pub struct ParseError(pub String);

fn parse_time_of_day(time: &str) -> Result<NaiveTime, ParseError> {
    let time = time.trim();
    NaiveTime::parse_from_str(time, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M"))
        .map_err(|_| ParseError(time.to_string()))
}

/// Resolves `time` (`HH:MM` or `HH:MM:SS`, UTC) to the matching instant
/// within ±12 hours of `now`.
pub fn resolve(time: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, ParseError> {
    let tod = parse_time_of_day(time)?;
    let half_day = Duration::hours(12);
    let mut candidate = now.date_naive().and_time(tod).and_utc();
    while candidate - now > half_day {
        candidate -= Duration::days(1);
    }
    while candidate - now < -half_day {
        candidate += Duration::days(1);
    }
    Ok(candidate)
}
