//! Conversions between the tracker's date text formats and timestamps.
//!
//! The tracker writes datetimes as `YYYY/MM/DD HH:MM:SS ZONE`. The zone token
//! is informational only: the numeric fields are read as a UTC wall-clock
//! reading, since the tracker only ever emits UTC-equivalent zone names
//! ("UTC", "GMT"). Calendar days are `YYYY-MM-DD`.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::{TrackerError, TrackerResult};

const TRACKER_DATETIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";
const DAY_FORMAT: &str = "%Y-%m-%d";

/// Seconds in one calendar day.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Parse `YYYY/MM/DD HH:MM:SS ZONE` into a POSIX timestamp.
pub fn parse_tracker_datetime(text: &str) -> TrackerResult<i64> {
    let text = text.trim();
    let (clock, zone) = text
        .rsplit_once(' ')
        .ok_or_else(|| TrackerError::Format(text.to_string()))?;

    if zone.is_empty() || !zone.chars().all(is_zone_char) {
        return Err(TrackerError::Format(text.to_string()));
    }

    let naive = NaiveDateTime::parse_from_str(clock, TRACKER_DATETIME_FORMAT)
        .map_err(|_| TrackerError::Format(text.to_string()))?;

    Ok(naive.and_utc().timestamp())
}

fn is_zone_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '_' | '/')
}

/// Render a POSIX timestamp as `YYYY/MM/DD HH:MM:SS UTC`.
pub fn format_tracker_datetime(timestamp: i64) -> TrackerResult<String> {
    let dt = DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| TrackerError::Format(timestamp.to_string()))?;
    Ok(format!("{} UTC", dt.format(TRACKER_DATETIME_FORMAT)))
}

/// Truncate a tracker datetime string to its `YYYY-MM-DD` day.
pub fn to_calendar_day(text: &str) -> TrackerResult<String> {
    timestamp_to_day(parse_tracker_datetime(text)?)
}

/// The `YYYY-MM-DD` day a timestamp falls on.
pub fn timestamp_to_day(timestamp: i64) -> TrackerResult<String> {
    let dt = DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| TrackerError::Format(timestamp.to_string()))?;
    Ok(dt.format(DAY_FORMAT).to_string())
}

/// The calendar day after `day`.
pub fn add_one_day(day: &str) -> TrackerResult<String> {
    let next = parse_day(day)?
        .succ_opt()
        .ok_or_else(|| TrackerError::Format(day.to_string()))?;
    Ok(next.format(DAY_FORMAT).to_string())
}

/// Timestamp of midnight at the start of `day`.
///
/// Only meaningful as one side of a difference between two days. Midnight is
/// taken in UTC so the difference is always a whole number of days.
pub fn day_to_seconds(day: &str) -> TrackerResult<i64> {
    parse_day(day)?
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc().timestamp())
        .ok_or_else(|| TrackerError::Format(day.to_string()))
}

fn parse_day(day: &str) -> TrackerResult<NaiveDate> {
    NaiveDate::parse_from_str(day, DAY_FORMAT).map_err(|_| TrackerError::Format(day.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tracker_datetime() {
        assert_eq!(
            parse_tracker_datetime("2009/04/17 00:47:50 GMT").unwrap(),
            1239929270
        );
        assert_eq!(
            parse_tracker_datetime("2009/05/21 19:00:00 GMT").unwrap(),
            1242932400
        );
        assert_eq!(
            parse_tracker_datetime("2008/12/10 00:00:00 UTC").unwrap(),
            1228867200
        );
    }

    #[test]
    fn test_zone_token_is_informational() {
        let gmt = parse_tracker_datetime("2010/11/19 08:03:22 GMT").unwrap();
        let utc = parse_tracker_datetime("2010/11/19 08:03:22 UTC").unwrap();
        let pst = parse_tracker_datetime("2010/11/19 08:03:22 PST").unwrap();
        assert_eq!(gmt, utc);
        assert_eq!(gmt, pst);
    }

    #[test]
    fn test_parse_tracker_datetime_rejects_malformed_text() {
        for text in [
            "",
            "2009/04/17",
            "2009/04/17 00:47:50",
            "2009-04-17 00:47:50 UTC",
            "2009/13/17 00:47:50 UTC",
            "yesterday at noon UTC",
        ] {
            assert!(
                matches!(parse_tracker_datetime(text), Err(TrackerError::Format(_))),
                "expected format error for {:?}",
                text
            );
        }
    }

    #[test]
    fn test_format_tracker_datetime() {
        assert_eq!(
            format_tracker_datetime(1290153802).unwrap(),
            "2010/11/19 08:03:22 UTC"
        );
        let text = format_tracker_datetime(1239929270).unwrap();
        assert_eq!(parse_tracker_datetime(&text).unwrap(), 1239929270);
    }

    #[test]
    fn test_to_calendar_day() {
        assert_eq!(
            to_calendar_day("2009/06/09 00:00:04 GMT").unwrap(),
            "2009-06-09"
        );
        assert_eq!(
            to_calendar_day("2010/11/19 23:59:59 UTC").unwrap(),
            "2010-11-19"
        );
        assert!(to_calendar_day("2010-11-19").is_err());
    }

    #[test]
    fn test_add_one_day_rollovers() {
        assert_eq!(add_one_day("2010-11-19").unwrap(), "2010-11-20");
        assert_eq!(add_one_day("2010-12-31").unwrap(), "2011-01-01");
        assert_eq!(add_one_day("2010-02-28").unwrap(), "2010-03-01");
        assert_eq!(add_one_day("2012-02-28").unwrap(), "2012-02-29");
        assert_eq!(add_one_day("2012-02-29").unwrap(), "2012-03-01");
        assert_eq!(add_one_day("2010-04-30").unwrap(), "2010-05-01");
    }

    #[test]
    fn test_add_one_day_rejects_bad_day() {
        assert!(matches!(add_one_day("2010/12/31"), Err(TrackerError::Format(_))));
        assert!(matches!(add_one_day("2010-02-30"), Err(TrackerError::Format(_))));
    }

    #[test]
    fn test_day_to_seconds_delta() {
        let deadline = day_to_seconds("2010-11-19").unwrap();
        let release = day_to_seconds("2010-11-22").unwrap();
        assert_eq!(release - deadline, 3 * SECONDS_PER_DAY);

        // Across a DST change in most zones
        let before = day_to_seconds("2010-03-13").unwrap();
        let after = day_to_seconds("2010-03-15").unwrap();
        assert_eq!(after - before, 2 * SECONDS_PER_DAY);
    }
}
