//! Time bucketing for usage counters
//!
//! All buckets are UTC.
//! - Day buckets: "YYYY-MM-DD" keys of `usage_by_day`
//! - Hour buckets: 0-23 keys of `usage_by_hour`

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};

/// Day bucket string for a timestamp.
///
/// # Example
/// ```
/// use chrono::{TimeZone, Utc};
/// let ts = Utc.with_ymd_and_hms(2023, 12, 28, 12, 34, 56).unwrap();
/// assert_eq!(levelup::metrics::day_bucket(ts), "2023-12-28");
/// ```
pub fn day_bucket(ts: DateTime<Utc>) -> String {
    format!("{:04}-{:02}-{:02}", ts.year(), ts.month(), ts.day())
}

/// Hour-of-day bucket (0-23) for a timestamp.
pub fn hour_bucket(ts: DateTime<Utc>) -> u8 {
    ts.hour() as u8
}

/// Parse a day bucket string back to a date.
pub fn parse_day_bucket(bucket: &str) -> Option<NaiveDate> {
    // Parse "YYYY-MM-DD" strictly, chrono alone accepts unpadded fields
    let parts: Vec<&str> = bucket.split('-').collect();
    if parts.len() != 3 || parts[0].len() != 4 || parts[1].len() != 2 || parts[2].len() != 2 {
        return None;
    }
    let year: i32 = parts[0].parse().ok()?;
    let month: u32 = parts[1].parse().ok()?;
    let day: u32 = parts[2].parse().ok()?;

    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_day_bucket() {
        // 2023-12-28 12:34:56 UTC
        let ts = Utc.timestamp_millis_opt(1703766896000).unwrap();
        assert_eq!(day_bucket(ts), "2023-12-28");
    }

    #[test]
    fn test_hour_bucket() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 5, 23, 59, 0).unwrap();
        assert_eq!(hour_bucket(ts), 23);
        let ts = Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 1).unwrap();
        assert_eq!(hour_bucket(ts), 0);
    }

    #[test]
    fn test_parse_day_bucket() {
        let date = parse_day_bucket("2023-12-28").unwrap();
        assert_eq!(date.year(), 2023);
        assert_eq!(date.month(), 12);
        assert_eq!(date.day(), 28);

        assert!(parse_day_bucket("2023-13-01").is_none());
        assert!(parse_day_bucket("2023-1-01").is_none());
        assert!(parse_day_bucket("today").is_none());
    }
}
