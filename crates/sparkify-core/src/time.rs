use chrono::{DateTime, Datelike, NaiveDateTime, Timelike};

/// Calendar decomposition of an event timestamp, matching a row of the `time`
/// dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeParts {
    /// UTC instant truncated to whole seconds.
    pub start_time: NaiveDateTime,
    pub hour: u32,
    pub day: u32,
    /// ISO 8601 week number.
    pub week: u32,
    pub month: u32,
    pub year: i32,
    /// Day of week, Sunday = 0.
    pub weekday: u32,
}

impl TimeParts {
    /// Decompose a millisecond epoch timestamp. Returns `None` when the value
    /// is outside the range chrono can represent.
    pub fn from_epoch_millis(ms: i64) -> Option<Self> {
        // Integer division truncates toward zero, as the warehouse does.
        let start_time = DateTime::from_timestamp(ms / 1000, 0)?.naive_utc();
        Some(Self {
            start_time,
            hour: start_time.hour(),
            day: start_time.day(),
            week: start_time.iso_week().week(),
            month: start_time.month(),
            year: start_time.year(),
            weekday: start_time.weekday().num_days_from_sunday(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decomposes_known_event_timestamp() {
        let parts = TimeParts::from_epoch_millis(1_541_990_258_796).expect("in range");
        assert_eq!(parts.start_time.to_string(), "2018-11-12 02:37:38");
        assert_eq!(parts.hour, 2);
        assert_eq!(parts.day, 12);
        assert_eq!(parts.week, 46);
        assert_eq!(parts.month, 11);
        assert_eq!(parts.year, 2018);
        assert_eq!(parts.weekday, 1);
    }

    #[test]
    fn test_sunday_is_weekday_zero_and_iso_week_crosses_year() {
        // 2017-01-01 00:00:00 UTC, a Sunday in ISO week 52 of 2016.
        let parts = TimeParts::from_epoch_millis(1_483_228_800_000).expect("in range");
        assert_eq!(parts.weekday, 0);
        assert_eq!(parts.week, 52);
        assert_eq!(parts.year, 2017);
    }

    #[test]
    fn test_sub_second_part_is_truncated() {
        let a = TimeParts::from_epoch_millis(1_541_990_258_000).expect("in range");
        let b = TimeParts::from_epoch_millis(1_541_990_258_999).expect("in range");
        assert_eq!(a, b);
    }

    #[test]
    fn test_out_of_range_is_none() {
        assert!(TimeParts::from_epoch_millis(i64::MAX).is_none());
    }
}
