//! UTC calendar-day helpers.
//!
//! Buckets are keyed by the UTC calendar date of a measurement timestamp.
//! All truncation and boundary arithmetic lives here so the store and the
//! query engine agree on exactly where a day starts and ends.

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, UtcOffset};

use crate::error::{ParseError, ParseResult};

const DAY_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Truncate a timestamp to its UTC calendar date.
pub fn truncate_to_day(time: OffsetDateTime) -> Date {
    time.to_offset(UtcOffset::UTC).date()
}

/// First instant of a day: `00:00:00.000000000` UTC.
pub fn day_start(day: Date) -> OffsetDateTime {
    day.midnight().assume_utc()
}

/// Last instant of a day: `23:59:59.999999999` UTC.
pub fn day_end(day: Date) -> OffsetDateTime {
    day_start(day) + Duration::days(1) - Duration::nanoseconds(1)
}

/// Render a day as `YYYY-MM-DD`.
pub fn format_day(day: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        day.year(),
        u8::from(day.month()),
        day.day()
    )
}

/// Parse a `YYYY-MM-DD` date string.
pub fn parse_day(value: &str) -> ParseResult<Date> {
    Date::parse(value, DAY_FORMAT).map_err(|_| ParseError::InvalidDate(value.to_string()))
}

/// Serde adapter serializing a [`Date`] as a `YYYY-MM-DD` string.
pub mod serde_day {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use time::Date;

    pub fn serialize<S: Serializer>(day: &Date, serializer: S) -> Result<S::Ok, S::Error> {
        super::format_day(*day).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Date, D::Error> {
        let value = String::deserialize(deserializer)?;
        super::parse_day(&value).map_err(serde::de::Error::custom)
    }
}
