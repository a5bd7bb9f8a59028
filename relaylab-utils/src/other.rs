//! Module containing some utility functions that didn't fit anywhere else.

use time::{macros::format_description as fd, OffsetDateTime};

pub use time::Date;

fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// Produces a timestamp `String` of the current time in YYYYMMDDHHmmSS format, as used in the
/// names of measurement captures.
pub fn get_timestamp() -> String {
    now()
        .format(fd!("[year][month][day][hour][minute][second]"))
        .unwrap_or_default()
}

/// Today's date (local time if available).
pub fn today() -> Date {
    now().date()
}

/// Formats a date as the `YYYYMMDD` key used for persisted values.
pub fn date_key(date: Date) -> String {
    date.format(fd!("[year][month][day]")).unwrap_or_default()
}

/// Parses a `YYYYMMDD` key back into a date.
pub fn parse_date_key(key: impl AsRef<str>) -> Option<Date> {
    Date::parse(key.as_ref(), fd!("[year][month][day]")).ok()
}

#[cfg(test)]
mod test {
    use time::macros::date;

    use super::*;

    #[test]
    fn date_key_roundtrip() {
        let d = date!(2024 - 03 - 07);
        assert_eq!(date_key(d), "20240307");
        assert_eq!(parse_date_key("20240307"), Some(d));
        assert_eq!(parse_date_key("2024-03-07"), None);
    }

    #[test]
    fn timestamp_has_fourteen_digits() {
        let ts = get_timestamp();
        assert_eq!(ts.len(), 14);
        assert!(ts.chars().all(|c| c.is_ascii_digit()));
    }
}
