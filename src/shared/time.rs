//! Usage: Wall-clock helpers (unix seconds/millis and RFC 3339 rendering).

use chrono::{DateTime, SecondsFormat, Utc};

pub(crate) fn now_unix_seconds() -> i64 {
    Utc::now().timestamp()
}

pub(crate) fn now_unix_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn unix_seconds_to_rfc3339(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| secs.to_string())
}

pub(crate) fn unix_millis_to_rfc3339(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| millis.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_like_javascript_iso_strings() {
        assert_eq!(unix_seconds_to_rfc3339(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(
            unix_millis_to_rfc3339(1_700_000_000_123),
            "2023-11-14T22:13:20.123Z"
        );
    }

    #[test]
    fn millis_and_seconds_agree() {
        let secs = now_unix_seconds();
        let millis = now_unix_millis();
        assert!((millis / 1000 - secs).abs() <= 1);
    }
}
