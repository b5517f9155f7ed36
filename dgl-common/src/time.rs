//! Timestamp utilities
//!
//! Store-assigned timestamps are kept at microsecond resolution so they
//! survive a round trip through RFC 3339 text and SQLite integer columns.

use chrono::{DateTime, SecondsFormat, Utc};

/// Get current UTC timestamp truncated to microseconds
pub fn now() -> DateTime<Utc> {
    from_micros(Utc::now().timestamp_micros())
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}

/// Build a timestamp from microseconds since the Unix epoch
pub fn from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_micros(micros).unwrap_or_default()
}

/// Server timestamp for a write that follows `previous`
///
/// Never returns a value at or before `previous`, so timestamps on one
/// document are strictly increasing even if the wall clock steps back.
pub fn next_server_timestamp(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let candidate = now();
    match previous {
        Some(prev) if candidate <= prev => from_micros(prev.timestamp_micros() + 1),
        _ => candidate,
    }
}

/// Format as RFC 3339 with microsecond precision and a `Z` suffix
pub fn to_rfc3339(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 string, returning None on malformed input
pub fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| from_micros(dt.with_timezone(&Utc).timestamp_micros()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // After 2000-01-01 and before 2100-01-01
        assert!(timestamp.timestamp() > 946_684_800);
        assert!(timestamp.timestamp() < 4_102_444_800);
    }

    #[test]
    fn test_now_has_no_sub_microsecond_component() {
        let timestamp = now();
        assert_eq!(timestamp.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[test]
    fn test_millis_to_duration() {
        assert_eq!(millis_to_duration(0), Duration::from_millis(0));
        assert_eq!(millis_to_duration(200), Duration::from_millis(200));
        assert_eq!(millis_to_duration(1000), Duration::from_secs(1));
    }

    #[test]
    fn test_next_server_timestamp_is_strictly_increasing() {
        let far_future = from_micros(now().timestamp_micros() + 60_000_000);
        let next = next_server_timestamp(Some(far_future));
        assert_eq!(next.timestamp_micros(), far_future.timestamp_micros() + 1);

        let again = next_server_timestamp(Some(next));
        assert!(again > next);
    }

    #[test]
    fn test_next_server_timestamp_without_previous_uses_clock() {
        let before = now();
        let stamp = next_server_timestamp(None);
        assert!(stamp >= before);
    }

    #[test]
    fn test_rfc3339_round_trip() {
        let timestamp = from_micros(1_771_000_000_123_456);
        let text = to_rfc3339(&timestamp);
        assert!(text.ends_with('Z'));
        assert_eq!(parse_rfc3339(&text), Some(timestamp));
    }

    #[test]
    fn test_parse_rfc3339_rejects_garbage() {
        assert_eq!(parse_rfc3339("yesterday"), None);
        assert_eq!(parse_rfc3339(""), None);
    }
}
