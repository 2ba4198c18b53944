//! Input validation for hits and aggregate queries

use chrono::{Duration, NaiveDateTime};

use super::StatsError;
use crate::models::hit::{MAX_APP_LEN, MAX_IP_LEN, MAX_URI_LEN};
use crate::models::{parse_timestamp, HitRecord};
use crate::storage::StoredHit;

fn required<'a>(value: &'a str, name: &str) -> Result<&'a str, StatsError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StatsError::Validation(format!("{name} cannot be empty")));
    }
    Ok(trimmed)
}

fn bounded<'a>(value: &'a str, name: &str, max: usize) -> Result<&'a str, StatsError> {
    if value.chars().count() > max {
        return Err(StatsError::Validation(format!(
            "{name} too long (maximum {max} characters)"
        )));
    }
    Ok(value)
}

/// Validate a hit and convert it into its stored, trimmed form
pub fn validate_hit(record: &HitRecord) -> Result<StoredHit, StatsError> {
    let app = bounded(required(&record.app, "App name")?, "App name", MAX_APP_LEN)?;
    let uri = bounded(required(&record.uri, "URI")?, "URI", MAX_URI_LEN)?;
    let ip = bounded(required(&record.ip, "IP address")?, "IP address", MAX_IP_LEN)?;
    let timestamp = required(&record.timestamp, "Timestamp")?;

    let timestamp = parse_timestamp(timestamp).map_err(|_| {
        StatsError::Validation("Invalid timestamp format. Use 'yyyy-MM-dd HH:mm:ss'".to_string())
    })?;

    Ok(StoredHit {
        app: app.to_string(),
        uri: uri.to_string(),
        ip: ip.to_string(),
        timestamp,
    })
}

/// Check `start <= end`, `start` not after `now`, and a span of at most `max_days`
pub fn validate_range(
    start: NaiveDateTime,
    end: NaiveDateTime,
    now: NaiveDateTime,
    max_days: i64,
) -> Result<(), StatsError> {
    if start > end {
        return Err(StatsError::Validation(
            "Start date cannot be after end date".to_string(),
        ));
    }

    if start > now {
        return Err(StatsError::Validation(
            "Start date cannot be in the future".to_string(),
        ));
    }

    let limit = Duration::try_days(max_days).and_then(|span| start.checked_add_signed(span));
    if limit.is_some_and(|limit| limit < end) {
        return Err(StatsError::Validation(format!(
            "Date range cannot exceed {max_days} days"
        )));
    }

    Ok(())
}

pub fn validate_uris(uris: Option<&[String]>, max_uris: usize) -> Result<(), StatsError> {
    let Some(uris) = uris else {
        return Ok(());
    };

    if uris.len() > max_uris {
        return Err(StatsError::Validation(format!(
            "Too many URIs in query. Maximum is {max_uris}"
        )));
    }

    if let Some(uri) = uris.iter().find(|uri| uri.chars().count() > MAX_URI_LEN) {
        return Err(StatsError::Validation(format!("URI too long: {uri}")));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::now_utc;

    fn record(app: &str, uri: &str, ip: &str, timestamp: &str) -> HitRecord {
        HitRecord {
            app: app.to_string(),
            uri: uri.to_string(),
            ip: ip.to_string(),
            timestamp: timestamp.to_string(),
        }
    }

    #[test]
    fn test_valid_hit_is_trimmed() {
        let stored =
            validate_hit(&record(" svc ", " /events/1 ", " 10.0.0.1 ", "2024-01-01 10:00:00"))
                .unwrap();
        assert_eq!(stored.app, "svc");
        assert_eq!(stored.uri, "/events/1");
        assert_eq!(stored.ip, "10.0.0.1");
    }

    #[test]
    fn test_blank_fields_are_rejected() {
        assert!(validate_hit(&record("  ", "/a", "1.1.1.1", "2024-01-01 10:00:00")).is_err());
        assert!(validate_hit(&record("svc", "", "1.1.1.1", "2024-01-01 10:00:00")).is_err());
        assert!(validate_hit(&record("svc", "/a", "", "2024-01-01 10:00:00")).is_err());
        assert!(validate_hit(&record("svc", "/a", "1.1.1.1", "")).is_err());
    }

    #[test]
    fn test_length_limits() {
        let long_ip = "1".repeat(46);
        assert!(validate_hit(&record("svc", "/a", &long_ip, "2024-01-01 10:00:00")).is_err());

        let long_uri = format!("/{}", "a".repeat(512));
        assert!(validate_hit(&record("svc", &long_uri, "1.1.1.1", "2024-01-01 10:00:00")).is_err());

        let long_app = "a".repeat(256);
        assert!(validate_hit(&record(&long_app, "/a", "1.1.1.1", "2024-01-01 10:00:00")).is_err());
    }

    #[test]
    fn test_bad_timestamp_is_rejected() {
        let err = validate_hit(&record("svc", "/a", "1.1.1.1", "2024-01-01T10:00:00")).unwrap_err();
        assert!(err.to_string().contains("yyyy-MM-dd HH:mm:ss"));
    }

    #[test]
    fn test_range_rules() {
        let now = now_utc();
        assert!(validate_range(now - Duration::days(1), now, now, 365).is_ok());
        assert!(validate_range(now, now - Duration::days(1), now, 365).is_err());
        assert!(validate_range(now + Duration::hours(1), now + Duration::hours(2), now, 365).is_err());
        assert!(validate_range(now - Duration::days(366), now, now, 365).is_err());
        assert!(validate_range(now - Duration::days(365), now, now, 365).is_ok());
    }

    #[test]
    fn test_range_limit_beyond_calendar_allows_any_span() {
        let now = now_utc();
        assert!(validate_range(now - Duration::days(3650), now, now, i64::MAX).is_ok());
        assert!(validate_range(now - Duration::days(1), now, now, 100_000_000).is_ok());
    }

    #[test]
    fn test_uri_list_rules() {
        let uris: Vec<String> = (0..101).map(|i| format!("/events/{i}")).collect();
        assert!(validate_uris(Some(&uris), 100).is_err());
        assert!(validate_uris(Some(&uris[..100]), 100).is_ok());
        assert!(validate_uris(None, 100).is_ok());
    }
}
