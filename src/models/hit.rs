use chrono::{NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Wire and storage format of hit timestamps (`yyyy-MM-dd HH:mm:ss`, UTC)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const MAX_APP_LEN: usize = 255;
pub const MAX_URI_LEN: usize = 512;
pub const MAX_IP_LEN: usize = 45;

pub fn format_timestamp(value: &NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT)
}

/// Current UTC time truncated to whole seconds
pub fn now_utc() -> NaiveDateTime {
    Utc::now().trunc_subsecs(0).naive_utc()
}

/// One observed request of `uri` by `ip`, reported by application `app`.
///
/// Fields default to empty strings on deserialization so that missing
/// values surface as validation errors rather than decode failures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HitRecord {
    pub app: String,
    pub uri: String,
    pub ip: String,
    pub timestamp: String,
}

impl HitRecord {
    pub fn new(
        app: impl Into<String>,
        uri: impl Into<String>,
        ip: impl Into<String>,
        at: NaiveDateTime,
    ) -> Self {
        Self {
            app: app.into(),
            uri: uri.into(),
            ip: ip.into(),
            timestamp: format_timestamp(&at),
        }
    }
}

/// Aggregated hit count for an (app, uri) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ViewStat {
    pub app: String,
    pub uri: String,
    pub hits: i64,
}

/// Parameters of an aggregate query. Also the key of the stats query cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatsQuery {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub uris: Option<Vec<String>>,
    pub unique: bool,
}

impl StatsQuery {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            start,
            end,
            uris: None,
            unique: false,
        }
    }

    pub fn with_uris(mut self, uris: Vec<String>) -> Self {
        self.uris = Some(uris);
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// An empty allow-list means "no filter"
    pub fn uri_filter(&self) -> Option<&[String]> {
        self.uris.as_deref().filter(|uris| !uris.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_roundtrip_uses_fixed_pattern() {
        let parsed = parse_timestamp("2024-03-05 07:08:09").unwrap();
        assert_eq!(format_timestamp(&parsed), "2024-03-05 07:08:09");
    }

    #[test]
    fn test_timestamp_rejects_iso_format() {
        assert!(parse_timestamp("2024-03-05T07:08:09").is_err());
    }

    #[test]
    fn test_hit_record_missing_fields_default_to_empty() {
        let hit: HitRecord = serde_json::from_str(r#"{"app":"svc"}"#).unwrap();
        assert_eq!(hit.app, "svc");
        assert!(hit.uri.is_empty());
        assert!(hit.timestamp.is_empty());
    }

    #[test]
    fn test_empty_uri_list_is_no_filter() {
        let now = now_utc();
        let query = StatsQuery::new(now, now).with_uris(vec![]);
        assert!(query.uri_filter().is_none());
    }
}
