use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::InsightsError;

/// Epoch values below this are seconds, at or above it milliseconds.
const EPOCH_SECONDS_CEILING: i64 = 10_000_000_000;

/// `{ name }` reference resolved through a lookup-table join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRef {
    pub name: String,
}

/// `{ path }` reference resolved through the pages lookup table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRef {
    pub path: String,
}

/// Write-time timestamp as it comes out of the event store: epoch seconds,
/// epoch milliseconds, or a date-time string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventTimestamp {
    Epoch(i64),
    Text(String),
}

impl Default for EventTimestamp {
    fn default() -> Self {
        EventTimestamp::Epoch(0)
    }
}

impl EventTimestamp {
    /// Milliseconds since the epoch. Unparseable text yields 0.
    pub fn to_millis(&self) -> i64 {
        match self {
            EventTimestamp::Epoch(v) if *v < EPOCH_SECONDS_CEILING => v.saturating_mul(1000),
            EventTimestamp::Epoch(v) => *v,
            EventTimestamp::Text(raw) => {
                if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
                    return dt.timestamp_millis();
                }
                if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
                    return dt.and_utc().timestamp_millis();
                }
                raw.parse::<i64>()
                    .map(|v| EventTimestamp::Epoch(v).to_millis())
                    .unwrap_or(0)
            }
        }
    }
}

/// One analytics row as read from the event store.
///
/// Rows written by the optimized pipeline carry the joined lookup objects
/// (`analytics_event_types`, ...); rows from the legacy table carry the
/// names inline (`event_name`, `category`, ...). A row may carry both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_hash: Option<i64>,
    #[serde(default)]
    pub visitor_hash: Option<String>,
    #[serde(default)]
    pub created_at: EventTimestamp,

    // Product metadata
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,

    // Joined lookups
    #[serde(default)]
    pub analytics_event_types: Option<NameRef>,
    #[serde(default)]
    pub analytics_categories: Option<NameRef>,
    #[serde(default)]
    pub analytics_actions: Option<NameRef>,
    #[serde(default)]
    pub analytics_pages: Option<PathRef>,

    // Legacy flat columns
    #[serde(default)]
    pub event_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Product fields carried by an event, if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductMeta {
    pub product_id: Option<String>,
    pub product_name: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub quantity: Option<f64>,
}

/// Canonical event every aggregation works on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedEvent {
    pub event_name: String,
    pub category: String,
    pub action: String,
    pub label: Option<String>,
    pub value: Option<f64>,
    pub user_id: Option<String>,
    pub visitor_id: Option<String>,
    pub session_id: String,
    pub page: String,
    pub created_at_ms: i64,
    pub device_type: Option<String>,
    pub user_agent: Option<String>,
    pub product: ProductMeta,
}

impl NormalizedEvent {
    /// Authenticated user id, or the anonymous visitor hash.
    pub fn identity(&self) -> Option<&str> {
        self.user_id.as_deref().or(self.visitor_id.as_deref())
    }

    pub fn is_ecommerce(&self) -> bool {
        self.category == "shop" || self.category == "ecommerce"
    }

    pub fn is_cart_addition(&self) -> bool {
        self.action == "add_to_cart" || self.action == "add"
    }

    pub fn is_cart_removal(&self) -> bool {
        self.action == "remove_from_cart" || self.action == "remove"
    }

    pub fn is_purchase(&self) -> bool {
        self.action == "purchase"
    }

    pub fn is_product_view(&self) -> bool {
        self.page.contains("/product/") || self.page.contains("/buy/") || self.action == "view_item"
    }
}

/// Window and optional scope of a metrics query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsQueryParams {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl MetricsQueryParams {
    pub fn new(start_date: DateTime<Utc>, end_date: DateTime<Utc>) -> Self {
        Self {
            start_date,
            end_date,
            user_id: None,
            session_id: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Window from two caller-supplied bounds, each RFC 3339 or `YYYY-MM-DD`.
    /// A bare end date covers that whole day.
    pub fn from_bounds(start: &str, end: &str) -> Result<Self, InsightsError> {
        let start_date = parse_bound(start, false)?;
        let end_date = parse_bound(end, true)?;
        if start_date > end_date {
            return Err(InsightsError::Validation(format!(
                "start date {start} is after end date {end}"
            )));
        }
        Ok(Self::new(start_date, end_date))
    }
}

fn parse_bound(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, InsightsError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| InsightsError::Validation(format!("invalid date '{raw}'")))?;
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    };
    time.map(|t| date.and_time(t).and_utc())
        .ok_or_else(|| InsightsError::Validation(format!("invalid date '{raw}'")))
}

/// Time-bucketing strategy of a metrics query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Realtime,
    Daily,
    Weekly,
    Monthly,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Realtime => "realtime",
            Granularity::Daily => "daily",
            Granularity::Weekly => "weekly",
            Granularity::Monthly => "monthly",
        }
    }

    /// Cache lifetime for results of this granularity.
    pub fn ttl_secs(&self) -> u64 {
        match self {
            Granularity::Realtime => 30,
            Granularity::Daily => 3600,
            Granularity::Weekly => 21600,
            Granularity::Monthly => 86400,
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = InsightsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "realtime" => Ok(Granularity::Realtime),
            "daily" => Ok(Granularity::Daily),
            "weekly" => Ok(Granularity::Weekly),
            "monthly" => Ok(Granularity::Monthly),
            other => Err(InsightsError::Validation(format!(
                "unknown granularity '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_seconds_are_scaled() {
        assert_eq!(EventTimestamp::Epoch(1_768_788_256).to_millis(), 1_768_788_256_000);
        assert_eq!(
            EventTimestamp::Epoch(1_768_788_256_000).to_millis(),
            1_768_788_256_000
        );
    }

    #[test]
    fn test_timestamp_text_forms() {
        let iso = EventTimestamp::Text("2026-01-15T10:00:00Z".into());
        assert_eq!(iso.to_millis(), 1_768_471_200_000);
        let plain = EventTimestamp::Text("2026-01-15 10:00:00".into());
        assert_eq!(plain.to_millis(), 1_768_471_200_000);
        assert_eq!(EventTimestamp::Text("garbage".into()).to_millis(), 0);
    }

    #[test]
    fn test_raw_event_accepts_both_shapes() {
        let joined: RawEvent = serde_json::from_str(
            r#"{"id":"1","created_at":1768788256,"session_hash":42,
                "analytics_categories":{"name":"shop"},
                "analytics_actions":{"name":"purchase"},"value":10}"#,
        )
        .unwrap();
        assert_eq!(joined.analytics_categories.unwrap().name, "shop");
        assert_eq!(joined.session_hash, Some(42));

        let legacy: RawEvent = serde_json::from_str(
            r#"{"id":"2","created_at":"2026-01-15T10:00:00Z",
                "category":"search","action":"search","session_id":"abc"}"#,
        )
        .unwrap();
        assert_eq!(legacy.category.as_deref(), Some("search"));
        assert_eq!(legacy.created_at.to_millis(), 1_768_471_200_000);
    }

    #[test]
    fn test_query_bounds() {
        let params = MetricsQueryParams::from_bounds("2026-01-15", "2026-01-15").unwrap();
        assert_eq!(params.start_date.timestamp_millis(), 1_768_435_200_000);
        assert_eq!(params.end_date.timestamp_millis(), 1_768_521_599_999);

        let iso = MetricsQueryParams::from_bounds("2026-01-15T10:00:00Z", "2026-01-16").unwrap();
        assert_eq!(iso.start_date.timestamp_millis(), 1_768_471_200_000);

        assert!(MetricsQueryParams::from_bounds("2026-01-16", "2026-01-15").is_err());
        assert!(MetricsQueryParams::from_bounds("yesterday", "2026-01-15").is_err());
    }

    #[test]
    fn test_granularity_round_trip_and_ttl() {
        for g in [
            Granularity::Realtime,
            Granularity::Daily,
            Granularity::Weekly,
            Granularity::Monthly,
        ] {
            assert_eq!(g.as_str().parse::<Granularity>().unwrap(), g);
        }
        assert_eq!(Granularity::Realtime.ttl_secs(), 30);
        assert_eq!(Granularity::Monthly.ttl_secs(), 86400);
        assert!("hourly".parse::<Granularity>().is_err());
    }
}
